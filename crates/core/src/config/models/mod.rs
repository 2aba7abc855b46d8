pub mod app_config;
pub mod cluster;
pub mod database;
pub mod engine;
pub mod observability;

pub use app_config::AppConfig;
pub use cluster::ClusterConfig;
pub use database::DatabaseConfig;
pub use engine::{CleaningConfig, QueueConfig, WorkersConfig};
pub use observability::ObservabilityConfig;
