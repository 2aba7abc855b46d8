pub mod cluster;
pub mod entities;
pub mod repositories;
pub mod submission;
pub mod task;

pub use cluster::*;
pub use engine_core::{EngineError, EngineResult};
pub use entities::*;
pub use repositories::*;
pub use submission::*;
pub use task::*;
