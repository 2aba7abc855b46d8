pub mod cluster;
pub mod database;

pub use cluster::*;
pub use database::*;
