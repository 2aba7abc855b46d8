pub mod schema;
pub mod sqlite_task_store;

pub use sqlite_task_store::{SqliteStoreSession, SqliteTaskStore};
