//! Appeal lifecycle: the controller and the storage it drives.

pub mod lifecycle;
pub mod repository;

pub use lifecycle::{AppealLifecycle, LifecycleError};
pub use repository::{AppealRepository, InMemoryRepository, RepositoryError, SqliteRepository};
