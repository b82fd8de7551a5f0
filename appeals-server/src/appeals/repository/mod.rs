//! Repository abstraction for appeal persistence.
//!
//! This module defines the `AppealRepository` trait that abstracts storage
//! of appeals and their audit responses. Implementations provide different
//! backends (in-memory, SQLite).
//!
//! Every mutating operation is a conditional update: it only applies when
//! the appeal is currently in one of the expected statuses, and the status
//! change plus its audit row commit together or not at all. Callers never
//! lock anything themselves.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use appeals_core::{Appeal, AppealFilter, AppealId, AppealResponse, AppealStatus};

/// Builds the audit message for one appeal of a bulk transition.
///
/// Receives the appeal as it was before the transition.
pub type ResponseTemplate = Arc<dyn Fn(&Appeal) -> String + Send + Sync>;

/// Errors raised by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The backend failed to execute an operation (I/O, SQL, lock poisoning).
    Storage {
        operation: &'static str,
        message: String,
    },
    /// A stored value could not be decoded.
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { operation, message } => {
                write!(f, "storage error during {}: {}", operation, message)
            }
            Self::Corruption { what } => write!(f, "corrupt {} in database", what),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Repository trait for persisting appeals.
#[async_trait]
pub trait AppealRepository: Send + Sync {
    /// Insert a new appeal in status `New` with both dates set to now.
    async fn create(&self, topic: &str, message: &str) -> Result<Appeal, RepositoryError>;

    /// Get one appeal, returning None if it does not exist.
    async fn get(&self, id: AppealId) -> Result<Option<Appeal>, RepositoryError>;

    /// Appeals matching every present filter, newest `init_date` first
    /// (ties broken by id, highest first).
    async fn list(&self, filter: &AppealFilter) -> Result<Vec<Appeal>, RepositoryError>;

    /// Audit responses of an appeal, oldest first.
    async fn responses(&self, id: AppealId) -> Result<Vec<AppealResponse>, RepositoryError>;

    /// Atomically move appeal `id` to `new_status` if its current status is
    /// in `expected`, recording `response_message` as an audit row when given.
    ///
    /// Returns `None` when the appeal does not exist or is in another status.
    /// In that case nothing is written.
    async fn conditional_transition(
        &self,
        id: AppealId,
        expected: &[AppealStatus],
        new_status: AppealStatus,
        response_message: Option<String>,
    ) -> Result<Option<Appeal>, RepositoryError>;

    /// Atomically move every appeal whose status is in `from` to `to`,
    /// recording one audit row per appeal. All source statuses are handled in
    /// one unit of work. Returns the transitioned appeals, newest first.
    async fn bulk_transition(
        &self,
        from: &[AppealStatus],
        to: AppealStatus,
        template: ResponseTemplate,
    ) -> Result<Vec<Appeal>, RepositoryError>;
}

/// Current time as unix milliseconds, the storage resolution for dates.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub(crate) fn millis_to_datetime(
    millis: i64,
    column: &'static str,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| RepositoryError::corruption(format!("{} timestamp {}", column, millis)))
}
