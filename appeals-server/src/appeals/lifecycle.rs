//! The lifecycle controller.
//!
//! Maps each user-facing verb onto one conditional store call. The expected
//! prior statuses come from [`Operation::rule`]; this module only adds input
//! validation and the wording of audit messages. It never locks anything:
//! racing requests are settled by the store's conditional update.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::repository::{AppealRepository, RepositoryError, ResponseTemplate};
use appeals_core::{Appeal, AppealFilter, AppealId, AppealResponse, BulkCancelResult, Operation};

/// Reason recorded by a bulk cancellation when the caller gives none.
pub const DEFAULT_BULK_CANCEL_REASON: &str = "All in-progress appeals cancelled";

pub fn completion_message(solution: &str) -> String {
    format!("Appeal completed. Solution: {}", solution)
}

pub fn cancellation_message(reason: &str) -> String {
    format!("Appeal cancelled. Reason: {}", reason)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Request rejected before touching storage.
    Validation(String),
    /// The appeal does not exist or is not in a status the operation accepts.
    /// Callers cannot tell the two apart.
    NotFound {
        id: AppealId,
        operation: &'static str,
    },
    Storage(RepositoryError),
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(message) => f.write_str(message),
            Self::NotFound { id, operation } => write!(
                f,
                "Appeal {} not found or not in a status that allows {}",
                id, operation
            ),
            Self::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LifecycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RepositoryError> for LifecycleError {
    fn from(e: RepositoryError) -> Self {
        Self::Storage(e)
    }
}

/// Drives appeals through their lifecycle on top of an injected repository.
#[derive(Clone)]
pub struct AppealLifecycle {
    repository: Arc<dyn AppealRepository>,
}

impl AppealLifecycle {
    pub fn new(repository: Arc<dyn AppealRepository>) -> Self {
        Self { repository }
    }

    pub async fn submit(&self, topic: &str, message: &str) -> Result<Appeal, LifecycleError> {
        if topic.trim().is_empty() {
            return Err(LifecycleError::Validation("topic must not be empty".into()));
        }
        if message.trim().is_empty() {
            return Err(LifecycleError::Validation(
                "message must not be empty".into(),
            ));
        }

        let appeal = self.repository.create(topic, message).await?;
        info!("Appeal {} submitted on topic {:?}", appeal.id, appeal.topic);
        Ok(appeal)
    }

    pub async fn list(&self, filter: &AppealFilter) -> Result<Vec<Appeal>, LifecycleError> {
        Ok(self.repository.list(filter).await?)
    }

    pub async fn get(&self, id: AppealId) -> Result<Appeal, LifecycleError> {
        self.repository
            .get(id)
            .await?
            .ok_or(LifecycleError::NotFound {
                id,
                operation: "get",
            })
    }

    /// Audit responses of an appeal, oldest first.
    pub async fn history(&self, id: AppealId) -> Result<Vec<AppealResponse>, LifecycleError> {
        if self.repository.get(id).await?.is_none() {
            return Err(LifecycleError::NotFound {
                id,
                operation: "history",
            });
        }
        Ok(self.repository.responses(id).await?)
    }

    pub async fn take(&self, id: AppealId) -> Result<Appeal, LifecycleError> {
        self.apply(id, Operation::Take, None).await
    }

    /// A missing solution is recorded as an empty string.
    pub async fn complete(
        &self,
        id: AppealId,
        solution: Option<&str>,
    ) -> Result<Appeal, LifecycleError> {
        let message = completion_message(solution.unwrap_or_default());
        self.apply(id, Operation::Complete, Some(message)).await
    }

    /// A missing reason is recorded as an empty string.
    pub async fn cancel(
        &self,
        id: AppealId,
        reason: Option<&str>,
    ) -> Result<Appeal, LifecycleError> {
        let message = cancellation_message(reason.unwrap_or_default());
        self.apply(id, Operation::Cancel, Some(message)).await
    }

    /// Cancel every appeal currently in progress in one atomic batch.
    pub async fn cancel_all_in_work(
        &self,
        reason: Option<&str>,
    ) -> Result<BulkCancelResult, LifecycleError> {
        let rule = Operation::CancelAllInWork.rule();
        let message = cancellation_message(reason.unwrap_or(DEFAULT_BULK_CANCEL_REASON));
        let template: ResponseTemplate = Arc::new(move |_: &Appeal| message.clone());

        let appeals = self
            .repository
            .bulk_transition(rule.expected, rule.target, template)
            .await?;

        info!(
            "Cancelled {} in-progress appeals: {:?}",
            appeals.len(),
            appeals.iter().map(|a| a.id.0).collect::<Vec<_>>()
        );
        Ok(BulkCancelResult {
            message: format!("Cancelled {} appeals", appeals.len()),
            appeals,
        })
    }

    async fn apply(
        &self,
        id: AppealId,
        operation: Operation,
        response_message: Option<String>,
    ) -> Result<Appeal, LifecycleError> {
        let rule = operation.rule();
        let response_message = response_message.filter(|_| rule.records_response);

        match self
            .repository
            .conditional_transition(id, rule.expected, rule.target, response_message)
            .await?
        {
            Some(appeal) => {
                info!("Appeal {} is now {} ({})", appeal.id, appeal.status, operation);
                Ok(appeal)
            }
            None => {
                debug!(
                    "Rejected {} on appeal {}: missing or not in {:?}",
                    operation, id, rule.expected
                );
                Err(LifecycleError::NotFound {
                    id,
                    operation: operation.name(),
                })
            }
        }
    }
}
