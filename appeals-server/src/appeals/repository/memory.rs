//! In-memory implementation of `AppealRepository`.
//!
//! All state lives behind one `RwLock`; every mutation holds the write guard
//! for its whole duration, which gives the same all-or-nothing behavior as a
//! database transaction. State is lost on restart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    millis_to_datetime, now_millis, AppealRepository, RepositoryError, ResponseTemplate,
};
use appeals_core::{Appeal, AppealFilter, AppealId, AppealResponse, AppealStatus};

#[derive(Default)]
struct Tables {
    appeals: BTreeMap<AppealId, Appeal>,
    responses: Vec<AppealResponse>,
    last_appeal_id: i64,
    last_response_id: i64,
}

impl Tables {
    fn latest_response(&self, id: AppealId) -> Option<String> {
        self.responses
            .iter()
            .rev()
            .find(|response| response.appeal_id == id)
            .map(|response| response.response_message.clone())
    }

    fn with_latest_response(&self, appeal: &Appeal) -> Appeal {
        Appeal {
            response_message: self.latest_response(appeal.id),
            ..appeal.clone()
        }
    }

    fn push_response(
        &mut self,
        appeal_id: AppealId,
        response_message: String,
        now: i64,
    ) -> Result<(), RepositoryError> {
        self.last_response_id += 1;
        self.responses.push(AppealResponse {
            id: self.last_response_id,
            appeal_id,
            response_message,
            date: millis_to_datetime(now, "date")?,
        });
        Ok(())
    }
}

/// In-memory appeal repository.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AppealRepository for InMemoryRepository {
    async fn create(&self, topic: &str, message: &str) -> Result<Appeal, RepositoryError> {
        let now = millis_to_datetime(now_millis(), "init_date")?;
        let mut tables = self.tables.write().await;
        tables.last_appeal_id += 1;
        let appeal = Appeal {
            id: AppealId(tables.last_appeal_id),
            topic: topic.to_string(),
            message: message.to_string(),
            status: AppealStatus::New,
            response_message: None,
            init_date: now,
            update_date: now,
        };
        tables.appeals.insert(appeal.id, appeal.clone());
        Ok(appeal)
    }

    async fn get(&self, id: AppealId) -> Result<Option<Appeal>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .appeals
            .get(&id)
            .map(|appeal| tables.with_latest_response(appeal)))
    }

    async fn list(&self, filter: &AppealFilter) -> Result<Vec<Appeal>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut appeals: Vec<Appeal> = tables
            .appeals
            .values()
            .filter(|appeal| filter.matches(appeal))
            .map(|appeal| tables.with_latest_response(appeal))
            .collect();
        appeals.sort_by(|a, b| (b.init_date, b.id).cmp(&(a.init_date, a.id)));
        Ok(appeals)
    }

    async fn responses(&self, id: AppealId) -> Result<Vec<AppealResponse>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .responses
            .iter()
            .filter(|response| response.appeal_id == id)
            .cloned()
            .collect())
    }

    async fn conditional_transition(
        &self,
        id: AppealId,
        expected: &[AppealStatus],
        new_status: AppealStatus,
        response_message: Option<String>,
    ) -> Result<Option<Appeal>, RepositoryError> {
        let now = now_millis();
        let now_date = millis_to_datetime(now, "update_date")?;

        let mut tables = self.tables.write().await;
        let Some(appeal) = tables.appeals.get_mut(&id) else {
            return Ok(None);
        };
        if !expected.contains(&appeal.status) {
            return Ok(None);
        }

        appeal.status = new_status;
        appeal.update_date = appeal.update_date.max(now_date);
        let updated = appeal.clone();

        if let Some(message) = &response_message {
            tables.push_response(id, message.clone(), now)?;
        }

        Ok(Some(Appeal {
            response_message,
            ..updated
        }))
    }

    async fn bulk_transition(
        &self,
        from: &[AppealStatus],
        to: AppealStatus,
        template: ResponseTemplate,
    ) -> Result<Vec<Appeal>, RepositoryError> {
        let now = now_millis();
        let now_date = millis_to_datetime(now, "update_date")?;

        let mut tables = self.tables.write().await;
        let mut prior: Vec<Appeal> = tables
            .appeals
            .values()
            .filter(|appeal| from.contains(&appeal.status))
            .cloned()
            .collect();
        prior.sort_by(|a, b| (b.init_date, b.id).cmp(&(a.init_date, a.id)));

        let mut transitioned = Vec::with_capacity(prior.len());
        for before in prior {
            let message = template(&before);
            let after = Appeal {
                status: to,
                update_date: before.update_date.max(now_date),
                response_message: None,
                ..before
            };
            tables.appeals.insert(after.id, after.clone());
            tables.push_response(after.id, message.clone(), now)?;
            transitioned.push(Appeal {
                response_message: Some(message),
                ..after
            });
        }

        Ok(transitioned)
    }
}
