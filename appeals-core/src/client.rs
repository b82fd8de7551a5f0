use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::appeal::{
    Appeal, AppealFilter, AppealId, AppealResponse, BulkCancelResult, CancelAllInWork,
    CancelAppeal, CompleteAppeal, SubmitAppeal,
};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

/// Synchronous client for the appeals HTTP API
#[derive(Clone)]
pub struct AppealsClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl AppealsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::blocking::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn submit(&self, topic: &str, message: &str) -> Result<Appeal> {
        let body = SubmitAppeal {
            topic: topic.to_string(),
            message: message.to_string(),
        };
        self.send(
            self.client.post(self.url("/appeals")).json(&body),
            "submit appeal",
        )
    }

    pub fn list(&self, filter: &AppealFilter) -> Result<Vec<Appeal>> {
        self.send(
            self.client.get(self.url("/appeals")).query(filter),
            "list appeals",
        )
    }

    pub fn get(&self, id: AppealId) -> Result<Appeal> {
        self.send(
            self.client.get(self.url(&format!("/appeals/{}", id))),
            "get appeal",
        )
    }

    pub fn responses(&self, id: AppealId) -> Result<Vec<AppealResponse>> {
        self.send(
            self.client
                .get(self.url(&format!("/appeals/{}/responses", id))),
            "get appeal responses",
        )
    }

    pub fn take(&self, id: AppealId) -> Result<Appeal> {
        self.send(
            self.client.put(self.url(&format!("/appeals/{}/take", id))),
            "take appeal",
        )
    }

    pub fn complete(&self, id: AppealId, solution: Option<String>) -> Result<Appeal> {
        let body = CompleteAppeal { solution };
        self.send(
            self.client
                .put(self.url(&format!("/appeals/{}/complete", id)))
                .json(&body),
            "complete appeal",
        )
    }

    pub fn cancel(&self, id: AppealId, cancellation_reason: Option<String>) -> Result<Appeal> {
        let body = CancelAppeal {
            cancellation_reason,
        };
        self.send(
            self.client
                .put(self.url(&format!("/appeals/{}/cancel", id)))
                .json(&body),
            "cancel appeal",
        )
    }

    pub fn cancel_all_in_work(&self, response_message: Option<String>) -> Result<BulkCancelResult> {
        let body = CancelAllInWork { response_message };
        self.send(
            self.client
                .put(self.url("/appeals/cancel-all-in-work"))
                .json(&body),
            "cancel all in-progress appeals",
        )
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T> {
        let response = request
            .send()
            .with_context(|| format!("Failed to {} at {}", action, self.base_url))?;
        Self::parse(response, action)
    }

    fn parse<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .context("Failed to read error response body")?;
            let detail = serde_json::from_str::<ErrorBody>(&error_text)
                .map(|body| body.error)
                .unwrap_or(error_text);
            return Err(anyhow!("Failed to {}: {} - {}", action, status, detail));
        }

        response
            .json()
            .with_context(|| format!("Failed to parse {} response", action))
    }
}
