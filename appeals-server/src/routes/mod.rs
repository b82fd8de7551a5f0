//! HTTP surface of the service.

pub mod appeals;
pub mod docs;
pub mod extract;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::error;
use utoipa::ToSchema;

use crate::{AppState, LifecycleError};

/// Body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Error returned by handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::Validation(_) => ApiError::BadRequest(e.to_string()),
            LifecycleError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            LifecycleError::Storage(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => {
                error!("Request failed: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal storage error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": crate::SERVICE_NAME
    }))
}

async fn help_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": crate::SERVICE_NAME,
        "version": crate::get_version(),
        "description": "Tracks appeals through New, InProgress, Completed and Cancelled",
        "endpoints": [
            {
                "path": "/appeals",
                "method": "POST",
                "description": "Submit an appeal",
                "body": {"topic": "string", "message": "string"}
            },
            {
                "path": "/appeals",
                "method": "GET",
                "description": "List appeals, newest first",
                "query": {
                    "date": "YYYY-MM-DD",
                    "startDate": "YYYY-MM-DD (requires endDate)",
                    "endDate": "YYYY-MM-DD (inclusive, requires startDate)",
                    "status": "New | InProgress | Completed | Cancelled"
                }
            },
            {
                "path": "/appeals/:id",
                "method": "GET",
                "description": "Fetch one appeal"
            },
            {
                "path": "/appeals/:id/responses",
                "method": "GET",
                "description": "Audit responses recorded for an appeal"
            },
            {
                "path": "/appeals/:id/take",
                "method": "PUT",
                "description": "Move a New appeal to InProgress"
            },
            {
                "path": "/appeals/:id/complete",
                "method": "PUT",
                "description": "Complete an InProgress appeal",
                "body": {"solution": "string"}
            },
            {
                "path": "/appeals/:id/cancel",
                "method": "PUT",
                "description": "Cancel a New or InProgress appeal",
                "body": {"cancellation_reason": "string"}
            },
            {
                "path": "/appeals/cancel-all-in-work",
                "method": "PUT",
                "description": "Cancel every InProgress appeal at once",
                "body": {"response_message": "string (optional)"}
            },
            {
                "path": "/api-docs",
                "method": "GET",
                "description": "Swagger UI for the appeals API"
            },
            {
                "path": "/api-docs/openapi.json",
                "method": "GET",
                "description": "OpenAPI document for the appeals API"
            },
            {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint"
            },
            {
                "path": "/help",
                "method": "GET",
                "description": "This document"
            }
        ],
        "configuration": {
            "optional_env_vars": [
                "PORT (default: 3000)",
                "BIND_ADDRESS (default: 0.0.0.0)",
                "STATE_DIR (default: current directory)",
                "DATABASE_PATH (default: STATE_DIR/appeals.db)"
            ]
        }
    }))
}

pub fn appeals_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/appeals",
            post(appeals::submit_appeal).get(appeals::list_appeals),
        )
        .route(
            "/appeals/cancel-all-in-work",
            put(appeals::cancel_all_in_work),
        )
        .route("/appeals/:id", get(appeals::get_appeal))
        .route("/appeals/:id/responses", get(appeals::get_responses))
        .route("/appeals/:id/take", put(appeals::take_appeal))
        .route("/appeals/:id/complete", put(appeals::complete_appeal))
        .route("/appeals/:id/cancel", put(appeals::cancel_appeal))
}

/// The complete application with request tracing.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/help", get(help_handler))
        .route("/api-docs", get(docs::swagger_ui))
        .route(docs::OPENAPI_JSON_PATH, get(docs::openapi_json))
        .merge(appeals_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
