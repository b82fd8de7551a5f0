//! Request body extraction for endpoints whose body may be omitted.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;

use super::ApiError;

/// A JSON body that may be left out entirely.
///
/// An empty (or whitespace-only) body yields `None`. Anything else must be
/// well-formed JSON sent as `application/json`, otherwise the request is
/// rejected with 400 rather than treated as absent.
#[derive(Debug)]
pub struct OptionalJson<T>(pub Option<T>);

impl<T: Default> OptionalJson<T> {
    pub fn into_inner_or_default(self) -> T {
        self.0.unwrap_or_default()
    }
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = has_json_content_type(req.headers());
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(None));
        }
        if !is_json {
            return Err(ApiError::BadRequest(
                "Expected request with `Content-Type: application/json`".to_string(),
            ));
        }

        let Json(value) =
            Json::<T>::from_bytes(&bytes).map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(Some(value)))
    }
}
