//! OpenAPI document and Swagger UI under `/api-docs`.

use axum::{response::Html, Json};
use utoipa::OpenApi;

use super::{appeals, ErrorBody};
use appeals_core::{
    Appeal, AppealId, AppealResponse, AppealStatus, BulkCancelResult, CancelAllInWork,
    CancelAppeal, CompleteAppeal, SubmitAppeal,
};

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(title = "Appeals", description = "Appeal tracking with a fixed status lifecycle"),
    paths(
        appeals::submit_appeal,
        appeals::list_appeals,
        appeals::get_appeal,
        appeals::get_responses,
        appeals::take_appeal,
        appeals::complete_appeal,
        appeals::cancel_appeal,
        appeals::cancel_all_in_work,
    ),
    components(schemas(
        Appeal,
        AppealId,
        AppealResponse,
        AppealStatus,
        BulkCancelResult,
        CancelAllInWork,
        CancelAppeal,
        CompleteAppeal,
        SubmitAppeal,
        ErrorBody,
    )),
    tags((name = "appeals", description = "Appeal lifecycle operations"))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    let mut doc = ApiDoc::openapi();
    doc.info.version = crate::get_version().to_string();
    Json(doc)
}

// Assets come from the unpkg CDN; only the page shell is served here.
pub async fn swagger_ui() -> Html<String> {
    Html(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>Appeals API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js" crossorigin></script>
  <script>
    window.onload = () => {{
      window.ui = SwaggerUIBundle({{ url: "{spec_url}", dom_id: "#swagger-ui" }});
    }};
  </script>
</body>
</html>
"##,
        spec_url = OPENAPI_JSON_PATH
    ))
}
