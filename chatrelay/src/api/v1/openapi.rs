use axum::Json;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

use super::dto;
use super::handlers;
use super::response;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Chatrelay API",
        version = "1.0.0",
        description = "Streaming relay for a retrieval-augmented chat API, with transcript persistence and a per-conversation citation cache.",
    ),
    paths(
        handlers::health::health_check,
        handlers::chat::chat,
        handlers::citations::get_citations,
        handlers::citations::put_citations,
        handlers::citations::delete_citations,
    ),
    components(schemas(
        response::ErrorCode,
        response::ApiError,
        crate::models::CitationRecord,
        crate::citations::WriteOutcome,
        dto::ChatRequest,
        dto::CitationsResponse,
        dto::WriteCitationsRequest,
        dto::WriteCitationsResponse,
        dto::ClearCitationsResponse,
        handlers::health::HealthData,
        handlers::health::DatabaseStatus,
        handlers::health::UpstreamStatus,
    )),
    tags(
        (name = "health", description = "Health check"),
        (name = "chat", description = "Streamed chat turns"),
        (name = "citations", description = "Per-conversation citation cache"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(utoipa::openapi::security::Http::new(
                utoipa::openapi::security::HttpAuthScheme::Bearer,
            )),
        );
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn redoc_router<S: Clone + Send + Sync + 'static>() -> axum::Router<S> {
    Redoc::with_url("/docs", ApiDoc::openapi()).into()
}
