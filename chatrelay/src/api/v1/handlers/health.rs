use axum::extract::State;
use serde::Serialize;

use crate::api::state::AppState;
use crate::api::v1::response::ApiResponse;

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub database: DatabaseStatus,
    pub upstream: UpstreamStatus,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DatabaseStatus {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamStatus {
    pub base_url: String,
    /// Whether a default app key is set.
    pub default_key: bool,
    /// Number of knowledge bases with their own app key.
    pub knowledge_bases: usize,
}

/// `GET /api/v1/health`
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Service health status", body = HealthData),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResponse<HealthData> {
    let database = match state.db.ping().await {
        Ok(()) => DatabaseStatus {
            status: "ok".to_string(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Health check database ping failed");
            DatabaseStatus {
                status: "error".to_string(),
            }
        }
    };

    let upstream_config = &state.config.upstream;
    let upstream = UpstreamStatus {
        base_url: upstream_config.base_url.clone(),
        default_key: state.upstream.is_configured(None),
        knowledge_bases: upstream_config.knowledge_bases.len(),
    };

    let status = if database.status == "ok" { "ok" } else { "degraded" };
    ApiResponse::success(HealthData {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        upstream,
    })
}
