use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::api::state::AppState;

use super::handlers;
use super::middleware::v1_auth_middleware;

pub fn v1_router(state: AppState) -> Router<AppState> {
    let conversations = Router::new()
        .route(
            "/{conversationId}/citations",
            get(handlers::citations::get_citations).delete(handlers::citations::delete_citations),
        )
        .route(
            "/{conversationId}/citations/{ordinal}",
            put(handlers::citations::put_citations),
        );

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/openapi.json", get(super::openapi::openapi_json))
        .merge(super::openapi::redoc_router());

    let protected_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .nest("/conversations", conversations)
        .route_layer(middleware::from_fn_with_state(state, v1_auth_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}
