use std::sync::Arc;

use axum::{routing::get, Router};
use carestate_store::Store;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler;

/// Build the axum router with the inspection endpoints.
pub fn build_router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/buckets", get(handler::list_buckets_handler))
        .route("/v1/buckets/:name", get(handler::get_bucket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(store)
}
