//! HTTP API
//!
//! Handlers are thin: they translate requests into calls on the
//! [`DeliveryService`](crate::DeliveryService) components and map domain
//! errors through [`response::ApiError`].

pub mod preload;
pub mod response;
pub mod stream;

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, head},
    Json, Router,
};
use serde_json::{json, Value};

use crate::DeliveryService;

/// Shared handler state.
pub type AppState = Arc<DeliveryService>;

/// Creates the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/audio/{id}/stream",
            head(stream::head_audio)
                .get(stream::stream_audio)
                .options(stream::stream_options),
        )
        .route(
            "/preload",
            get(preload::preload_status)
                .post(preload::trigger_preload)
                .put(preload::record_behavior)
                .delete(preload::clear_preload),
        )
        .with_state(state)
}

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let cache = state.cache().stats();
    Json(json!({
        "status": "ok",
        "network": state.network().current_metrics().quality,
        "cacheEntries": cache.entries,
        "cacheUsagePercent": cache.usage_percentage(),
    }))
}
