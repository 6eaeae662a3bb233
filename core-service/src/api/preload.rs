//! Preload and behavior endpoints.
//!
//! `/preload` multiplexes four operations by method:
//! - `POST` triggers a preload for the listener's context
//! - `PUT` records a behavior event (a `play` also counts a cache access)
//! - `GET` reports cache, network and analytics state
//! - `DELETE` clears the cache and expired behavior data

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use core_behavior::{BehaviorAction, BehaviorContext, BehaviorEvent};
use core_delivery::PreloadContext;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::response::{ApiError, ApiResult};
use super::AppState;

/// `POST /preload`
pub async fn trigger_preload(
    State(state): State<AppState>,
    body: Result<Json<PreloadContext>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(context) = body?;
    let report = state.preloader().preload_intelligently(context).await?;

    if let Some(reason) = report.skipped {
        return Ok(Json(json!({
            "success": true,
            "preloaded": false,
            "reason": reason,
            "message": reason.message(),
            "networkMetrics": report.network,
            "strategy": report.strategy,
            "cacheStats": report.cache,
        })));
    }

    Ok(Json(json!({
        "success": true,
        "preloaded": true,
        "message": format!("Preloaded {} item(s)", report.cached.len()),
        "report": report,
        "networkMetrics": report.network,
        "cacheStats": report.cache,
    })))
}

/// Body of `PUT /preload`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEventBody {
    pub user_id: String,
    pub session_id: String,
    pub action: String,
    pub audio_id: String,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    /// Server time is used when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context: Option<BehaviorContext>,
}

impl BehaviorEventBody {
    fn into_event(self, now: DateTime<Utc>) -> Result<BehaviorEvent, ApiError> {
        let action: BehaviorAction = self.action.parse()?;
        let mut event = BehaviorEvent::new(
            self.user_id,
            self.session_id,
            action,
            self.audio_id,
            self.timestamp.unwrap_or(now),
        );
        event.position = self.position;
        event.duration = self.duration;
        event.context = self.context;
        Ok(event)
    }
}

/// `PUT /preload`
pub async fn record_behavior(
    State(state): State<AppState>,
    body: Result<Json<BehaviorEventBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let event = body.into_event(state.dependencies().clock.now())?;
    let action = event.action;
    let audio_id = event.audio_id.clone();

    let recorded = state.analyzer().record_behavior(event).await?;
    let cache_hit = if recorded && action == BehaviorAction::Play {
        Some(state.preloader().record_access(&audio_id))
    } else {
        None
    };

    debug!(audio_id = %audio_id, %action, recorded, ?cache_hit, "Behavior event handled");
    Ok(Json(json!({
        "success": true,
        "recorded": recorded,
        "cacheHit": cache_hit,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadStatusQuery {
    pub user_id: Option<String>,
}

/// `GET /preload`
pub async fn preload_status(
    State(state): State<AppState>,
    Query(query): Query<PreloadStatusQuery>,
) -> Json<Value> {
    let network = state.network();
    let mut body = json!({
        "cacheStats": state.cache().stats(),
        "cachedEntries": state.cache().entries(),
        "networkMetrics": network.current_metrics(),
        "recommendedStrategy": network.recommended_preload_strategy(),
        "suitableForPreloading": network.is_suitable_for_preloading(),
        "inFlight": state.preloader().in_flight_count(),
        "analytics": state.analyzer().stats(),
    });

    if let Some(user_id) = query.user_id.as_deref().filter(|id| !id.trim().is_empty()) {
        body["userId"] = json!(user_id);
        body["listeningPattern"] = json!(state.analyzer().listening_pattern(user_id));
    }

    Json(body)
}

/// `DELETE /preload`
pub async fn clear_preload(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.cache().clear_all();
    let expired = state.analyzer().cleanup_expired_data();
    info!(cleared, removed_events = expired.removed_events, "Preload state cleared");

    Json(json!({
        "success": true,
        "clearedEntries": cleared,
        "expiredEvents": expired.removed_events,
        "usersDropped": expired.users_dropped,
    }))
}
