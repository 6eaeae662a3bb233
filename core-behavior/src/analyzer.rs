//! # User Behavior Analyzer
//!
//! Keeps a bounded, in-memory history of playback events per user and derives
//! listening patterns and personalized recommendations from it.
//!
//! ## Overview
//!
//! - Histories are capped by count (oldest dropped first) and by age
//!   (`cleanup_expired_data`).
//! - Patterns are recomputed from the live history on every request.
//! - Each record carries the category, speaker and track length looked up from
//!   the catalog at record time, so later derivations do not hit the catalog.
//!
//! ## Usage
//!
//! ```ignore
//! let analyzer = Arc::new(UserBehaviorAnalyzer::new(
//!     AnalyzerConfig::default(),
//!     catalog,
//!     Arc::new(SystemClock),
//! ));
//! analyzer.record_behavior(event).await?;
//! let pattern = analyzer.listening_pattern("user-1");
//! let picks = analyzer.generate_personalized_recommendations("user-1", 10).await?;
//! ```

use crate::error::Result;
use crate::event::{BehaviorAction, BehaviorEvent};
use crate::pattern::ListeningPattern;
use crate::recommend::{self, Recommendation, RecommendationWeights};
use bridge_traits::{AudioCatalog, Clock};
use chrono::{DateTime, Utc};
use core_runtime::config::BehaviorSettings;
use core_runtime::events::{AnalyticsEvent, CoreEvent, EventBus};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Analyzer tuning.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Events kept per user before the oldest are dropped
    pub max_events_per_user: usize,
    /// Events older than this many days are expired
    pub retention_days: u32,
    /// How many recent catalog items are considered for recommendations
    pub candidate_pool: usize,
    pub weights: RecommendationWeights,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_events_per_user: 500,
            retention_days: 90,
            candidate_pool: 200,
            weights: RecommendationWeights::default(),
        }
    }
}

impl From<&BehaviorSettings> for AnalyzerConfig {
    fn from(settings: &BehaviorSettings) -> Self {
        Self {
            max_events_per_user: settings.max_events_per_user,
            retention_days: settings.retention_days,
            ..Self::default()
        }
    }
}

/// A recorded event plus the catalog facts known when it was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorRecord {
    pub event: BehaviorEvent,
    pub category: Option<String>,
    pub speaker: Option<String>,
    /// Track length in seconds
    pub audio_duration: Option<f64>,
}

/// Result of one expiry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed_events: usize,
    pub users_dropped: usize,
}

/// Snapshot of the analyzer's size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerStats {
    pub users: usize,
    pub events: usize,
    pub oldest_event_at: Option<DateTime<Utc>>,
}

/// Per-user behavior history and derived analytics.
pub struct UserBehaviorAnalyzer {
    config: AnalyzerConfig,
    catalog: Arc<dyn AudioCatalog>,
    clock: Arc<dyn Clock>,
    histories: RwLock<HashMap<String, VecDeque<BehaviorRecord>>>,
    event_bus: Option<Arc<EventBus>>,
}

impl UserBehaviorAnalyzer {
    pub fn new(config: AnalyzerConfig, catalog: Arc<dyn AudioCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            catalog,
            clock,
            histories: RwLock::new(HashMap::new()),
            event_bus: None,
        }
    }

    /// Set event bus for analytics events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    fn retention_cutoff(&self) -> DateTime<Utc> {
        self.clock.now() - chrono::Duration::days(i64::from(self.config.retention_days))
    }

    fn emit(&self, event: AnalyticsEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Behavior(event)).ok();
        }
    }

    /// Append an event to the user's history.
    ///
    /// Returns `Ok(false)` when the event is already past the retention window
    /// and was ignored. Catalog lookup failures do not reject the event; it is
    /// stored without enrichment.
    #[instrument(skip(self, event), fields(user_id = %event.user_id, action = %event.action))]
    pub async fn record_behavior(&self, event: BehaviorEvent) -> Result<bool> {
        event.validate()?;

        if event.timestamp < self.retention_cutoff() {
            debug!(audio_id = %event.audio_id, "Ignoring event older than retention window");
            return Ok(false);
        }

        let descriptor = match self.catalog.get_audio(&event.audio_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(audio_id = %event.audio_id, error = %e, "Catalog lookup failed; recording without enrichment");
                None
            }
        };

        let record = BehaviorRecord {
            category: descriptor.as_ref().and_then(|d| d.category.clone()),
            speaker: descriptor.as_ref().and_then(|d| d.speaker.clone()),
            audio_duration: descriptor.as_ref().map(|d| d.metadata.duration),
            event,
        };

        let recorded = AnalyticsEvent::Recorded {
            user_id: record.event.user_id.clone(),
            audio_id: record.event.audio_id.clone(),
            action: record.event.action.to_string(),
        };

        {
            let mut histories = self.histories.write();
            let history = histories.entry(record.event.user_id.clone()).or_default();
            history.push_back(record);
            while history.len() > self.config.max_events_per_user {
                history.pop_front();
            }
        }

        debug!("Behavior event recorded");
        self.emit(recorded);
        Ok(true)
    }

    /// Number of events currently held for a user.
    pub fn history_len(&self, user_id: &str) -> usize {
        self.histories.read().get(user_id).map_or(0, VecDeque::len)
    }

    /// Derive the user's listening pattern from unexpired history.
    ///
    /// Returns `None` when the user has no live events.
    pub fn listening_pattern(&self, user_id: &str) -> Option<ListeningPattern> {
        let cutoff = self.retention_cutoff();
        let histories = self.histories.read();
        let history = histories.get(user_id)?;
        let live: Vec<&BehaviorRecord> = history
            .iter()
            .filter(|r| r.event.timestamp >= cutoff)
            .collect();
        if live.is_empty() {
            return None;
        }
        Some(ListeningPattern::derive(user_id, live))
    }

    /// Audio the user started or finished within the retention window.
    pub fn played_audio_ids(&self, user_id: &str) -> HashSet<String> {
        let cutoff = self.retention_cutoff();
        self.histories
            .read()
            .get(user_id)
            .map(|history| {
                history
                    .iter()
                    .filter(|r| r.event.timestamp >= cutoff)
                    .filter(|r| matches!(r.event.action, BehaviorAction::Play | BehaviorAction::Complete))
                    .map(|r| r.event.audio_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove every event older than the retention window, across all users.
    ///
    /// Safe to run concurrently with `record_behavior`; a second call with the
    /// clock unchanged removes nothing.
    #[instrument(skip(self))]
    pub fn cleanup_expired_data(&self) -> CleanupReport {
        let cutoff = self.retention_cutoff();
        let mut report = CleanupReport::default();

        {
            let mut histories = self.histories.write();
            histories.retain(|_, history| {
                let before = history.len();
                history.retain(|r| r.event.timestamp >= cutoff);
                report.removed_events += before - history.len();
                if history.is_empty() {
                    report.users_dropped += 1;
                    false
                } else {
                    true
                }
            });
        }

        if report.removed_events > 0 {
            info!(
                removed = report.removed_events,
                users_dropped = report.users_dropped,
                "Expired behavior data removed"
            );
            self.emit(AnalyticsEvent::Expired {
                removed: report.removed_events,
                users_dropped: report.users_dropped,
            });
        }

        report
    }

    /// Rank recent catalog content for a user.
    ///
    /// Items the user already completed are left out. Users without history
    /// get the newest uploads.
    #[instrument(skip(self))]
    pub async fn generate_personalized_recommendations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Recommendation>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let pattern = self.listening_pattern(user_id);
        let completed: HashSet<String> = {
            let cutoff = self.retention_cutoff();
            self.histories
                .read()
                .get(user_id)
                .map(|history| {
                    history
                        .iter()
                        .filter(|r| r.event.timestamp >= cutoff && r.event.action == BehaviorAction::Complete)
                        .map(|r| r.event.audio_id.clone())
                        .collect()
                })
                .unwrap_or_default()
        };

        let candidates: Vec<_> = self
            .catalog
            .list_recent(self.config.candidate_pool)
            .await?
            .into_iter()
            .filter(|d| !completed.contains(d.id()))
            .collect();

        let ranked = recommend::rank(
            pattern.as_ref(),
            candidates,
            self.clock.now(),
            &self.config.weights,
            limit,
        );
        debug!(count = ranked.len(), "Generated recommendations");
        Ok(ranked)
    }

    pub fn stats(&self) -> AnalyzerStats {
        let histories = self.histories.read();
        AnalyzerStats {
            users: histories.len(),
            events: histories.values().map(VecDeque::len).sum(),
            oldest_event_at: histories
                .values()
                .flat_map(|h| h.iter().map(|r| r.event.timestamp))
                .min(),
        }
    }

    /// Run `cleanup_expired_data` every `interval` until `token` is cancelled.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let analyzer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Behavior cleanup loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        analyzer.cleanup_expired_data();
                    }
                }
            }
        })
    }
}
