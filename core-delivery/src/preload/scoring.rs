//! Candidate scoring
//!
//! A candidate's score is a plain weighted sum of independent signals. The
//! weights are data so they can be tuned without touching the ranking code.

use super::context::PreloadContext;
use bridge_traits::catalog::same_label;
use bridge_traits::AudioDescriptor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

/// Weights for each scoring signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    /// Same category as the current track
    pub same_category: f64,
    /// Same speaker as the current track
    pub same_speaker: f64,
    /// Per tag shared with the current track
    pub shared_tag: f64,
    /// Per position of playlist proximity; the next item gets `lookahead` steps
    pub playlist_step: f64,
    /// Bonus for a brand new upload, decaying to zero over `recency_window_days`
    pub recency: f64,
    pub recency_window_days: f64,
    /// Returned by the personalized recommender
    pub personalized: f64,
    /// Category or speaker listed in the user's preferences (each)
    pub preferred: f64,
    /// Multiplier for items already in the play history
    pub replay_factor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            same_category: 10.0,
            same_speaker: 8.0,
            shared_tag: 3.0,
            playlist_step: 5.0,
            recency: 5.0,
            recency_window_days: 30.0,
            personalized: 4.0,
            preferred: 4.0,
            replay_factor: 0.5,
        }
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSignals {
    /// 1 for the item right after the current one
    pub playlist_distance: Option<usize>,
    pub related: bool,
    pub personalized: bool,
}

impl CandidateSignals {
    /// Combine signals gathered from different sources for the same item.
    pub fn merge(&mut self, other: CandidateSignals) {
        self.playlist_distance = match (self.playlist_distance, other.playlist_distance) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.related |= other.related;
        self.personalized |= other.personalized;
    }
}

/// A scored preload candidate.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub audio: AudioDescriptor,
    pub signals: CandidateSignals,
    pub score: f64,
}

/// Serializable view of a candidate for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    pub audio_id: String,
    pub score: f64,
    pub signals: CandidateSignals,
}

impl From<&ScoredCandidate> for CandidateSummary {
    fn from(candidate: &ScoredCandidate) -> Self {
        Self {
            audio_id: candidate.audio.id().to_string(),
            score: candidate.score,
            signals: candidate.signals,
        }
    }
}

/// Score one candidate relative to the current track.
pub fn score_candidate(
    current: Option<&AudioDescriptor>,
    candidate: &AudioDescriptor,
    signals: &CandidateSignals,
    context: &PreloadContext,
    lookahead: usize,
    now: DateTime<Utc>,
    weights: &ScoringWeights,
) -> f64 {
    let mut score = 0.0;

    if let Some(current) = current {
        if same_label(&current.category, &candidate.category) {
            score += weights.same_category;
        }
        if same_label(&current.speaker, &candidate.speaker) {
            score += weights.same_speaker;
        }
        score += weights.shared_tag * current.shared_tags(candidate) as f64;
    }

    if let Some(distance) = signals.playlist_distance {
        let steps = (lookahead + 1).saturating_sub(distance.max(1));
        score += weights.playlist_step * steps as f64;
    }

    if weights.recency_window_days > 0.0 {
        let age_days = (now - candidate.uploaded_at).num_seconds().max(0) as f64 / 86_400.0;
        let freshness = (1.0 - age_days / weights.recency_window_days).max(0.0);
        score += weights.recency * freshness;
    }

    if signals.personalized {
        score += weights.personalized;
    }

    let preferences = &context.user_preferences;
    if preferences.prefers_category(candidate.category.as_deref()) {
        score += weights.preferred;
    }
    if preferences.prefers_speaker(candidate.speaker.as_deref()) {
        score += weights.preferred;
    }

    if context.has_played(candidate.id()) {
        score *= weights.replay_factor;
    }

    score
}

/// Highest score first, then newest upload, then id.
pub fn rank(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.audio.uploaded_at.cmp(&a.audio.uploaded_at))
            .then_with(|| a.audio.id().cmp(b.audio.id()))
    });
}
