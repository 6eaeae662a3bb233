//! Personalized ranking of catalog items against a listening pattern.

use crate::pattern::{ListeningPattern, TimeOfDay};
use bridge_traits::AudioDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weights applied to each fit signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendationWeights {
    /// Multiplied by category affinity in [-1, 1]
    pub category: f64,
    /// Multiplied by duration fit in [0, 1]
    pub duration_fit: f64,
    /// Multiplied by the category's share of the current time-of-day bucket
    pub time_of_day: f64,
}

impl Default for RecommendationWeights {
    fn default() -> Self {
        Self {
            category: 10.0,
            duration_fit: 5.0,
            time_of_day: 3.0,
        }
    }
}

/// A ranked catalog item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub audio: AudioDescriptor,
    pub score: f64,
}

/// Score one candidate for a pattern at time `now`.
pub fn score(
    pattern: &ListeningPattern,
    candidate: &AudioDescriptor,
    now: DateTime<Utc>,
    weights: &RecommendationWeights,
) -> f64 {
    let mut total = 0.0;

    if let Some(category) = &candidate.category {
        total += weights.category * pattern.affinity_for(category);
        total += weights.time_of_day * pattern.time_of_day_share(TimeOfDay::at(now), category);
    }

    if let Some(range) = &pattern.preferred_duration_range {
        total += weights.duration_fit * range.fit(candidate.metadata.duration);
    }

    total
}

/// Rank candidates best first; equal scores go to the newer upload.
pub fn rank(
    pattern: Option<&ListeningPattern>,
    candidates: Vec<AudioDescriptor>,
    now: DateTime<Utc>,
    weights: &RecommendationWeights,
    limit: usize,
) -> Vec<Recommendation> {
    let mut ranked: Vec<Recommendation> = candidates
        .into_iter()
        .map(|audio| Recommendation {
            score: pattern.map_or(0.0, |p| score(p, &audio, now, weights)),
            audio,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.audio.uploaded_at.cmp(&a.audio.uploaded_at))
            .then_with(|| a.audio.id().cmp(b.audio.id()))
    });
    ranked.truncate(limit);
    ranked
}
