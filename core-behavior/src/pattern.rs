//! # Listening Patterns
//!
//! A `ListeningPattern` is a pure derivation over a user's live history. It is
//! never stored, so it always reflects the latest recorded events.

use crate::analyzer::BehaviorRecord;
use crate::event::BehaviorAction;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How many of the busiest hours are reported.
const PREFERRED_HOURS: usize = 3;

/// Coarse time-of-day bucket (UTC hours).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    /// 05:00 - 11:59
    Morning,
    /// 12:00 - 16:59
    Afternoon,
    /// 17:00 - 21:59
    Evening,
    /// 22:00 - 04:59
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Self::from_hour(time.hour())
    }
}

/// Inclusive range of track lengths (seconds) the user tends to finish.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationRange {
    pub min_seconds: f64,
    pub max_seconds: f64,
}

impl DurationRange {
    pub fn contains(&self, seconds: f64) -> bool {
        seconds >= self.min_seconds && seconds <= self.max_seconds
    }

    /// 1.0 inside the range, decaying linearly to 0.0 one range-width outside it.
    pub fn fit(&self, seconds: f64) -> f64 {
        if self.contains(seconds) {
            return 1.0;
        }
        let width = (self.max_seconds - self.min_seconds).max(self.max_seconds * 0.25).max(1.0);
        let distance = if seconds < self.min_seconds {
            self.min_seconds - seconds
        } else {
            seconds - self.max_seconds
        };
        (1.0 - distance / width).max(0.0)
    }
}

/// Aggregates derived from one user's behavior history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningPattern {
    pub user_id: String,
    pub total_events: usize,
    /// Busiest UTC hours, most active first
    pub preferred_hours: Vec<u32>,
    pub preferred_time_of_day: Option<TimeOfDay>,
    /// Completed plays over started plays, in [0, 1]
    pub average_completion_rate: f64,
    /// Skips over started plays, in [0, 1]
    pub skip_rate: f64,
    pub preferred_duration_range: Option<DurationRange>,
    /// Lowercased category -> affinity in [-1, 1]
    pub category_affinity: BTreeMap<String, f64>,
    /// Share of engagement events falling in each bucket
    pub time_of_day_distribution: BTreeMap<TimeOfDay, f64>,
    /// Per bucket, share of categorised engagement events by category
    pub time_of_day_categories: BTreeMap<TimeOfDay, BTreeMap<String, f64>>,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl ListeningPattern {
    /// Derive the pattern from a user's records.
    pub fn derive<'a>(
        user_id: &str,
        records: impl IntoIterator<Item = &'a BehaviorRecord>,
    ) -> Self {
        let mut total_events = 0usize;
        let mut plays = 0usize;
        let mut completes = 0usize;
        let mut skips = 0usize;
        let mut hour_counts = [0usize; 24];
        let mut bucket_counts: HashMap<TimeOfDay, usize> = HashMap::new();
        let mut bucket_categories: HashMap<TimeOfDay, HashMap<String, usize>> = HashMap::new();
        let mut category_weights: HashMap<String, f64> = HashMap::new();
        let mut durations: Vec<f64> = Vec::new();
        let mut last_active_at: Option<DateTime<Utc>> = None;

        for record in records {
            let event = &record.event;
            total_events += 1;
            last_active_at = last_active_at.max(Some(event.timestamp));

            match event.action {
                BehaviorAction::Play => plays += 1,
                BehaviorAction::Complete => completes += 1,
                BehaviorAction::Skip => skips += 1,
                _ => {}
            }

            let category = record.category.as_ref().map(|c| c.to_lowercase());
            if let Some(category) = &category {
                *category_weights.entry(category.clone()).or_default() +=
                    event.action.affinity_weight();
            }

            if !event.action.is_engagement() {
                continue;
            }

            hour_counts[event.timestamp.hour() as usize] += 1;
            let bucket = TimeOfDay::at(event.timestamp);
            *bucket_counts.entry(bucket).or_default() += 1;
            if let Some(category) = category {
                *bucket_categories
                    .entry(bucket)
                    .or_default()
                    .entry(category)
                    .or_default() += 1;
            }

            if matches!(event.action, BehaviorAction::Play | BehaviorAction::Complete) {
                if let Some(seconds) = record.audio_duration.filter(|d| *d > 0.0) {
                    durations.push(seconds);
                }
            }
        }

        let started = plays.max(completes + skips);
        let rate = |n: usize| {
            if started == 0 {
                0.0
            } else {
                n as f64 / started as f64
            }
        };

        Self {
            user_id: user_id.to_string(),
            total_events,
            preferred_hours: preferred_hours(&hour_counts),
            preferred_time_of_day: bucket_counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(bucket, _)| *bucket),
            average_completion_rate: rate(completes),
            skip_rate: rate(skips),
            preferred_duration_range: duration_range(durations),
            category_affinity: normalize_affinity(category_weights),
            time_of_day_distribution: shares(&bucket_counts),
            time_of_day_categories: bucket_categories
                .into_iter()
                .map(|(bucket, counts)| (bucket, shares(&counts)))
                .collect(),
            last_active_at,
        }
    }

    /// Affinity for a category, 0.0 when unknown.
    pub fn affinity_for(&self, category: &str) -> f64 {
        self.category_affinity
            .get(&category.to_lowercase())
            .copied()
            .unwrap_or(0.0)
    }

    /// Share of this bucket's listening that went to `category`.
    pub fn time_of_day_share(&self, bucket: TimeOfDay, category: &str) -> f64 {
        self.time_of_day_categories
            .get(&bucket)
            .and_then(|m| m.get(&category.to_lowercase()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Categories with positive affinity, strongest first.
    pub fn top_categories(&self, limit: usize) -> Vec<String> {
        let mut positive: Vec<(&String, f64)> = self
            .category_affinity
            .iter()
            .filter(|(_, a)| **a > 0.0)
            .map(|(c, a)| (c, *a))
            .collect();
        positive.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        positive.into_iter().take(limit).map(|(c, _)| c.clone()).collect()
    }
}

fn preferred_hours(hour_counts: &[usize; 24]) -> Vec<u32> {
    let mut hours: Vec<(u32, usize)> = hour_counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(hour, count)| (hour as u32, *count))
        .collect();
    hours.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    hours.into_iter().take(PREFERRED_HOURS).map(|(h, _)| h).collect()
}

/// Interquartile range of listened track lengths.
fn duration_range(mut durations: Vec<f64>) -> Option<DurationRange> {
    if durations.is_empty() {
        return None;
    }
    durations.sort_by(|a, b| a.total_cmp(b));
    let at = |p: f64| {
        let idx = (p * (durations.len() - 1) as f64).round() as usize;
        durations[idx.min(durations.len() - 1)]
    };
    Some(DurationRange {
        min_seconds: at(0.25),
        max_seconds: at(0.75),
    })
}

fn normalize_affinity(weights: HashMap<String, f64>) -> BTreeMap<String, f64> {
    let max_abs = weights.values().fold(0.0f64, |acc, w| acc.max(w.abs()));
    weights
        .into_iter()
        .map(|(category, weight)| {
            let affinity = if max_abs > 0.0 { weight / max_abs } else { 0.0 };
            (category, affinity)
        })
        .collect()
}

fn shares<K: Ord + Clone>(counts: &HashMap<K, usize>) -> BTreeMap<K, f64> {
    let total: usize = counts.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }
    counts
        .iter()
        .map(|(k, n)| (k.clone(), *n as f64 / total as f64))
        .collect()
}
