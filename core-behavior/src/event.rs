//! Behavior event model
//!
//! A `BehaviorEvent` is one discrete thing a listener did with a track. Events
//! are append-only; the analyzer never edits them after they are recorded.

use crate::error::{BehaviorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the listener did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorAction {
    Play,
    Pause,
    Skip,
    Seek,
    Complete,
    Like,
    Share,
}

impl BehaviorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorAction::Play => "play",
            BehaviorAction::Pause => "pause",
            BehaviorAction::Skip => "skip",
            BehaviorAction::Seek => "seek",
            BehaviorAction::Complete => "complete",
            BehaviorAction::Like => "like",
            BehaviorAction::Share => "share",
        }
    }

    /// Weight of this action toward category affinity.
    ///
    /// Skips count against a category; pause and seek are neutral.
    pub fn affinity_weight(&self) -> f64 {
        match self {
            BehaviorAction::Play => 1.0,
            BehaviorAction::Complete => 2.0,
            BehaviorAction::Like | BehaviorAction::Share => 3.0,
            BehaviorAction::Skip => -1.0,
            BehaviorAction::Pause | BehaviorAction::Seek => 0.0,
        }
    }

    /// Actions that indicate the listener actually engaged with the track.
    pub fn is_engagement(&self) -> bool {
        matches!(
            self,
            BehaviorAction::Play | BehaviorAction::Complete | BehaviorAction::Like | BehaviorAction::Share
        )
    }
}

impl fmt::Display for BehaviorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BehaviorAction {
    type Err = BehaviorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "play" => Ok(BehaviorAction::Play),
            "pause" => Ok(BehaviorAction::Pause),
            "skip" => Ok(BehaviorAction::Skip),
            "seek" => Ok(BehaviorAction::Seek),
            "complete" => Ok(BehaviorAction::Complete),
            "like" => Ok(BehaviorAction::Like),
            "share" => Ok(BehaviorAction::Share),
            other => Err(BehaviorError::InvalidEvent(format!("Unknown action: {}", other))),
        }
    }
}

/// Where the event came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_audio_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

/// A single playback event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEvent {
    pub user_id: String,
    pub session_id: String,
    pub action: BehaviorAction,
    pub audio_id: String,
    /// Playback position in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
    /// Listened duration in seconds, when the client reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BehaviorContext>,
}

impl BehaviorEvent {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        action: BehaviorAction,
        audio_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            action,
            audio_id: audio_id.into(),
            position: None,
            duration: None,
            timestamp,
            context: None,
        }
    }

    pub fn with_position(mut self, position: f64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_context(mut self, context: BehaviorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Rejects events the analyzer cannot attribute or interpret.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("userId", &self.user_id),
            ("sessionId", &self.session_id),
            ("audioId", &self.audio_id),
        ] {
            if value.trim().is_empty() {
                return Err(BehaviorError::InvalidEvent(format!("{} is required", field)));
            }
        }

        for (field, value) in [("position", self.position), ("duration", self.duration)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(BehaviorError::InvalidEvent(format!(
                        "{} must be a non-negative number",
                        field
                    )));
                }
            }
        }

        Ok(())
    }
}
