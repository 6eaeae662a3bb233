//! Preload trigger input
//!
//! Deserialized straight from the `POST /preload` body, so field names follow
//! the client's camelCase convention.

use crate::error::{DeliveryError, Result};
use crate::network::NetworkQuality;
use serde::{Deserialize, Serialize};

/// Kind of device the listener is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
    #[default]
    #[serde(other)]
    Unknown,
}

fn default_true() -> bool {
    true
}

/// Listener preferences that steer candidate scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default)]
    pub preferred_categories: Vec<String>,
    #[serde(default)]
    pub preferred_speakers: Vec<String>,
    /// Quality to cache under; unset or `auto` follows the network tier
    #[serde(default)]
    pub preferred_quality: Option<String>,
    /// `false` turns the preload call into a no-op
    #[serde(default = "default_true")]
    pub preload_enabled: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            preferred_categories: Vec::new(),
            preferred_speakers: Vec::new(),
            preferred_quality: None,
            preload_enabled: true,
        }
    }
}

impl UserPreferences {
    pub fn prefers_category(&self, category: Option<&str>) -> bool {
        category.map_or(false, |c| {
            self.preferred_categories.iter().any(|p| p.eq_ignore_ascii_case(c))
        })
    }

    pub fn prefers_speaker(&self, speaker: Option<&str>) -> bool {
        speaker.map_or(false, |s| {
            self.preferred_speakers.iter().any(|p| p.eq_ignore_ascii_case(s))
        })
    }
}

/// Everything the preloader knows about the listener at trigger time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadContext {
    pub current_audio_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Recently played ids, newest last
    #[serde(default)]
    pub play_history: Vec<String>,
    #[serde(default)]
    pub current_playlist: Vec<String>,
    #[serde(default)]
    pub user_preferences: UserPreferences,
    /// Client-side connection hint ("wifi", "4g", "low", ...)
    #[serde(default)]
    pub network_quality: Option<String>,
    /// Client-measured throughput in Mbps
    #[serde(default)]
    pub network_speed: Option<f64>,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub time_of_day: Option<String>,
    /// Battery charge in percent
    #[serde(default)]
    pub battery_level: Option<f64>,
}

impl PreloadContext {
    pub fn new(current_audio_id: impl Into<String>) -> Self {
        Self {
            current_audio_id: current_audio_id.into(),
            user_id: None,
            play_history: Vec::new(),
            current_playlist: Vec::new(),
            user_preferences: UserPreferences::default(),
            network_quality: None,
            network_speed: None,
            device_type: DeviceType::Unknown,
            time_of_day: None,
            battery_level: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_playlist<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.current_playlist = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_history<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.play_history = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_device(mut self, device_type: DeviceType, battery_level: Option<f64>) -> Self {
        self.device_type = device_type;
        self.battery_level = battery_level;
        self
    }

    pub fn with_network_speed(mut self, speed_mbps: f64) -> Self {
        self.network_speed = Some(speed_mbps);
        self
    }

    pub fn with_preferences(mut self, preferences: UserPreferences) -> Self {
        self.user_preferences = preferences;
        self
    }

    /// Reject bodies that cannot describe a real listening session.
    pub fn validate(&self) -> Result<()> {
        if self.current_audio_id.trim().is_empty() {
            return Err(DeliveryError::InvalidContext("currentAudioId is required".to_string()));
        }
        if matches!(&self.user_id, Some(id) if id.trim().is_empty()) {
            return Err(DeliveryError::InvalidContext("userId must not be blank".to_string()));
        }
        if let Some(level) = self.battery_level {
            if !level.is_finite() || !(0.0..=100.0).contains(&level) {
                return Err(DeliveryError::InvalidContext(
                    "batteryLevel must be between 0 and 100".to_string(),
                ));
            }
        }
        if let Some(speed) = self.network_speed {
            if !speed.is_finite() || speed < 0.0 {
                return Err(DeliveryError::InvalidContext(
                    "networkSpeed must be a non-negative number".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Mobile device reporting a charge under `critical_percent`.
    pub fn is_battery_critical(&self, critical_percent: f64) -> bool {
        self.device_type == DeviceType::Mobile
            && self.battery_level.map_or(false, |level| level < critical_percent)
    }

    /// The client's own connection hint, when it parses.
    pub fn client_network_quality(&self) -> Option<NetworkQuality> {
        self.network_quality.as_deref().and_then(NetworkQuality::parse)
    }

    pub fn has_played(&self, audio_id: &str) -> bool {
        self.play_history.iter().any(|id| id == audio_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_body() {
        let context: PreloadContext =
            serde_json::from_str(r#"{"currentAudioId":"a1","deviceType":"smartwatch"}"#).unwrap();
        assert_eq!(context.current_audio_id, "a1");
        assert_eq!(context.device_type, DeviceType::Unknown);
        assert!(context.user_preferences.preload_enabled);
        assert!(context.play_history.is_empty());
    }

    #[test]
    fn test_deserialize_full_body() {
        let body = r#"{
            "currentAudioId": "a1",
            "userId": "u1",
            "playHistory": ["a0"],
            "currentPlaylist": ["a0", "a1", "a2"],
            "userPreferences": {"preferredCategories": ["Science"], "preloadEnabled": false},
            "deviceType": "mobile",
            "batteryLevel": 42.5
        }"#;
        let context: PreloadContext = serde_json::from_str(body).unwrap();
        assert_eq!(context.device_type, DeviceType::Mobile);
        assert_eq!(context.battery_level, Some(42.5));
        assert!(!context.user_preferences.preload_enabled);
        assert!(context.user_preferences.prefers_category(Some("science")));
        assert!(context.has_played("a0"));
        assert!(context.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(PreloadContext::new(" ").validate().is_err());
        assert!(PreloadContext::new("a").with_user("").validate().is_err());
        assert!(PreloadContext::new("a")
            .with_device(DeviceType::Mobile, Some(120.0))
            .validate()
            .is_err());
        assert!(PreloadContext::new("a").with_network_speed(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_battery_gate_applies_to_mobile_only() {
        let mobile = PreloadContext::new("a").with_device(DeviceType::Mobile, Some(5.0));
        assert!(mobile.is_battery_critical(15.0));

        let desktop = PreloadContext::new("a").with_device(DeviceType::Desktop, Some(5.0));
        assert!(!desktop.is_battery_critical(15.0));

        let unknown_level = PreloadContext::new("a").with_device(DeviceType::Mobile, None);
        assert!(!unknown_level.is_battery_critical(15.0));
    }
}
