//! # Core Behavior Module
//!
//! Listening-behavior analytics for the delivery engine.
//!
//! ## Overview
//!
//! - [`event`]: the `BehaviorEvent` clients post for every play, skip, like, ...
//! - [`analyzer`]: `UserBehaviorAnalyzer`, the bounded per-user history
//! - [`pattern`]: `ListeningPattern`, derived on demand from the history
//! - [`recommend`]: personalized ranking used by the preloader and the API

pub mod analyzer;
pub mod error;
pub mod event;
pub mod pattern;
pub mod recommend;

pub use analyzer::{AnalyzerConfig, AnalyzerStats, BehaviorRecord, CleanupReport, UserBehaviorAnalyzer};
pub use error::{BehaviorError, Result};
pub use event::{BehaviorAction, BehaviorContext, BehaviorEvent};
pub use pattern::{DurationRange, ListeningPattern, TimeOfDay};
pub use recommend::{Recommendation, RecommendationWeights};
