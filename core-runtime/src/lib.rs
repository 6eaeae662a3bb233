//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the audio delivery engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the behavior, delivery and
//! service crates depend on. It establishes the logging conventions, the
//! validated configuration, and the event broadcasting used throughout the
//! workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, FeatureFlags};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};
