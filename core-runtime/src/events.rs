//! # Event Bus System
//!
//! Provides an event-driven architecture for the delivery engine using `tokio::sync::broadcast`.
//! Components publish typed events; the server and tests subscribe without the
//! publishers knowing who listens.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for network, preload and analytics
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   emit   ┌───────────┐
//! │ NetworkMonitor ├─────────>│           │
//! └────────────────┘          │           │   subscribe   ┌──────────────┐
//! ┌────────────────┐   emit   │ EventBus  ├──────────────>│ Event logger │
//! │   Preloader    ├─────────>│ (broadcast│               └──────────────┘
//! └────────────────┘          │  channel) │   subscribe   ┌──────────────┐
//! ┌────────────────┐   emit   │           ├──────────────>│    Tests     │
//! │    Analyzer    ├─────────>│           │               └──────────────┘
//! └────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, PreloadEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut preload_events =
//!     EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Preload(_)));
//!
//! bus.emit(CoreEvent::Preload(PreloadEvent::Cleared { entries: 3 })).ok();
//!
//! let event = preload_events.recv().await.unwrap();
//! assert_eq!(event.description(), "Preload cache cleared");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishers ignore the `SendError` returned when nobody is subscribed.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Network estimate events
    Network(NetworkEvent),
    /// Preload and cache events
    Preload(PreloadEvent),
    /// Behavior analytics events
    Behavior(AnalyticsEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Network(e) => e.description(),
            CoreEvent::Preload(e) => e.description(),
            CoreEvent::Behavior(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Network(NetworkEvent::ProbeFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Preload(PreloadEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::Network(NetworkEvent::QualityChanged { .. }) => EventSeverity::Info,
            CoreEvent::Preload(PreloadEvent::Cleared { .. }) => EventSeverity::Info,
            CoreEvent::Behavior(AnalyticsEvent::Expired { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Network Events
// ============================================================================

/// Events emitted by the network monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum NetworkEvent {
    /// The quality tier changed after a new sample.
    QualityChanged {
        /// Previous tier name ("high", "medium", "low")
        previous: String,
        /// New tier name
        current: String,
        /// Rolling speed estimate in Mbps
        speed_mbps: f64,
    },
    /// A throughput probe failed or timed out; the last estimate stays in place.
    ProbeFailed {
        /// Human-readable error message
        message: String,
    },
}

impl NetworkEvent {
    fn description(&self) -> &str {
        match self {
            NetworkEvent::QualityChanged { .. } => "Network quality changed",
            NetworkEvent::ProbeFailed { .. } => "Network probe failed",
        }
    }
}

// ============================================================================
// Preload Events
// ============================================================================

/// Events emitted by the preloader and the preload cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PreloadEvent {
    /// A preload pass started fetching candidates.
    Started {
        /// Track the listener is currently on
        current_audio_id: String,
        /// Number of candidates selected for fetching
        candidates: usize,
    },
    /// A fetched chunk was admitted to the cache.
    Cached {
        audio_id: String,
        quality: String,
        size_bytes: u64,
    },
    /// An entry was evicted to make room.
    Evicted {
        audio_id: String,
        quality: String,
        size_bytes: u64,
    },
    /// An in-flight fetch was abandoned because a newer pass superseded it.
    Cancelled { audio_id: String },
    /// A fetch failed; the candidate was dropped.
    Failed { audio_id: String, message: String },
    /// A preload pass was skipped by the gate.
    Skipped {
        /// Why the pass did nothing
        reason: String,
    },
    /// The cache was emptied.
    Cleared {
        /// Entries removed
        entries: usize,
    },
}

impl PreloadEvent {
    fn description(&self) -> &str {
        match self {
            PreloadEvent::Started { .. } => "Preload started",
            PreloadEvent::Cached { .. } => "Preloaded chunk cached",
            PreloadEvent::Evicted { .. } => "Preloaded chunk evicted",
            PreloadEvent::Cancelled { .. } => "Preload fetch cancelled",
            PreloadEvent::Failed { .. } => "Preload fetch failed",
            PreloadEvent::Skipped { .. } => "Preload skipped",
            PreloadEvent::Cleared { .. } => "Preload cache cleared",
        }
    }
}

// ============================================================================
// Analytics Events
// ============================================================================

/// Events emitted by the behavior analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AnalyticsEvent {
    /// A behavior event was appended to a user's history.
    Recorded {
        user_id: String,
        audio_id: String,
        action: String,
    },
    /// Expired history was removed.
    Expired {
        /// Events removed across all users
        removed: usize,
        /// Users whose history became empty and was dropped
        users_dropped: usize,
    },
}

impl AnalyticsEvent {
    fn description(&self) -> &str {
        match self {
            AnalyticsEvent::Recorded { .. } => "Behavior event recorded",
            AnalyticsEvent::Expired { .. } => "Expired behavior data removed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning the bus is cheap; every clone publishes to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
