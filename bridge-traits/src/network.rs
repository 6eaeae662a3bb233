//! Network Throughput Probe Abstraction
//!
//! Provides raw throughput measurements. Classification into quality tiers and
//! the rolling estimate live in `core-delivery`; a probe only reports how many
//! bytes moved in how much time.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// One throughput measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSample {
    /// Bytes transferred during the probe
    pub bytes: u64,
    /// Wall time the transfer took
    pub elapsed: Duration,
}

impl ProbeSample {
    pub fn new(bytes: u64, elapsed: Duration) -> Self {
        Self { bytes, elapsed }
    }

    /// Throughput in megabits per second. Returns `None` for an empty or
    /// zero-duration sample, which carries no information.
    pub fn megabits_per_second(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        if self.bytes == 0 || secs <= 0.0 {
            return None;
        }
        Some(self.bytes as f64 * 8.0 / 1_000_000.0 / secs)
    }
}

/// Throughput probe trait
///
/// Implementations perform one measurement per call. They may be slow; callers
/// wrap every call in a timeout.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::ThroughputProbe;
///
/// async fn speed(probe: &dyn ThroughputProbe) -> Option<f64> {
///     probe.probe().await.ok()?.megabits_per_second()
/// }
/// ```
#[async_trait]
pub trait ThroughputProbe: Send + Sync {
    /// Run a single measurement.
    async fn probe(&self) -> Result<ProbeSample>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_speed() {
        // 1,250,000 bytes in one second is 10 Mbps
        let sample = ProbeSample::new(1_250_000, Duration::from_secs(1));
        let speed = sample.megabits_per_second().unwrap();
        assert!((speed - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_samples() {
        assert!(ProbeSample::new(0, Duration::from_secs(1))
            .megabits_per_second()
            .is_none());
        assert!(ProbeSample::new(100, Duration::ZERO)
            .megabits_per_second()
            .is_none());
    }
}
