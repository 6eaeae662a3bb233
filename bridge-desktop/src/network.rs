//! Throughput Probe Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    network::{ProbeSample, ThroughputProbe},
};
use futures_util::StreamExt;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default number of bytes pulled per probe (512 KiB)
const DEFAULT_PROBE_BYTES: u64 = 512 * 1024;

/// Measures throughput by timing a download of a known resource
///
/// The probe stops reading once `max_bytes` have arrived so that a large
/// probe target does not turn into a full download.
pub struct HttpThroughputProbe {
    client: Client,
    url: String,
    max_bytes: u64,
}

impl HttpThroughputProbe {
    /// Create a probe against `url` with default limits
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent("audio-delivery-probe/0.1.0")
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))?;

        Ok(Self::with_client(client, url))
    }

    /// Create a probe with a custom client
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            max_bytes: DEFAULT_PROBE_BYTES,
        }
    }

    /// Limit the bytes read per probe
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes.max(1);
        self
    }
}

#[async_trait]
impl ThroughputProbe for HttpThroughputProbe {
    async fn probe(&self) -> Result<ProbeSample> {
        let started = Instant::now();

        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Probe request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "Probe HTTP error: {}",
                response.status()
            )));
        }

        let mut received = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| BridgeError::OperationFailed(format!("Probe read failed: {}", e)))?;
            received += chunk.len() as u64;
            if received >= self.max_bytes {
                break;
            }
        }

        let elapsed = started.elapsed();
        debug!(bytes = received, elapsed_ms = elapsed.as_millis() as u64, "Throughput probe finished");

        Ok(ProbeSample::new(received, elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_against_unreachable_host_fails() {
        // Port 9 on localhost is discard; nothing listens there in CI
        let probe = HttpThroughputProbe::new("http://127.0.0.1:9/probe.bin")
            .unwrap()
            .with_max_bytes(0);
        assert_eq!(probe.max_bytes, 1);

        let result = probe.probe().await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }
}
