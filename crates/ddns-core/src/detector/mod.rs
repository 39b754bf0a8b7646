//! Public IP detection across a prioritized list of sources
//!
//! The detector owns all retry, backoff and failover behaviour; individual
//! [`IpSource`]s perform exactly one request per call.
//!
//! ```text
//! source 1: attempt ─ delay ─ attempt ─ delay ─ attempt ─┐ exhausted
//!                                                        │ pause
//! source 2: attempt ── ok ──► detected IP                ◄┘
//! ```
//!
//! Timeouts, transport errors, non-success statuses and malformed bodies are
//! all treated the same: one failed attempt.

use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::traits::IpSource;

/// Bounded retry policy applied to one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts against the source before moving on
    pub max_attempts: u32,
    /// Delay after the 1st, 2nd, ... failed attempt; the last value repeats
    pub delays: Vec<Duration>,
    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,
    /// Pause before falling over to the next source
    pub source_pause: Duration,
}

impl RetryPolicy {
    /// 4 attempts, 1s/2s/4s backoff, 5s per request, 1s between sources
    pub fn standard() -> Self {
        Self {
            max_attempts: 4,
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            attempt_timeout: Duration::from_secs(5),
            source_pause: Duration::from_secs(1),
        }
    }

    /// 4 attempts, 2s/5s/10s backoff, 10s per request, 2s between sources
    pub fn extended() -> Self {
        Self {
            max_attempts: 4,
            delays: vec![
                Duration::from_secs(2),
                Duration::from_secs(5),
                Duration::from_secs(10),
            ],
            attempt_timeout: Duration::from_secs(10),
            source_pause: Duration::from_secs(2),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.delays
            .get(index)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("Retry policy needs at least one attempt"));
        }
        if self.attempt_timeout.is_zero() {
            return Err(Error::config("Retry policy attempt timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

struct DetectorSource {
    source: Box<dyn IpSource>,
    policy: RetryPolicy,
}

/// Detects the public IP from the first source that answers
///
/// Detection never touches persisted state.
#[derive(Default)]
pub struct IpDetector {
    sources: Vec<DetectorSource>,
}

impl IpDetector {
    /// Detector with no sources
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source with its retry policy (lowest priority so far)
    pub fn with_source(mut self, source: Box<dyn IpSource>, policy: RetryPolicy) -> Self {
        self.push_source(source, policy);
        self
    }

    /// Append a source with its retry policy
    pub fn push_source(&mut self, source: Box<dyn IpSource>, policy: RetryPolicy) {
        self.sources.push(DetectorSource { source, policy });
    }

    /// Number of configured sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Detect the current public IP
    ///
    /// # Errors
    ///
    /// `Error::DetectionFailed` once every source has exhausted its retries.
    pub async fn detect(&self) -> Result<IpAddr> {
        let total = self.sources.len();

        for (index, entry) in self.sources.iter().enumerate() {
            match self.try_source(entry).await {
                Ok(ip) => {
                    info!("Detected public IP {} via {}", ip, entry.source.name());
                    return Ok(ip);
                }
                Err(e) => {
                    warn!(
                        "IP source {} exhausted after {} attempt(s): {}",
                        entry.source.name(),
                        entry.policy.max_attempts,
                        e
                    );
                    if index + 1 < total {
                        debug!(
                            "Falling over to next IP source in {:?}",
                            entry.policy.source_pause
                        );
                        tokio::time::sleep(entry.policy.source_pause).await;
                    }
                }
            }
        }

        Err(Error::detection_failed(format!(
            "all {} IP source(s) exhausted their retries",
            total
        )))
    }

    /// Run the retry loop against a single source
    async fn try_source(&self, entry: &DetectorSource) -> Result<IpAddr> {
        let name = entry.source.name();
        let attempts = entry.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("Querying {} (attempt {}/{})", name, attempt, attempts);

            let outcome =
                tokio::time::timeout(entry.policy.attempt_timeout, entry.source.fetch()).await;

            let error = match outcome {
                Ok(Ok(ip)) => return Ok(ip),
                Ok(Err(e)) => e,
                Err(_) => Error::ip_source(format!(
                    "{} timed out after {:?}",
                    name, entry.policy.attempt_timeout
                )),
            };

            debug!("Attempt {}/{} against {} failed: {}", attempt, attempts, name, error);
            last_error = Some(error);

            if attempt < attempts {
                tokio::time::sleep(entry.policy.delay_after(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| Error::ip_source(format!("{} made no attempts", name))))
    }
}
