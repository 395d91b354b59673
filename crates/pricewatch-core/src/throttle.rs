//! Per-host request throttling for polite crawling.
//!
//! A [`HostThrottle`] hands out request slots per host, spaced by a minimum
//! delay. One throttle is shared by every source of a run, so two sources on
//! the same host are spaced against each other. Static sources use a short
//! delay, rendered sources a longer one; the scheduler picks the delay from
//! the source's render mode and waits for the slot before it takes an
//! in-flight permit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use url::Url;

/// Configuration for per-host spacing.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum delay between consecutive requests to the same host.
    pub delay: Duration,

    /// Maximum random jitter added on top of `delay` (uniform [0, jitter)).
    /// `Duration::ZERO` disables it.
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn effective_delay(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return self.delay;
        }
        self.delay + Duration::from_millis(rand::rng().random_range(0..max_ms))
    }
}

/// Last reserved request slot per host key (scheme + host + port).
///
/// Clones share the same bookkeeping.
#[derive(Clone, Default)]
pub struct HostThrottle {
    last_request: Arc<Mutex<HashMap<String, Instant>>>,
}

impl HostThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    fn host_key(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        let host = url.host_str()?;
        let port = url
            .port_or_known_default()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        Some(format!("{}://{}{}", url.scheme(), host, port))
    }

    /// Reserve the next request slot for `url`'s host and sleep until it
    /// opens. URLs without a host are not throttled.
    ///
    /// The slot is claimed under the lock before sleeping so that
    /// concurrent callers queue up one delay apart.
    pub async fn wait(&self, url: &str, config: &ThrottleConfig) {
        let Some(host) = Self::host_key(url) else {
            return;
        };

        let wait = {
            let mut map = self.last_request.lock().await;
            let now = Instant::now();
            let slot = match map.get(&host) {
                Some(&last) => (last + config.effective_delay()).max(now),
                None => now,
            };
            map.insert(host.clone(), slot);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            tracing::debug!(%host, sleep_ms = %wait.as_millis(), "Throttling request");
            tokio::time::sleep(wait).await;
        }
    }
}
