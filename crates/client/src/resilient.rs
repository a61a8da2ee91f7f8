//! The resilient call path: cache, circuit breaker, bounded retry.

use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::cache::ResponseCache;
use crate::capability::CapabilityTransport;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vigil_common::{CancelFlag, Result, VigilError};

/// Resilience parameters for one capability server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// TTL applied to cached results, in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_cache_ttl_ms() -> u64 {
    300_000
}

fn default_cache_capacity() -> usize {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Wraps a [`CapabilityTransport`] with a response cache, a circuit
/// breaker, and bounded retry with backoff.
///
/// Owns the server's circuit state and cache entries exclusively; no
/// other component mutates them.
pub struct ResilientClient {
    transport: Arc<dyn CapabilityTransport>,
    breaker: CircuitBreaker,
    cache: ResponseCache,
    retry: RetryConfig,
    cache_ttl: Duration,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn CapabilityTransport>, config: ClientConfig) -> Self {
        Self {
            transport,
            breaker: CircuitBreaker::new(config.breaker),
            cache: ResponseCache::new(config.cache_capacity),
            retry: config.retry,
            cache_ttl: Duration::from_millis(config.cache_ttl_ms),
        }
    }

    pub fn server_name(&self) -> &str {
        self.transport.server_name()
    }

    /// Current circuit state, for host-side observability.
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Invoke a capability with a per-attempt deadline.
    ///
    /// A live cache entry short-circuits everything: no breaker check,
    /// no network attempt. Otherwise the breaker gates each attempt and
    /// failures back off geometrically; once the attempt budget or the
    /// circuit is exhausted the whole sequence surfaces as
    /// `ServerUnavailable`.
    ///
    /// A call whose `cancel` flag is set by the time it completes still
    /// returns its value (success feeds breaker accounting) but never
    /// fills the cache: the caller is about to discard the result, and
    /// serving it to a later identical request would resurrect it.
    pub async fn invoke(
        &self,
        capability: &str,
        arguments: &serde_json::Value,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Result<serde_json::Value> {
        let key = ResponseCache::key(capability, arguments);
        if let Some(value) = self.cache.get(&key) {
            debug!(capability, "cache hit, skipping remote call");
            return Ok(value);
        }

        let mut attempt = 0u32;
        loop {
            if !self.breaker.try_acquire() {
                return Err(VigilError::ServerUnavailable(
                    self.transport.server_name().to_string(),
                ));
            }

            match self.attempt_call(capability, arguments, timeout).await {
                Ok(value) => {
                    self.breaker.on_success();
                    if cancel.is_cancelled() {
                        debug!(capability, "call cancelled mid-flight, not caching");
                    } else {
                        self.cache.put(key, value.clone(), self.cache_ttl);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    self.breaker.on_failure();
                    warn!(
                        capability,
                        attempt = attempt + 1,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "capability call failed"
                    );
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(VigilError::ServerUnavailable(
                            self.transport.server_name().to_string(),
                        ));
                    }
                    tokio::time::sleep(self.retry.delay_for(attempt - 1)).await;
                }
            }
        }
    }

    /// Lightweight liveness probe. Bypasses the cache (a stale "alive"
    /// answer is worse than none) but goes through the breaker so probe
    /// outcomes feed failure accounting.
    pub async fn health_check(&self, timeout: Duration) -> Result<()> {
        if !self.breaker.try_acquire() {
            return Err(VigilError::ServerUnavailable(
                self.transport.server_name().to_string(),
            ));
        }
        match self
            .attempt_call("health_check", &serde_json::Value::Null, timeout)
            .await
        {
            Ok(_) => {
                self.breaker.on_success();
                Ok(())
            }
            Err(e) => {
                self.breaker.on_failure();
                Err(e)
            }
        }
    }

    async fn attempt_call(
        &self,
        capability: &str,
        arguments: &serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        match tokio::time::timeout(timeout, self.transport.call(capability, arguments)).await {
            Ok(result) => result,
            Err(_) => Err(VigilError::CallFailed(format!(
                "timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }
}
