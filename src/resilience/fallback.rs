use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// One entry in a fallback provider chain: a name (used for its own
/// circuit breaker and for attribution on the returned result) and the
/// breaker itself.
pub struct ProviderSlot {
    pub name: String,
    pub breaker: Arc<CircuitBreaker>,
}

impl ProviderSlot {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        ProviderSlot {
            breaker: Arc::new(CircuitBreaker::new(name.clone(), config)),
            name,
        }
    }
}

/// An ordered list of providers, each protected by its own breaker. Calls
/// are attempted in priority order; a provider whose breaker forbids the
/// call is skipped without counting as a failure, a provider that returns
/// `Ok(Some(_))` wins, and a provider that errors or returns `Ok(None)`
/// records one breaker failure before the chain advances.
pub struct FallbackChain {
    pub resource: String,
    pub providers: Vec<ProviderSlot>,
}

impl FallbackChain {
    pub fn new(resource: impl Into<String>, providers: Vec<ProviderSlot>) -> Self {
        FallbackChain { resource: resource.into(), providers }
    }

    /// Runs `call` against each provider in order until one succeeds.
    /// `call` receives the provider name and must return `Ok(Some(value))`
    /// on success, `Ok(None)` on an empty-but-non-erroring result, or `Err`
    /// on failure.
    pub async fn execute<T, E, F, Fut>(&self, mut call: F) -> Option<(String, T)>
    where
        F: FnMut(&str) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: std::fmt::Display,
    {
        for slot in &self.providers {
            if !slot.breaker.allow_request() {
                warn!(resource = %self.resource, provider = %slot.name, "skipped: circuit open");
                continue;
            }
            match call(&slot.name).await {
                Ok(Some(value)) => {
                    slot.breaker.record_success();
                    info!(resource = %self.resource, provider = %slot.name, "fallback chain succeeded");
                    return Some((slot.name.clone(), value));
                }
                Ok(None) => {
                    slot.breaker.record_failure();
                }
                Err(err) => {
                    warn!(resource = %self.resource, provider = %slot.name, error = %err, "provider failed");
                    slot.breaker.record_failure();
                }
            }
        }
        None
    }
}
