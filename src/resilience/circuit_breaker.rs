use parking_lot::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    half_open_calls: u32,
    last_failure_time: Option<Instant>,
}

/// Per-resource circuit breaker. Mirrors the upstream resilience layer's
/// `CircuitBreaker`: closed calls flow freely, repeated failures open the
/// breaker, and after `recovery_timeout` a bounded number of probe calls are
/// let through in half-open state.
pub struct CircuitBreaker {
    pub name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        CircuitBreaker {
            name: name.into(),
            config,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                half_open_successes: 0,
                half_open_calls: 0,
                last_failure_time: None,
            }),
        }
    }

    /// Returns the current state, applying the Open -> HalfOpen transition
    /// if the recovery timeout has elapsed.
    pub fn state(&self) -> CircuitState {
        {
            let inner = self.inner.read();
            if inner.state != CircuitState::Open {
                return inner.state;
            }
            let elapsed = inner
                .last_failure_time
                .map(|t| t.elapsed() >= self.config.recovery_timeout)
                .unwrap_or(false);
            if !elapsed {
                return CircuitState::Open;
            }
        }
        let mut inner = self.inner.write();
        if inner.state == CircuitState::Open {
            inner.state = CircuitState::HalfOpen;
            inner.half_open_calls = 0;
            inner.half_open_successes = 0;
        }
        inner.state
    }

    /// Whether a new call may proceed. Also reserves a half-open probe slot
    /// if applicable, so concurrent callers cannot oversubscribe the probe
    /// budget (property P6).
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let mut inner = self.inner.write();
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_max_calls {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        inner.last_failure_time = Some(Instant::now());
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_at_threshold() {
        let cb = CircuitBreaker::new("test", CircuitBreakerConfig { failure_threshold: 3, ..Default::default() });
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn half_open_success_closes() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
            half_open_max_calls: 1,
        };
        let cb = CircuitBreaker::new("test", cfg);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow_request());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
            half_open_max_calls: 1,
        };
        let cb = CircuitBreaker::new("test", cfg);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn no_calls_allowed_while_open() {
        let cb = CircuitBreaker::new("test", CircuitBreakerConfig { failure_threshold: 1, ..Default::default() });
        cb.record_failure();
        for _ in 0..5 {
            assert!(!cb.allow_request());
        }
    }
}
