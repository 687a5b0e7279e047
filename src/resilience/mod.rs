pub mod circuit_breaker;
pub mod fallback;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::{FallbackChain, ProviderSlot};
pub use retry::{retry_with_backoff, RetryConfig};
pub use timeout::with_timeout;
