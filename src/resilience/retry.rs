use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: 0.5,
        }
    }
}

fn backoff_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
    let raw = cfg.base_delay.as_secs_f64() * cfg.exponential_base.powi(attempt as i32);
    let capped = raw.min(cfg.max_delay.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(-cfg.jitter..=cfg.jitter);
    let delay = (capped + jitter).max(0.1);
    Duration::from_secs_f64(delay)
}

/// Retries `op` up to `cfg.max_attempts` times with exponential backoff and
/// jitter between attempts. The last failure is returned to the caller; a
/// single retry-exhaustion here is meant to be recorded as exactly one
/// failure against any enclosing circuit breaker (see DESIGN.md open
/// question 1).
pub async fn retry_with_backoff<T, E, F, Fut>(cfg: RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= cfg.max_attempts {
                    return Err(e);
                }
                tokio::time::sleep(backoff_delay(&cfg, attempt - 1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, &str> = retry_with_backoff(RetryConfig::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_attempt_never_retries() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig { max_attempts: 1, base_delay: Duration::from_millis(1), ..Default::default() };
        let result: Result<i32, &str> = retry_with_backoff(cfg, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("boom")
        })
        .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_exhausted() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig { max_attempts: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2), ..Default::default() };
        let result: Result<i32, &str> = retry_with_backoff(cfg, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("boom")
        })
        .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
