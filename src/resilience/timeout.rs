use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Runs `op` with a bounded deadline, returning `default` and logging a
/// warning if the deadline expires.
pub async fn with_timeout<T, F>(label: &str, duration: Duration, op: F, default: T) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(duration, op).await {
        Ok(v) => v,
        Err(_) => {
            warn!(label, timeout_ms = duration.as_millis() as u64, "operation timed out");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_default_on_deadline() {
        let result = with_timeout(
            "test",
            Duration::from_millis(5),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                1
            },
            0,
        )
        .await;
        assert_eq!(result, 0);
    }

    #[tokio::test]
    async fn returns_value_when_fast_enough() {
        let result = with_timeout("test", Duration::from_millis(50), async { 7 }, 0).await;
        assert_eq!(result, 7);
    }
}
