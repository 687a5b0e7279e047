//! Uniform per-specialist execution wrapper: cache lookup, timed call,
//! telemetry, bus events. See SPEC_FULL.md section 4.5. Grounded on
//! `execution.rs`'s wrap-then-branch style (pre-check, branch, always
//! return a typed result, never an escaping exception).

use crate::bus::MessageBus;
use crate::cache::TtlCache;
use crate::market_context::{AgentMessage, AgentResponse, Telemetry};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[async_trait]
pub trait Specialist: Send + Sync {
    fn name(&self) -> &str;

    /// Per-call cache key derived from `input`; `None` disables caching for
    /// this call.
    fn cache_key(&self, input: &Value) -> Option<String>;

    fn cache_ttl(&self) -> Duration;

    fn timeout(&self) -> Duration;

    async fn analyze(&self, input: Value) -> Result<Value, String>;
}

pub struct AgentEnvelope {
    cache: Arc<TtlCache<Value>>,
    bus: Arc<MessageBus>,
    enabled: bool,
}

impl AgentEnvelope {
    pub fn new(cache: Arc<TtlCache<Value>>, bus: Arc<MessageBus>, enabled: bool) -> Self {
        AgentEnvelope { cache, bus, enabled }
    }

    /// Runs `specialist.analyze(input)` through the full envelope: disabled
    /// check, cache lookup, timed call with telemetry, cache population,
    /// and bus lifecycle events. Never propagates a panic-worthy error —
    /// every path returns a typed `AgentResponse`.
    pub async fn execute(
        &self,
        specialist: &dyn Specialist,
        input: Value,
        correlation_id: Option<String>,
    ) -> AgentResponse {
        let name = specialist.name().to_string();

        if !self.enabled {
            return AgentResponse::failure(name, "disabled", 0);
        }

        let start = Instant::now();
        self.emit(&name, "agent_started", Value::Null, correlation_id.clone());

        let cache_key = specialist.cache_key(&input);
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key) {
                let latency_ms = start.elapsed().as_millis() as u64;
                let telemetry = self.telemetry(&name, latency_ms, true, correlation_id.clone());
                self.emit(
                    &name,
                    "agent_complete",
                    serde_json::json!({"cached": true, "success": true}),
                    correlation_id,
                );
                return AgentResponse {
                    agent_name: name,
                    success: true,
                    data: cached,
                    error: None,
                    latency_ms,
                    cached: true,
                    telemetry: Some(telemetry),
                };
            }
        }

        let result = tokio::time::timeout(specialist.timeout(), specialist.analyze(input)).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let response = match result {
            Ok(Ok(data)) => {
                if let Some(key) = &cache_key {
                    self.cache.set(key.clone(), data.clone(), specialist.cache_ttl());
                }
                let telemetry = self.telemetry(&name, latency_ms, false, correlation_id.clone());
                AgentResponse {
                    agent_name: name.clone(),
                    success: true,
                    data,
                    error: None,
                    latency_ms,
                    cached: false,
                    telemetry: Some(telemetry),
                }
            }
            Ok(Err(err)) => {
                warn!(agent = %name, error = %err, "specialist returned error");
                AgentResponse::failure(name.clone(), err, latency_ms)
            }
            Err(_) => {
                warn!(agent = %name, timeout_ms = specialist.timeout().as_millis() as u64, "specialist timed out");
                AgentResponse::failure(name.clone(), "timeout", latency_ms)
            }
        };

        self.emit(
            &name,
            "agent_complete",
            serde_json::json!({"success": response.success, "error": response.error}),
            correlation_id,
        );

        response
    }

    fn telemetry(&self, agent_name: &str, latency_ms: u64, cached: bool, correlation_id: Option<String>) -> Telemetry {
        Telemetry {
            agent_name: agent_name.to_string(),
            model_version: None,
            latency_ms,
            correlation_id,
            cached,
            tokens_used: None,
            timestamp: Utc::now(),
        }
    }

    fn emit(&self, agent_name: &str, subject: &str, payload: Value, correlation_id: Option<String>) {
        info!(agent = agent_name, subject, "envelope event");
        self.bus.send(AgentMessage::new(agent_name, AgentMessage::BROADCAST, subject, payload, correlation_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Specialist for Echo {
        fn name(&self) -> &str {
            "EchoAgent"
        }
        fn cache_key(&self, input: &Value) -> Option<String> {
            Some(format!("echo:{}", input))
        }
        fn cache_ttl(&self) -> Duration {
            Duration::from_secs(60)
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn analyze(&self, input: Value) -> Result<Value, String> {
            Ok(input)
        }
    }

    struct SlowAgent;

    #[async_trait]
    impl Specialist for SlowAgent {
        fn name(&self) -> &str {
            "SlowAgent"
        }
        fn cache_key(&self, _input: &Value) -> Option<String> {
            None
        }
        fn cache_ttl(&self) -> Duration {
            Duration::from_secs(60)
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(5)
        }
        async fn analyze(&self, _input: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Value::Null)
        }
    }

    fn envelope() -> AgentEnvelope {
        AgentEnvelope::new(Arc::new(TtlCache::new()), Arc::new(MessageBus::new()), true)
    }

    #[tokio::test]
    async fn success_path_caches_and_returns() {
        let env = envelope();
        let resp = env.execute(&Echo, serde_json::json!("AAPL"), None).await;
        assert!(resp.success);
        assert!(!resp.cached);
        let resp2 = env.execute(&Echo, serde_json::json!("AAPL"), None).await;
        assert!(resp2.cached);
    }

    #[tokio::test]
    async fn timeout_becomes_failure_response() {
        let env = envelope();
        let resp = env.execute(&SlowAgent, Value::Null, None).await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn disabled_envelope_short_circuits() {
        let env = AgentEnvelope::new(Arc::new(TtlCache::new()), Arc::new(MessageBus::new()), false);
        let resp = env.execute(&Echo, Value::Null, None).await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("disabled"));
    }
}
