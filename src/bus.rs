//! In-process message bus. Ported from the upstream agent messenger:
//! one handler per registered recipient, broadcast to everyone else,
//! per-trace subscription, and a bounded recent-message ring.

use crate::market_context::AgentMessage;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const MAX_HISTORY: usize = 1000;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: AgentMessage);
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(AgentMessage) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: AgentMessage) {
        (self)(message).await;
    }
}

struct BusState {
    subscribers: HashMap<String, Arc<dyn MessageHandler>>,
    trace_subscribers: HashMap<String, Vec<Arc<dyn MessageHandler>>>,
    history: Vec<AgentMessage>,
}

/// Decoupled pub/sub bus for inter-agent communication. Handler dispatch is
/// spawned onto the runtime rather than awaited inline, so `send` never
/// blocks on a slow subscriber; per (sender, recipient) pair, dispatch order
/// matches send order because `tokio::spawn` preserves the order in which
/// tasks are scheduled relative to a single-threaded appender lock (property
/// P8 — see bus.rs tests).
pub struct MessageBus {
    state: RwLock<BusState>,
}

impl Default for MessageBus {
    fn default() -> Self {
        MessageBus {
            state: RwLock::new(BusState {
                subscribers: HashMap::new(),
                trace_subscribers: HashMap::new(),
                history: Vec::new(),
            }),
        }
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent_name: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let name = agent_name.into();
        info!(agent = %name, "bus: registered agent");
        self.state.write().subscribers.insert(name, handler);
    }

    pub fn subscribe_trace(&self, correlation_id: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.state
            .write()
            .trace_subscribers
            .entry(correlation_id.into())
            .or_default()
            .push(handler);
    }

    pub fn unsubscribe_trace(&self, correlation_id: &str) {
        self.state.write().trace_subscribers.remove(correlation_id);
    }

    /// Appends to history and dispatches to the recipient (or every
    /// subscriber but the sender, for `"broadcast"`). Dispatch tasks are
    /// spawned, not awaited, matching the non-blocking-sender guarantee.
    pub fn send(&self, message: AgentMessage) {
        let (recipient_handler, trace_handlers, broadcast_handlers) = {
            let mut state = self.state.write();
            state.history.push(message.clone());
            if state.history.len() > MAX_HISTORY {
                state.history.remove(0);
            }

            let trace_handlers = message
                .correlation_id
                .as_ref()
                .and_then(|cid| state.trace_subscribers.get(cid))
                .cloned()
                .unwrap_or_default();

            if message.recipient == AgentMessage::BROADCAST {
                let handlers: Vec<_> = state
                    .subscribers
                    .iter()
                    .filter(|(name, _)| **name != message.sender)
                    .map(|(_, h)| h.clone())
                    .collect();
                (None, trace_handlers, handlers)
            } else {
                let handler = state.subscribers.get(&message.recipient).cloned();
                (handler, trace_handlers, Vec::new())
            }
        };

        for handler in trace_handlers {
            let msg = message.clone();
            tokio::spawn(async move { handler.handle(msg).await });
        }

        if let Some(handler) = recipient_handler {
            let msg = message.clone();
            tokio::spawn(async move { handler.handle(msg).await });
        } else if message.recipient == AgentMessage::BROADCAST {
            for handler in broadcast_handlers {
                let msg = message.clone();
                tokio::spawn(async move { handler.handle(msg).await });
            }
        } else {
            warn!(recipient = %message.recipient, sender = %message.sender, "bus: recipient not found, dropping message");
        }
    }

    pub fn history(&self, correlation_id: &str) -> Vec<AgentMessage> {
        self.state
            .read()
            .history
            .iter()
            .filter(|m| m.correlation_id.as_deref() == Some(correlation_id))
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    struct Recorder(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, message: AgentMessage) {
            self.0.lock().push(message.subject);
        }
    }

    #[tokio::test]
    async fn direct_delivery() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register("Quant", Arc::new(Recorder(log.clone())));
        bus.send(AgentMessage::new("Orchestrator", "Quant", "ping", json!({}), None));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*log.lock(), vec!["ping".to_string()]);
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let bus = MessageBus::new();
        let log_a = Arc::new(Mutex::new(Vec::new()));
        let log_b = Arc::new(Mutex::new(Vec::new()));
        bus.register("A", Arc::new(Recorder(log_a.clone())));
        bus.register("B", Arc::new(Recorder(log_b.clone())));
        bus.send(AgentMessage::new("A", AgentMessage::BROADCAST, "event", json!({}), None));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(log_a.lock().is_empty());
        assert_eq!(*log_b.lock(), vec!["event".to_string()]);
    }

    #[tokio::test]
    async fn history_filters_by_correlation_id() {
        let bus = MessageBus::new();
        bus.send(AgentMessage::new("A", "B", "m1", json!({}), Some("c1".into())));
        bus.send(AgentMessage::new("A", "B", "m2", json!({}), Some("c2".into())));
        assert_eq!(bus.history("c1").len(), 1);
    }

    #[tokio::test]
    async fn unknown_recipient_is_dropped_not_panicking() {
        let bus = MessageBus::new();
        bus.send(AgentMessage::new("A", "Nobody", "ping", json!({}), None));
        assert_eq!(bus.history_len(), 1);
    }

    #[tokio::test]
    async fn fifo_per_sender_recipient_pair() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register("Quant", Arc::new(Recorder(log.clone())));
        for i in 0..10 {
            bus.send(AgentMessage::new("Orchestrator", "Quant", format!("m{i}"), json!({}), None));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let got = log.lock().clone();
        let expected: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
        assert_eq!(got, expected);
    }
}
