//! Per-sender capability policy mediating all bus traffic. Ported from the
//! upstream governance service's hardcoded policy table.

use crate::bus::MessageBus;
use crate::market_context::AgentMessage;
use std::collections::{HashMap, HashSet};
use tracing::error;

#[derive(Debug, Clone)]
pub struct AgentPolicy {
    pub name: String,
    pub can_read_portfolio: bool,
    pub can_trade: bool,
    pub allowed_recipients: HashSet<String>,
}

impl AgentPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        AgentPolicy {
            name: name.into(),
            can_read_portfolio: false,
            can_trade: false,
            allowed_recipients: ["CoordinatorAgent", "DecisionAgent"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    pub fn read_portfolio(mut self) -> Self {
        self.can_read_portfolio = true;
        self
    }

    pub fn can_trade(mut self) -> Self {
        self.can_trade = true;
        self
    }

    pub fn recipients(mut self, recipients: &[&str]) -> Self {
        self.allowed_recipients = recipients.iter().map(|s| s.to_string()).collect();
        self
    }
}

pub enum Action {
    SendMessage { recipient: String },
    ReadPortfolio,
    Trade,
}

pub struct GovernanceService {
    policies: HashMap<String, AgentPolicy>,
}

impl Default for GovernanceService {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(
            "OrchestratorAgent".to_string(),
            AgentPolicy::new("OrchestratorAgent").read_portfolio().recipients(&["broadcast"]),
        );
        policies.insert("PortfolioAgent".to_string(), AgentPolicy::new("PortfolioAgent").read_portfolio());
        policies.insert("QuantAgent".to_string(), AgentPolicy::new("QuantAgent"));
        policies.insert("ForecastingAgent".to_string(), AgentPolicy::new("ForecastingAgent"));
        policies.insert("ResearchAgent".to_string(), AgentPolicy::new("ResearchAgent"));
        policies.insert("SocialAgent".to_string(), AgentPolicy::new("SocialAgent"));
        policies.insert("WhaleAgent".to_string(), AgentPolicy::new("WhaleAgent"));
        policies.insert("GoalPlannerAgent".to_string(), AgentPolicy::new("GoalPlannerAgent"));
        policies.insert("MathGeneratorAgent".to_string(), AgentPolicy::new("MathGeneratorAgent"));
        policies.insert(
            "RiskAgent".to_string(),
            AgentPolicy::new("RiskAgent").read_portfolio().can_trade().recipients(&["broadcast"]),
        );
        GovernanceService { policies }
    }
}

impl GovernanceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: AgentPolicy) -> Self {
        self.policies.insert(policy.name.clone(), policy);
        self
    }

    pub fn is_authorized(&self, sender: &str, action: &Action) -> bool {
        let Some(policy) = self.policies.get(sender) else {
            return false;
        };
        match action {
            Action::SendMessage { recipient } => {
                policy.allowed_recipients.contains("broadcast") || policy.allowed_recipients.contains(recipient)
            }
            Action::ReadPortfolio => policy.can_read_portfolio,
            Action::Trade => policy.can_trade,
        }
    }

    /// Dispatches a message through the bus only if the sender is
    /// authorized to send to its recipient; otherwise logs and drops it
    /// without raising an error to the caller (matches upstream behavior).
    pub fn secure_dispatch(&self, bus: &MessageBus, message: AgentMessage) {
        let authorized = self.is_authorized(
            &message.sender,
            &Action::SendMessage { recipient: message.recipient.clone() },
        );
        if authorized {
            bus.send(message);
        } else {
            error!(sender = %message.sender, recipient = %message.recipient, "governance: blocked unauthorized message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quant_agent_cannot_broadcast() {
        let gov = GovernanceService::new();
        assert!(!gov.is_authorized("QuantAgent", &Action::SendMessage { recipient: "broadcast".into() }));
    }

    #[test]
    fn orchestrator_can_broadcast() {
        let gov = GovernanceService::new();
        assert!(gov.is_authorized("OrchestratorAgent", &Action::SendMessage { recipient: "broadcast".into() }));
    }

    #[test]
    fn unknown_sender_denied() {
        let gov = GovernanceService::new();
        assert!(!gov.is_authorized("Nobody", &Action::ReadPortfolio));
    }

    #[tokio::test]
    async fn secure_dispatch_drops_unauthorized() {
        let gov = GovernanceService::new();
        let bus = MessageBus::new();
        gov.secure_dispatch(&bus, AgentMessage::new("QuantAgent", "broadcast", "x", json!({}), Some("c".into())));
        assert!(bus.history("c").is_empty());
    }

    #[tokio::test]
    async fn secure_dispatch_allows_authorized() {
        let gov = GovernanceService::new();
        let bus = MessageBus::new();
        gov.secure_dispatch(&bus, AgentMessage::new("OrchestratorAgent", "broadcast", "x", json!({}), Some("c".into())));
        assert_eq!(bus.history("c").len(), 1);
    }
}
