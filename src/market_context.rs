//! Shared data model: requests, intents, the aggregate market context, and
//! the small DTOs passed across the agent envelope and message bus.
//! See SPEC_FULL.md section 3.

use crate::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountScope {
    Invest,
    Isa,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub query: String,
    pub ticker: Option<String>,
    pub account_scope: Option<AccountScope>,
    pub conversation_id: Option<String>,
    pub history: Vec<Message>,
    pub correlation_id: String,
    /// Caller-supplied side data, e.g. `recent_trades` for the wash-sale
    /// gate, passed through untouched into `MarketContext.user_context`.
    pub user_context: HashMap<String, serde_json::Value>,
}

impl RequestContext {
    pub fn new(query: impl Into<String>) -> Self {
        RequestContext {
            query: query.into(),
            ticker: None,
            account_scope: None,
            conversation_id: None,
            history: Vec::new(),
            correlation_id: Uuid::new_v4().to_string(),
            user_context: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialistTag {
    Quant,
    Forecast,
    Portfolio,
    Research,
    Social,
    Whale,
    Goal,
    Math,
}

impl SpecialistTag {
    pub fn name(self) -> &'static str {
        match self {
            SpecialistTag::Quant => "QuantAgent",
            SpecialistTag::Forecast => "ForecastingAgent",
            SpecialistTag::Portfolio => "PortfolioAgent",
            SpecialistTag::Research => "ResearchAgent",
            SpecialistTag::Social => "SocialAgent",
            SpecialistTag::Whale => "WhaleAgent",
            SpecialistTag::Goal => "GoalPlannerAgent",
            SpecialistTag::Math => "MathGeneratorAgent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentType {
    PriceCheck,
    MarketAnalysis,
    PortfolioQuery,
    ForecastRequest,
    GoalPlanning,
    Educational,
}

impl IntentType {
    /// Fixed intent -> required-specialists table (SPEC_FULL.md 4.7 step b).
    pub fn default_needs(self) -> Vec<SpecialistTag> {
        use SpecialistTag::*;
        match self {
            IntentType::PriceCheck => vec![],
            IntentType::MarketAnalysis => vec![Quant, Forecast, Research, Social, Whale],
            IntentType::PortfolioQuery => vec![Portfolio],
            IntentType::ForecastRequest => vec![Forecast],
            IntentType::GoalPlanning => vec![Goal, Portfolio],
            IntentType::Educational => vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    pub needs: Vec<SpecialistTag>,
    pub primary_ticker: Option<String>,
    pub params: HashMap<String, serde_json::Value>,
    pub reason: String,
}

impl Intent {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Intent {
            intent_type: IntentType::MarketAnalysis,
            needs: vec![SpecialistTag::Quant, SpecialistTag::Forecast, SpecialistTag::Portfolio],
            primary_ticker: None,
            params: HashMap::new(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantSignal {
    Buy,
    Sell,
    Hold,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacdValue {
    pub value: Decimal,
    pub signal: Decimal,
    pub hist: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: Decimal,
    pub middle: Decimal,
    pub lower: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantData {
    pub ticker: String,
    pub rsi: Decimal,
    pub macd: MacdValue,
    pub bbands: BollingerBands,
    pub signal: QuantSignal,
    pub support: Option<Decimal>,
    pub resistance: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Bullish,
    Bearish,
    Sideways,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastData {
    pub ticker: String,
    pub forecast_24h: Decimal,
    pub forecast_48h: Option<Decimal>,
    pub forecast_7d: Option<Decimal>,
    pub confidence: Decimal,
    pub trend: Trend,
    pub algorithm: String,
    pub is_fallback: bool,
    pub series: Vec<Bar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub quantity: Decimal,
    pub avg_price: Money,
    pub current_price: Money,
    pub pnl: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cash {
    pub total: Money,
    pub free: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioData {
    pub total_value: Money,
    pub total_invested: Money,
    pub total_pnl: Money,
    pub pnl_percent: Decimal,
    pub cash: Cash,
    pub positions: Vec<Position>,
    pub accounts: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub source: String,
    pub url: Option<String>,
    pub sentiment: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchData {
    pub ticker: String,
    pub sentiment_score: Decimal,
    pub sentiment_label: SentimentLabel,
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialData {
    pub ticker: String,
    pub sentiment_label: SentimentLabel,
    pub mention_count: u64,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhaleImpact {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleData {
    pub ticker: String,
    pub impact: WhaleImpact,
    pub notable_transactions: u64,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalData {
    pub goal_name: String,
    pub target_amount: Money,
    pub monthly_contribution: Money,
    pub months_to_target: u32,
    pub plan: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceData {
    pub ticker: String,
    pub current_price: Money,
    pub source: String,
    pub series: Vec<Bar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    pub agent_name: String,
    pub model_version: Option<String>,
    pub latency_ms: u64,
    pub correlation_id: Option<String>,
    pub cached: bool,
    pub tokens_used: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent_name: String,
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
    pub latency_ms: u64,
    pub cached: bool,
    pub telemetry: Option<Telemetry>,
}

impl AgentResponse {
    pub fn failure(agent_name: impl Into<String>, error: impl Into<String>, latency_ms: u64) -> Self {
        AgentResponse {
            agent_name: agent_name.into(),
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
            latency_ms,
            cached: false,
            telemetry: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub payload: serde_json::Value,
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Self {
        AgentMessage {
            id: Uuid::new_v4(),
            sender: sender.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            payload,
            correlation_id,
            timestamp: Utc::now(),
        }
    }

    pub const BROADCAST: &'static str = "broadcast";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskStatus {
    Approved,
    Flagged,
    Blocked,
}

impl std::fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskStatus::Approved => write!(f, "APPROVED"),
            RiskStatus::Flagged => write!(f, "FLAGGED"),
            RiskStatus::Blocked => write!(f, "BLOCKED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateTurn {
    pub turn: u32,
    pub status: RiskStatus,
    pub refutation: String,
}

pub type DebateTrace = Vec<DebateTurn>;

/// Aggregate carrier passed between orchestrator stages. Built by the
/// fabricator, mutated only by the orchestrator while merging specialist
/// results, then read-only during reasoning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketContext {
    pub ticker: Option<String>,
    pub price: Option<PriceData>,
    pub quant: Option<QuantData>,
    pub forecast: Option<ForecastData>,
    pub portfolio: Option<PortfolioData>,
    pub research: Option<ResearchData>,
    pub social: Option<SocialData>,
    pub whale: Option<WhaleData>,
    pub goal: Option<GoalData>,
    pub agents_executed: Vec<String>,
    pub agents_failed: Vec<String>,
    pub telemetry: Vec<Telemetry>,
    pub total_latency_ms: u64,
    pub user_context: HashMap<String, serde_json::Value>,
    pub reasoning: Option<String>,
}

impl MarketContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Property P2: executed and failed sets must never overlap.
    pub fn invariant_disjoint_agent_sets(&self) -> bool {
        self.agents_executed.iter().all(|a| !self.agents_failed.contains(a))
    }

    pub fn mark_executed(&mut self, agent: impl Into<String>) {
        let agent = agent.into();
        self.agents_failed.retain(|a| a != &agent);
        if !self.agents_executed.contains(&agent) {
            self.agents_executed.push(agent);
        }
    }

    pub fn mark_failed(&mut self, agent: impl Into<String>) {
        let agent = agent.into();
        if self.agents_executed.contains(&agent) {
            return;
        }
        if !self.agents_failed.contains(&agent) {
            self.agents_failed.push(agent);
        }
    }
}
