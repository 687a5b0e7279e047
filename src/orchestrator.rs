//! Orchestrator: the top-level request lifecycle tying the fabricator,
//! specialist envelope, risk critic, and ACE evaluator together. Grounded
//! on the upstream orchestrator's route -> fabricate -> swarm -> reason ->
//! critique -> finalize pipeline; the trade-execution surface it also
//! carries is out of scope (SPEC_FULL.md section 1 Non-goals), so the
//! tool-call step here only ever intercepts sensitive markers, and dispatches
//! everything else to a `ToolExecutorAgent` that this core never registers.

use crate::ace::AceEvaluator;
use rust_decimal::prelude::FromPrimitive;
use crate::bus::MessageBus;
use crate::config::CoreConfig;
use crate::envelope::{AgentEnvelope, Specialist};
use crate::fabricator::Fabricator;
use crate::llm::{extract_chain_of_thought, LLMMessage, SharedLLM};
use crate::market_context::{
    AgentMessage, DebateTrace, DebateTurn, Intent, IntentType, MarketContext, RequestContext, RiskStatus,
    SpecialistTag, Trend,
};
use crate::risk::{RecentTrade, RiskAgent, RiskVerdict, TradeSide};
use crate::ticker;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Markers the reasoning model may emit to request a tool call:
/// `[TOOL:name(json-args)]`. Only the name is needed to decide whether the
/// call is sensitive.
static TOOL_CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[TOOL:([A-Za-z_]+)\([^)]*\)\]").unwrap());

/// Tools that this core will never execute. A match is always rewritten to
/// an `[ACTION_REQUIRED:<name>]` sentinel instead of being actioned
/// (property P3).
const SENSITIVE_TOOLS: &[&str] = &[
    "place_market_order",
    "place_limit_order",
    "place_stop_order",
    "place_stop_limit_order",
    "cancel_order",
    "create_investment_pie",
    "update_investment_pie",
    "delete_investment_pie",
];

const MAX_DEBATE_TURNS: usize = 2;

/// Bound on reasoning/tool-call round-trips per request: one initial
/// generation plus at most two more after tool results are injected back.
const MAX_TOOL_ROUNDS: usize = 3;

/// The non-sensitive tool dispatch recipient. This core has no real tool
/// executor (Non-goals), so calls land here, a result sentinel is
/// synthesized, and the call is still visible on the bus for observability.
const TOOL_EXECUTOR_RECIPIENT: &str = "ToolExecutorAgent";

const REASONING_SYSTEM_PROMPT: &str = "You are the lead reasoning agent for a financial decision-support system. You never place trades yourself. Synthesize the supplied specialist context into a clear recommendation for the user, citing the evidence that supports it.";

const REBUTTAL_SYSTEM_PROMPT: &str = "You are the lead reasoning agent responding to a risk critique. Address the specific concern raised, or concede and revise the recommendation.";

const ROUTING_SYSTEM_PROMPT: &str = "You are the Orchestrator. Route queries to specialist agents. Respond in exactly this format:\nINTENT: [intent_name]\nTICKER: [symbol or NONE]\nREASON: [short explanation]\n\nIntents: price_check, market_analysis, portfolio_query, forecast_request, goal_planning, educational";

static INTENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)INTENT:\s*(\w+)").unwrap());
static TICKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)TICKER:\s*([A-Z0-9.]+)").unwrap());

/// Share-quantity markers in a proposed strategy, e.g. "buying 10 shares of
/// AAPL", used to size the position for the risk agent's exposure gate.
static TRADE_QUANTITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*shares?").unwrap());

/// Replaces sensitive tool-call markers with an `[ACTION_REQUIRED:name]`
/// sentinel and returns the names that were intercepted. Non-sensitive tool
/// markers pass through unchanged so the caller can dispatch them.
fn intercept_tool_calls(text: &str) -> (String, Vec<String>) {
    let mut intercepted = Vec::new();
    let rewritten = TOOL_CALL_RE.replace_all(text, |caps: &regex::Captures| {
        let name = &caps[1];
        if SENSITIVE_TOOLS.contains(&name) {
            intercepted.push(name.to_string());
            format!("[ACTION_REQUIRED:{name}]")
        } else {
            caps[0].to_string()
        }
    });
    (rewritten.into_owned(), intercepted)
}

/// Tool-call markers still present after sensitive ones were rewritten —
/// these are the non-sensitive calls that need dispatching this round.
fn remaining_tool_calls(text: &str) -> Vec<String> {
    TOOL_CALL_RE.captures_iter(text).map(|c| c[1].to_string()).collect()
}

/// Parses `INTENT:`/`TICKER:` out of the routing model's reply. Falls back
/// to a market-analysis default on any parse failure, matching the
/// upstream router's exception-path behavior.
fn parse_routed_intent(content: &str, request: &RequestContext) -> Intent {
    let Some(intent_caps) = INTENT_RE.captures(content) else {
        return Intent::fallback("routing model reply missing INTENT: field");
    };

    let intent_type = match intent_caps[1].to_ascii_lowercase().as_str() {
        "price_check" => IntentType::PriceCheck,
        "market_analysis" => IntentType::MarketAnalysis,
        "portfolio_query" => IntentType::PortfolioQuery,
        "forecast_request" | "forecast" => IntentType::ForecastRequest,
        "goal_planning" => IntentType::GoalPlanning,
        "educational" => IntentType::Educational,
        other => return Intent::fallback(format!("unrecognized intent '{other}' in routing model reply")),
    };

    let ticker_from_llm = TICKER_RE.captures(content).and_then(|c| {
        let raw = c[1].to_ascii_uppercase();
        (raw != "NONE").then_some(raw)
    });
    let ticker = request.ticker.clone().or(ticker_from_llm);

    let mut params = HashMap::new();
    if let Some(t) = &ticker {
        params.insert("ticker".to_string(), Value::String(t.clone()));
    }

    Intent { needs: intent_type.default_needs(), primary_ticker: ticker, params, reason: "routed by routing model".to_string(), intent_type }
}

/// Tries, in order: Tier 1 (re-normalize), Tier 2 (fuzzy match against a
/// known instrument catalog), Tier 3 (sandboxed suffix-swap transforms).
/// Returns the first ticker distinct from `raw` that recovery produces.
fn recover_ticker(raw: &str, catalog: &[(String, String)]) -> Option<String> {
    let tier1 = ticker::normalize_ticker(raw);
    if tier1 != raw {
        return Some(tier1);
    }

    let mut best: Option<(f64, String)> = None;
    for (symbol, name) in catalog {
        let score = ticker::lcs_similarity(raw, name).max(ticker::lcs_similarity(raw, symbol));
        if score >= 0.6 {
            if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                best = Some((score, symbol.clone()));
            }
        }
    }
    if let Some((_, symbol)) = best {
        return Some(symbol);
    }

    for expr in [r#"append_suffix(".L")"#, r#"swap_exchange_suffix(".L",".DE")"#] {
        if let Ok(candidate) = crate::sandbox::run(expr, raw) {
            if candidate != raw {
                return Some(candidate);
            }
        }
    }
    None
}

/// Flags a disagreement between two specialists whose signals should
/// normally move together. Checks three independent pairs — quant vs
/// forecast, quant vs research (technicals vs news), whale vs social
/// (institutional vs retail flow) — each in both directions, and returns
/// the first one found.
fn detect_contradiction(ctx: &MarketContext) -> Option<String> {
    use crate::market_context::{QuantSignal, SentimentLabel, WhaleImpact};

    if let (Some(quant), Some(forecast)) = (ctx.quant.as_ref(), ctx.forecast.as_ref()) {
        let contradicts =
            matches!((quant.signal, forecast.trend), (QuantSignal::Buy, Trend::Bearish) | (QuantSignal::Sell, Trend::Bullish));
        if contradicts {
            return Some(format!(
                "QuantAgent signals {:?} while ForecastingAgent projects a {:?} trend",
                quant.signal, forecast.trend
            ));
        }
    }

    if let (Some(quant), Some(research)) = (ctx.quant.as_ref(), ctx.research.as_ref()) {
        let contradicts = matches!(
            (quant.signal, research.sentiment_label),
            (QuantSignal::Buy, SentimentLabel::Bearish) | (QuantSignal::Sell, SentimentLabel::Bullish)
        );
        if contradicts {
            return Some(format!(
                "QuantAgent technicals signal {:?} while ResearchAgent news sentiment is {:?}",
                quant.signal, research.sentiment_label
            ));
        }
    }

    if let (Some(whale), Some(social)) = (ctx.whale.as_ref(), ctx.social.as_ref()) {
        let contradicts = matches!(
            (whale.impact, social.sentiment_label),
            (WhaleImpact::Bullish, SentimentLabel::Bearish) | (WhaleImpact::Bearish, SentimentLabel::Bullish)
        );
        if contradicts {
            return Some(format!(
                "WhaleAgent institutional flow is {:?} while SocialAgent retail sentiment is {:?}",
                whale.impact, social.sentiment_label
            ));
        }
    }

    None
}

/// Staging shape for `user_context["recent_trades"]`, the passthrough slot a
/// caller populates with the account's recent fills before calling
/// `Orchestrator::handle`.
#[derive(Debug, Deserialize)]
struct RawRecentTrade {
    ticker: String,
    side: String,
    pnl: f64,
    timestamp: String,
}

fn parse_trade_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc())
}

/// Reads `ctx.user_context["recent_trades"]` (a caller-supplied JSON array)
/// into the `RecentTrade` shape the risk agent's wash-sale gate expects.
/// Missing or malformed input yields an empty list rather than an error.
fn derive_recent_trades(ctx: &MarketContext) -> Vec<RecentTrade> {
    let Some(value) = ctx.user_context.get("recent_trades") else {
        return Vec::new();
    };
    let Ok(raw_trades) = serde_json::from_value::<Vec<RawRecentTrade>>(value.clone()) else {
        return Vec::new();
    };
    raw_trades
        .into_iter()
        .filter_map(|raw| {
            let side = match raw.side.to_ascii_uppercase().as_str() {
                "BUY" => TradeSide::Buy,
                "SELL" => TradeSide::Sell,
                _ => return None,
            };
            let timestamp = parse_trade_timestamp(&raw.timestamp)?;
            Some(RecentTrade { ticker: raw.ticker, side, pnl: Decimal::from_f64(raw.pnl)?, timestamp })
        })
        .collect()
}

/// Sizes a proposed trade as a percentage of portfolio value by reading a
/// "N shares" quantity out of the suggestion text and pricing it against the
/// current quote, so the risk agent's exposure-limit gate has a real number
/// to compare against instead of always seeing `None`.
fn derive_proposed_position_pct(suggestion: &str, ctx: &MarketContext) -> Option<f64> {
    let quantity: f64 = TRADE_QUANTITY_RE.captures(suggestion)?[1].parse().ok()?;
    let price = ctx.price.as_ref()?.current_price.amount().to_f64()?;
    let portfolio_value = ctx.portfolio.as_ref()?.total_value.amount().to_f64()?;
    if portfolio_value == 0.0 {
        return None;
    }
    Some(quantity * price / portfolio_value * 100.0)
}

#[derive(Debug, Clone)]
pub struct OrchestratorResponse {
    pub correlation_id: String,
    pub intent: IntentType,
    pub ticker: Option<String>,
    pub answer: String,
    pub chain_of_thought: Option<String>,
    pub actions_required: Vec<String>,
    pub contradiction: Option<String>,
    pub risk: Option<RiskVerdict>,
    pub debate_trace: DebateTrace,
    pub robustness_score: f64,
    pub robustness_label: &'static str,
    pub context: MarketContext,
    pub timed_out: bool,
}

pub struct Orchestrator {
    config: CoreConfig,
    fabricator: Arc<Fabricator>,
    envelope: Arc<AgentEnvelope>,
    specialists: HashMap<SpecialistTag, Arc<dyn Specialist>>,
    risk: Arc<RiskAgent>,
    ace: Arc<AceEvaluator>,
    reasoning_llm: SharedLLM,
    routing_llm: SharedLLM,
    bus: Arc<MessageBus>,
    instrument_catalog: Vec<(String, String)>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CoreConfig,
        fabricator: Arc<Fabricator>,
        envelope: Arc<AgentEnvelope>,
        specialists: HashMap<SpecialistTag, Arc<dyn Specialist>>,
        risk: Arc<RiskAgent>,
        ace: Arc<AceEvaluator>,
        reasoning_llm: SharedLLM,
        routing_llm: SharedLLM,
        bus: Arc<MessageBus>,
        instrument_catalog: Vec<(String, String)>,
    ) -> Self {
        Orchestrator { config, fabricator, envelope, specialists, risk, ace, reasoning_llm, routing_llm, bus, instrument_catalog }
    }

    /// Runs the full lifecycle bounded by `config.orchestrator_timeout_ms`
    /// (property P1). On timeout, returns a response carrying `timed_out =
    /// true` rather than propagating an error.
    pub async fn handle(&self, request: RequestContext) -> OrchestratorResponse {
        let correlation_id = request.correlation_id.clone();
        let bound = Duration::from_millis(self.config.orchestrator_timeout_ms);
        match tokio::time::timeout(bound, self.run(request)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(correlation_id = %correlation_id, "orchestrator run exceeded timeout bound");
                OrchestratorResponse {
                    correlation_id,
                    intent: IntentType::Educational,
                    ticker: None,
                    answer: "The request took too long to process. Please try again.".to_string(),
                    chain_of_thought: None,
                    actions_required: Vec::new(),
                    contradiction: None,
                    risk: None,
                    debate_trace: Vec::new(),
                    robustness_score: 0.0,
                    robustness_label: "High-Entropy",
                    context: MarketContext::new(),
                    timed_out: true,
                }
            }
        }
    }

    fn emit(&self, subject: &str, payload: Value, correlation_id: &str) {
        self.bus.send(AgentMessage::new(
            "OrchestratorAgent",
            AgentMessage::BROADCAST,
            subject,
            payload,
            Some(correlation_id.to_string()),
        ));
    }

    async fn route(&self, request: &RequestContext) -> Intent {
        let clean_query: String = request.query.chars().take(500).collect();
        let messages = [LLMMessage::system(ROUTING_SYSTEM_PROMPT), LLMMessage::user(format!("Query: \"{clean_query}\""))];
        let content = match self.routing_llm.complete(&messages).await {
            Ok(r) => r.content,
            Err(err) => {
                warn!(error = %err, "orchestrator: routing LLM call failed");
                return Intent::fallback(format!("routing LLM call failed: {err}"));
            }
        };
        parse_routed_intent(&content, request)
    }

    async fn run(&self, request: RequestContext) -> OrchestratorResponse {
        let correlation_id = request.correlation_id.clone();
        self.emit("agent_started", serde_json::json!({"agent": "OrchestratorAgent", "query": request.query}), &correlation_id);

        let intent = self.route(&request).await;
        info!(correlation_id = %correlation_id, intent = ?intent.intent_type, "orchestrator: routed");
        self.emit(
            "intent_classified",
            serde_json::json!({"type": intent.intent_type, "primary_ticker": intent.primary_ticker, "reason": intent.reason}),
            &correlation_id,
        );

        let history_lines: Vec<&str> = request.history.iter().map(|m| m.content.as_str()).collect();
        let stop_words: HashSet<&str> = ["THE", "AND", "FOR", "BUY", "SELL", "HOLD"].into_iter().collect();
        let ticker = intent
            .primary_ticker
            .clone()
            .or_else(|| ticker::resolve_ticker_from_history(&history_lines, &stop_words));

        let mut ctx = self.fabricator.fabricate(intent.intent_type, ticker.as_deref()).await;
        for (key, value) in &request.user_context {
            ctx.user_context.insert(key.clone(), value.clone());
        }

        let needs_price = matches!(
            intent.intent_type,
            IntentType::PriceCheck | IntentType::MarketAnalysis | IntentType::ForecastRequest
        );
        if needs_price && ctx.price.is_none() {
            if let Some(raw) = &ticker {
                if let Some(recovered) = recover_ticker(raw, &self.instrument_catalog) {
                    info!(correlation_id = %correlation_id, original = %raw, recovered = %recovered, "orchestrator: ticker recovery ladder engaged");
                    ctx = self.fabricator.fabricate(intent.intent_type, Some(&recovered)).await;
                    ctx.ticker = Some(recovered);
                }
            }
        }

        self.emit("context_fabricated", serde_json::json!({"ticker": ctx.ticker, "intent": intent.intent_type}), &correlation_id);

        self.emit("swarm_started", serde_json::json!({"agents": intent.needs}), &correlation_id);
        self.run_swarm(&intent, &mut ctx, &correlation_id).await;

        let contradiction = detect_contradiction(&ctx);
        if let Some(note) = &contradiction {
            warn!(correlation_id = %correlation_id, "orchestrator: contradiction detected: {note}");
        }

        self.emit("reasoning_started", serde_json::json!({"model": self.config.reasoning_model}), &correlation_id);
        let (answer, chain_of_thought, actions_required) = self.reason(&request, &ctx, &contradiction, &correlation_id).await;

        let mut debate_trace: DebateTrace = Vec::new();
        let mut risk_verdict: Option<RiskVerdict> = None;
        let mut current_suggestion = answer.clone();
        let recent_trades = derive_recent_trades(&ctx);

        for turn in 0..MAX_DEBATE_TURNS {
            self.emit("risk_review_started", serde_json::json!({"model": self.config.risk_model, "turn": turn}), &correlation_id);
            let proposed_position_pct = derive_proposed_position_pct(&current_suggestion, &ctx);
            let verdict = self.risk.review(&ctx, &current_suggestion, proposed_position_pct, &recent_trades).await;
            let done = verdict.status == RiskStatus::Approved;
            debate_trace.push(DebateTurn { turn: turn as u32, status: verdict.status.clone(), refutation: verdict.debate_refutation.clone() });
            let status = verdict.status.clone();
            risk_verdict = Some(verdict);
            if done || turn + 1 == MAX_DEBATE_TURNS {
                break;
            }
            current_suggestion = self.rebut(&current_suggestion, &risk_verdict.as_ref().unwrap().risk_assessment).await;
            info!(correlation_id = %correlation_id, turn, status = %status, "orchestrator: debate turn recorded");
        }

        let final_status = risk_verdict.as_ref().map(|v| v.status.clone()).unwrap_or(RiskStatus::Flagged);
        let robustness_score = self.ace.calculate_score(&debate_trace, &final_status);
        let robustness_label = self.ace.robustness_label(robustness_score);

        self.emit("agent_complete", serde_json::json!({"agent": "OrchestratorAgent", "success": true}), &correlation_id);

        OrchestratorResponse {
            correlation_id,
            intent: intent.intent_type,
            ticker: ctx.ticker.clone(),
            answer: current_suggestion,
            chain_of_thought,
            actions_required,
            contradiction,
            risk: risk_verdict,
            debate_trace,
            robustness_score,
            robustness_label,
            context: ctx,
            timed_out: false,
        }
    }

    async fn run_swarm(&self, intent: &Intent, ctx: &mut MarketContext, correlation_id: &str) {
        for tag in &intent.needs {
            let Some(specialist) = self.specialists.get(tag) else {
                ctx.mark_failed(tag.name());
                continue;
            };
            let input = self.build_input(*tag, ctx, intent);
            let response = self.envelope.execute(specialist.as_ref(), input, Some(correlation_id.to_string())).await;
            if response.success {
                ctx.mark_executed(tag.name());
                self.merge(*tag, ctx, response.data);
            } else {
                ctx.mark_failed(tag.name());
                warn!(correlation_id = %correlation_id, agent = tag.name(), error = ?response.error, "orchestrator: specialist failed");
            }
        }
    }

    fn build_input(&self, tag: SpecialistTag, ctx: &MarketContext, intent: &Intent) -> Value {
        let ticker = ctx.ticker.clone().unwrap_or_default();
        match tag {
            SpecialistTag::Quant | SpecialistTag::Forecast => {
                let ohlcv = ctx.price.as_ref().map(|p| p.series.clone()).unwrap_or_default();
                serde_json::json!({"ticker": ticker, "ohlcv": ohlcv, "days": 1})
            }
            SpecialistTag::Research => {
                let articles = ctx.user_context.get("fetched_articles").cloned().unwrap_or(Value::Array(vec![]));
                serde_json::json!({"ticker": ticker, "articles": articles})
            }
            SpecialistTag::Social | SpecialistTag::Whale => {
                serde_json::json!({"ticker": ticker, "bullish_mentions": 0, "bearish_mentions": 0, "large_buys": 0, "large_sells": 0})
            }
            SpecialistTag::Portfolio => Value::Null,
            SpecialistTag::Goal => Value::Object(intent.params.clone().into_iter().collect()),
            SpecialistTag::Math => serde_json::json!({"ticker": ticker}),
        }
    }

    fn merge(&self, tag: SpecialistTag, ctx: &mut MarketContext, data: Value) {
        match tag {
            SpecialistTag::Quant => ctx.quant = serde_json::from_value(data).ok(),
            SpecialistTag::Forecast => ctx.forecast = serde_json::from_value(data).ok(),
            SpecialistTag::Portfolio => ctx.portfolio = serde_json::from_value(data).ok(),
            SpecialistTag::Research => ctx.research = serde_json::from_value(data).ok(),
            SpecialistTag::Social => ctx.social = serde_json::from_value(data).ok(),
            SpecialistTag::Whale => ctx.whale = serde_json::from_value(data).ok(),
            SpecialistTag::Goal => ctx.goal = serde_json::from_value(data).ok(),
            SpecialistTag::Math => {
                ctx.user_context.insert("math_problem".to_string(), data);
            }
        }
    }

    /// Runs the reasoning model to completion, re-submitting up to
    /// `MAX_TOOL_ROUNDS` times: each round's non-sensitive tool-call
    /// markers are dispatched over the bus, a result sentinel is injected
    /// back as a new user turn, and the model is asked to continue. Sensitive
    /// tool markers are intercepted permanently and never trigger a
    /// resubmission by themselves.
    async fn reason(
        &self,
        request: &RequestContext,
        ctx: &MarketContext,
        contradiction: &Option<String>,
        correlation_id: &str,
    ) -> (String, Option<String>, Vec<String>) {
        let context_json = serde_json::to_string(ctx).unwrap_or_default();
        let mut prompt = format!("[USER QUERY]\n{}\n\n[MARKET CONTEXT]\n{context_json}\n", request.query);
        if let Some(note) = contradiction {
            prompt.push_str(&format!("\n[CONTRADICTION WARNING]\n{note}\n"));
        }
        let mut messages = vec![LLMMessage::system(REASONING_SYSTEM_PROMPT), LLMMessage::user(prompt)];
        let mut actions_required = Vec::new();

        for round in 0..MAX_TOOL_ROUNDS {
            let response = match self.reasoning_llm.complete(&messages).await {
                Ok(r) => r.content,
                Err(err) => {
                    warn!(error = %err, "orchestrator: reasoning LLM call failed");
                    let (visible, thought) =
                        extract_chain_of_thought("I was unable to generate a recommendation due to an internal error.");
                    return (visible, thought, actions_required);
                }
            };

            let (rewritten, intercepted) = intercept_tool_calls(&response);
            actions_required.extend(intercepted);

            let remaining = remaining_tool_calls(&rewritten);
            if remaining.is_empty() || round + 1 == MAX_TOOL_ROUNDS {
                return extract_two(extract_chain_of_thought(&rewritten), actions_required);
            }

            let tool_results = self.dispatch_tool_calls(&remaining, correlation_id);
            messages.push(LLMMessage { role: "assistant".to_string(), content: rewritten });
            messages.push(LLMMessage::user(tool_results));
        }

        unreachable!("loop always returns within MAX_TOOL_ROUNDS iterations")
    }

    /// Sends each non-sensitive tool call onto the bus (recipient
    /// `ToolExecutorAgent`, which this core never registers) and synthesizes
    /// a `[TOOL_RESULT:name]` line for each, the way the upstream agentic
    /// loop injects real tool output back into the conversation.
    fn dispatch_tool_calls(&self, tool_names: &[String], correlation_id: &str) -> String {
        let mut results = Vec::with_capacity(tool_names.len());
        for name in tool_names {
            self.bus.send(AgentMessage::new(
                "OrchestratorAgent",
                TOOL_EXECUTOR_RECIPIENT,
                "tool_call_requested",
                serde_json::json!({"tool": name}),
                Some(correlation_id.to_string()),
            ));
            results.push(format!("[TOOL_RESULT:{name}] Tool execution is not available in this core."));
        }
        results.join("\n")
    }

    async fn rebut(&self, prior_suggestion: &str, risk_assessment: &str) -> String {
        let prompt = format!(
            "[PRIOR RECOMMENDATION]\n{prior_suggestion}\n\n[RISK CRITIQUE]\n{risk_assessment}\n\nRevise the recommendation."
        );
        let messages = [LLMMessage::system(REBUTTAL_SYSTEM_PROMPT), LLMMessage::user(prompt)];
        match self.reasoning_llm.complete(&messages).await {
            Ok(r) => extract_chain_of_thought(&r.content).0,
            Err(_) => prior_suggestion.to_string(),
        }
    }
}

fn extract_two(pair: (String, Option<String>), actions_required: Vec<String>) -> (String, Option<String>, Vec<String>) {
    (pair.0, pair.1, actions_required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::cache::TtlCache;
    use crate::config::RiskSettings;
    use crate::llm::MockLLM;
    use crate::specialists::{ForecastingAgent, PortfolioAgent, PortfolioStore, QuantAgent};

    fn orchestrator_with(routing_canned: &str, reasoning_canned: &str, risk_canned: &str) -> Orchestrator {
        let config = CoreConfig::default();
        let fabricator = Arc::new(Fabricator::new(vec![], vec![], vec![]));
        let bus = Arc::new(MessageBus::new());
        let cache = Arc::new(TtlCache::new());
        let envelope = Arc::new(AgentEnvelope::new(cache, bus.clone(), true));

        let mut specialists: HashMap<SpecialistTag, Arc<dyn Specialist>> = HashMap::new();
        specialists.insert(SpecialistTag::Quant, Arc::new(QuantAgent));
        specialists.insert(SpecialistTag::Forecast, Arc::new(ForecastingAgent));
        specialists.insert(SpecialistTag::Portfolio, Arc::new(PortfolioAgent::new(Arc::new(PortfolioStore::default()))));

        let risk_llm: SharedLLM = Arc::new(MockLLM::new("mock-risk", risk_canned));
        let risk = Arc::new(RiskAgent::new(risk_llm, RiskSettings::default()));
        let ace = Arc::new(AceEvaluator::new(config.ace.clone()));
        let reasoning_llm: SharedLLM = Arc::new(MockLLM::new("mock-reasoner", reasoning_canned));
        let routing_llm: SharedLLM = Arc::new(MockLLM::new("mock-router", routing_canned));

        Orchestrator::new(config, fabricator, envelope, specialists, risk, ace, reasoning_llm, routing_llm, bus, vec![])
    }

    #[tokio::test]
    async fn educational_intent_never_touches_price_provider() {
        let orch = orchestrator_with(
            "INTENT: educational\nTICKER: NONE\nREASON: conceptual question",
            "Diversification means not putting all your money in one stock.",
            r#"{"status":"APPROVED","confidence_score":0.9,"risk_assessment":"ok","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
        );
        let mut request = RequestContext::new("Can you explain what diversification means?");
        request.ticker = None;
        let response = orch.handle(request).await;
        assert_eq!(response.intent, IntentType::Educational);
        assert!(response.context.price.is_none());
        assert!(!response.timed_out);
    }

    #[tokio::test]
    async fn sensitive_tool_marker_is_intercepted_not_executed() {
        let orch = orchestrator_with(
            "INTENT: market_analysis\nTICKER: AAPL\nREASON: stock query",
            "I recommend increasing your position. [TOOL:place_market_order(\"AAPL\",10)]",
            r#"{"status":"APPROVED","confidence_score":0.9,"risk_assessment":"ok","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
        );
        let request = RequestContext::new("What is the outlook for $AAPL?");
        let response = orch.handle(request).await;
        assert!(response.answer.contains("[ACTION_REQUIRED:place_market_order]"));
        assert!(!response.answer.contains("[TOOL:place_market_order"));
        assert_eq!(response.actions_required, vec!["place_market_order".to_string()]);
    }

    #[tokio::test]
    async fn blocked_verdict_yields_low_robustness_label() {
        let orch = orchestrator_with(
            "INTENT: market_analysis\nTICKER: AAPL\nREASON: stock query",
            "Consider selling part of your position.",
            r#"{"status":"BLOCKED","confidence_score":0.2,"risk_assessment":"wash sale risk","compliance_notes":"","debate_refutation":"not addressed","requires_hitl":true}"#,
        );
        let request = RequestContext::new("What should I do with $AAPL?");
        let response = orch.handle(request).await;
        assert_eq!(response.risk.as_ref().unwrap().status, RiskStatus::Blocked);
        assert_eq!(response.robustness_label, "High-Entropy");
    }

    #[tokio::test]
    async fn agent_executed_and_failed_sets_stay_disjoint() {
        let orch = orchestrator_with(
            "INTENT: market_analysis\nTICKER: AAPL\nREASON: stock query",
            "Hold steady.",
            r#"{"status":"APPROVED","confidence_score":0.9,"risk_assessment":"ok","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
        );
        let request = RequestContext::new("Give me a full market analysis of $AAPL");
        let response = orch.handle(request).await;
        assert!(response.context.invariant_disjoint_agent_sets());
    }

    #[tokio::test]
    async fn unparseable_routing_reply_falls_back_to_market_analysis() {
        let orch = orchestrator_with(
            "I'm not sure what you mean.",
            "Hold steady.",
            r#"{"status":"APPROVED","confidence_score":0.9,"risk_assessment":"ok","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
        );
        let request = RequestContext::new("asdf");
        let response = orch.handle(request).await;
        assert_eq!(response.intent, IntentType::MarketAnalysis);
    }

    #[tokio::test]
    async fn wash_sale_recent_trade_blocks_a_buy_recommendation() {
        let orch = orchestrator_with(
            "INTENT: market_analysis\nTICKER: AAPL\nREASON: stock query",
            "I recommend buying 10 shares of AAPL.",
            r#"{"status":"APPROVED","confidence_score":0.9,"risk_assessment":"ok","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
        );
        let recent_date = (chrono::Utc::now() - chrono::Duration::days(5)).format("%Y-%m-%d").to_string();
        let mut request = RequestContext::new("Should I buy more $AAPL?");
        request.user_context.insert(
            "recent_trades".to_string(),
            serde_json::json!([{"ticker": "AAPL", "side": "SELL", "pnl": -50.0, "timestamp": recent_date}]),
        );
        let response = orch.handle(request).await;
        assert_eq!(response.risk.as_ref().unwrap().status, RiskStatus::Blocked);
    }
}
