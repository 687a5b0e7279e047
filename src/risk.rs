//! Risk agent: adversarial critic over a proposed strategy. Combines a
//! contrarian LLM verdict with deterministic gates that can only escalate
//! the outcome, never soften it. Grounded on the upstream risk agent's
//! "Contrarian" system prompt and JSON verdict shape, generalized with the
//! escalation-only gating pattern this crate's circuit breakers already use.

use crate::config::RiskSettings;
use crate::llm::{extract_json_object, LLMMessage, SharedLLM};
use crate::market_context::{MarketContext, RiskStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

const RISK_SYSTEM_PROMPT: &str = "You are the Risk Agent, a contrarian critic. Your job is to find reasons the proposed strategy is wrong or dangerous: exposure limits, compliance, wash-sale risk, and logic gaps. Reply with JSON only: {\"status\":\"APPROVED|FLAGGED|BLOCKED\",\"confidence_score\":0.0-1.0,\"risk_assessment\":\"...\",\"compliance_notes\":\"...\",\"debate_refutation\":\"...\",\"requires_hitl\":true|false}";

const TRADE_KEYWORDS: &[&str] = &["BUY", "SELL", "ORDER", "TRADE"];

#[derive(Debug, Clone)]
pub struct RiskVerdict {
    pub status: RiskStatus,
    pub confidence: f64,
    pub risk_assessment: String,
    pub compliance_notes: String,
    pub debate_refutation: String,
    pub requires_human_approval: bool,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    status: String,
    #[serde(default)]
    confidence_score: f64,
    #[serde(default)]
    risk_assessment: String,
    #[serde(default)]
    compliance_notes: String,
    #[serde(default)]
    debate_refutation: String,
    #[serde(default)]
    requires_hitl: bool,
}

fn parse_status(raw: &str) -> RiskStatus {
    match raw.to_ascii_uppercase().as_str() {
        "BLOCKED" => RiskStatus::Blocked,
        "FLAGGED" => RiskStatus::Flagged,
        _ => RiskStatus::Approved,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

pub struct RecentTrade {
    pub ticker: String,
    pub side: TradeSide,
    pub pnl: Decimal,
    pub timestamp: DateTime<Utc>,
}

pub struct RiskAgent {
    llm: SharedLLM,
    settings: RiskSettings,
}

impl RiskAgent {
    pub fn new(llm: SharedLLM, settings: RiskSettings) -> Self {
        RiskAgent { llm, settings }
    }

    /// Reviews `suggestion` against `context`. The LLM verdict is the
    /// starting point; deterministic gates can only escalate it (Approved ->
    /// Flagged -> Blocked), never soften it.
    pub async fn review(
        &self,
        context: &MarketContext,
        suggestion: &str,
        proposed_position_pct: Option<f64>,
        recent_trades: &[RecentTrade],
    ) -> RiskVerdict {
        let mut verdict = self.llm_verdict(context, suggestion).await;
        let upper = suggestion.to_uppercase();

        if TRADE_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
            verdict.requires_human_approval = true;
        }

        if let Some(pct) = proposed_position_pct {
            if pct > self.settings.position_size_limit_pct && verdict.status == RiskStatus::Approved {
                verdict.status = RiskStatus::Flagged;
                verdict.risk_assessment = format!(
                    "{} Position size {pct:.1}% exceeds the {:.1}% limit.",
                    verdict.risk_assessment, self.settings.position_size_limit_pct
                );
            }
        }

        if let Some(ticker) = &context.ticker {
            let is_buy = upper.contains("BUY");
            let wash_sale = recent_trades.iter().any(|t| {
                &t.ticker == ticker
                    && t.side == TradeSide::Sell
                    && t.pnl < Decimal::ZERO
                    && is_buy
                    && (Utc::now() - t.timestamp).num_days() <= self.settings.wash_sale_window_days
            });
            if wash_sale {
                verdict.status = RiskStatus::Blocked;
                verdict.requires_human_approval = true;
                verdict.compliance_notes = format!(
                    "{} Wash-sale risk: {ticker} sold at a loss within the window.",
                    verdict.compliance_notes
                );
            }
        }

        verdict
    }

    async fn llm_verdict(&self, context: &MarketContext, suggestion: &str) -> RiskVerdict {
        let portfolio_value =
            context.portfolio.as_ref().map(|p| p.total_value.to_string()).unwrap_or_else(|| "Unknown".to_string());
        let cash = context.portfolio.as_ref().map(|p| p.cash.total.to_string()).unwrap_or_else(|| "Unknown".to_string());
        let ticker = context.ticker.clone().unwrap_or_else(|| "Unknown".to_string());

        let prompt = format!(
            "[CONTEXT]\nTicker: {ticker}\nPortfolio Value: {portfolio_value}\nCash: {cash}\n\n[PROPOSED STRATEGY]\n{suggestion}\n\nAudit this strategy."
        );

        let messages = [LLMMessage::system(RISK_SYSTEM_PROMPT), LLMMessage::user(prompt)];

        let fallback = RiskVerdict {
            status: RiskStatus::Flagged,
            confidence: 0.0,
            risk_assessment: "Risk Agent Error: could not produce a verdict".to_string(),
            compliance_notes: String::new(),
            debate_refutation: String::new(),
            requires_human_approval: true,
        };

        let response = match self.llm.complete(&messages).await {
            Ok(r) => r,
            Err(err) => {
                warn!(error = %err, "risk agent LLM call failed");
                return fallback;
            }
        };

        let Some(json) = extract_json_object(&response.content) else {
            warn!("risk agent failed to find a JSON object in the model output");
            return fallback;
        };

        match serde_json::from_str::<RawVerdict>(json) {
            Ok(raw) => RiskVerdict {
                status: parse_status(&raw.status),
                confidence: raw.confidence_score,
                risk_assessment: raw.risk_assessment,
                compliance_notes: raw.compliance_notes,
                debate_refutation: raw.debate_refutation,
                requires_human_approval: raw.requires_hitl,
            },
            Err(err) => {
                warn!(error = %err, "risk agent verdict JSON did not match the expected schema");
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLLM;
    use std::sync::Arc;

    fn llm_returning(json: &str) -> SharedLLM {
        Arc::new(MockLLM::new("mock-risk", json))
    }

    #[tokio::test]
    async fn position_size_gate_flags_even_when_llm_approves() {
        let llm = llm_returning(
            r#"{"status":"APPROVED","confidence_score":0.9,"risk_assessment":"ok","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
        );
        let agent = RiskAgent::new(llm, RiskSettings::default());
        let ctx = MarketContext::new();
        let verdict = agent.review(&ctx, "Buy AAPL", Some(8.0), &[]).await;
        assert_eq!(verdict.status, RiskStatus::Flagged);
    }

    #[tokio::test]
    async fn wash_sale_forces_blocked() {
        let llm = llm_returning(
            r#"{"status":"APPROVED","confidence_score":0.9,"risk_assessment":"ok","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
        );
        let agent = RiskAgent::new(llm, RiskSettings::default());
        let mut ctx = MarketContext::new();
        ctx.ticker = Some("AAPL".to_string());
        let trades = vec![RecentTrade {
            ticker: "AAPL".to_string(),
            side: TradeSide::Sell,
            pnl: Decimal::from(-50),
            timestamp: Utc::now() - chrono::Duration::days(10),
        }];
        let verdict = agent.review(&ctx, "Buy AAPL", None, &trades).await;
        assert_eq!(verdict.status, RiskStatus::Blocked);
        assert!(verdict.requires_human_approval);
    }

    #[tokio::test]
    async fn trade_keyword_forces_human_approval() {
        let llm = llm_returning(
            r#"{"status":"APPROVED","confidence_score":0.9,"risk_assessment":"ok","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
        );
        let agent = RiskAgent::new(llm, RiskSettings::default());
        let ctx = MarketContext::new();
        let verdict = agent.review(&ctx, "I recommend you BUY this position", None, &[]).await;
        assert!(verdict.requires_human_approval);
    }

    #[tokio::test]
    async fn unparseable_llm_output_falls_back_to_flagged() {
        let llm = llm_returning("not json at all");
        let agent = RiskAgent::new(llm, RiskSettings::default());
        let ctx = MarketContext::new();
        let verdict = agent.review(&ctx, "Hold position", None, &[]).await;
        assert_eq!(verdict.status, RiskStatus::Flagged);
    }

    #[tokio::test]
    async fn old_wash_sale_trade_does_not_block() {
        let llm = llm_returning(
            r#"{"status":"APPROVED","confidence_score":0.9,"risk_assessment":"ok","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
        );
        let agent = RiskAgent::new(llm, RiskSettings::default());
        let mut ctx = MarketContext::new();
        ctx.ticker = Some("AAPL".to_string());
        let trades = vec![RecentTrade {
            ticker: "AAPL".to_string(),
            side: TradeSide::Sell,
            pnl: Decimal::from(-50),
            timestamp: Utc::now() - chrono::Duration::days(90),
        }];
        let verdict = agent.review(&ctx, "Buy AAPL", None, &trades).await;
        assert_eq!(verdict.status, RiskStatus::Approved);
    }
}
