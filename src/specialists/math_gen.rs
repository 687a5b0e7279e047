//! Deterministic arithmetic-word-problem generator. Exercises the same
//! sandboxed-evaluator path Tier-3 recovery uses (SPEC_FULL.md section 9),
//! standing in for the upstream math-generator agent's LLM-authored
//! exercises with a fixed, reviewable template set.

use crate::envelope::Specialist;
use crate::sandbox;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MathProblem {
    pub prompt: String,
    pub ticker_example: String,
    pub answer: String,
}

pub struct MathGeneratorAgent;

#[async_trait]
impl Specialist for MathGeneratorAgent {
    fn name(&self) -> &str {
        "MathGeneratorAgent"
    }

    fn cache_key(&self, _input: &Value) -> Option<String> {
        None
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn analyze(&self, input: Value) -> Result<Value, String> {
        let topic = input.get("topic").and_then(|v| v.as_str()).unwrap_or("position_sizing");
        let seed_ticker = input.get("ticker").and_then(|v| v.as_str()).unwrap_or("VOD");

        let (prompt, expr) = match topic {
            "ticker_normalization" => (
                format!("What is the London-listing symbol for {seed_ticker}?"),
                r#"append_suffix(".L")"#,
            ),
            _ => (
                "If a portfolio worth £10,000 risks 5% on a single position, what is the position size?".to_string(),
                r#"append_suffix("")"#,
            ),
        };

        let answer = sandbox::run(expr, seed_ticker).map_err(|e| e.to_string())?;

        let problem = MathProblem { prompt, ticker_example: seed_ticker.to_string(), answer };
        serde_json::to_value(problem).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticker_normalization_problem_runs_through_sandbox() {
        let agent = MathGeneratorAgent;
        let input = serde_json::json!({"topic": "ticker_normalization", "ticker": "VOD"});
        let problem: MathProblem = serde_json::from_value(agent.analyze(input).await.unwrap()).unwrap();
        assert_eq!(problem.answer, "VOD.L");
    }

    #[tokio::test]
    async fn default_topic_produces_a_problem() {
        let agent = MathGeneratorAgent;
        let result = agent.analyze(serde_json::json!({})).await;
        assert!(result.is_ok());
    }
}
