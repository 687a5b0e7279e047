//! Social-swarm aggregation leaf. The upstream implementation fans out to
//! per-platform micro-agents (reddit, twitter); this core collapses that to
//! a single leaf consuming pre-aggregated mention counts from the
//! fabricator, since concrete social providers are out of scope.

use crate::envelope::Specialist;
use crate::market_context::{SentimentLabel, SocialData};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub struct SocialAgent;

#[async_trait]
impl Specialist for SocialAgent {
    fn name(&self) -> &str {
        "SocialAgent"
    }

    fn cache_key(&self, input: &Value) -> Option<String> {
        input.get("ticker").and_then(|t| t.as_str()).map(|t| format!("social:{t}"))
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn analyze(&self, input: Value) -> Result<Value, String> {
        let ticker = input.get("ticker").and_then(|v| v.as_str()).ok_or("missing ticker")?.to_string();
        let bullish = input.get("bullish_mentions").and_then(|v| v.as_u64()).unwrap_or(0);
        let bearish = input.get("bearish_mentions").and_then(|v| v.as_u64()).unwrap_or(0);
        let mention_count = bullish + bearish;
        if mention_count == 0 {
            return Err("not_found: no social mentions available".to_string());
        }
        let label = if bullish as f64 > bearish as f64 * 1.2 {
            SentimentLabel::Bullish
        } else if bearish as f64 > bullish as f64 * 1.2 {
            SentimentLabel::Bearish
        } else {
            SentimentLabel::Neutral
        };
        let data = SocialData {
            ticker: ticker.clone(),
            sentiment_label: label,
            mention_count,
            summary: format!("{bullish} bullish / {bearish} bearish mentions for {ticker}"),
        };
        serde_json::to_value(data).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn strongly_bullish_mentions_yield_bullish_label() {
        let agent = SocialAgent;
        let input = serde_json::json!({"ticker": "AAPL", "bullish_mentions": 100, "bearish_mentions": 10});
        let data: SocialData = serde_json::from_value(agent.analyze(input).await.unwrap()).unwrap();
        assert_eq!(data.sentiment_label, SentimentLabel::Bullish);
    }

    #[tokio::test]
    async fn no_mentions_is_error() {
        let agent = SocialAgent;
        let input = serde_json::json!({"ticker": "AAPL", "bullish_mentions": 0, "bearish_mentions": 0});
        assert!(agent.analyze(input).await.is_err());
    }
}
