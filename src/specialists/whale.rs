//! Whale-transaction intelligence leaf. Consumes pre-fetched large-holder
//! transaction counts from the fabricator (the provider integration is
//! out of scope) and derives a directional impact label.

use crate::envelope::Specialist;
use crate::market_context::{WhaleData, WhaleImpact};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub struct WhaleAgent;

#[async_trait]
impl Specialist for WhaleAgent {
    fn name(&self) -> &str {
        "WhaleAgent"
    }

    fn cache_key(&self, input: &Value) -> Option<String> {
        input.get("ticker").and_then(|t| t.as_str()).map(|t| format!("whale:{t}"))
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn analyze(&self, input: Value) -> Result<Value, String> {
        let ticker = input.get("ticker").and_then(|v| v.as_str()).ok_or("missing ticker")?.to_string();
        let buys = input.get("large_buys").and_then(|v| v.as_u64()).unwrap_or(0);
        let sells = input.get("large_sells").and_then(|v| v.as_u64()).unwrap_or(0);
        let notable_transactions = buys + sells;
        if notable_transactions == 0 {
            return Err("not_found: no whale transactions available".to_string());
        }
        let impact = if buys > sells * 2 {
            WhaleImpact::Bullish
        } else if sells > buys * 2 {
            WhaleImpact::Bearish
        } else {
            WhaleImpact::Neutral
        };
        let data = WhaleData {
            ticker: ticker.clone(),
            impact,
            notable_transactions,
            summary: format!("{buys} large buys / {sells} large sells for {ticker}"),
        };
        serde_json::to_value(data).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heavy_selling_yields_bearish_impact() {
        let agent = WhaleAgent;
        let input = serde_json::json!({"ticker": "AAPL", "large_buys": 1, "large_sells": 10});
        let data: WhaleData = serde_json::from_value(agent.analyze(input).await.unwrap()).unwrap();
        assert_eq!(data.impact, WhaleImpact::Bearish);
    }
}
