//! Research specialist. News-sentiment aggregation itself is an external
//! provider concern; this leaf accepts pre-fetched articles from the
//! fabricator and derives a sentiment label deterministically.

use crate::envelope::Specialist;
use crate::market_context::{Article, ResearchData, SentimentLabel};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

pub struct ResearchAgent;

fn label_for(score: Decimal) -> SentimentLabel {
    if score > Decimal::new(15, 2) {
        SentimentLabel::Bullish
    } else if score < -Decimal::new(15, 2) {
        SentimentLabel::Bearish
    } else {
        SentimentLabel::Neutral
    }
}

#[async_trait]
impl Specialist for ResearchAgent {
    fn name(&self) -> &str {
        "ResearchAgent"
    }

    fn cache_key(&self, input: &Value) -> Option<String> {
        input.get("ticker").and_then(|t| t.as_str()).map(|t| format!("research:{t}"))
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn analyze(&self, input: Value) -> Result<Value, String> {
        let ticker = input.get("ticker").and_then(|v| v.as_str()).ok_or("missing ticker")?.to_string();
        let articles: Vec<Article> = input
            .get("articles")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e: serde_json::Error| e.to_string())?
            .unwrap_or_default();

        if articles.is_empty() {
            return Err("not_found: no articles available".to_string());
        }

        let total: Decimal = articles.iter().map(|a| a.sentiment).sum();
        let sentiment_score = total / Decimal::from(articles.len() as u64);

        let data = ResearchData { ticker, sentiment_score, sentiment_label: label_for(sentiment_score), articles };
        serde_json::to_value(data).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bullish_average_yields_bullish_label() {
        let agent = ResearchAgent;
        let input = serde_json::json!({
            "ticker": "AAPL",
            "articles": [
                {"title": "a", "source": "s", "url": null, "sentiment": "0.5"},
                {"title": "b", "source": "s", "url": null, "sentiment": "0.4"}
            ]
        });
        let data: ResearchData = serde_json::from_value(agent.analyze(input).await.unwrap()).unwrap();
        assert_eq!(data.sentiment_label, SentimentLabel::Bullish);
    }

    #[tokio::test]
    async fn no_articles_is_not_found() {
        let agent = ResearchAgent;
        let input = serde_json::json!({"ticker": "AAPL", "articles": []});
        assert!(agent.analyze(input).await.is_err());
    }
}
