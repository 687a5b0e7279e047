//! Data fabricator: builds a `MarketContext` from raw provider IO before
//! specialist analyses run. See SPEC_FULL.md section 4.6. Concrete
//! providers are out of scope; this module defines the provider trait and
//! the concurrent fan-out/reconciliation logic, with deterministic mock
//! providers for tests.

use crate::currency::reconcile_price_units;
use crate::market_context::{Article, Bar, IntentType, MarketContext, PriceData};
use crate::money::{Currency, Money};
use crate::resilience::{CircuitBreakerConfig, FallbackChain, ProviderSlot};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_price(&self, ticker: &str) -> Result<Option<(Decimal, Currency)>, String>;
}

#[async_trait]
pub trait BarsProvider: Send + Sync {
    async fn fetch_bars(&self, ticker: &str, count: usize) -> Result<Option<Vec<Bar>>, String>;
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn fetch_articles(&self, ticker: &str) -> Result<Option<Vec<Article>>, String>;
}

/// Named, breaker-protected provider entries plus the chains built from
/// them. Owned by the runtime and reused across requests so breaker state
/// persists between calls.
pub struct Fabricator {
    price_providers: Vec<(String, Arc<dyn PriceProvider>)>,
    price_chain: FallbackChain,
    bars_providers: Vec<(String, Arc<dyn BarsProvider>)>,
    bars_chain: FallbackChain,
    news_providers: Vec<(String, Arc<dyn NewsProvider>)>,
    news_chain: FallbackChain,
}

impl Fabricator {
    pub fn new(
        price_providers: Vec<(String, Arc<dyn PriceProvider>)>,
        bars_providers: Vec<(String, Arc<dyn BarsProvider>)>,
        news_providers: Vec<(String, Arc<dyn NewsProvider>)>,
    ) -> Self {
        let price_chain = FallbackChain::new(
            "price",
            price_providers.iter().map(|(name, _)| ProviderSlot::new(name.clone(), CircuitBreakerConfig::default())).collect(),
        );
        let bars_chain = FallbackChain::new(
            "bars",
            bars_providers.iter().map(|(name, _)| ProviderSlot::new(name.clone(), CircuitBreakerConfig::default())).collect(),
        );
        let news_chain = FallbackChain::new(
            "news",
            news_providers.iter().map(|(name, _)| ProviderSlot::new(name.clone(), CircuitBreakerConfig::default())).collect(),
        );
        Fabricator {
            price_providers,
            price_chain,
            bars_providers,
            bars_chain,
            news_providers,
            news_chain,
        }
    }

    fn price_by_name(&self, name: &str) -> Option<&Arc<dyn PriceProvider>> {
        self.price_providers.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    fn bars_by_name(&self, name: &str) -> Option<&Arc<dyn BarsProvider>> {
        self.bars_providers.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    fn news_by_name(&self, name: &str) -> Option<&Arc<dyn NewsProvider>> {
        self.news_providers.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    /// Builds a `MarketContext` for `intent`/`ticker` by launching the raw
    /// IO the intent requires, concurrently, then reconciling price/bar
    /// units. Specialist analyses are NOT run here (SPEC_FULL.md 4.6 step 2
    /// — that happens later in the orchestrator's swarm stage).
    pub async fn fabricate(&self, intent_type: IntentType, ticker: Option<&str>) -> MarketContext {
        let start = Instant::now();
        let mut ctx = MarketContext::new();
        ctx.ticker = ticker.map(String::from);

        let needs_price = matches!(
            intent_type,
            IntentType::PriceCheck | IntentType::MarketAnalysis | IntentType::ForecastRequest
        );
        let needs_news = matches!(intent_type, IntentType::MarketAnalysis);

        let ticker_owned = ticker.map(String::from);

        let price_fut = async {
            if !needs_price {
                return None;
            }
            let Some(ticker) = ticker_owned.clone() else { return None };
            self.price_chain
                .execute(|name| {
                    let ticker = ticker.clone();
                    let name = name.to_string();
                    async move {
                        match self.price_by_name(&name) {
                            Some(p) => p.fetch_price(&ticker).await,
                            None => Ok(None),
                        }
                    }
                })
                .await
        };

        let bars_fut = async {
            if !needs_price {
                return None;
            }
            let Some(ticker) = ticker_owned.clone() else { return None };
            self.bars_chain
                .execute(|name| {
                    let ticker = ticker.clone();
                    let name = name.to_string();
                    async move {
                        match self.bars_by_name(&name) {
                            Some(p) => p.fetch_bars(&ticker, 500).await,
                            None => Ok(None),
                        }
                    }
                })
                .await
        };

        let news_fut = async {
            if !needs_news {
                return None;
            }
            let Some(ticker) = ticker_owned.clone() else { return None };
            self.news_chain
                .execute(|name| {
                    let ticker = ticker.clone();
                    let name = name.to_string();
                    async move {
                        match self.news_by_name(&name) {
                            Some(p) => p.fetch_articles(&ticker).await,
                            None => Ok(None),
                        }
                    }
                })
                .await
        };

        let (price_result, bars_result, news_result) = tokio::join!(price_fut, bars_fut, news_fut);

        let mut series = Vec::new();
        if let Some((_source, bars)) = &bars_result {
            series = bars.clone();
        }

        if let Some((source, (price, currency))) = price_result {
            let mut adjusted_price = price;
            if !series.is_empty() {
                let mut closes: Vec<Decimal> = series.iter().map(|b| b.close).collect();
                closes.sort();
                let median = closes[closes.len() / 2];
                let (corrected, changed) = reconcile_price_units(price, median);
                if changed {
                    warn!(ticker = ?ticker_owned, "fabricator: corrected pence/pounds unit mismatch");
                }
                adjusted_price = corrected;
            }
            ctx.price = Some(PriceData {
                ticker: ticker_owned.clone().unwrap_or_default(),
                current_price: Money::new(adjusted_price, currency),
                source,
                series: series.clone(),
            });
        }

        if let Some(articles) = news_result.map(|(_, a)| a) {
            ctx.user_context.insert(
                "fetched_articles".to_string(),
                serde_json::to_value(articles).unwrap_or(serde_json::Value::Null),
            );
        }

        ctx.total_latency_ms = start.elapsed().as_millis() as u64;
        ctx
    }
}
