//! Portfolio specialist. Snapshot fetch plus an optimistic local-update
//! path used after a (never-executed-by-this-core) trade sentinel is
//! confirmed out-of-band by the caller. See DESIGN.md Open Question 2.

use crate::envelope::Specialist;
use crate::market_context::{Cash, PortfolioData, Position};
use crate::money::{Currency, Money};
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Mutable portfolio state the agent reads and optimistically updates.
/// Owned by the runtime and shared via `Arc`.
pub struct PortfolioStore {
    inner: RwLock<PortfolioData>,
}

impl PortfolioStore {
    pub fn new(initial: PortfolioData) -> Self {
        PortfolioStore { inner: RwLock::new(initial) }
    }

    pub fn snapshot(&self) -> PortfolioData {
        self.inner.read().clone()
    }

    /// Applies an optimistic local update for a trade that has not yet been
    /// confirmed by a broker (this core never places trades itself — see
    /// SPEC_FULL.md section 4.7 step i). Never rolled back automatically;
    /// a caller that later learns the trade was rejected must call this
    /// again with the inverse `quantity_delta`.
    pub fn update_local(&self, ticker: &str, quantity_delta: Decimal, price: Money) {
        let mut data = self.inner.write();
        if let Some(pos) = data.positions.iter_mut().find(|p| p.ticker == ticker) {
            pos.quantity += quantity_delta;
            pos.current_price = price;
        } else if quantity_delta > Decimal::ZERO {
            data.positions.push(Position {
                ticker: ticker.to_string(),
                quantity: quantity_delta,
                avg_price: price,
                current_price: price,
                pnl: Money::zero(price.currency()),
            });
        }
        data.positions.retain(|p| !p.quantity.is_zero());
    }
}

impl Default for PortfolioStore {
    fn default() -> Self {
        PortfolioStore::new(PortfolioData {
            total_value: Money::zero(Currency::Gbp),
            total_invested: Money::zero(Currency::Gbp),
            total_pnl: Money::zero(Currency::Gbp),
            pnl_percent: Decimal::ZERO,
            cash: Cash { total: Money::zero(Currency::Gbp), free: Money::zero(Currency::Gbp) },
            positions: Vec::new(),
            accounts: None,
        })
    }
}

pub struct PortfolioAgent {
    store: Arc<PortfolioStore>,
}

impl PortfolioAgent {
    pub fn new(store: Arc<PortfolioStore>) -> Self {
        PortfolioAgent { store }
    }
}

#[async_trait]
impl Specialist for PortfolioAgent {
    fn name(&self) -> &str {
        "PortfolioAgent"
    }

    fn cache_key(&self, _input: &Value) -> Option<String> {
        Some("current_portfolio".to_string())
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(3600)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn analyze(&self, _input: Value) -> Result<Value, String> {
        let data = self.store.snapshot();
        serde_json::to_value(data).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_round_trips_through_json() {
        let store = Arc::new(PortfolioStore::default());
        let agent = PortfolioAgent::new(store);
        let result = agent.analyze(Value::Null).await.unwrap();
        let data: PortfolioData = serde_json::from_value(result).unwrap();
        assert!(data.positions.is_empty());
    }

    #[test]
    fn optimistic_update_adds_new_position() {
        let store = PortfolioStore::default();
        store.update_local("AAPL", Decimal::from(10), Money::from_str_amount("150", Currency::Usd).unwrap());
        let snap = store.snapshot();
        assert_eq!(snap.positions.len(), 1);
        assert_eq!(snap.positions[0].quantity, Decimal::from(10));
    }

    #[test]
    fn optimistic_update_closes_position_at_zero() {
        let store = PortfolioStore::default();
        let price = Money::from_str_amount("150", Currency::Usd).unwrap();
        store.update_local("AAPL", Decimal::from(10), price);
        store.update_local("AAPL", Decimal::from(-10), price);
        assert!(store.snapshot().positions.is_empty());
    }
}
