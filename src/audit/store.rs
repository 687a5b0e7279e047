//! In-process alpha-audit store: three tables (`ohlcv_history`,
//! `agent_telemetry`, `agent_performance`) plus the post-hoc forward-return
//! attribution job and the `get_agent_alpha_metrics` read path. Grounded on
//! spec section 4.9; the `AuditSink` trait is the seam a real OLAP-backed
//! store would sit behind.

use crate::bus::MessageHandler;
use crate::market_context::AgentMessage;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcvRow {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRow {
    pub correlation_id: String,
    pub agent_name: String,
    pub subject: String,
    pub payload_json: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub correlation_id: String,
    pub ticker: String,
    pub entry_price: Decimal,
    pub return_1d: Option<Decimal>,
    pub return_5d: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpecialistAlpha {
    pub avg_1d: Decimal,
    pub avg_5d: Decimal,
    pub total_sessions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlphaMetrics {
    pub avg_1d: Decimal,
    pub avg_5d: Decimal,
    pub total_sessions: u64,
    pub specialists: HashMap<String, SpecialistAlpha>,
}

/// Seam a real OLAP-backed implementation can sit behind; `AlphaAuditStore`
/// is the in-process reference implementation used by this core's tests and
/// demo binary.
pub trait AuditSink: Send + Sync {
    fn record_ohlcv(&self, row: OhlcvRow);
    fn record_telemetry(&self, row: TelemetryRow);
    fn record_context_fabricated(&self, correlation_id: &str, ticker: &str, at: DateTime<Utc>);
    fn run_attribution_job(&self, correlation_id: &str);
    fn get_agent_alpha_metrics(&self, ticker: Option<&str>) -> AlphaMetrics;
}

struct Inner {
    ohlcv: Vec<OhlcvRow>,
    telemetry: Vec<TelemetryRow>,
    performance: HashMap<String, PerformanceRow>,
    context_fabricated: HashMap<String, (String, DateTime<Utc>)>,
}

pub struct AlphaAuditStore {
    inner: RwLock<Inner>,
}

impl Default for AlphaAuditStore {
    fn default() -> Self {
        AlphaAuditStore {
            inner: RwLock::new(Inner {
                ohlcv: Vec::new(),
                telemetry: Vec::new(),
                performance: HashMap::new(),
                context_fabricated: HashMap::new(),
            }),
        }
    }
}

impl AlphaAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn latest_close_at_or_before(ohlcv: &[OhlcvRow], ticker: &str, t: DateTime<Utc>) -> Option<Decimal> {
        ohlcv
            .iter()
            .filter(|r| r.ticker == ticker && r.timestamp <= t)
            .max_by_key(|r| r.timestamp)
            .map(|r| r.close)
    }

    fn first_close_at_or_after(ohlcv: &[OhlcvRow], ticker: &str, t: DateTime<Utc>) -> Option<Decimal> {
        ohlcv
            .iter()
            .filter(|r| r.ticker == ticker && r.timestamp >= t)
            .min_by_key(|r| r.timestamp)
            .map(|r| r.close)
    }
}

impl AuditSink for AlphaAuditStore {
    fn record_ohlcv(&self, row: OhlcvRow) {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.ohlcv.iter_mut().find(|r| r.ticker == row.ticker && r.timestamp == row.timestamp) {
            *existing = row;
        } else {
            inner.ohlcv.push(row);
        }
    }

    fn record_telemetry(&self, row: TelemetryRow) {
        self.inner.write().telemetry.push(row);
    }

    fn record_context_fabricated(&self, correlation_id: &str, ticker: &str, at: DateTime<Utc>) {
        self.inner.write().context_fabricated.insert(correlation_id.to_string(), (ticker.to_string(), at));
    }

    /// Reads the `context_fabricated` event for `correlation_id` to learn
    /// the ticker and `t0`, then computes 1-day/5-day forward returns from
    /// `ohlcv_history` and upserts into `agent_performance`.
    fn run_attribution_job(&self, correlation_id: &str) {
        let mut inner = self.inner.write();
        let Some((ticker, t0)) = inner.context_fabricated.get(correlation_id).cloned() else {
            return;
        };
        let Some(entry_price) = Self::latest_close_at_or_before(&inner.ohlcv, &ticker, t0) else {
            return;
        };
        let p1 = Self::first_close_at_or_after(&inner.ohlcv, &ticker, t0 + Duration::days(1));
        let p5 = Self::first_close_at_or_after(&inner.ohlcv, &ticker, t0 + Duration::days(5));

        let return_1d = p1.filter(|_| !entry_price.is_zero()).map(|p| (p - entry_price) / entry_price);
        let return_5d = p5.filter(|_| !entry_price.is_zero()).map(|p| (p - entry_price) / entry_price);

        inner.performance.insert(
            correlation_id.to_string(),
            PerformanceRow { correlation_id: correlation_id.to_string(), ticker, entry_price, return_1d, return_5d, timestamp: t0 },
        );
    }

    fn get_agent_alpha_metrics(&self, ticker: Option<&str>) -> AlphaMetrics {
        let inner = self.inner.read();
        let relevant: Vec<&PerformanceRow> =
            inner.performance.values().filter(|p| ticker.map(|t| t == p.ticker).unwrap_or(true)).collect();

        if relevant.is_empty() {
            return AlphaMetrics::default();
        }

        let n = Decimal::from(relevant.len() as u64);
        let sum_1d: Decimal = relevant.iter().filter_map(|p| p.return_1d).sum();
        let sum_5d: Decimal = relevant.iter().filter_map(|p| p.return_5d).sum();

        let mut specialists: HashMap<String, (Decimal, Decimal, u64)> = HashMap::new();
        for row in &relevant {
            let agent_names: Vec<String> = inner
                .telemetry
                .iter()
                .filter(|t| {
                    t.correlation_id == row.correlation_id && t.subject == "agent_complete" && t.agent_name != "OrchestratorAgent"
                })
                .map(|t| t.agent_name.clone())
                .collect();
            for name in agent_names {
                let entry = specialists.entry(name).or_insert((Decimal::ZERO, Decimal::ZERO, 0));
                entry.0 += row.return_1d.unwrap_or(Decimal::ZERO);
                entry.1 += row.return_5d.unwrap_or(Decimal::ZERO);
                entry.2 += 1;
            }
        }

        let specialist_metrics = specialists
            .into_iter()
            .map(|(name, (sum1, sum5, count))| {
                let n = Decimal::from(count);
                (
                    name,
                    SpecialistAlpha {
                        avg_1d: if n.is_zero() { Decimal::ZERO } else { sum1 / n },
                        avg_5d: if n.is_zero() { Decimal::ZERO } else { sum5 / n },
                        total_sessions: count,
                    },
                )
            })
            .collect();

        AlphaMetrics {
            avg_1d: sum_1d / n,
            avg_5d: sum_5d / n,
            total_sessions: relevant.len() as u64,
            specialists: specialist_metrics,
        }
    }
}

/// Bridges bus traffic into the store: registered on the message bus under
/// a fixed name so every `agent_complete` broadcast is recorded as an
/// `agent_telemetry` row, the way `get_agent_alpha_metrics` expects to find
/// it without the orchestrator calling `record_telemetry` directly.
pub struct AlphaAuditBusHandler {
    store: Arc<AlphaAuditStore>,
}

impl AlphaAuditBusHandler {
    pub fn new(store: Arc<AlphaAuditStore>) -> Self {
        AlphaAuditBusHandler { store }
    }
}

#[async_trait]
impl MessageHandler for AlphaAuditBusHandler {
    async fn handle(&self, message: AgentMessage) {
        if message.subject != "agent_complete" {
            return;
        }
        let Some(correlation_id) = message.correlation_id.clone() else { return };
        self.store.record_telemetry(TelemetryRow {
            correlation_id,
            agent_name: message.sender,
            subject: message.subject,
            payload_json: message.payload,
            timestamp: message.timestamp,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ticker: &str, days_from_epoch: i64, close: i64) -> OhlcvRow {
        OhlcvRow {
            ticker: ticker.to_string(),
            timestamp: DateTime::<Utc>::from_timestamp(days_from_epoch * 86_400, 0).unwrap(),
            open: Decimal::from(close),
            high: Decimal::from(close),
            low: Decimal::from(close),
            close: Decimal::from(close),
            volume: Decimal::from(1000),
        }
    }

    #[test]
    fn forward_return_attribution_matches_worked_example() {
        let store = AlphaAuditStore::new();
        let t0 = DateTime::<Utc>::from_timestamp(100 * 86_400, 0).unwrap();
        store.record_ohlcv(row("AAPL", 100, 150));
        store.record_ohlcv(row("AAPL", 101, 160));
        store.record_ohlcv(row("AAPL", 105, 180));
        store.record_context_fabricated("c1", "AAPL", t0);
        store.record_telemetry(TelemetryRow {
            correlation_id: "c1".to_string(),
            agent_name: "QuantAgent".to_string(),
            subject: "agent_complete".to_string(),
            payload_json: serde_json::json!({}),
            timestamp: t0,
        });

        store.run_attribution_job("c1");

        let metrics = store.get_agent_alpha_metrics(Some("AAPL"));
        assert_eq!(metrics.total_sessions, 1);
        let r1 = metrics.avg_1d;
        let expected_1d = (Decimal::from(160) - Decimal::from(150)) / Decimal::from(150);
        assert_eq!(r1, expected_1d);
        let expected_5d = (Decimal::from(180) - Decimal::from(150)) / Decimal::from(150);
        assert_eq!(metrics.avg_5d, expected_5d);
        assert_eq!(metrics.specialists.get("QuantAgent").unwrap().total_sessions, 1);
    }

    #[test]
    fn missing_context_is_a_no_op() {
        let store = AlphaAuditStore::new();
        store.run_attribution_job("unknown");
        assert_eq!(store.get_agent_alpha_metrics(None).total_sessions, 0);
    }

    #[test]
    fn metrics_without_ticker_filter_aggregate_everything() {
        let store = AlphaAuditStore::new();
        store.record_ohlcv(row("AAPL", 100, 100));
        store.record_ohlcv(row("AAPL", 101, 110));
        store.record_context_fabricated("c1", "AAPL", DateTime::<Utc>::from_timestamp(100 * 86_400, 0).unwrap());
        store.run_attribution_job("c1");
        assert_eq!(store.get_agent_alpha_metrics(None).total_sessions, 1);
    }
}
