//! Forecast specialist. The primary ML forecaster is external
//! (SPEC_FULL.md Non-goals); damped double-exponential (Holt) smoothing is
//! the one algorithm this core actually ships, matching the spec's
//! designation of it as the deterministic fallback path.

use crate::envelope::Specialist;
use crate::market_context::{Bar, ForecastData, Trend};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

const MIN_BARS: usize = 50;
const MAX_HORIZON_STEPS: u32 = 96;

/// Corrects GBP/GBX-style unit mismatches against the series median before
/// forecasting: a bar whose close is more than 50x the median is assumed to
/// be quoted in the smaller unit (divide by 100); a bar less than 1/50th the
/// median is assumed to be quoted in the larger unit (multiply by 100).
/// Ported from `forecasting_agent.py`'s whole-series sanitization step.
fn sanitize_unit_mismatches(bars: &mut [Bar]) {
    if bars.len() <= 10 {
        return;
    }
    let mut closes: Vec<Decimal> = bars.iter().map(|b| b.close).filter(|c| !c.is_zero()).collect();
    if closes.is_empty() {
        return;
    }
    closes.sort();
    let median = closes[closes.len() / 2];
    if median.is_zero() {
        return;
    }

    for bar in bars.iter_mut() {
        if bar.close.is_zero() {
            continue;
        }
        let ratio = bar.close / median;
        let factor = if ratio > Decimal::from(50) {
            Some(Decimal::new(1, 2)) // 0.01
        } else if ratio < Decimal::new(2, 2) {
            Some(Decimal::from(100))
        } else {
            None
        };
        if let Some(factor) = factor {
            bar.open *= factor;
            bar.high *= factor;
            bar.low *= factor;
            bar.close *= factor;
        }
    }
}

/// Damped double-exponential (Holt) smoothing: `level`/`trend` state
/// updated per observation, projected `steps` ahead with a damping factor
/// `phi` so the trend contribution decays rather than extrapolating
/// linearly forever.
fn holt_forecast(closes: &[Decimal], steps: u32) -> Decimal {
    let alpha = Decimal::new(3, 1); // 0.3
    let beta = Decimal::new(1, 1); // 0.1
    let phi = Decimal::new(9, 1); // 0.9 damping

    let mut level = closes[0];
    let mut trend = closes[1] - closes[0];

    for &y in &closes[1..] {
        let prev_level = level;
        level = alpha * y + (Decimal::ONE - alpha) * (prev_level + trend);
        trend = beta * (level - prev_level) + (Decimal::ONE - beta) * trend;
    }

    let mut damp_sum = Decimal::ZERO;
    let mut phi_pow = phi;
    for _ in 0..steps {
        damp_sum += phi_pow;
        phi_pow *= phi;
    }
    level + trend * damp_sum
}

fn trend_of(current: Decimal, forecast: Decimal) -> Trend {
    if current.is_zero() {
        return Trend::Sideways;
    }
    let pct = (forecast - current) / current;
    if pct > Decimal::new(5, 3) {
        Trend::Bullish
    } else if pct < -Decimal::new(5, 3) {
        Trend::Bearish
    } else {
        Trend::Sideways
    }
}

pub struct ForecastingAgent;

#[async_trait]
impl Specialist for ForecastingAgent {
    fn name(&self) -> &str {
        "ForecastingAgent"
    }

    fn cache_key(&self, input: &Value) -> Option<String> {
        input.get("ticker").and_then(|t| t.as_str()).map(|t| format!("forecast:{t}"))
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn analyze(&self, input: Value) -> Result<Value, String> {
        let ticker = input.get("ticker").and_then(|v| v.as_str()).ok_or("missing ticker")?.to_string();
        let mut bars: Vec<Bar> = serde_json::from_value(input.get("ohlcv").cloned().ok_or("missing ohlcv")?)
            .map_err(|e| e.to_string())?;
        if bars.len() < MIN_BARS {
            return Err(format!("validation_error: need >= {MIN_BARS} bars, got {}", bars.len()));
        }
        sanitize_unit_mismatches(&mut bars);
        let requested_days = input.get("days").and_then(|v| v.as_u64()).unwrap_or(1) as u32;
        let days = requested_days.min(MAX_HORIZON_STEPS);

        let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
        let current = *closes.last().unwrap();

        let forecast_24h = holt_forecast(&closes, 1);
        let forecast_48h = if days >= 2 { Some(holt_forecast(&closes, 2)) } else { None };
        let forecast_7d = if days >= 7 { Some(holt_forecast(&closes, 7)) } else { None };

        // Sanity check: a single-step move beyond 30% is treated as an
        // unreliable projection and the fallback flag is raised so the
        // caller knows not to over-trust it.
        let move_pct = if current.is_zero() {
            Decimal::ZERO
        } else {
            ((forecast_24h - current) / current).abs()
        };
        let is_fallback = move_pct > Decimal::new(3, 1);

        let data = ForecastData {
            ticker,
            forecast_24h,
            forecast_48h,
            forecast_7d,
            confidence: if is_fallback { Decimal::new(3, 1) } else { Decimal::new(6, 1) },
            trend: trend_of(current, forecast_24h),
            algorithm: "holt-damped".to_string(),
            is_fallback,
            series: bars,
        };
        serde_json::to_value(data).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bars(n: usize, price: i64) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                timestamp: i as i64 * 86_400_000,
                open: Decimal::from(price),
                high: Decimal::from(price),
                low: Decimal::from(price),
                close: Decimal::from(price),
                volume: Decimal::from(100),
            })
            .collect()
    }

    #[tokio::test]
    async fn rejects_fewer_than_fifty_bars() {
        let agent = ForecastingAgent;
        let input = serde_json::json!({"ticker": "AAPL", "ohlcv": flat_bars(49, 100), "days": 1});
        assert!(agent.analyze(input).await.is_err());
    }

    #[tokio::test]
    async fn unit_mismatched_outlier_bar_is_sanitized_before_forecasting() {
        let agent = ForecastingAgent;
        let mut bars = flat_bars(60, 100);
        bars[30].open = Decimal::from(10_000);
        bars[30].high = Decimal::from(10_000);
        bars[30].low = Decimal::from(10_000);
        bars[30].close = Decimal::from(10_000);
        let input = serde_json::json!({"ticker": "AAPL", "ohlcv": bars, "days": 1});
        let data: ForecastData = serde_json::from_value(agent.analyze(input).await.unwrap()).unwrap();
        assert_eq!(data.series[30].close, Decimal::from(100));
        assert!(!data.is_fallback);
        assert_eq!(data.trend, Trend::Sideways);
    }

    #[tokio::test]
    async fn flat_series_forecasts_near_current_price() {
        let agent = ForecastingAgent;
        let input = serde_json::json!({"ticker": "AAPL", "ohlcv": flat_bars(60, 100), "days": 1});
        let data: ForecastData = serde_json::from_value(agent.analyze(input).await.unwrap()).unwrap();
        assert!(!data.is_fallback);
        assert_eq!(data.trend, Trend::Sideways);
    }

    #[tokio::test]
    async fn horizon_clamped_to_96() {
        let agent = ForecastingAgent;
        let input = serde_json::json!({"ticker": "AAPL", "ohlcv": flat_bars(60, 100), "days": 500});
        // clamp happens internally; the call must still succeed
        assert!(agent.analyze(input).await.is_ok());
    }
}
