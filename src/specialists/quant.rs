//! Deterministic reference quant specialist. The production indicator math
//! is out of scope (SPEC_FULL.md section 1 Non-goals); this ships a minimal
//! RSI-14 / MACD(12,26,9) / Bollinger implementation so the envelope and
//! orchestrator paths are exercisable end-to-end. Shape mirrors the
//! upstream quant engine's "composite signal from weighted indicator
//! rules" design, not its tuning.

use crate::envelope::Specialist;
use crate::market_context::{Bar, BollingerBands, MacdValue, QuantData, QuantSignal};
use async_trait::async_trait;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

const MIN_BARS: usize = 50;

fn ema(series: &[Decimal], period: usize) -> Vec<Decimal> {
    let k = Decimal::from(2) / Decimal::from(period as u64 + 1);
    let mut out = Vec::with_capacity(series.len());
    let mut prev = series[0];
    out.push(prev);
    for &v in &series[1..] {
        prev = v * k + prev * (Decimal::ONE - k);
        out.push(prev);
    }
    out
}

fn rsi_14(closes: &[Decimal]) -> Decimal {
    let period = 14usize;
    if closes.len() <= period {
        return Decimal::from(50);
    }
    let mut gains = Decimal::ZERO;
    let mut losses = Decimal::ZERO;
    for w in closes.windows(2).take(period) {
        let delta = w[1] - w[0];
        if delta > Decimal::ZERO {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / Decimal::from(period as u64);
    let mut avg_loss = losses / Decimal::from(period as u64);
    for w in closes.windows(2).skip(period) {
        let delta = w[1] - w[0];
        let (gain, loss) = if delta > Decimal::ZERO { (delta, Decimal::ZERO) } else { (Decimal::ZERO, -delta) };
        avg_gain = (avg_gain * Decimal::from(period as u64 - 1) + gain) / Decimal::from(period as u64);
        avg_loss = (avg_loss * Decimal::from(period as u64 - 1) + loss) / Decimal::from(period as u64);
    }
    if avg_loss.is_zero() {
        return Decimal::from(100);
    }
    let rs = avg_gain / avg_loss;
    Decimal::from(100) - (Decimal::from(100) / (Decimal::ONE + rs))
}

fn macd(closes: &[Decimal]) -> MacdValue {
    let ema12 = ema(closes, 12);
    let ema26 = ema(closes, 26);
    let macd_line: Vec<Decimal> = ema12.iter().zip(ema26.iter()).map(|(a, b)| a - b).collect();
    let signal_line = ema(&macd_line, 9);
    let value = *macd_line.last().unwrap();
    let signal = *signal_line.last().unwrap();
    MacdValue { value, signal, hist: value - signal }
}

fn bollinger(closes: &[Decimal], period: usize) -> BollingerBands {
    let window = &closes[closes.len().saturating_sub(period)..];
    let n = Decimal::from(window.len() as u64);
    let mean = window.iter().sum::<Decimal>() / n;
    let variance = window.iter().map(|v| (*v - mean) * (*v - mean)).sum::<Decimal>() / n;
    let std_dev = variance.sqrt().unwrap_or(Decimal::ZERO);
    BollingerBands {
        upper: mean + std_dev * Decimal::from(2),
        middle: mean,
        lower: mean - std_dev * Decimal::from(2),
    }
}

fn derive_signal(rsi: Decimal, macd: &MacdValue, price: Decimal, bbands: &BollingerBands) -> QuantSignal {
    let mut score = 0i32;
    if rsi < Decimal::from(30) {
        score += 1;
    } else if rsi > Decimal::from(70) {
        score -= 1;
    }
    if macd.hist > Decimal::ZERO {
        score += 1;
    } else if macd.hist < Decimal::ZERO {
        score -= 1;
    }
    if price < bbands.lower {
        score += 1;
    } else if price > bbands.upper {
        score -= 1;
    }
    match score {
        s if s >= 2 => QuantSignal::Buy,
        s if s <= -2 => QuantSignal::Sell,
        0 => QuantSignal::Neutral,
        _ => QuantSignal::Hold,
    }
}

pub struct QuantAgent;

#[async_trait]
impl Specialist for QuantAgent {
    fn name(&self) -> &str {
        "QuantAgent"
    }

    fn cache_key(&self, input: &Value) -> Option<String> {
        input.get("ticker").and_then(|t| t.as_str()).map(|t| format!("quant:{t}"))
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn analyze(&self, input: Value) -> Result<Value, String> {
        let ticker = input.get("ticker").and_then(|v| v.as_str()).ok_or("missing ticker")?.to_string();
        let bars: Vec<Bar> = serde_json::from_value(
            input.get("ohlcv").cloned().ok_or("missing ohlcv")?,
        )
        .map_err(|e| e.to_string())?;

        if bars.len() < MIN_BARS {
            return Err(format!("validation_error: need >= {MIN_BARS} bars, got {}", bars.len()));
        }

        let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
        let rsi = rsi_14(&closes);
        let macd_value = macd(&closes);
        let bbands = bollinger(&closes, 20);
        let price = *closes.last().unwrap();

        let window = &closes[closes.len().saturating_sub(20)..];
        let support = window.iter().cloned().reduce(Decimal::min);
        let resistance = window.iter().cloned().reduce(Decimal::max);

        let signal = derive_signal(rsi, &macd_value, price, &bbands);

        let data = QuantData { ticker, rsi, macd: macd_value, bbands, signal, support, resistance };
        serde_json::to_value(data).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_bars(n: usize, start: i64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let close = Decimal::from(start) + Decimal::from(i as i64 % 5) - Decimal::from(2);
                Bar {
                    timestamp: i as i64 * 86_400_000,
                    open: close,
                    high: close + Decimal::ONE,
                    low: close - Decimal::ONE,
                    close,
                    volume: Decimal::from(1000),
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn rejects_fewer_than_fifty_bars() {
        let agent = QuantAgent;
        let input = serde_json::json!({"ticker": "AAPL", "ohlcv": synthetic_bars(49, 100)});
        let result = agent.analyze(input).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accepts_fifty_bars() {
        let agent = QuantAgent;
        let input = serde_json::json!({"ticker": "AAPL", "ohlcv": synthetic_bars(50, 100)});
        let result = agent.analyze(input).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn support_never_exceeds_resistance() {
        let agent = QuantAgent;
        let input = serde_json::json!({"ticker": "AAPL", "ohlcv": synthetic_bars(60, 100)});
        let data: QuantData = serde_json::from_value(agent.analyze(input).await.unwrap()).unwrap();
        if let (Some(s), Some(r)) = (data.support, data.resistance) {
            assert!(s <= r);
        }
    }
}
