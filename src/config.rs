// =============================================================================
// Core Configuration — Hot-reloadable orchestrator settings with atomic save
// =============================================================================
//
// Central configuration hub for the orchestration core. Every tunable
// parameter lives here so that the core can be reconfigured without a
// restart.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default = "...")]` so that adding new
// fields never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_routing_model() -> String {
    "router-small".to_string()
}

fn default_reasoning_model() -> String {
    "reasoner-main".to_string()
}

fn default_risk_model() -> String {
    "risk-critic".to_string()
}

fn default_specialist_timeout_ms() -> u64 {
    15_000
}

fn default_forecast_timeout_ms() -> u64 {
    30_000
}

fn default_math_timeout_ms() -> u64 {
    30_000
}

fn default_orchestrator_timeout_ms() -> u64 {
    60_000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_timeout_s() -> u64 {
    30
}

fn default_half_open_max_calls() -> u32 {
    1
}

fn default_cache_ttl_default() -> u64 {
    300
}

fn default_cache_ttl_quant() -> u64 {
    60
}

fn default_cache_ttl_price() -> u64 {
    60
}

fn default_cache_ttl_portfolio() -> u64 {
    3600
}

fn default_position_size_limit_pct() -> f64 {
    5.0
}

fn default_wash_sale_window_days() -> i64 {
    30
}

fn default_ace_turn_penalty() -> f64 {
    0.1
}

fn default_ace_block_factor() -> f64 {
    0.2
}

fn default_ace_flag_factor() -> f64 {
    0.6
}

fn default_ace_resolution_bonus() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

// =============================================================================
// CircuitBreakerSettings
// =============================================================================

/// Tunable parameters for a single named circuit breaker resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_recovery_timeout_s")]
    pub recovery_timeout_s: u64,

    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_s: default_recovery_timeout_s(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

impl CircuitBreakerSettings {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_s)
    }
}

// =============================================================================
// CacheTtlSettings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlSettings {
    #[serde(default = "default_cache_ttl_default")]
    pub default_s: u64,

    #[serde(default = "default_cache_ttl_quant")]
    pub quant_s: u64,

    #[serde(default = "default_cache_ttl_price")]
    pub price_s: u64,

    #[serde(default = "default_cache_ttl_portfolio")]
    pub portfolio_s: u64,
}

impl Default for CacheTtlSettings {
    fn default() -> Self {
        Self {
            default_s: default_cache_ttl_default(),
            quant_s: default_cache_ttl_quant(),
            price_s: default_cache_ttl_price(),
            portfolio_s: default_cache_ttl_portfolio(),
        }
    }
}

// =============================================================================
// RiskSettings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettings {
    /// Position size beyond this percentage of portfolio value is at
    /// minimum Flagged.
    #[serde(default = "default_position_size_limit_pct")]
    pub position_size_limit_pct: f64,

    /// A buy within this many days of a losing sale of the same ticker is
    /// forced Blocked (wash-sale gate).
    #[serde(default = "default_wash_sale_window_days")]
    pub wash_sale_window_days: i64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            position_size_limit_pct: default_position_size_limit_pct(),
            wash_sale_window_days: default_wash_sale_window_days(),
        }
    }
}

// =============================================================================
// AceSettings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AceSettings {
    #[serde(default = "default_ace_turn_penalty")]
    pub turn_penalty: f64,

    #[serde(default = "default_ace_block_factor")]
    pub block_factor: f64,

    #[serde(default = "default_ace_flag_factor")]
    pub flag_factor: f64,

    #[serde(default = "default_ace_resolution_bonus")]
    pub resolution_bonus: f64,
}

impl Default for AceSettings {
    fn default() -> Self {
        Self {
            turn_penalty: default_ace_turn_penalty(),
            block_factor: default_ace_block_factor(),
            flag_factor: default_ace_flag_factor(),
            resolution_bonus: default_ace_resolution_bonus(),
        }
    }
}

// =============================================================================
// CoreConfig
// =============================================================================

/// Top-level runtime configuration for the orchestration core.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialize correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    // --- Model identifiers ---------------------------------------------------
    #[serde(default = "default_routing_model")]
    pub routing_model: String,

    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,

    #[serde(default = "default_risk_model")]
    pub risk_model: String,

    // --- Timeouts -------------------------------------------------------------
    #[serde(default = "default_specialist_timeout_ms")]
    pub specialist_timeout_ms: u64,

    #[serde(default = "default_forecast_timeout_ms")]
    pub forecast_timeout_ms: u64,

    #[serde(default = "default_math_timeout_ms")]
    pub math_timeout_ms: u64,

    #[serde(default = "default_orchestrator_timeout_ms")]
    pub orchestrator_timeout_ms: u64,

    // --- Resilience -------------------------------------------------------------
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    #[serde(default)]
    pub cache_ttl: CacheTtlSettings,

    // --- Risk & ACE -------------------------------------------------------------
    #[serde(default)]
    pub risk: RiskSettings,

    #[serde(default)]
    pub ace: AceSettings,

    // --- Feature flags ----------------------------------------------------------
    /// Whether specialists are enabled at all; a disabled specialist always
    /// returns `{success: false, error: "disabled"}` from the envelope.
    #[serde(default = "default_true")]
    pub specialists_enabled: bool,

    #[serde(default = "default_true")]
    pub enable_alpha_audit: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            routing_model: default_routing_model(),
            reasoning_model: default_reasoning_model(),
            risk_model: default_risk_model(),
            specialist_timeout_ms: default_specialist_timeout_ms(),
            forecast_timeout_ms: default_forecast_timeout_ms(),
            math_timeout_ms: default_math_timeout_ms(),
            orchestrator_timeout_ms: default_orchestrator_timeout_ms(),
            circuit_breaker: CircuitBreakerSettings::default(),
            cache_ttl: CacheTtlSettings::default(),
            risk: RiskSettings::default(),
            ace: AceSettings::default(),
            specialists_enabled: true,
            enable_alpha_audit: true,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read core config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse core config from {}", path.display()))?;

        info!(path = %path.display(), reasoning_model = %config.reasoning_model, "core config loaded");

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialize core config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "core config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.reasoning_model, "reasoner-main");
        assert_eq!(cfg.specialist_timeout_ms, 15_000);
        assert_eq!(cfg.forecast_timeout_ms, 30_000);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 3);
        assert!((cfg.risk.position_size_limit_pct - 5.0).abs() < f64::EPSILON);
        assert_eq!(cfg.risk.wash_sale_window_days, 30);
        assert!((cfg.ace.turn_penalty - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: CoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.routing_model, "router-small");
        assert!(cfg.specialists_enabled);
        assert_eq!(cfg.cache_ttl.quant_s, 60);
    }

    #[test]
    fn deserialize_partial_json_fills_defaults() {
        let json = r#"{ "reasoning_model": "reasoner-xl", "risk": { "wash_sale_window_days": 60 } }"#;
        let cfg: CoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.reasoning_model, "reasoner-xl");
        assert_eq!(cfg.risk.wash_sale_window_days, 60);
        assert!((cfg.risk.position_size_limit_pct - 5.0).abs() < f64::EPSILON);
        assert_eq!(cfg.specialist_timeout_ms, 15_000);
    }

    #[test]
    fn roundtrip_serialization() {
        let cfg = CoreConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.reasoning_model, cfg2.reasoning_model);
        assert_eq!(cfg.circuit_breaker.failure_threshold, cfg2.circuit_breaker.failure_threshold);
    }
}
