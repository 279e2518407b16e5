// =============================================================================
// Runtime Configuration — Hot-reloadable engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the mycelial engine. Every tunable parameter
// lives here so that the engine can be reconfigured at runtime without a
// restart.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default = "...")]` so that adding new
// fields never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{AccountMode, TradingMode};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "XXBTZUSD".to_string(),
        "XETHZUSD".to_string(),
        "SOLUSD".to_string(),
    ]
}

fn default_max_drawdown_pct() -> f64 {
    0.05
}

fn default_policy_contagion_threshold() -> f64 {
    0.80
}

fn default_archive_interval() -> u64 {
    300
}

fn default_archive_value_threshold() -> f64 {
    40.0
}

fn default_collision_window_secs() -> f64 {
    5.0
}

fn default_signal_cooldown_secs() -> f64 {
    10.0
}

fn default_max_active_assets() -> usize {
    15
}

fn default_deployment_cooldown_secs() -> f64 {
    3600.0
}

fn default_prospector_scan_interval() -> u64 {
    60
}

fn default_pattern_history_window() -> usize {
    100
}

fn default_trading_fee_pct() -> f64 {
    0.26
}

fn default_slippage_pct() -> f64 {
    0.10
}

fn default_probation_tier1_pct() -> f64 {
    -5.0
}

fn default_probation_tier2_pct() -> f64 {
    -10.0
}

fn default_hibernation_threshold_pct() -> f64 {
    -15.0
}

fn default_hibernation_days() -> f64 {
    90.0
}

fn default_initial_portfolio_value() -> f64 {
    10_000.0
}

fn default_tick_period_secs() -> f64 {
    1.0
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the mycelial engine.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Operational modes ---------------------------------------------------
    #[serde(default)]
    pub trading_mode: TradingMode,
    #[serde(default)]
    pub account_mode: AccountMode,

    // --- Symbols & asset registry --------------------------------------------
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_max_active_assets")]
    pub max_active_assets: usize,

    // --- Risk ----------------------------------------------------------------
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    #[serde(default = "default_initial_portfolio_value")]
    pub initial_portfolio_value: f64,

    // --- Scheduler / archiver --------------------------------------------------
    #[serde(default = "default_tick_period_secs")]
    pub tick_period_secs: f64,
    #[serde(default = "default_archive_interval")]
    pub archive_interval: u64,
    #[serde(default = "default_archive_value_threshold")]
    pub archive_value_threshold: f64,
    #[serde(default = "default_policy_contagion_threshold")]
    pub policy_contagion_threshold: f64,

    // --- Signal collision / trading costs --------------------------------------
    #[serde(default = "default_collision_window_secs")]
    pub collision_window_secs: f64,
    #[serde(default = "default_signal_cooldown_secs")]
    pub signal_cooldown_secs: f64,
    #[serde(default = "default_trading_fee_pct")]
    pub trading_fee_pct: f64,
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: f64,

    // --- P&L tracker / probation / hibernation ---------------------------------
    #[serde(default = "default_probation_tier1_pct")]
    pub probation_tier1_pct: f64,
    #[serde(default = "default_probation_tier2_pct")]
    pub probation_tier2_pct: f64,
    #[serde(default = "default_hibernation_threshold_pct")]
    pub hibernation_threshold_pct: f64,
    #[serde(default = "default_hibernation_days")]
    pub hibernation_days: f64,

    // --- Prospector / builder ---------------------------------------------------
    #[serde(default = "default_prospector_scan_interval")]
    pub prospector_scan_interval: u64,
    #[serde(default = "default_deployment_cooldown_secs")]
    pub deployment_cooldown_secs: f64,
    #[serde(default = "default_pattern_history_window")]
    pub pattern_history_window: usize,
}

impl RuntimeConfig {
    /// Round-trip trading cost: `2 * (fee_pct + slippage_pct)`.
    pub fn round_trip_cost_pct(&self) -> f64 {
        2.0 * (self.trading_fee_pct + self.slippage_pct)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paused,
            account_mode: AccountMode::Demo,
            symbols: default_symbols(),
            max_active_assets: default_max_active_assets(),
            max_drawdown_pct: default_max_drawdown_pct(),
            initial_portfolio_value: default_initial_portfolio_value(),
            tick_period_secs: default_tick_period_secs(),
            archive_interval: default_archive_interval(),
            archive_value_threshold: default_archive_value_threshold(),
            policy_contagion_threshold: default_policy_contagion_threshold(),
            collision_window_secs: default_collision_window_secs(),
            signal_cooldown_secs: default_signal_cooldown_secs(),
            trading_fee_pct: default_trading_fee_pct(),
            slippage_pct: default_slippage_pct(),
            probation_tier1_pct: default_probation_tier1_pct(),
            probation_tier2_pct: default_probation_tier2_pct(),
            hibernation_threshold_pct: default_hibernation_threshold_pct(),
            hibernation_days: default_hibernation_days(),
            prospector_scan_interval: default_prospector_scan_interval(),
            deployment_cooldown_secs: default_deployment_cooldown_secs(),
            pattern_history_window: default_pattern_history_window(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            trading_mode = %config.trading_mode,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    ///
    /// This prevents corruption if the process crashes mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
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
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.account_mode, AccountMode::Demo);
        assert_eq!(cfg.max_active_assets, 15);
        assert!((cfg.max_drawdown_pct - 0.05).abs() < f64::EPSILON);
        assert!((cfg.round_trip_cost_pct() - 0.72).abs() < 1e-9);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.prospector_scan_interval, 60);
        assert_eq!(cfg.pattern_history_window, 100);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "trading_mode": "Live", "symbols": ["ETHUSD"] }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert_eq!(cfg.symbols, vec!["ETHUSD"]);
        assert_eq!(cfg.archive_interval, 300);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.max_active_assets, cfg2.max_active_assets);
        assert_eq!(cfg.trading_mode, cfg2.trading_mode);
    }

    #[test]
    fn save_then_load_atomic_roundtrip() {
        let dir = std::env::temp_dir().join(format!("mycelial-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runtime_config.json");

        let cfg = RuntimeConfig::default();
        cfg.save(&path).unwrap();
        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.symbols, cfg.symbols);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
