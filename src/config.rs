//! Run configuration.
//!
//! Everything a backtest needs is carried in one explicit [`RunConfig`]
//! passed to the engine per run: strategies, correlation groups, the VIX
//! buying-power table, capital, commission, and the data seed. No
//! process-wide state survives between runs.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::StrategyDefinition;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Invalid(String),

    #[error("failed to read config file: {0}")]
    Io(String),
}

/// One bucket of the VIX -> max buying power table.
///
/// `upper_vix` is exclusive; a level equal to the bound resolves to the next
/// bucket up. `None` marks the unbounded top bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VixBpTableEntry {
    pub upper_vix: Option<f64>,
    pub bp_pct: f64,
}

/// The observed production table, defensive dip included: the 25-30 band
/// deliberately drops to 50% before the puts-only regime at 30+ raises the
/// cap to 80%.
pub fn default_vix_bp_table() -> Vec<VixBpTableEntry> {
    vec![
        VixBpTableEntry { upper_vix: Some(13.0), bp_pct: 45.0 },
        VixBpTableEntry { upper_vix: Some(18.0), bp_pct: 65.0 },
        VixBpTableEntry { upper_vix: Some(25.0), bp_pct: 75.0 },
        VixBpTableEntry { upper_vix: Some(30.0), bp_pct: 50.0 },
        VixBpTableEntry { upper_vix: None, bp_pct: 80.0 },
    ]
}

fn default_correlation_groups() -> HashMap<String, usize> {
    HashMap::from([
        ("EQUITIES".to_string(), 3),
        ("METALS".to_string(), 2),
        ("ENERGY".to_string(), 2),
        ("BONDS".to_string(), 2),
        ("CURRENCIES".to_string(), 2),
    ])
}

/// Thresholds for the independent emergency triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyThresholds {
    /// Account drawdown from peak that triggers an emergency (percent).
    pub max_drawdown_pct: f64,
    /// Single-day loss that triggers an emergency (percent).
    pub max_daily_loss_pct: f64,
    /// Volatility-index level that triggers an emergency.
    pub vix_spike_level: f64,
    /// Margin utilization that triggers an emergency (percent).
    pub max_margin_utilization_pct: f64,
}

impl Default for EmergencyThresholds {
    fn default() -> Self {
        Self {
            max_drawdown_pct: 20.0,
            max_daily_loss_pct: 5.0,
            vix_spike_level: 35.0,
            max_margin_utilization_pct: 95.0,
        }
    }
}

/// Complete configuration for one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Starting capital.
    pub initial_capital: Decimal,

    /// Flat commission/slippage deduction per closed trade.
    pub commission_per_trade: Decimal,

    /// Contract multiplier (100 for standard equity options).
    pub contract_multiplier: u32,

    /// Risk-free rate for theoretical pricing.
    pub risk_free_rate: f64,

    /// RNG seed for synthetic data; part of the config so runs reproduce.
    pub seed: u64,

    /// Cap applied to correlation groups absent from the map.
    #[serde(default = "default_group_cap")]
    pub default_group_cap: usize,

    /// VIX -> max buying power table.
    #[serde(default = "default_vix_bp_table")]
    pub vix_bp_table: Vec<VixBpTableEntry>,

    /// Correlation group name -> max concurrent open positions.
    #[serde(default = "default_correlation_groups")]
    pub correlation_groups: HashMap<String, usize>,

    /// Emergency-trigger thresholds.
    #[serde(default)]
    pub emergency: EmergencyThresholds,

    /// Strategies to run, evaluated in listed order.
    pub strategies: Vec<StrategyDefinition>,
}

fn default_group_cap() -> usize {
    2
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(100_000),
            commission_per_trade: dec!(2.50),
            contract_multiplier: 100,
            risk_free_rate: 0.05,
            seed: 42,
            vix_bp_table: default_vix_bp_table(),
            correlation_groups: default_correlation_groups(),
            default_group_cap: default_group_cap(),
            emergency: EmergencyThresholds::default(),
            strategies: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Load and validate a TOML config file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.as_ref().display())))?;
        let config: Self =
            toml::from_str(&text).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole configuration. A run never starts from an invalid
    /// config; this is where incomplete strategies and malformed tables are
    /// caught.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "initial capital {} must be positive",
                self.initial_capital
            )));
        }
        if self.commission_per_trade < Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "commission {} must be non-negative",
                self.commission_per_trade
            )));
        }
        if self.contract_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "contract multiplier must be positive".to_string(),
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "risk-free rate {} is not finite",
                self.risk_free_rate
            )));
        }

        self.validate_bp_table()?;

        if self.strategies.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one strategy is required".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for strategy in &self.strategies {
            strategy.validate()?;
            if !seen.insert(strategy.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate strategy name '{}'",
                    strategy.name
                )));
            }
            if !self.correlation_groups.contains_key(&strategy.correlation_group) {
                return Err(ConfigError::Invalid(format!(
                    "strategy '{}' references unknown correlation group '{}'",
                    strategy.name, strategy.correlation_group
                )));
            }
        }

        Ok(())
    }

    fn validate_bp_table(&self) -> Result<(), ConfigError> {
        if self.vix_bp_table.is_empty() {
            return Err(ConfigError::Invalid("VIX/BP table is empty".to_string()));
        }

        let mut prev_bound: Option<f64> = None;
        for (i, entry) in self.vix_bp_table.iter().enumerate() {
            if !entry.bp_pct.is_finite() || !(0.0..=100.0).contains(&entry.bp_pct) {
                return Err(ConfigError::Invalid(format!(
                    "VIX/BP table entry {i}: bp_pct {} must be in [0, 100]",
                    entry.bp_pct
                )));
            }
            match entry.upper_vix {
                Some(bound) => {
                    if !bound.is_finite() || bound <= 0.0 {
                        return Err(ConfigError::Invalid(format!(
                            "VIX/BP table entry {i}: bound {bound} must be a finite positive number"
                        )));
                    }
                    if let Some(prev) = prev_bound {
                        if bound <= prev {
                            return Err(ConfigError::Invalid(format!(
                                "VIX/BP table entry {i}: bound {bound} not above previous {prev}"
                            )));
                        }
                    }
                    prev_bound = Some(bound);
                }
                None => {
                    if i != self.vix_bp_table.len() - 1 {
                        return Err(ConfigError::Invalid(format!(
                            "VIX/BP table entry {i}: unbounded bucket must be last"
                        )));
                    }
                }
            }
        }

        if self.vix_bp_table.last().and_then(|e| e.upper_vix).is_some() {
            return Err(ConfigError::Invalid(
                "VIX/BP table must end with an unbounded bucket".to_string(),
            ));
        }

        Ok(())
    }

    /// Cap for a correlation group.
    pub fn group_cap(&self, group: &str) -> usize {
        self.correlation_groups
            .get(group)
            .copied()
            .unwrap_or(self.default_group_cap)
    }
}
