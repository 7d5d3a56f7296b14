//! Strategy definitions and the evaluation seam.
//!
//! A strategy is a complete rule set: entry window (days of week), target
//! DTE, a volatility-gating signal, an allocation fraction, and exit
//! parameters. Definitions with missing or nonsensical rules fail at
//! configuration-validation time, not silently at runtime.
//!
//! The engine talks to strategies through the [`Strategy`] trait so signal
//! evaluation stays a fallible boundary: one strategy erroring on one day is
//! isolated and reported as a warning, it never aborts the run.

use chrono::{NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::data::{MarketSnapshot, OptionType};

/// A single strategy's evaluation failed on one date. Recoverable: the
/// engine skips the strategy for that day and continues.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("strategy '{strategy}' failed on {date}: {reason}")]
pub struct StrategyError {
    pub strategy: String,
    pub date: NaiveDate,
    pub reason: String,
}

/// Volatility-gating entry signal. Tagged so configs are explicit about
/// which condition applies; a definition without a signal does not parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntrySignal {
    /// Enter whenever the entry window and risk checks allow.
    Always,
    /// Enter only below a volatility-index ceiling.
    VixBelow { max: f64 },
    /// Enter only above a volatility-index floor.
    VixAbove { min: f64 },
    /// Enter only inside a volatility-index band.
    VixBetween { min: f64, max: f64 },
}

impl EntrySignal {
    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> bool {
        match self {
            Self::Always => true,
            Self::VixBelow { max } => snapshot.vix < *max,
            Self::VixAbove { min } => snapshot.vix > *min,
            Self::VixBetween { min, max } => snapshot.vix >= *min && snapshot.vix <= *max,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let check = |label: &str, v: f64| {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "strategy '{name}': signal {label} {v} is not a finite non-negative number"
                )));
            }
            Ok(())
        };

        match self {
            Self::Always => Ok(()),
            Self::VixBelow { max } => check("max", *max),
            Self::VixAbove { min } => check("min", *min),
            Self::VixBetween { min, max } => {
                check("min", *min)?;
                check("max", *max)?;
                if min > max {
                    return Err(ConfigError::Invalid(format!(
                        "strategy '{name}': signal band min {min} exceeds max {max}"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Static configuration for one strategy. Read-only during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    /// Strategy identifier, unique within a run.
    pub name: String,

    /// Underlying symbol.
    pub symbol: String,

    /// Correlation group the symbol belongs to.
    pub correlation_group: String,

    /// Option type sold at entry.
    pub option_type: OptionType,

    /// Days of week on which entries may fire.
    pub entry_days: Vec<Weekday>,

    /// Target days-to-expiry at entry.
    pub target_dte: i64,

    /// Strike offset from spot, as a fraction (0.05 = 5% out of the money).
    pub strike_offset_pct: f64,

    /// Volatility gate for entries.
    pub signal: EntrySignal,

    /// Capital allocation as percentage of account value.
    pub allocation_pct: f64,

    /// Margin/capital requirement per contract.
    pub per_contract_capital: Decimal,

    /// Close at this percentage of max credit captured (50.0 = 50%).
    pub profit_target_pct: f64,

    /// Close when loss reaches this percentage of credit (200.0 = 200%).
    pub stop_loss_pct: f64,

    /// Defensive time exit when DTE falls to this level.
    pub management_dte: i64,
}

impl StrategyDefinition {
    /// Validate the rule set. Called during [`crate::config::RunConfig`]
    /// validation; a run never starts with an incomplete strategy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.name;
        if name.is_empty() {
            return Err(ConfigError::Invalid("strategy name is empty".to_string()));
        }
        if self.symbol.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}': symbol is empty"
            )));
        }
        if self.correlation_group.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}': correlation group is empty"
            )));
        }
        if self.entry_days.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}': no entry days configured"
            )));
        }
        if self.target_dte <= 0 {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}': target DTE must be positive, got {}",
                self.target_dte
            )));
        }
        if self.management_dte < 0 || self.management_dte >= self.target_dte {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}': management DTE {} must be in [0, {})",
                self.management_dte, self.target_dte
            )));
        }
        if !self.strike_offset_pct.is_finite()
            || self.strike_offset_pct < 0.0
            || self.strike_offset_pct >= 1.0
        {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}': strike offset {} must be in [0, 1)",
                self.strike_offset_pct
            )));
        }
        if !self.allocation_pct.is_finite()
            || self.allocation_pct <= 0.0
            || self.allocation_pct > 100.0
        {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}': allocation {}% must be in (0, 100]",
                self.allocation_pct
            )));
        }
        if self.per_contract_capital <= Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}': per-contract capital {} must be positive",
                self.per_contract_capital
            )));
        }
        if !self.profit_target_pct.is_finite()
            || self.profit_target_pct <= 0.0
            || self.profit_target_pct > 100.0
        {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}': profit target {}% must be in (0, 100]",
                self.profit_target_pct
            )));
        }
        if !self.stop_loss_pct.is_finite() || self.stop_loss_pct <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}': stop loss {}% must be positive",
                self.stop_loss_pct
            )));
        }
        self.signal.validate(name)
    }
}

/// The evaluation interface the engine drives each day.
pub trait Strategy: Send + Sync {
    /// Static parameters for this strategy.
    fn definition(&self) -> &StrategyDefinition;

    /// Whether the strategy-specific signal fires on this snapshot.
    fn entry_signal(&self, snapshot: &MarketSnapshot) -> Result<bool, StrategyError>;
}

/// Standard rule-driven strategy backed by a [`StrategyDefinition`].
pub struct RuleStrategy {
    definition: StrategyDefinition,
}

impl RuleStrategy {
    pub fn new(definition: StrategyDefinition) -> Result<Self, ConfigError> {
        definition.validate()?;
        Ok(Self { definition })
    }
}

impl Strategy for RuleStrategy {
    fn definition(&self) -> &StrategyDefinition {
        &self.definition
    }

    fn entry_signal(&self, snapshot: &MarketSnapshot) -> Result<bool, StrategyError> {
        Ok(self.definition.signal.evaluate(snapshot))
    }
}
