//! VIX-adaptive risk limits.
//!
//! Pure rules engine: volatility-index level and position context in,
//! [`RiskLimits`] out. A fresh value is computed on every call, nothing is
//! mutated in place, so evaluations are safe to share across parallel runs.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{EmergencyThresholds, RunConfig, VixBpTableEntry};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Reason an emergency trigger fired. All conditions are evaluated
/// independently, so a limits value can carry several of these at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    /// Account drawdown from peak beyond threshold.
    DrawdownLimit,
    /// Single-day loss beyond threshold.
    DailyLossLimit,
    /// Volatility-index spike beyond threshold.
    VixSpike,
    /// A correlation group holds more positions than its cap.
    CorrelationBreach,
    /// Margin utilization beyond threshold.
    MarginUtilization,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DrawdownLimit => "account drawdown limit exceeded",
            Self::DailyLossLimit => "single-day loss limit exceeded",
            Self::VixSpike => "volatility index spike",
            Self::CorrelationBreach => "correlation group cap breached",
            Self::MarginUtilization => "margin utilization limit exceeded",
        }
    }
}

/// Derived, per-evaluation limits value. Recomputed fresh each time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum buying-power usage, percent of account value, in [0, 100].
    pub max_bp_usage_pct: f64,
    /// Default cap on concurrent positions per correlation group.
    pub max_positions_per_group: usize,
    /// Whether any emergency condition holds.
    pub emergency_triggered: bool,
    /// Every condition that fired, in evaluation order.
    pub trigger_reasons: Vec<TriggerReason>,
}

/// Account/market context for an emergency evaluation.
#[derive(Debug, Clone)]
pub struct RiskContext {
    /// Current account value.
    pub account_value: Decimal,
    /// Highest account value seen this run.
    pub peak_value: Decimal,
    /// Account value at the start of the current day.
    pub day_start_value: Decimal,
    /// Current volatility-index level.
    pub vix: f64,
    /// Margin currently committed as percent of account value.
    pub margin_utilization_pct: f64,
    /// Whether any correlation group is over its cap.
    pub group_over_cap: bool,
}

/// Rules engine mapping volatility and position context to policy limits.
pub struct RiskManager {
    vix_bp_table: Vec<VixBpTableEntry>,
    correlation_groups: HashMap<String, usize>,
    default_group_cap: usize,
    emergency: EmergencyThresholds,
}

impl RiskManager {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            vix_bp_table: config.vix_bp_table.clone(),
            correlation_groups: config.correlation_groups.clone(),
            default_group_cap: config.default_group_cap,
            emergency: config.emergency.clone(),
        }
    }

    /// Maximum buying-power usage for a volatility-index level.
    ///
    /// Deterministic bucket lookup; a boundary value resolves to the upper
    /// bucket, and levels above the table clamp into the top bucket. Negative
    /// or non-finite input is an error.
    pub fn max_buying_power_usage(&self, vix: f64) -> Result<f64, RiskError> {
        if !vix.is_finite() {
            return Err(RiskError::InvalidInput(format!("vix {vix} is not finite")));
        }
        if vix < 0.0 {
            return Err(RiskError::InvalidInput(format!("vix {vix} is negative")));
        }

        for entry in &self.vix_bp_table {
            match entry.upper_vix {
                Some(bound) if vix < bound => return Ok(entry.bp_pct),
                Some(_) => continue,
                None => return Ok(entry.bp_pct),
            }
        }

        // Config validation guarantees an unbounded last bucket.
        Ok(self.vix_bp_table.last().map(|e| e.bp_pct).unwrap_or(0.0))
    }

    /// Configured cap on concurrent open positions for a group.
    pub fn max_positions_for_group(&self, group: &str) -> usize {
        self.correlation_groups
            .get(group)
            .copied()
            .unwrap_or(self.default_group_cap)
    }

    /// Whether admitting one more position in `group` stays within the cap.
    pub fn correlation_allows(&self, group: &str, open_in_group: usize) -> bool {
        open_in_group < self.max_positions_for_group(group)
    }

    /// Evaluate all emergency conditions and return a fresh limits value.
    ///
    /// Every condition is checked independently so the result reports all
    /// triggered reasons, not just the first.
    pub fn check_emergency_triggers(&self, ctx: &RiskContext) -> RiskLimits {
        let mut reasons = Vec::new();

        let drawdown_pct = pct_decline(ctx.peak_value, ctx.account_value);
        if drawdown_pct >= self.emergency.max_drawdown_pct {
            reasons.push(TriggerReason::DrawdownLimit);
        }

        let daily_loss_pct = pct_decline(ctx.day_start_value, ctx.account_value);
        if daily_loss_pct >= self.emergency.max_daily_loss_pct {
            reasons.push(TriggerReason::DailyLossLimit);
        }

        if ctx.vix > self.emergency.vix_spike_level {
            reasons.push(TriggerReason::VixSpike);
        }

        if ctx.group_over_cap {
            reasons.push(TriggerReason::CorrelationBreach);
        }

        if ctx.margin_utilization_pct >= self.emergency.max_margin_utilization_pct {
            reasons.push(TriggerReason::MarginUtilization);
        }

        let max_bp_usage_pct = self.max_buying_power_usage(ctx.vix.max(0.0)).unwrap_or(0.0);

        RiskLimits {
            max_bp_usage_pct,
            max_positions_per_group: self.default_group_cap,
            emergency_triggered: !reasons.is_empty(),
            trigger_reasons: reasons,
        }
    }
}

/// Percentage decline from `from` down to `to`; 0 when not a decline.
fn pct_decline(from: Decimal, to: Decimal) -> f64 {
    if from <= Decimal::ZERO || to >= from {
        return 0.0;
    }
    let from_f: f64 = from.try_into().unwrap_or(1.0);
    let to_f: f64 = to.try_into().unwrap_or(from_f);
    (from_f - to_f) / from_f * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use rust_decimal_macros::dec;

    fn manager() -> RiskManager {
        RiskManager::new(&RunConfig::default())
    }

    fn calm_context() -> RiskContext {
        RiskContext {
            account_value: dec!(100_000),
            peak_value: dec!(100_000),
            day_start_value: dec!(100_000),
            vix: 15.0,
            margin_utilization_pct: 30.0,
            group_over_cap: false,
        }
    }

    #[test]
    fn test_bp_buckets() {
        let rm = manager();
        assert_eq!(rm.max_buying_power_usage(0.0).unwrap(), 45.0);
        assert_eq!(rm.max_buying_power_usage(12.99).unwrap(), 45.0);
        assert_eq!(rm.max_buying_power_usage(15.0).unwrap(), 65.0);
        assert_eq!(rm.max_buying_power_usage(20.0).unwrap(), 75.0);
        assert_eq!(rm.max_buying_power_usage(27.0).unwrap(), 50.0);
        assert_eq!(rm.max_buying_power_usage(35.0).unwrap(), 80.0);
        assert_eq!(rm.max_buying_power_usage(500.0).unwrap(), 80.0);
    }

    #[test]
    fn test_bp_boundaries_resolve_upward() {
        let rm = manager();
        assert_eq!(rm.max_buying_power_usage(13.0).unwrap(), 65.0);
        assert_eq!(rm.max_buying_power_usage(18.0).unwrap(), 75.0);
        assert_eq!(rm.max_buying_power_usage(25.0).unwrap(), 50.0);
        assert_eq!(rm.max_buying_power_usage(30.0).unwrap(), 80.0);
    }

    #[test]
    fn test_bp_invalid_inputs() {
        let rm = manager();
        assert!(rm.max_buying_power_usage(-0.1).is_err());
        assert!(rm.max_buying_power_usage(f64::NAN).is_err());
        assert!(rm.max_buying_power_usage(f64::INFINITY).is_err());
    }

    #[test]
    fn test_correlation_caps() {
        let rm = manager();
        assert_eq!(rm.max_positions_for_group("EQUITIES"), 3);
        assert_eq!(rm.max_positions_for_group("METALS"), 2);
        assert_eq!(rm.max_positions_for_group("UNLISTED"), 2);

        assert!(rm.correlation_allows("EQUITIES", 2));
        assert!(!rm.correlation_allows("EQUITIES", 3));
        assert!(!rm.correlation_allows("METALS", 2));
    }

    #[test]
    fn test_no_triggers_when_calm() {
        let limits = manager().check_emergency_triggers(&calm_context());
        assert!(!limits.emergency_triggered);
        assert!(limits.trigger_reasons.is_empty());
        assert_eq!(limits.max_bp_usage_pct, 65.0);
    }

    #[test]
    fn test_drawdown_trigger() {
        let mut ctx = calm_context();
        ctx.peak_value = dec!(130_000);
        ctx.account_value = dec!(100_000);
        ctx.day_start_value = dec!(100_000);

        let limits = manager().check_emergency_triggers(&ctx);
        assert!(limits.emergency_triggered);
        assert_eq!(limits.trigger_reasons, vec![TriggerReason::DrawdownLimit]);
    }

    #[test]
    fn test_daily_loss_trigger() {
        let mut ctx = calm_context();
        ctx.day_start_value = dec!(106_000);
        ctx.account_value = dec!(100_000);
        ctx.peak_value = dec!(106_000);

        let limits = manager().check_emergency_triggers(&ctx);
        assert!(limits
            .trigger_reasons
            .contains(&TriggerReason::DailyLossLimit));
    }

    #[test]
    fn test_vix_spike_trigger() {
        let mut ctx = calm_context();
        ctx.vix = 36.0;
        let limits = manager().check_emergency_triggers(&ctx);
        assert_eq!(limits.trigger_reasons, vec![TriggerReason::VixSpike]);
        // Puts-only regime still reports the top-bucket BP cap.
        assert_eq!(limits.max_bp_usage_pct, 80.0);
    }

    #[test]
    fn test_all_triggers_reported_together() {
        let ctx = RiskContext {
            account_value: dec!(70_000),
            peak_value: dec!(100_000),
            day_start_value: dec!(76_000),
            vix: 40.0,
            margin_utilization_pct: 96.0,
            group_over_cap: true,
        };

        let limits = manager().check_emergency_triggers(&ctx);
        assert!(limits.emergency_triggered);
        assert_eq!(
            limits.trigger_reasons,
            vec![
                TriggerReason::DrawdownLimit,
                TriggerReason::DailyLossLimit,
                TriggerReason::VixSpike,
                TriggerReason::CorrelationBreach,
                TriggerReason::MarginUtilization,
            ]
        );
    }
}
