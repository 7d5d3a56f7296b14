//! Risk management module.
//!
//! Provides:
//! - VIX-bucketed buying-power limits (defensive dip preserved as observed)
//! - Correlation-group concurrent-position caps
//! - Independent emergency triggers (drawdown, daily loss, VIX spike,
//!   correlation breach, margin utilization)
//! - Allocation-based integer position sizing

pub mod limits;
pub mod position_sizer;

pub use limits::{RiskContext, RiskError, RiskLimits, RiskManager, TriggerReason};
