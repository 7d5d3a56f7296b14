//! VIX-adaptive premium-selling backtester.
//!
//! Risk limits follow a bucketed volatility-index table with correlation
//! group caps and independent emergency triggers; option marks come from a
//! Black-Scholes Greeks calculator; the engine replays snapshot sequences
//! deterministically and isolates per-strategy failures as warnings.

pub mod config;
pub mod data;
pub mod engine;
pub mod greeks;
pub mod metrics;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use config::{ConfigError, EmergencyThresholds, RunConfig, VixBpTableEntry};
pub use data::{DataError, MarketSnapshot, OptionType, SyntheticConfig, SyntheticGenerator};
pub use engine::{
    BacktestEngine, BacktestResult, DailyPnlPoint, EngineError, ExitReason, Position, RunWarning,
    Trade,
};
pub use greeks::{GreeksCalculator, GreeksError, OptionGreeks};
pub use metrics::{DrawdownAnalysis, MetricsCalculator, PerformanceMetrics};
pub use risk::{RiskContext, RiskError, RiskLimits, RiskManager, TriggerReason};
pub use strategy::{EntrySignal, RuleStrategy, Strategy, StrategyDefinition, StrategyError};
