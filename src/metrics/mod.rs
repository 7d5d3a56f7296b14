//! Performance metrics over a completed run.

pub mod calculator;

pub use calculator::{DrawdownAnalysis, MetricsCalculator, PerformanceMetrics};
