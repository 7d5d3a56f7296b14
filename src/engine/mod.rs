//! Day-by-day backtest engine.
//!
//! The engine replays a validated snapshot sequence against a set of
//! strategies. Each day it marks open positions to their theoretical price,
//! applies exit rules, evaluates emergency triggers, and only then considers
//! new entries, in the order strategies are listed in the configuration.
//! Given the same configuration and data, two runs produce identical trade
//! ledgers.
//!
//! A strategy failing to evaluate on one day is recoverable: the engine logs
//! it, records a [`RunWarning`], and moves on. Bad input data is not: the run
//! aborts with the index of the offending snapshot before any trading logic
//! executes.

pub mod position;

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, RunConfig};
use crate::data::{validate_snapshots, DataError, MarketSnapshot, OptionType};
use crate::greeks::{GreeksCalculator, GreeksError};
use crate::risk::{RiskContext, RiskError, RiskManager};
use crate::strategy::{RuleStrategy, Strategy};

pub use position::{DailyPnlPoint, ExitReason, Position, PositionStatus, Trade};

/// Fatal run failure. Recoverable per-strategy problems surface as
/// [`RunWarning`]s on a successful result instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Greeks(#[from] GreeksError),
}

/// A recoverable problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunWarning {
    pub date: NaiveDate,
    pub strategy: String,
    pub message: String,
}

/// Complete output of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub initial_capital: Decimal,
    pub final_capital: Decimal,
    pub peak_capital: Decimal,
    /// Maximum peak-to-trough drawdown over the run, percent.
    pub max_drawdown: f64,
    /// Days on which emergency triggers blocked new entries.
    pub emergency_days: usize,
    /// Closed-trade ledger, in close order.
    pub trades: Vec<Trade>,
    /// End-of-day account series, one point per snapshot.
    pub daily: Vec<DailyPnlPoint>,
    /// Recoverable problems encountered, in occurrence order.
    pub warnings: Vec<RunWarning>,
}

impl BacktestResult {
    pub fn total_return_pct(&self) -> f64 {
        if self.initial_capital <= Decimal::ZERO {
            return 0.0;
        }
        let initial: f64 = self.initial_capital.try_into().unwrap_or(1.0);
        let fin: f64 = self.final_capital.try_into().unwrap_or(initial);
        (fin - initial) / initial * 100.0
    }

    /// Human-readable run summary.
    pub fn summary(&self) -> String {
        let period = match (self.daily.first(), self.daily.last()) {
            (Some(first), Some(last)) => format!("{} to {}", first.date, last.date),
            _ => "empty".to_string(),
        };
        format!(
            "period:         {period}\n\
             capital:        {} -> {} ({:+.2}%)\n\
             trades:         {} ({} warnings)\n\
             max drawdown:   {:.2}%\n\
             emergency days: {}",
            self.initial_capital,
            self.final_capital,
            self.total_return_pct(),
            self.trades.len(),
            self.warnings.len(),
            self.max_drawdown,
            self.emergency_days,
        )
    }
}

/// The backtest engine. Holds per-run configuration and derived components;
/// `run` itself takes the data, so one engine can replay many series.
pub struct BacktestEngine {
    config: RunConfig,
    risk: RiskManager,
    greeks: GreeksCalculator,
    strategies: Vec<Box<dyn Strategy>>,
}

impl BacktestEngine {
    /// Build an engine from a validated configuration, with the standard
    /// rule-driven strategies.
    pub fn new(config: RunConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let strategies = config
            .strategies
            .iter()
            .cloned()
            .map(|def| Ok(Box::new(RuleStrategy::new(def)?) as Box<dyn Strategy>))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            risk: RiskManager::new(&config),
            greeks: GreeksCalculator::new(config.risk_free_rate),
            strategies,
            config,
        })
    }

    /// Build an engine around caller-supplied strategy implementations. The
    /// configuration's strategy list is replaced by their definitions.
    pub fn with_strategies(
        mut config: RunConfig,
        strategies: Vec<Box<dyn Strategy>>,
    ) -> Result<Self, EngineError> {
        config.strategies = strategies.iter().map(|s| s.definition().clone()).collect();
        config.validate()?;
        Ok(Self {
            risk: RiskManager::new(&config),
            greeks: GreeksCalculator::new(config.risk_free_rate),
            strategies,
            config,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Replay the snapshot series and produce the trade ledger.
    ///
    /// Data is validated before any trading logic runs; an integrity failure
    /// aborts with the offending index. Per day: mark open positions, apply
    /// exits, evaluate emergency triggers, then consider entries in
    /// configured strategy order. The final day closes everything that
    /// remains open.
    pub fn run(&self, snapshots: &[MarketSnapshot]) -> Result<BacktestResult, EngineError> {
        validate_snapshots(snapshots)?;

        let multiplier = self.config.contract_multiplier;
        let commission = self.config.commission_per_trade;
        let initial = self.config.initial_capital;

        let mut open: Vec<Position> = Vec::new();
        let mut trades: Vec<Trade> = Vec::new();
        let mut warnings: Vec<RunWarning> = Vec::new();
        let mut daily: Vec<DailyPnlPoint> = Vec::with_capacity(snapshots.len());

        let mut realized = Decimal::ZERO;
        let mut peak = initial;
        let mut max_drawdown = 0.0_f64;
        let mut emergency_days = 0usize;
        let mut day_start = initial;

        for (idx, snap) in snapshots.iter().enumerate() {
            let last_day = idx + 1 == snapshots.len();

            for pos in open.iter_mut() {
                pos.current_price =
                    self.theoretical_price(snap, pos.strike, pos.dte(snap.date), pos.option_type)?;
            }
            for i in 0..open.len() {
                if let Some(reason) = self.exit_check(&open[i], snap.date) {
                    open[i].close(snap.date, reason, multiplier, commission);
                }
            }
            if last_day {
                for pos in open.iter_mut().filter(|p| p.is_open()) {
                    pos.close(snap.date, ExitReason::EndOfPeriod, multiplier, commission);
                }
            }

            // Move closed positions to the ledger, preserving order.
            let mut i = 0;
            while i < open.len() {
                if open[i].is_open() {
                    i += 1;
                    continue;
                }
                let pos = open.remove(i);
                realized += pos.realized_pnl.unwrap_or(Decimal::ZERO);
                if let Some(trade) = pos.to_trade() {
                    debug!(
                        strategy = %trade.strategy,
                        date = %trade.exit_date,
                        pnl = %trade.pnl,
                        reason = ?trade.exit_reason,
                        "closed position"
                    );
                    trades.push(trade);
                }
            }

            let equity = equity_value(initial, realized, &open, multiplier);
            let margin_used: Decimal = open.iter().map(|p| p.margin_requirement).sum();
            let equity_f: f64 = equity.try_into().unwrap_or(0.0);
            let margin_f: f64 = margin_used.try_into().unwrap_or(f64::MAX);
            let margin_utilization_pct = if equity_f > 0.0 {
                margin_f / equity_f * 100.0
            } else {
                100.0
            };

            let limits = self.risk.check_emergency_triggers(&RiskContext {
                account_value: equity,
                peak_value: peak,
                day_start_value: day_start,
                vix: snap.vix,
                margin_utilization_pct,
                group_over_cap: self.any_group_over_cap(&open),
            });

            if limits.emergency_triggered {
                emergency_days += 1;
                warn!(
                    date = %snap.date,
                    reasons = ?limits.trigger_reasons,
                    "emergency triggers active, new entries blocked"
                );
            } else if !last_day && equity > Decimal::ZERO {
                self.enter_positions(
                    snap,
                    equity,
                    margin_used,
                    limits.max_bp_usage_pct,
                    &mut open,
                    &mut warnings,
                )?;
            }

            if equity > peak {
                peak = equity;
            }
            let drawdown = drawdown_pct(peak, equity);
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }

            daily.push(DailyPnlPoint {
                date: snap.date,
                capital: equity,
                daily_pnl: equity - day_start,
            });
            day_start = equity;
        }

        Ok(BacktestResult {
            initial_capital: initial,
            final_capital: initial + realized,
            peak_capital: peak,
            max_drawdown,
            emergency_days,
            trades,
            daily,
            warnings,
        })
    }

    fn enter_positions(
        &self,
        snap: &MarketSnapshot,
        equity: Decimal,
        mut margin_used: Decimal,
        max_bp_usage_pct: f64,
        open: &mut Vec<Position>,
        warnings: &mut Vec<RunWarning>,
    ) -> Result<(), EngineError> {
        let equity_f: f64 = equity.try_into().unwrap_or(0.0);

        for strategy in &self.strategies {
            let def = strategy.definition();
            if !def.entry_days.contains(&snap.weekday()) {
                continue;
            }

            match strategy.entry_signal(snap) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    warn!(strategy = %def.name, date = %snap.date, "signal failed: {}", err.reason);
                    warnings.push(RunWarning {
                        date: snap.date,
                        strategy: def.name.clone(),
                        message: err.to_string(),
                    });
                    continue;
                }
            }

            let in_group = open
                .iter()
                .filter(|p| p.correlation_group == def.correlation_group)
                .count();
            if !self.risk.correlation_allows(&def.correlation_group, in_group) {
                debug!(
                    strategy = %def.name,
                    group = %def.correlation_group,
                    "entry blocked by correlation group cap"
                );
                continue;
            }

            let contracts = self.risk.position_size(def, equity, snap.vix)?;
            if contracts == 0 {
                continue;
            }

            let margin = def.per_contract_capital * Decimal::from(contracts);
            let margin_f: f64 = margin.try_into().unwrap_or(f64::MAX);
            let used_f: f64 = margin_used.try_into().unwrap_or(f64::MAX);
            if (used_f + margin_f) / equity_f * 100.0 > max_bp_usage_pct {
                debug!(strategy = %def.name, "entry blocked by buying-power cap");
                continue;
            }

            let offset = Decimal::from_f64_retain(def.strike_offset_pct).unwrap_or(Decimal::ZERO);
            let strike = match def.option_type {
                OptionType::Put => snap.underlying_price * (Decimal::ONE - offset),
                OptionType::Call => snap.underlying_price * (Decimal::ONE + offset),
            }
            .round_dp(0);

            let entry_price =
                self.theoretical_price(snap, strike, def.target_dte, def.option_type)?;
            if entry_price <= Decimal::ZERO {
                debug!(strategy = %def.name, %strike, "no credit available, entry skipped");
                continue;
            }

            debug!(
                strategy = %def.name,
                date = %snap.date,
                contracts,
                %strike,
                credit = %entry_price,
                "opened position"
            );
            open.push(Position {
                strategy: def.name.clone(),
                symbol: def.symbol.clone(),
                correlation_group: def.correlation_group.clone(),
                option_type: def.option_type,
                strike,
                entry_date: snap.date,
                expiration: snap.date + Duration::days(def.target_dte),
                contracts,
                entry_price,
                current_price: entry_price,
                margin_requirement: margin,
                status: PositionStatus::Open,
                exit_date: None,
                exit_reason: None,
                realized_pnl: None,
            });
            margin_used += margin;
        }
        Ok(())
    }

    /// Exit rule for one position at its latest mark. Expiration is forced;
    /// otherwise profit target takes precedence over the time exit, which
    /// takes precedence over the stop loss.
    fn exit_check(&self, pos: &Position, date: NaiveDate) -> Option<ExitReason> {
        if pos.dte(date) <= 0 {
            return Some(ExitReason::Expired);
        }
        let def = self
            .strategies
            .iter()
            .map(|s| s.definition())
            .find(|d| d.name == pos.strategy)?;
        let pnl_pct = pos.unrealized_pnl_pct_of_credit(self.config.contract_multiplier);
        if pnl_pct >= def.profit_target_pct {
            return Some(ExitReason::ProfitTarget);
        }
        if pos.dte(date) <= def.management_dte {
            return Some(ExitReason::TimeExit);
        }
        if pnl_pct <= -def.stop_loss_pct {
            return Some(ExitReason::StopLoss);
        }
        None
    }

    fn theoretical_price(
        &self,
        snap: &MarketSnapshot,
        strike: Decimal,
        dte: i64,
        opt_type: OptionType,
    ) -> Result<Decimal, EngineError> {
        let spot: f64 = snap.underlying_price.try_into().unwrap_or(0.0);
        let strike_f: f64 = strike.try_into().unwrap_or(0.0);
        let time = dte.max(0) as f64 / 365.0;
        let price = self
            .greeks
            .price(spot, strike_f, time, snap.implied_vol, opt_type)?;
        Ok(Decimal::from_f64_retain(price)
            .unwrap_or(Decimal::ZERO)
            .round_dp(4))
    }

    fn any_group_over_cap(&self, open: &[Position]) -> bool {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for pos in open {
            *counts.entry(pos.correlation_group.as_str()).or_default() += 1;
        }
        counts
            .iter()
            .any(|(group, n)| *n > self.risk.max_positions_for_group(group))
    }
}

/// Run several configurations against the same data in parallel. Each run is
/// independent, so results line up with the input order regardless of
/// scheduling.
pub fn run_many(
    configs: &[RunConfig],
    snapshots: &[MarketSnapshot],
) -> Vec<Result<BacktestResult, EngineError>> {
    configs
        .par_iter()
        .map(|config| BacktestEngine::new(config.clone()).and_then(|e| e.run(snapshots)))
        .collect()
}

fn equity_value(
    initial: Decimal,
    realized: Decimal,
    open: &[Position],
    multiplier: u32,
) -> Decimal {
    initial
        + realized
        + open
            .iter()
            .map(|p| p.unrealized_pnl(multiplier))
            .sum::<Decimal>()
}

fn drawdown_pct(peak: Decimal, value: Decimal) -> f64 {
    if peak <= Decimal::ZERO || value >= peak {
        return 0.0;
    }
    let peak_f: f64 = peak.try_into().unwrap_or(1.0);
    let value_f: f64 = value.try_into().unwrap_or(peak_f);
    (peak_f - value_f) / peak_f * 100.0
}
