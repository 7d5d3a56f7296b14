//! Aggregate statistics over a trade ledger and daily account series.
//!
//! Every field is well-defined for every input, including an empty ledger: a
//! run with no trades reports zero rates and ratios, never NaN. Ratios with
//! an empty denominator but real profits use `f64::INFINITY` as the sentinel.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::engine::{DailyPnlPoint, Trade};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Headline statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winners: usize,
    pub losers: usize,
    /// Percentage of trades with positive P&L; 0 when there are no trades.
    pub win_rate_pct: f64,
    pub total_pnl: Decimal,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    /// Gross profit over gross loss. `INFINITY` when there are profits but
    /// no losses; 0 when there are neither.
    pub profit_factor: f64,
    /// Mean P&L per trade.
    pub expectancy: Decimal,
    pub avg_days_held: f64,
    /// Annualized Sharpe ratio of daily returns; 0 when returns do not vary.
    pub sharpe_ratio: f64,
    /// Annualized Sortino ratio; `INFINITY` for positive mean return with no
    /// downside days, 0 otherwise when downside deviation is zero.
    pub sortino_ratio: f64,
    pub drawdown: DrawdownAnalysis,
}

/// Worst peak-to-trough excursion of the account series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawdownAnalysis {
    /// Maximum drawdown, percent of peak. 0 for a non-declining series.
    pub max_drawdown_pct: f64,
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
    /// Days from peak to trough.
    pub drawdown_days: i64,
    /// Days from trough back to the peak level, if the series recovered.
    pub recovery_days: Option<i64>,
}

impl DrawdownAnalysis {
    fn flat() -> Self {
        Self {
            max_drawdown_pct: 0.0,
            peak_date: None,
            trough_date: None,
            drawdown_days: 0,
            recovery_days: None,
        }
    }
}

pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Compute the full statistics block for one run.
    pub fn calculate(trades: &[Trade], daily: &[DailyPnlPoint]) -> PerformanceMetrics {
        let winners: Vec<&Trade> = trades.iter().filter(|t| t.pnl > Decimal::ZERO).collect();
        let losers: Vec<&Trade> = trades.iter().filter(|t| t.pnl < Decimal::ZERO).collect();

        let gross_profit: Decimal = winners.iter().map(|t| t.pnl).sum();
        let gross_loss: Decimal = losers.iter().map(|t| -t.pnl).sum();
        let total_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();

        let win_rate_pct = if trades.is_empty() {
            0.0
        } else {
            winners.len() as f64 / trades.len() as f64 * 100.0
        };

        let avg_win = decimal_mean(gross_profit, winners.len());
        let avg_loss = decimal_mean(gross_loss, losers.len());
        let expectancy = decimal_mean(total_pnl, trades.len());

        let profit_factor = if gross_loss > Decimal::ZERO {
            let profit: f64 = gross_profit.try_into().unwrap_or(0.0);
            let loss: f64 = gross_loss.try_into().unwrap_or(1.0);
            profit / loss
        } else if gross_profit > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_days_held = if trades.is_empty() {
            0.0
        } else {
            trades.iter().map(|t| t.days_held as f64).sum::<f64>() / trades.len() as f64
        };

        let returns = daily_returns(daily);

        PerformanceMetrics {
            total_trades: trades.len(),
            winners: winners.len(),
            losers: losers.len(),
            win_rate_pct,
            total_pnl,
            avg_win,
            avg_loss,
            profit_factor,
            expectancy,
            avg_days_held,
            sharpe_ratio: sharpe(&returns),
            sortino_ratio: sortino(&returns),
            drawdown: Self::analyze_drawdown(daily),
        }
    }

    /// Locate the worst peak-to-trough move and whether it recovered.
    pub fn analyze_drawdown(daily: &[DailyPnlPoint]) -> DrawdownAnalysis {
        if daily.is_empty() {
            return DrawdownAnalysis::flat();
        }

        let mut peak = daily[0].capital;
        let mut peak_date = daily[0].date;

        let mut max_dd = 0.0_f64;
        let mut best_peak_date = None;
        let mut best_trough_date = None;
        let mut best_peak_value = Decimal::ZERO;

        for point in daily {
            if point.capital > peak {
                peak = point.capital;
                peak_date = point.date;
            }
            let dd = decline_pct(peak, point.capital);
            if dd > max_dd {
                max_dd = dd;
                best_peak_date = Some(peak_date);
                best_trough_date = Some(point.date);
                best_peak_value = peak;
            }
        }

        let (Some(peak_date), Some(trough_date)) = (best_peak_date, best_trough_date) else {
            return DrawdownAnalysis::flat();
        };

        let recovery_days = daily
            .iter()
            .filter(|p| p.date > trough_date)
            .find(|p| p.capital >= best_peak_value)
            .map(|p| (p.date - trough_date).num_days());

        DrawdownAnalysis {
            max_drawdown_pct: max_dd,
            peak_date: Some(peak_date),
            trough_date: Some(trough_date),
            drawdown_days: (trough_date - peak_date).num_days(),
            recovery_days,
        }
    }
}

fn decimal_mean(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        total / Decimal::from(count as u64)
    }
}

fn daily_returns(daily: &[DailyPnlPoint]) -> Vec<f64> {
    daily
        .windows(2)
        .filter_map(|w| {
            let prev: f64 = w[0].capital.try_into().ok()?;
            let curr: f64 = w[1].capital.try_into().ok()?;
            if prev > 0.0 {
                Some((curr - prev) / prev)
            } else {
                None
            }
        })
        .collect()
}

fn sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (returns.len() - 1) as f64;
    let stdev = variance.sqrt();
    if stdev == 0.0 {
        return 0.0;
    }
    mean / stdev * TRADING_DAYS_PER_YEAR.sqrt()
}

fn sortino(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return if mean > 0.0 { f64::INFINITY } else { 0.0 };
    }
    let downside_var =
        downside.iter().map(|r| r.powi(2)).sum::<f64>() / returns.len() as f64;
    let downside_dev = downside_var.sqrt();
    if downside_dev == 0.0 {
        return 0.0;
    }
    mean / downside_dev * TRADING_DAYS_PER_YEAR.sqrt()
}

fn decline_pct(peak: Decimal, value: Decimal) -> f64 {
    if peak <= Decimal::ZERO || value >= peak {
        return 0.0;
    }
    let peak_f: f64 = peak.try_into().unwrap_or(1.0);
    let value_f: f64 = value.try_into().unwrap_or(peak_f);
    (peak_f - value_f) / peak_f * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExitReason;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn trade(pnl: Decimal, days_held: i64) -> Trade {
        Trade {
            strategy: "weekly-put".to_string(),
            symbol: "SPY".to_string(),
            correlation_group: "EQUITIES".to_string(),
            entry_date: date(2),
            exit_date: date(2 + days_held as u32),
            contracts: 1,
            pnl,
            days_held,
            exit_reason: ExitReason::ProfitTarget,
        }
    }

    fn series(capitals: &[i64]) -> Vec<DailyPnlPoint> {
        capitals
            .iter()
            .enumerate()
            .map(|(i, c)| DailyPnlPoint {
                date: date(2 + i as u32),
                capital: Decimal::from(*c),
                daily_pnl: if i == 0 {
                    Decimal::ZERO
                } else {
                    Decimal::from(*c - capitals[i - 1])
                },
            })
            .collect()
    }

    #[test]
    fn test_empty_inputs_yield_zeros_not_nan() {
        let m = MetricsCalculator::calculate(&[], &[]);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.win_rate_pct, 0.0);
        assert_eq!(m.avg_win, Decimal::ZERO);
        assert_eq!(m.avg_loss, Decimal::ZERO);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.expectancy, Decimal::ZERO);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.sortino_ratio, 0.0);
        assert_eq!(m.drawdown.max_drawdown_pct, 0.0);
        assert!(!m.win_rate_pct.is_nan());
        assert!(!m.profit_factor.is_nan());
    }

    #[test]
    fn test_basic_aggregates() {
        let trades = vec![
            trade(dec!(300), 10),
            trade(dec!(100), 20),
            trade(dec!(-200), 6),
        ];
        let m = MetricsCalculator::calculate(&trades, &[]);

        assert_eq!(m.total_trades, 3);
        assert_eq!(m.winners, 2);
        assert_eq!(m.losers, 1);
        assert!((m.win_rate_pct - 66.666).abs() < 0.01);
        assert_eq!(m.total_pnl, dec!(200));
        assert_eq!(m.avg_win, dec!(200));
        assert_eq!(m.avg_loss, dec!(200));
        assert_eq!(m.profit_factor, 2.0);
        assert_eq!(m.expectancy, dec!(200) / dec!(3));
        assert_eq!(m.avg_days_held, 12.0);
    }

    #[test]
    fn test_profit_factor_sentinels() {
        let all_winners = vec![trade(dec!(100), 5)];
        assert_eq!(
            MetricsCalculator::calculate(&all_winners, &[]).profit_factor,
            f64::INFINITY
        );

        let breakeven = vec![trade(dec!(0), 5)];
        assert_eq!(MetricsCalculator::calculate(&breakeven, &[]).profit_factor, 0.0);
    }

    #[test]
    fn test_zero_pnl_trade_is_not_a_winner() {
        let trades = vec![trade(dec!(0), 5), trade(dec!(50), 5)];
        let m = MetricsCalculator::calculate(&trades, &[]);
        assert_eq!(m.winners, 1);
        assert_eq!(m.losers, 0);
        assert_eq!(m.win_rate_pct, 50.0);
    }

    #[test]
    fn test_sharpe_zero_for_constant_series() {
        let m = MetricsCalculator::calculate(&[], &series(&[100_000, 100_000, 100_000]));
        assert_eq!(m.sharpe_ratio, 0.0);
        assert!(!m.sharpe_ratio.is_nan());
    }

    #[test]
    fn test_sharpe_positive_for_rising_varied_series() {
        let m = MetricsCalculator::calculate(
            &[],
            &series(&[100_000, 100_500, 100_400, 101_200, 101_900]),
        );
        assert!(m.sharpe_ratio > 0.0);
        assert!(m.sharpe_ratio.is_finite());
    }

    #[test]
    fn test_sortino_infinite_with_no_downside() {
        let m = MetricsCalculator::calculate(&[], &series(&[100_000, 100_500, 101_000]));
        assert_eq!(m.sortino_ratio, f64::INFINITY);
    }

    #[test]
    fn test_drawdown_with_recovery() {
        // Peak 110K on day 3, trough 99K on day 5, recovered day 7.
        let daily = series(&[100_000, 110_000, 105_000, 99_000, 104_000, 111_000]);
        let dd = MetricsCalculator::analyze_drawdown(&daily);

        assert!((dd.max_drawdown_pct - 10.0).abs() < 1e-9);
        assert_eq!(dd.peak_date, Some(date(3)));
        assert_eq!(dd.trough_date, Some(date(5)));
        assert_eq!(dd.drawdown_days, 2);
        assert_eq!(dd.recovery_days, Some(2));
    }

    #[test]
    fn test_drawdown_without_recovery() {
        let daily = series(&[100_000, 90_000, 85_000]);
        let dd = MetricsCalculator::analyze_drawdown(&daily);
        assert!((dd.max_drawdown_pct - 15.0).abs() < 1e-9);
        assert_eq!(dd.recovery_days, None);
    }

    #[test]
    fn test_monotonic_series_has_no_drawdown() {
        let daily = series(&[100_000, 101_000, 102_000]);
        let dd = MetricsCalculator::analyze_drawdown(&daily);
        assert_eq!(dd.max_drawdown_pct, 0.0);
        assert_eq!(dd.peak_date, None);
        assert_eq!(dd.trough_date, None);
    }
}
