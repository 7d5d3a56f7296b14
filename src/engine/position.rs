//! Position and trade lifecycle.
//!
//! A position is created when a strategy's entry rule fires and the risk
//! checks admit it, is marked to market daily, and becomes an immutable
//! [`Trade`] ledger entry once closed. Positions are owned by the engine run
//! that created them; there is no cross-run sharing.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::OptionType;

/// Reason a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Profit target reached. Takes precedence when several conditions
    /// trigger on the same day.
    ProfitTarget,
    /// Defensive time exit at the management DTE.
    TimeExit,
    /// Stop loss breached.
    StopLoss,
    /// Held through expiration.
    Expired,
    /// Closed at the end of the backtest period.
    EndOfPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A single short-premium position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Strategy that opened the position.
    pub strategy: String,
    /// Underlying symbol.
    pub symbol: String,
    /// Correlation group of the underlying.
    pub correlation_group: String,
    /// Option type sold.
    pub option_type: OptionType,
    /// Short strike.
    pub strike: Decimal,
    /// Entry date.
    pub entry_date: NaiveDate,
    /// Expiration date.
    pub expiration: NaiveDate,
    /// Contracts sold.
    pub contracts: u32,
    /// Option price received at entry, per share.
    pub entry_price: Decimal,
    /// Latest theoretical price, per share.
    pub current_price: Decimal,
    /// Margin committed while open.
    pub margin_requirement: Decimal,
    pub status: PositionStatus,
    pub exit_date: Option<NaiveDate>,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: Option<Decimal>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Total credit received at entry.
    pub fn entry_credit(&self, multiplier: u32) -> Decimal {
        self.entry_price * Decimal::from(self.contracts) * Decimal::from(multiplier)
    }

    /// Unrealized P&L at the latest mark. Short premium: profit when the
    /// option price decays below the entry price.
    pub fn unrealized_pnl(&self, multiplier: u32) -> Decimal {
        (self.entry_price - self.current_price)
            * Decimal::from(self.contracts)
            * Decimal::from(multiplier)
    }

    /// Unrealized P&L as a percentage of the credit received.
    pub fn unrealized_pnl_pct_of_credit(&self, multiplier: u32) -> f64 {
        let credit = self.entry_credit(multiplier);
        if credit.is_zero() {
            return 0.0;
        }
        let pnl: f64 = self.unrealized_pnl(multiplier).try_into().unwrap_or(0.0);
        let credit: f64 = credit.try_into().unwrap_or(1.0);
        pnl / credit * 100.0
    }

    /// Remaining days to expiry.
    pub fn dte(&self, date: NaiveDate) -> i64 {
        (self.expiration - date).num_days()
    }

    pub fn days_held(&self, date: NaiveDate) -> i64 {
        (date - self.entry_date).num_days()
    }

    /// Close the position at the latest mark and realize P&L net of the
    /// per-trade commission deduction.
    pub fn close(
        &mut self,
        exit_date: NaiveDate,
        exit_reason: ExitReason,
        multiplier: u32,
        commission: Decimal,
    ) {
        self.status = PositionStatus::Closed;
        self.exit_date = Some(exit_date);
        self.exit_reason = Some(exit_reason);
        self.realized_pnl = Some(self.unrealized_pnl(multiplier) - commission);
    }

    /// Convert a closed position into its immutable ledger entry.
    pub fn to_trade(&self) -> Option<Trade> {
        if self.status != PositionStatus::Closed {
            return None;
        }
        let exit_date = self.exit_date?;
        Some(Trade {
            strategy: self.strategy.clone(),
            symbol: self.symbol.clone(),
            correlation_group: self.correlation_group.clone(),
            entry_date: self.entry_date,
            exit_date,
            contracts: self.contracts,
            pnl: self.realized_pnl.unwrap_or(Decimal::ZERO),
            days_held: (exit_date - self.entry_date).num_days(),
            exit_reason: self.exit_reason?,
        })
    }
}

/// Immutable closed-trade ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub strategy: String,
    pub symbol: String,
    pub correlation_group: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub contracts: u32,
    pub pnl: Decimal,
    pub days_held: i64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > Decimal::ZERO
    }
}

/// One point of the daily P&L series. Dates are strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPnlPoint {
    pub date: NaiveDate,
    /// Account value at end of day.
    pub capital: Decimal,
    /// Change in account value from the previous point.
    pub daily_pnl: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open_position() -> Position {
        Position {
            strategy: "weekly-put".to_string(),
            symbol: "SPY".to_string(),
            correlation_group: "EQUITIES".to_string(),
            option_type: OptionType::Put,
            strike: dec!(430),
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            expiration: NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
            contracts: 2,
            entry_price: dec!(3.50),
            current_price: dec!(3.50),
            margin_requirement: dec!(5000),
            status: PositionStatus::Open,
            exit_date: None,
            exit_reason: None,
            realized_pnl: None,
        }
    }

    #[test]
    fn test_entry_credit() {
        let pos = open_position();
        assert_eq!(pos.entry_credit(100), dec!(700)); // 3.50 * 2 * 100
    }

    #[test]
    fn test_unrealized_pnl_short_premium() {
        let mut pos = open_position();

        pos.current_price = dec!(1.75);
        assert_eq!(pos.unrealized_pnl(100), dec!(350));
        assert_eq!(pos.unrealized_pnl_pct_of_credit(100), 50.0);

        pos.current_price = dec!(7.00);
        assert_eq!(pos.unrealized_pnl(100), dec!(-700));
        assert_eq!(pos.unrealized_pnl_pct_of_credit(100), -100.0);
    }

    #[test]
    fn test_dte_and_days_held() {
        let pos = open_position();
        let date = NaiveDate::from_ymd_opt(2024, 1, 26).unwrap();
        assert_eq!(pos.dte(date), 21);
        assert_eq!(pos.days_held(date), 21);
    }

    #[test]
    fn test_close_realizes_pnl_minus_commission() {
        let mut pos = open_position();
        pos.current_price = dec!(1.75);

        let exit = NaiveDate::from_ymd_opt(2024, 1, 26).unwrap();
        pos.close(exit, ExitReason::ProfitTarget, 100, dec!(2.50));

        assert!(!pos.is_open());
        assert_eq!(pos.realized_pnl, Some(dec!(347.50)));

        let trade = pos.to_trade().unwrap();
        assert_eq!(trade.pnl, dec!(347.50));
        assert_eq!(trade.days_held, 21);
        assert_eq!(trade.exit_reason, ExitReason::ProfitTarget);
        assert!(trade.is_winner());
    }

    #[test]
    fn test_open_position_has_no_trade() {
        assert!(open_position().to_trade().is_none());
    }
}
