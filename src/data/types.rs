//! Core market data types for the backtesting core.
//!
//! A backtest consumes an ordered sequence of [`MarketSnapshot`] records
//! supplied by an external data provider (historical or synthetic). The
//! sequence is validated once, up front, before any strategy logic runs.

use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "C",
            Self::Put => "P",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("snapshot {index}: {reason}")]
    Integrity { index: usize, reason: String },
}

/// A point-in-time record of market state. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Trading date.
    pub date: NaiveDate,

    /// Underlying price.
    pub underlying_price: Decimal,

    /// ATM implied volatility (annualized, e.g. 0.20).
    pub implied_vol: f64,

    /// Volatility index level (VIX-like scale, e.g. 18.5).
    pub vix: f64,
}

impl MarketSnapshot {
    pub fn new(date: NaiveDate, underlying_price: Decimal, implied_vol: f64, vix: f64) -> Self {
        Self {
            date,
            underlying_price,
            implied_vol,
            vix,
        }
    }

    /// Day of week for entry-window checks.
    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }
}

/// Validate a snapshot sequence before a run.
///
/// Checks, per record: strictly increasing dates (no duplicates), a finite
/// positive price, a finite positive implied vol, and a finite non-negative
/// volatility index. The first offending record aborts with its index so the
/// caller can fix the upstream data source.
pub fn validate_snapshots(snapshots: &[MarketSnapshot]) -> Result<(), DataError> {
    let mut prev_date: Option<NaiveDate> = None;

    for (index, snap) in snapshots.iter().enumerate() {
        if let Some(prev) = prev_date {
            if snap.date <= prev {
                return Err(DataError::Integrity {
                    index,
                    reason: format!("date {} is not after previous date {}", snap.date, prev),
                });
            }
        }
        prev_date = Some(snap.date);

        if snap.underlying_price <= Decimal::ZERO {
            return Err(DataError::Integrity {
                index,
                reason: format!("underlying price {} is not positive", snap.underlying_price),
            });
        }

        if !snap.implied_vol.is_finite() || snap.implied_vol <= 0.0 {
            return Err(DataError::Integrity {
                index,
                reason: format!(
                    "implied vol {} is not a finite positive number",
                    snap.implied_vol
                ),
            });
        }

        if !snap.vix.is_finite() || snap.vix < 0.0 {
            return Err(DataError::Integrity {
                index,
                reason: format!("vix {} is not a finite non-negative number", snap.vix),
            });
        }
    }

    Ok(())
}
