//! Seeded synthetic market data generator.
//!
//! Produces a weekday-only snapshot series with a lognormal price walk and a
//! mean-reverting volatility index. The RNG is a `Pcg64` seeded from the run
//! configuration, so a given seed always yields the same series.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::MarketSnapshot;

/// Parameters for synthetic series generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// First calendar date of the series (weekends are skipped).
    pub start_date: NaiveDate,
    /// Number of trading days to generate.
    pub trading_days: usize,
    /// Starting underlying price.
    pub initial_price: f64,
    /// Annualized drift of the price walk.
    pub drift: f64,
    /// Starting volatility index level.
    pub initial_vix: f64,
    /// Long-run mean the volatility index reverts toward.
    pub vix_mean: f64,
    /// Daily mean-reversion speed for the volatility index.
    pub vix_reversion: f64,
    /// Daily shock scale for the volatility index.
    pub vix_shock: f64,
    /// RNG seed; recorded so runs are reproducible.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date"),
            trading_days: 252,
            initial_price: 450.0,
            drift: 0.07,
            initial_vix: 16.0,
            vix_mean: 18.0,
            vix_reversion: 0.05,
            vix_shock: 1.2,
            seed: 42,
        }
    }
}

/// Generator for synthetic snapshot sequences.
pub struct SyntheticGenerator {
    config: SyntheticConfig,
}

impl SyntheticGenerator {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    /// Generate the full snapshot series.
    pub fn generate(&self) -> Vec<MarketSnapshot> {
        let cfg = &self.config;
        let mut rng = Pcg64::seed_from_u64(cfg.seed);
        let normal = Normal::new(0.0, 1.0).expect("valid normal distribution");

        let mut snapshots = Vec::with_capacity(cfg.trading_days);
        let mut date = cfg.start_date;
        let mut price = cfg.initial_price;
        let mut vix = cfg.initial_vix;

        while snapshots.len() < cfg.trading_days {
            if is_trading_day(date) {
                // Implied vol tracks the index level (VIX is quoted in vol points).
                let implied_vol = (vix / 100.0).max(0.01);

                snapshots.push(MarketSnapshot::new(
                    date,
                    Decimal::from_f64_retain(price).unwrap_or(Decimal::ONE),
                    implied_vol,
                    vix,
                ));

                let daily_vol = implied_vol / (252.0_f64).sqrt();
                let z: f64 = normal.sample(&mut rng);
                price *= (cfg.drift / 252.0 - 0.5 * daily_vol * daily_vol + daily_vol * z).exp();
                price = price.max(0.01);

                let shock: f64 = normal.sample(&mut rng);
                vix += cfg.vix_reversion * (cfg.vix_mean - vix) + cfg.vix_shock * shock;
                vix = vix.clamp(9.0, 90.0);
            }
            date += Duration::days(1);
        }

        snapshots
    }
}

fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
