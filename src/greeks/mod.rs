//! Black-Scholes pricing and Greeks.
//!
//! All five Greeks come back from a single call so they always reflect the
//! same d1/d2 intermediates. Inputs are validated at the boundary: negative
//! or non-finite spot/strike/vol fail with a typed error instead of letting
//! NaN propagate into the engine.
//!
//! Conventions (matching common data-vendor scaling):
//! - theta is per calendar day
//! - vega and rho are per 1% move

use std::f64::consts::PI;

use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::data::OptionType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GreeksError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Price and sensitivities for a single option contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionGreeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

/// Ceiling for sigma * sqrt(T) so extreme vol/tenor inputs saturate the
/// normal CDF instead of producing junk intermediates.
const MAX_VOL_SQRT_T: f64 = 1e6;

/// Black-Scholes calculator.
pub struct GreeksCalculator {
    /// Risk-free interest rate.
    pub rate: f64,
}

impl Default for GreeksCalculator {
    fn default() -> Self {
        Self { rate: 0.05 }
    }
}

impl GreeksCalculator {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    fn validate(spot: f64, strike: f64, time: f64, vol: f64) -> Result<(), GreeksError> {
        for (name, value) in [("spot", spot), ("strike", strike), ("time", time), ("vol", vol)] {
            if !value.is_finite() {
                return Err(GreeksError::InvalidInput(format!(
                    "{name} is not finite: {value}"
                )));
            }
        }
        if spot <= 0.0 {
            return Err(GreeksError::InvalidInput(format!(
                "spot must be positive, got {spot}"
            )));
        }
        if strike <= 0.0 {
            return Err(GreeksError::InvalidInput(format!(
                "strike must be positive, got {strike}"
            )));
        }
        if vol <= 0.0 {
            return Err(GreeksError::InvalidInput(format!(
                "vol must be positive, got {vol}"
            )));
        }
        Ok(())
    }

    fn norm_cdf(x: f64) -> f64 {
        let normal = Normal::new(0.0, 1.0).expect("standard normal");
        normal.cdf(x)
    }

    fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }

    /// Compute price and all five Greeks in one call.
    ///
    /// At `time <= 0` the contract is expired: the intrinsic-value limit is
    /// returned (delta exactly 1, 0, or -1; gamma/theta/vega/rho zero).
    pub fn greeks(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        vol: f64,
        opt_type: OptionType,
    ) -> Result<OptionGreeks, GreeksError> {
        Self::validate(spot, strike, time, vol)?;

        if time <= 0.0 {
            return Ok(Self::expired(spot, strike, opt_type));
        }

        let vol_sqrt_t = (vol * time.sqrt()).min(MAX_VOL_SQRT_T);
        let d1 = ((spot / strike).ln() + (self.rate + 0.5 * vol * vol) * time) / vol_sqrt_t;
        let d2 = d1 - vol_sqrt_t;

        let pdf_d1 = Self::norm_pdf(d1);
        let cdf_d1 = Self::norm_cdf(d1);
        let cdf_d2 = Self::norm_cdf(d2);
        let discount = (-self.rate * time).exp();

        let gamma = pdf_d1 / (spot * vol_sqrt_t);
        let vega = spot * pdf_d1 * time.sqrt() / 100.0;
        let decay = -spot * pdf_d1 * vol / (2.0 * time.sqrt());

        let (price, delta, theta, rho) = match opt_type {
            OptionType::Call => {
                let price = spot * cdf_d1 - strike * discount * cdf_d2;
                let theta = (decay - self.rate * strike * discount * cdf_d2) / 365.0;
                let rho = strike * time * discount * cdf_d2 / 100.0;
                (price, cdf_d1, theta, rho)
            }
            OptionType::Put => {
                let price = strike * discount * (1.0 - cdf_d2) - spot * (1.0 - cdf_d1);
                let theta = (decay + self.rate * strike * discount * (1.0 - cdf_d2)) / 365.0;
                let rho = -strike * time * discount * (1.0 - cdf_d2) / 100.0;
                (price, cdf_d1 - 1.0, theta, rho)
            }
        };

        Ok(OptionGreeks {
            price,
            delta,
            gamma,
            theta,
            vega,
            rho,
        })
    }

    /// Theoretical price only.
    pub fn price(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        vol: f64,
        opt_type: OptionType,
    ) -> Result<f64, GreeksError> {
        Ok(self.greeks(spot, strike, time, vol, opt_type)?.price)
    }

    fn expired(spot: f64, strike: f64, opt_type: OptionType) -> OptionGreeks {
        let (price, delta) = match opt_type {
            OptionType::Call => {
                let itm = spot > strike;
                ((spot - strike).max(0.0), if itm { 1.0 } else { 0.0 })
            }
            OptionType::Put => {
                let itm = spot < strike;
                ((strike - spot).max(0.0), if itm { -1.0 } else { 0.0 })
            }
        };
        OptionGreeks {
            price,
            delta,
            gamma: 0.0,
            theta: 0.0,
            vega: 0.0,
            rho: 0.0,
        }
    }

    /// Implied volatility from an option price using Newton-Raphson.
    pub fn implied_vol(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        price: f64,
        opt_type: OptionType,
    ) -> Option<f64> {
        if time <= 0.0 || price <= 0.0 || spot <= 0.0 || strike <= 0.0 {
            return None;
        }

        // Brenner-Subrahmanyam initial guess
        let mut vol = ((price / spot) * (2.0 * PI / time).sqrt()).clamp(0.01, 5.0);

        let max_iter = 100;
        let tolerance = 1e-6;

        for _ in 0..max_iter {
            let calc = self.greeks(spot, strike, time, vol, opt_type).ok()?;
            let diff = calc.price - price;

            if diff.abs() < tolerance {
                return Some(vol);
            }

            // Unscaled vega for the Newton step
            let vega = calc.vega * 100.0;
            if vega.abs() < 1e-10 {
                break;
            }

            vol = (vol - diff / vega).clamp(0.001, 10.0);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_atm_call_price() {
        let calc = GreeksCalculator::new(0.05);
        let g = calc.greeks(100.0, 100.0, 1.0, 0.20, OptionType::Call).unwrap();
        // Expected ~10.45 for ATM call at these inputs
        assert!(g.price > 10.0 && g.price < 11.0);
    }

    #[test]
    fn test_put_call_parity_on_price() {
        let calc = GreeksCalculator::new(0.05);
        let call = calc.greeks(100.0, 100.0, 1.0, 0.20, OptionType::Call).unwrap();
        let put = calc.greeks(100.0, 100.0, 1.0, 0.20, OptionType::Put).unwrap();

        // C - P = S - K*e^(-rT)
        let rhs = 100.0 - 100.0 * (-0.05_f64).exp();
        assert_relative_eq!(call.price - put.price, rhs, epsilon = 1e-9);
    }

    #[test]
    fn test_put_call_parity_on_delta() {
        let calc = GreeksCalculator::new(0.05);
        for (spot, strike, time, vol) in [
            (100.0, 100.0, 1.0, 0.20),
            (450.0, 420.0, 0.12, 0.35),
            (50.0, 80.0, 2.0, 0.60),
        ] {
            let call = calc.greeks(spot, strike, time, vol, OptionType::Call).unwrap();
            let put = calc.greeks(spot, strike, time, vol, OptionType::Put).unwrap();
            assert_relative_eq!(call.delta - put.delta, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_gamma_vega_match_between_types() {
        let calc = GreeksCalculator::default();
        let call = calc.greeks(100.0, 95.0, 0.5, 0.25, OptionType::Call).unwrap();
        let put = calc.greeks(100.0, 95.0, 0.5, 0.25, OptionType::Put).unwrap();
        assert_relative_eq!(call.gamma, put.gamma, epsilon = 1e-12);
        assert_relative_eq!(call.vega, put.vega, epsilon = 1e-12);
        assert!(call.gamma > 0.0);
        assert!(call.vega > 0.0);
    }

    #[test]
    fn test_expired_option_no_nan() {
        let calc = GreeksCalculator::default();

        let itm_call = calc.greeks(110.0, 100.0, 0.0, 0.20, OptionType::Call).unwrap();
        assert_eq!(itm_call.delta, 1.0);
        assert_eq!(itm_call.price, 10.0);

        let otm_call = calc.greeks(90.0, 100.0, 0.0, 0.20, OptionType::Call).unwrap();
        assert_eq!(otm_call.delta, 0.0);

        let itm_put = calc.greeks(90.0, 100.0, -0.5, 0.20, OptionType::Put).unwrap();
        assert_eq!(itm_put.delta, -1.0);
        assert_eq!(itm_put.price, 10.0);

        for g in [itm_call, otm_call, itm_put] {
            assert_eq!(g.gamma, 0.0);
            assert_eq!(g.theta, 0.0);
            assert_eq!(g.vega, 0.0);
            assert_eq!(g.rho, 0.0);
            assert!(!g.delta.is_nan());
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let calc = GreeksCalculator::default();
        assert!(calc.greeks(-1.0, 100.0, 1.0, 0.2, OptionType::Call).is_err());
        assert!(calc.greeks(100.0, -5.0, 1.0, 0.2, OptionType::Call).is_err());
        assert!(calc.greeks(100.0, 100.0, 1.0, 0.0, OptionType::Call).is_err());
        assert!(calc.greeks(100.0, 100.0, 1.0, -0.2, OptionType::Put).is_err());
        assert!(calc.greeks(f64::NAN, 100.0, 1.0, 0.2, OptionType::Call).is_err());
        assert!(calc
            .greeks(100.0, 100.0, f64::INFINITY, 0.2, OptionType::Put)
            .is_err());
    }

    #[test]
    fn test_extreme_vol_saturates() {
        let calc = GreeksCalculator::default();
        let g = calc.greeks(100.0, 100.0, 1.0, 500.0, OptionType::Call).unwrap();
        assert!(g.delta.is_finite());
        assert!(g.price.is_finite());
        assert_relative_eq!(g.delta, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_call_theta_negative() {
        let calc = GreeksCalculator::new(0.05);
        let g = calc.greeks(100.0, 100.0, 0.25, 0.20, OptionType::Call).unwrap();
        assert!(g.theta < 0.0);
    }

    #[test]
    fn test_implied_vol_roundtrip() {
        let calc = GreeksCalculator::new(0.05);
        let vol = 0.25;
        let price = calc.price(100.0, 100.0, 0.5, vol, OptionType::Call).unwrap();
        let iv = calc
            .implied_vol(100.0, 100.0, 0.5, price, OptionType::Call)
            .unwrap();
        assert_relative_eq!(iv, vol, epsilon = 1e-3);
    }
}
