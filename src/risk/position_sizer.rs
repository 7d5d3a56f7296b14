//! Allocation-based integer position sizing.
//!
//! Sizing scales with both the strategy's allocation and the VIX
//! buying-power cap, so the same account deploys fewer contracts in the
//! defensive volatility band than in the normal regimes.

use rust_decimal::Decimal;

use super::limits::{RiskError, RiskManager};
use crate::strategy::StrategyDefinition;

impl RiskManager {
    /// Integer contract count for a new position.
    ///
    /// Target dollars = allocation fraction of account value, scaled by the
    /// VIX buying-power cap; contracts = floor(target / per-contract
    /// capital), minimum 0.
    pub fn position_size(
        &self,
        strategy: &StrategyDefinition,
        account_value: Decimal,
        vix: f64,
    ) -> Result<u32, RiskError> {
        if account_value <= Decimal::ZERO {
            return Err(RiskError::InvalidInput(format!(
                "account value {account_value} must be positive"
            )));
        }

        let bp_pct = self.max_buying_power_usage(vix)?;

        let account: f64 = account_value.try_into().unwrap_or(0.0);
        let per_contract: f64 = strategy.per_contract_capital.try_into().unwrap_or(f64::MAX);
        let target = account * (strategy.allocation_pct / 100.0) * (bp_pct / 100.0);

        if per_contract <= 0.0 {
            return Err(RiskError::InvalidInput(
                "per-contract capital must be positive".to_string(),
            ));
        }

        Ok((target / per_contract).floor().max(0.0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RunConfig;
    use crate::data::OptionType;
    use crate::risk::RiskManager;
    use crate::strategy::{EntrySignal, StrategyDefinition};
    use chrono::Weekday;
    use rust_decimal_macros::dec;

    fn manager() -> RiskManager {
        RiskManager::new(&RunConfig::default())
    }

    fn put_seller() -> StrategyDefinition {
        StrategyDefinition {
            name: "weekly-put".to_string(),
            symbol: "SPY".to_string(),
            correlation_group: "EQUITIES".to_string(),
            option_type: OptionType::Put,
            entry_days: vec![Weekday::Fri],
            target_dte: 45,
            strike_offset_pct: 0.05,
            signal: EntrySignal::Always,
            allocation_pct: 5.0,
            per_contract_capital: dec!(2500),
            profit_target_pct: 50.0,
            stop_loss_pct: 200.0,
            management_dte: 21,
        }
    }

    #[test]
    fn test_position_size() {
        let rm = manager();
        let strategy = put_seller();

        // 100K * 5% * 65% (vix 15) = 3250 target / 2500 per contract = 1
        let contracts = rm.position_size(&strategy, dec!(100_000), 15.0).unwrap();
        assert_eq!(contracts, 1);

        // 500K * 5% * 65% = 16250 / 2500 = 6
        let contracts = rm.position_size(&strategy, dec!(500_000), 15.0).unwrap();
        assert_eq!(contracts, 6);

        // Small account floors to zero contracts
        let contracts = rm.position_size(&strategy, dec!(10_000), 15.0).unwrap();
        assert_eq!(contracts, 0);
    }

    #[test]
    fn test_size_shrinks_in_defensive_band() {
        let rm = manager();
        let mut strategy = put_seller();
        strategy.allocation_pct = 10.0;

        // vix 20 -> 75% cap -> 7500 / 2500 = 3; vix 27 -> 50% cap -> 2
        assert_eq!(rm.position_size(&strategy, dec!(100_000), 20.0).unwrap(), 3);
        assert_eq!(rm.position_size(&strategy, dec!(100_000), 27.0).unwrap(), 2);
    }

    #[test]
    fn test_position_size_invalid_inputs() {
        let rm = manager();
        let strategy = put_seller();
        assert!(rm.position_size(&strategy, dec!(0), 15.0).is_err());
        assert!(rm.position_size(&strategy, dec!(100_000), f64::NAN).is_err());
        assert!(rm.position_size(&strategy, dec!(100_000), -1.0).is_err());
    }
}
