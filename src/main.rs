//! Command-line entry point for the backtester.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tk_backtest::data::{SyntheticConfig, SyntheticGenerator};
use tk_backtest::engine::BacktestEngine;
use tk_backtest::greeks::GreeksCalculator;
use tk_backtest::metrics::MetricsCalculator;
use tk_backtest::{OptionType, RunConfig};

#[derive(Parser)]
#[command(name = "tk-backtest", about = "VIX-adaptive premium-selling backtester")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a backtest over synthetic market data
    Run {
        /// TOML run configuration; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Trading days of synthetic data to generate
        #[arg(long, default_value_t = 252)]
        days: usize,

        /// Override the configured data seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Price a single option and print its Greeks
    Greeks {
        #[arg(long)]
        spot: f64,

        #[arg(long)]
        strike: f64,

        /// Days to expiration
        #[arg(long)]
        dte: f64,

        /// Annualized implied volatility (0.20 = 20%)
        #[arg(long)]
        vol: f64,

        #[arg(long, default_value_t = 0.05)]
        rate: f64,

        /// Price a put instead of a call
        #[arg(long)]
        put: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Run { config, days, seed } => run_backtest(config, days, seed),
        Command::Greeks {
            spot,
            strike,
            dte,
            vol,
            rate,
            put,
        } => print_greeks(spot, strike, dte, vol, rate, put),
    }
}

fn run_backtest(config: Option<PathBuf>, days: usize, seed: Option<u64>) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => RunConfig::from_toml_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => default_run_config(),
    };
    if let Some(seed) = seed {
        config.seed = seed;
    }

    let data = SyntheticGenerator::new(SyntheticConfig {
        trading_days: days,
        seed: config.seed,
        ..Default::default()
    })
    .generate();

    let engine = BacktestEngine::new(config).context("building engine")?;
    let result = engine.run(&data).context("running backtest")?;

    println!("{}", result.summary());

    let metrics = MetricsCalculator::calculate(&result.trades, &result.daily);
    println!();
    println!("win rate:       {:.1}%", metrics.win_rate_pct);
    println!("profit factor:  {:.2}", metrics.profit_factor);
    println!("expectancy:     {:.2}", metrics.expectancy);
    println!("sharpe:         {:.2}", metrics.sharpe_ratio);
    println!("avg days held:  {:.1}", metrics.avg_days_held);
    if let (Some(peak), Some(trough)) = (metrics.drawdown.peak_date, metrics.drawdown.trough_date)
    {
        println!(
            "worst drawdown: {:.2}% ({} to {}, recovery {})",
            metrics.drawdown.max_drawdown_pct,
            peak,
            trough,
            metrics
                .drawdown
                .recovery_days
                .map(|d| format!("{d} days"))
                .unwrap_or_else(|| "none".to_string()),
        );
    }

    for warning in &result.warnings {
        tracing::warn!(date = %warning.date, strategy = %warning.strategy, "{}", warning.message);
    }

    Ok(())
}

fn print_greeks(
    spot: f64,
    strike: f64,
    dte: f64,
    vol: f64,
    rate: f64,
    put: bool,
) -> anyhow::Result<()> {
    let opt_type = if put { OptionType::Put } else { OptionType::Call };
    let g = GreeksCalculator::new(rate).greeks(spot, strike, dte / 365.0, vol, opt_type)?;

    println!("price: {:.4}", g.price);
    println!("delta: {:.4}", g.delta);
    println!("gamma: {:.6}", g.gamma);
    println!("theta: {:.4}", g.theta);
    println!("vega:  {:.4}", g.vega);
    println!("rho:   {:.4}", g.rho);
    Ok(())
}

/// Runnable out-of-the-box configuration: one SPY put seller on Fridays.
fn default_run_config() -> RunConfig {
    use chrono::Weekday;
    use rust_decimal_macros::dec;
    use tk_backtest::strategy::{EntrySignal, StrategyDefinition};

    RunConfig {
        strategies: vec![StrategyDefinition {
            name: "spy-weekly-put".to_string(),
            symbol: "SPY".to_string(),
            correlation_group: "EQUITIES".to_string(),
            option_type: OptionType::Put,
            entry_days: vec![Weekday::Fri],
            target_dte: 45,
            strike_offset_pct: 0.05,
            signal: EntrySignal::VixBelow { max: 35.0 },
            allocation_pct: 5.0,
            per_contract_capital: dec!(2500),
            profit_target_pct: 50.0,
            stop_loss_pct: 200.0,
            management_dte: 21,
        }],
        ..Default::default()
    }
}
