use clap::Args;
use serde_json::Value;

use equity_valuation_core::monte_carlo::simulation::{
    self, McDcfInput, NormalParams, StochasticParams,
};

use crate::commands::valuation::ProjectionFlags;
use crate::input;

/// Arguments for the Monte Carlo DCF. Revenue growth, EBITDA margin and
/// WACC are sampled around the flag values.
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct MonteCarloArgs {
    /// Path to JSON input file with simulation parameters
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub assumptions: ProjectionFlags,

    /// Standard deviation of revenue growth
    #[arg(long, default_value_t = 0.02)]
    pub growth_std: f64,

    /// Standard deviation of EBITDA margin
    #[arg(long, default_value_t = 0.03)]
    pub margin_std: f64,

    /// Mean discount rate (WACC)
    #[arg(long, default_value_t = 0.10)]
    pub wacc: f64,

    /// Standard deviation of WACC
    #[arg(long, default_value_t = 0.01)]
    pub wacc_std: f64,

    /// Perpetual growth rate after the forecast horizon
    #[arg(long, default_value_t = 0.02)]
    pub terminal_growth: f64,

    /// Debt minus cash, subtracted from enterprise value
    #[arg(long, default_value_t = 200.0)]
    pub net_debt: f64,

    /// Diluted shares outstanding
    #[arg(long, default_value_t = 50.0)]
    pub shares: f64,

    /// Number of trials
    #[arg(long, default_value_t = 10_000)]
    pub trials: u32,

    /// Seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_monte_carlo(args: MonteCarloArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mc_input: McDcfInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let base = args.assumptions.to_assumptions();
        McDcfInput {
            stochastic: StochasticParams {
                revenue_growth: NormalParams {
                    mean: base.revenue_growth,
                    std_dev: args.growth_std,
                },
                ebitda_margin: NormalParams {
                    mean: base.ebitda_margin,
                    std_dev: args.margin_std,
                },
                wacc: NormalParams {
                    mean: args.wacc,
                    std_dev: args.wacc_std,
                },
            },
            base,
            terminal_growth: args.terminal_growth,
            net_debt: args.net_debt,
            shares_outstanding: Some(args.shares),
            num_trials: args.trials,
            seed: args.seed,
        }
    };

    let result = simulation::run_monte_carlo_dcf(&mc_input)?;
    Ok(serde_json::to_value(result)?)
}
