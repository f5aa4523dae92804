use clap::Args;
use serde_json::Value;

use equity_valuation_core::pe::lbo::{self, LboInput};

use crate::input;

/// Arguments for a simplified LBO
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct LboArgs {
    /// Path to JSON input file with LBO parameters
    #[arg(long)]
    pub input: Option<String>,

    /// EBITDA at entry
    #[arg(long, default_value_t = 100.0)]
    pub entry_ebitda: f64,

    /// Entry EV / EBITDA
    #[arg(long, default_value_t = 10.0)]
    pub entry_multiple: f64,

    /// Entry debt / EBITDA
    #[arg(long, default_value_t = 6.0)]
    pub leverage: f64,

    /// Annual EBITDA growth
    #[arg(long, default_value_t = 0.05)]
    pub ebitda_growth: f64,

    /// Holding period in years
    #[arg(long, default_value_t = 5)]
    pub years: u32,

    /// Interest rate on outstanding debt
    #[arg(long, default_value_t = 0.08)]
    pub interest_rate: f64,

    /// Exit EV / EBITDA
    #[arg(long, default_value_t = 10.0)]
    pub exit_multiple: f64,

    /// Fraction of post-interest cash swept to debt repayment
    #[arg(long, default_value_t = 1.0)]
    pub cash_sweep: f64,
}

pub fn run_lbo(args: LboArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let lbo_input: LboInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        LboInput {
            entry_ebitda: args.entry_ebitda,
            entry_multiple: args.entry_multiple,
            leverage_multiple: args.leverage,
            ebitda_growth: args.ebitda_growth,
            years: args.years,
            interest_rate: args.interest_rate,
            exit_multiple: args.exit_multiple,
            cash_sweep: args.cash_sweep,
        }
    };

    let result = lbo::build_lbo(&lbo_input)?;
    Ok(serde_json::to_value(result)?)
}
