use clap::{Args, ValueEnum};
use serde_json::Value;

use equity_valuation_core::valuation::dcf::{self, DcfInput, TerminalAssumptions};
use equity_valuation_core::valuation::projection::{self, ProjectionAssumptions};

use crate::input;

/// Operating assumptions shared by `project`, `dcf` and `monte-carlo`.
#[derive(Args, Clone)]
pub struct ProjectionFlags {
    /// Base (year 0) revenue
    #[arg(long, default_value_t = 1000.0)]
    pub start_revenue: f64,

    /// Number of forecast years
    #[arg(long, default_value_t = 5)]
    pub years: u32,

    /// Annual revenue growth (0.08 = 8%)
    #[arg(long, default_value_t = 0.08)]
    pub revenue_growth: f64,

    /// EBITDA margin
    #[arg(long, default_value_t = 0.25)]
    pub ebitda_margin: f64,

    /// D&A as a fraction of revenue
    #[arg(long, default_value_t = 0.03)]
    pub da_pct: f64,

    /// CapEx as a fraction of revenue
    #[arg(long, default_value_t = 0.04)]
    pub capex_pct: f64,

    /// Net working capital as a fraction of revenue
    #[arg(long, default_value_t = 0.10)]
    pub nwc_pct: f64,

    /// Tax rate on positive EBIT
    #[arg(long, default_value_t = 0.25)]
    pub tax_rate: f64,
}

impl ProjectionFlags {
    pub fn to_assumptions(&self) -> ProjectionAssumptions {
        ProjectionAssumptions {
            start_revenue: self.start_revenue,
            years: self.years,
            revenue_growth: self.revenue_growth,
            ebitda_margin: self.ebitda_margin,
            deprec_amor_pct_revenue: self.da_pct,
            capex_pct_revenue: self.capex_pct,
            nwc_pct_revenue: self.nwc_pct,
            tax_rate: self.tax_rate,
        }
    }
}

/// Arguments for a cash flow projection
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct ProjectArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub assumptions: ProjectionFlags,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TerminalMethod {
    Perpetuity,
    ExitMultiple,
}

/// Arguments for DCF valuation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct DcfArgs {
    /// Path to JSON input file with DCF parameters
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub assumptions: ProjectionFlags,

    /// Discount rate (WACC)
    #[arg(long, default_value_t = 0.10)]
    pub wacc: f64,

    /// Terminal value convention
    #[arg(long, value_enum, default_value = "perpetuity")]
    pub terminal_method: TerminalMethod,

    /// Perpetual growth rate after the forecast horizon
    #[arg(long, default_value_t = 0.02)]
    pub terminal_growth: f64,

    /// EV / EBITDA applied to final-year EBITDA
    #[arg(long, default_value_t = 10.0)]
    pub exit_multiple: f64,

    /// Debt minus cash, subtracted from enterprise value
    #[arg(long, default_value_t = 200.0)]
    pub net_debt: f64,

    /// Diluted shares outstanding
    #[arg(long, default_value_t = 50.0)]
    pub shares: f64,
}

pub fn run_project(args: ProjectArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let assumptions: ProjectionAssumptions = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        args.assumptions.to_assumptions()
    };

    assumptions.validate()?;
    let projection = projection::project_cash_flows(&assumptions);
    Ok(serde_json::to_value(projection.rows())?)
}

pub fn run_dcf(args: DcfArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let dcf_input: DcfInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let terminal = match args.terminal_method {
            TerminalMethod::Perpetuity => TerminalAssumptions::Perpetuity {
                terminal_growth: args.terminal_growth,
            },
            TerminalMethod::ExitMultiple => TerminalAssumptions::ExitMultiple {
                multiple: args.exit_multiple,
            },
        };
        DcfInput {
            assumptions: args.assumptions.to_assumptions(),
            wacc: args.wacc,
            terminal,
            net_debt: args.net_debt,
            shares_outstanding: Some(args.shares),
        }
    };

    let result = dcf::calculate_dcf(&dcf_input)?;
    Ok(serde_json::to_value(result)?)
}
