mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::monte_carlo::MonteCarloArgs;
use commands::pe::LboArgs;
use commands::valuation::{DcfArgs, ProjectArgs};

/// Equity valuation: DCF, Monte Carlo DCF and simplified LBO returns
#[derive(Parser)]
#[command(
    name = "eqval",
    version,
    about = "Equity valuation: DCF, Monte Carlo DCF and LBO returns",
    long_about = "A CLI for valuing a company from operating assumptions. Projects \
                  free cash flow, values it with a perpetuity or exit-multiple \
                  terminal value, simulates the per-share price distribution and \
                  estimates sponsor returns from a simplified leveraged buyout."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log debug events to stderr (overrides EQVAL_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Project free cash flow year by year
    Project(ProjectArgs),
    /// Run a Discounted Cash Flow valuation
    Dcf(DcfArgs),
    /// Simulate the per-share price distribution of the DCF
    MonteCarlo(MonteCarloArgs),
    /// Simplified leveraged buyout returns (MOIC, IRR)
    Lbo(LboArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("EQVAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Project(args) => commands::valuation::run_project(args),
        Commands::Dcf(args) => commands::valuation::run_dcf(args),
        Commands::MonteCarlo(args) => commands::monte_carlo::run_monte_carlo(args),
        Commands::Lbo(args) => commands::pe::run_lbo(args),
        Commands::Version => {
            println!("eqval {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
