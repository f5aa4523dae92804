use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::time_value;
use crate::types::*;
use crate::ValuationResult;

/// Starting point for the IRR solve.
const IRR_GUESS: Rate = 0.10;

fn default_cash_sweep() -> Rate {
    1.0
}

/// Input for a simplified single-tranche LBO.
///
/// No taxes, capex or working capital: every unit of EBITDA left after
/// interest is available for debt paydown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LboInput {
    /// EBITDA at entry (year 0)
    pub entry_ebitda: Money,
    /// Entry EV / EBITDA
    pub entry_multiple: Multiple,
    /// Entry debt / EBITDA
    pub leverage_multiple: Multiple,
    /// Annual EBITDA growth
    pub ebitda_growth: Rate,
    /// Holding period in years
    pub years: u32,
    /// Interest rate charged on the prior year's closing debt
    pub interest_rate: Rate,
    /// Exit EV / EBITDA
    pub exit_multiple: Multiple,
    /// Fraction of post-interest cash swept to debt repayment
    #[serde(default = "default_cash_sweep")]
    pub cash_sweep: Rate,
}

/// Result of the LBO simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LboResult {
    pub ev_entry: Money,
    pub debt_entry: Money,
    pub equity_entry: Money,
    pub ev_exit: Money,
    pub final_debt: Money,
    pub equity_exit: Money,
    /// Multiple on Invested Capital
    pub moic: Multiple,
    /// Sponsor IRR on the equity cash flows
    pub irr: Rate,
    /// EBITDA by year, index 0 = entry (length years + 1)
    pub ebitdas: Vec<Money>,
    /// Closing debt by year, index 0 = entry (length years + 1)
    pub debts: Vec<Money>,
    /// Interest by year, index 0 = year 1 (length years)
    pub interests: Vec<Money>,
    /// Equity cash flows used for the IRR: [-entry, 0, ..., 0, exit]
    pub equity_cash_flows: Vec<Money>,
    /// Entry debt / entry EBITDA
    pub entry_leverage: Multiple,
    /// Final debt / exit EBITDA
    pub exit_leverage: Multiple,
}

/// Simulate debt paydown and EBITDA growth, then solve for equity returns.
///
/// Each year EBITDA grows, interest accrues on the prior year's closing debt,
/// and `cash_sweep` of the remaining cash repays debt. Repayment is floored at
/// zero and capped at the outstanding balance, so debt never goes negative.
/// Equity receives nothing until exit.
pub fn simulate_lbo(input: &LboInput) -> ValuationResult<LboResult> {
    validate_lbo_input(input)?;

    let ev_entry = input.entry_ebitda * input.entry_multiple;
    let debt_entry = input.entry_ebitda * input.leverage_multiple;
    let equity_entry = ev_entry - debt_entry;

    let n = input.years as usize;
    let mut ebitdas: Vec<Money> = Vec::with_capacity(n + 1);
    let mut debts: Vec<Money> = Vec::with_capacity(n + 1);
    let mut interests: Vec<Money> = Vec::with_capacity(n);
    ebitdas.push(input.entry_ebitda);
    debts.push(debt_entry);

    let mut ebitda = input.entry_ebitda;
    let mut debt = debt_entry;

    for _ in 0..input.years {
        ebitda *= 1.0 + input.ebitda_growth;
        let interest = debt * input.interest_rate;
        let cash_available = ebitda - interest;
        let paydown = (cash_available * input.cash_sweep).max(0.0).min(debt);
        debt -= paydown;

        ebitdas.push(ebitda);
        interests.push(interest);
        debts.push(debt);
    }

    let ev_exit = ebitda * input.exit_multiple;
    let final_debt = debt;
    let equity_exit = ev_exit - final_debt;

    if equity_entry == 0.0 {
        return Err(ValuationError::DivisionByZero {
            context: "MOIC: entry equity is zero".into(),
        });
    }
    let moic = equity_exit / equity_entry;

    let mut equity_cash_flows: Vec<Money> = vec![0.0; n + 1];
    equity_cash_flows[0] = -equity_entry;
    equity_cash_flows[n] = equity_exit;

    let irr = time_value::irr(&equity_cash_flows, IRR_GUESS)?;

    let entry_leverage = input.leverage_multiple;
    let exit_leverage = if ebitda == 0.0 {
        0.0
    } else {
        final_debt / ebitda
    };

    tracing::debug!(irr, moic, final_debt, "LBO simulated");

    Ok(LboResult {
        ev_entry,
        debt_entry,
        equity_entry,
        ev_exit,
        final_debt,
        equity_exit,
        moic,
        irr,
        ebitdas,
        debts,
        interests,
        equity_cash_flows,
        entry_leverage,
        exit_leverage,
    })
}

/// Run the LBO and wrap the result with warnings and metadata.
pub fn build_lbo(input: &LboInput) -> ValuationResult<ComputationOutput<LboResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if !(0.0..=1.0).contains(&input.cash_sweep) {
        warnings.push(format!(
            "Cash sweep of {:.1}% is outside 0-100%",
            input.cash_sweep * 100.0
        ));
    }

    let result = simulate_lbo(input)?;

    if result.equity_entry < 0.0 {
        warnings.push(format!(
            "Entry debt ({:.2}) exceeds entry enterprise value ({:.2}); equity is negative",
            result.debt_entry, result.ev_entry
        ));
    }
    if result.debt_entry > 0.0 {
        if let Some(year) = result.debts.iter().skip(1).position(|d| *d == 0.0) {
            warnings.push(format!("Debt fully repaid in year {}", year + 1));
        }
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Simplified Leveraged Buyout",
        input,
        warnings,
        elapsed,
        result,
    ))
}

fn validate_lbo_input(input: &LboInput) -> ValuationResult<()> {
    ensure_finite("entry_ebitda", input.entry_ebitda)?;
    if input.entry_ebitda <= 0.0 {
        return Err(ValuationError::invalid(
            "entry_ebitda",
            "Entry EBITDA must be positive",
        ));
    }
    if input.years == 0 {
        return Err(ValuationError::invalid(
            "years",
            "Holding period must be at least 1 year",
        ));
    }
    ensure_finite("entry_multiple", input.entry_multiple)?;
    ensure_finite("leverage_multiple", input.leverage_multiple)?;
    ensure_finite("ebitda_growth", input.ebitda_growth)?;
    ensure_finite("interest_rate", input.interest_rate)?;
    ensure_finite("exit_multiple", input.exit_multiple)?;
    ensure_finite("cash_sweep", input.cash_sweep)?;
    Ok(())
}
