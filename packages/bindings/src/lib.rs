use napi::Result as NapiResult;
use napi_derive::napi;

use equity_valuation_core::monte_carlo::simulation::{self, McDcfInput};
use equity_valuation_core::pe::lbo::{self, LboInput};
use equity_valuation_core::valuation::dcf::{self, DcfInput};
use equity_valuation_core::valuation::projection::{self, ProjectionAssumptions};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

#[napi]
pub fn project_cash_flows(input_json: String) -> NapiResult<String> {
    let input: ProjectionAssumptions = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = projection::project_cash_flows(&input);
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn calculate_dcf(input_json: String) -> NapiResult<String> {
    let input: DcfInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = dcf::calculate_dcf(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Monte Carlo
// ---------------------------------------------------------------------------

#[napi]
pub fn run_monte_carlo_dcf(input_json: String) -> NapiResult<String> {
    let input: McDcfInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = simulation::run_monte_carlo_dcf(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Private Equity
// ---------------------------------------------------------------------------

#[napi]
pub fn build_lbo(input_json: String) -> NapiResult<String> {
    let input: LboInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = lbo::build_lbo(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
