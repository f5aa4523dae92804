use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{ensure_finite, with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::ValuationResult;

use super::projection::{project_cash_flows, ProjectionAssumptions, YearlyProjection};

/// PV(TV) share of EV above which a warning is raised.
const TERMINAL_VALUE_WARNING_PCT: f64 = 0.75;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Terminal value convention. Exactly one is active per valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TerminalAssumptions {
    /// Growing perpetuity: TV = FCF_last * (1+g) / (WACC - g). Requires g < WACC.
    Perpetuity { terminal_growth: Rate },
    /// Exit multiple: TV = terminal-year EBITDA * multiple
    ExitMultiple { multiple: Multiple },
}

/// Discounting result for a sequence of free cash flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcfResult {
    /// 1 / (1+WACC)^t for t = 1..n
    pub discount_factors: Vec<Rate>,
    /// FCF_t * discount_factor_t, index-aligned with the projection
    pub pv_fcfs: Vec<Money>,
    /// Undiscounted terminal value at the end of the forecast horizon
    pub terminal_value: Money,
    /// Terminal value discounted with the final period's factor
    pub pv_terminal: Money,
    pub enterprise_value: Money,
    /// Enterprise value less net debt
    pub equity_value: Money,
    /// Present only when shares outstanding is supplied and positive
    pub price_per_share: Option<Money>,
}

/// Input for a combined projection + DCF valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfInput {
    #[serde(flatten)]
    pub assumptions: ProjectionAssumptions,
    /// Weighted average cost of capital (discount rate)
    pub wacc: Rate,
    pub terminal: TerminalAssumptions,
    /// Debt minus cash, for the equity bridge
    #[serde(default)]
    pub net_debt: Money,
    /// Shares outstanding for per-share value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares_outstanding: Option<f64>,
}

/// Output of [`calculate_dcf`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfValuation {
    pub projection: YearlyProjection,
    pub valuation: DcfResult,
    /// Sum of present values of explicit-period FCFs
    pub sum_pv_fcfs: Money,
    /// PV of terminal value as a fraction of enterprise value
    pub terminal_value_pct: Rate,
    /// Terminal value / terminal-year EBITDA
    pub implied_exit_multiple: Multiple,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Discount a sequence of free cash flows and bridge to equity value.
///
/// Cash flow `t` (1-based) is discounted by `1 / (1+wacc)^t`. The terminal
/// value is realised at the end of the explicit horizon, so it shares the
/// final period's discount factor. `terminal_year_ebitda` is only read by
/// the exit-multiple convention, which fails without it.
pub fn value_cash_flows(
    fcfs: &[Money],
    wacc: Rate,
    terminal: &TerminalAssumptions,
    terminal_year_ebitda: Option<Money>,
    net_debt: Money,
    shares_outstanding: Option<f64>,
) -> ValuationResult<DcfResult> {
    if fcfs.is_empty() {
        return Err(ValuationError::invalid(
            "fcfs",
            "At least one free cash flow is required",
        ));
    }
    ensure_finite("wacc", wacc)?;
    if wacc <= -1.0 {
        return Err(ValuationError::invalid(
            "wacc",
            "WACC must be greater than -100%",
        ));
    }
    ensure_finite("net_debt", net_debt)?;

    let one_plus_wacc = 1.0 + wacc;
    let discount_factors: Vec<Rate> = (1..=fcfs.len())
        .map(|t| 1.0 / one_plus_wacc.powi(t as i32))
        .collect();
    let pv_fcfs: Vec<Money> = fcfs
        .iter()
        .zip(&discount_factors)
        .map(|(fcf, df)| fcf * df)
        .collect();

    let terminal_value = terminal_value(fcfs, wacc, terminal, terminal_year_ebitda)?;

    let df_terminal = discount_factors[discount_factors.len() - 1];
    let pv_terminal = terminal_value * df_terminal;

    let enterprise_value = pv_fcfs.iter().sum::<Money>() + pv_terminal;
    let equity_value = enterprise_value - net_debt;

    let price_per_share = match shares_outstanding {
        Some(shares) if shares > 0.0 => Some(equity_value / shares),
        _ => None,
    };

    tracing::debug!(
        wacc,
        terminal = ?terminal,
        enterprise_value,
        "discounted cash flows"
    );

    Ok(DcfResult {
        discount_factors,
        pv_fcfs,
        terminal_value,
        pv_terminal,
        enterprise_value,
        equity_value,
        price_per_share,
    })
}

/// Project free cash flows and value them in one step.
///
/// The exit-multiple convention uses the final projected year's EBITDA.
pub fn calculate_dcf(input: &DcfInput) -> ValuationResult<ComputationOutput<DcfValuation>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    input.assumptions.validate()?;

    let projection = project_cash_flows(&input.assumptions);
    let valuation = value_cash_flows(
        &projection.fcfs,
        input.wacc,
        &input.terminal,
        projection.terminal_ebitda(),
        input.net_debt,
        input.shares_outstanding,
    )?;

    let sum_pv_fcfs: Money = valuation.pv_fcfs.iter().sum();

    let terminal_value_pct = if valuation.enterprise_value == 0.0 {
        0.0
    } else {
        valuation.pv_terminal / valuation.enterprise_value
    };
    if terminal_value_pct > TERMINAL_VALUE_WARNING_PCT {
        warnings.push(format!(
            "Terminal value represents {:.1}% of enterprise value; consider extending the explicit forecast period",
            terminal_value_pct * 100.0
        ));
    }

    let implied_exit_multiple = match projection.terminal_ebitda() {
        Some(ebitda) if ebitda != 0.0 => valuation.terminal_value / ebitda,
        _ => 0.0,
    };

    if valuation.price_per_share.is_none() {
        warnings.push(
            "No per-share value: shares outstanding not supplied or not positive".into(),
        );
    }

    let output = DcfValuation {
        projection,
        valuation,
        sum_pv_fcfs,
        terminal_value_pct,
        implied_exit_multiple,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "FCFF DCF (end-of-year discounting)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn terminal_value(
    fcfs: &[Money],
    wacc: Rate,
    terminal: &TerminalAssumptions,
    terminal_year_ebitda: Option<Money>,
) -> ValuationResult<Money> {
    match *terminal {
        TerminalAssumptions::Perpetuity { terminal_growth } => {
            ensure_finite("terminal_growth", terminal_growth)?;
            if terminal_growth >= wacc {
                return Err(ValuationError::invalid(
                    "terminal_growth",
                    format!(
                        "Terminal growth ({terminal_growth}) must be less than WACC ({wacc})"
                    ),
                ));
            }
            let fcf_last = fcfs[fcfs.len() - 1];
            Ok(fcf_last * (1.0 + terminal_growth) / (wacc - terminal_growth))
        }
        TerminalAssumptions::ExitMultiple { multiple } => {
            ensure_finite("multiple", multiple)?;
            let ebitda = terminal_year_ebitda.ok_or_else(|| {
                ValuationError::invalid(
                    "terminal_year_ebitda",
                    "Required for the exit multiple terminal method",
                )
            })?;
            Ok(ebitda * multiple)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FCFS: [f64; 5] = [
        159.4,
        172.152,
        185.92416,
        200.7980928,
        216.861940224,
    ];

    fn sample_dcf_input() -> DcfInput {
        DcfInput {
            assumptions: ProjectionAssumptions {
                start_revenue: 1000.0,
                years: 5,
                revenue_growth: 0.08,
                ebitda_margin: 0.25,
                deprec_amor_pct_revenue: 0.03,
                capex_pct_revenue: 0.04,
                nwc_pct_revenue: 0.10,
                tax_rate: 0.25,
            },
            wacc: 0.10,
            terminal: TerminalAssumptions::Perpetuity {
                terminal_growth: 0.02,
            },
            net_debt: 200.0,
            shares_outstanding: Some(50.0),
        }
    }

    fn perpetuity(g: f64) -> TerminalAssumptions {
        TerminalAssumptions::Perpetuity { terminal_growth: g }
    }

    #[test]
    fn test_perpetuity_terminal_value() {
        let r = value_cash_flows(&FCFS, 0.10, &perpetuity(0.02), None, 200.0, Some(50.0)).unwrap();
        // TV = 216.861940224 * 1.02 / 0.08
        assert!((r.terminal_value - 2764.989737856).abs() < 1e-6);
        assert!((r.enterprise_value - 2415.514132641).abs() < 1e-6);
        assert!((r.equity_value - 2215.514132641).abs() < 1e-6);
        assert!((r.price_per_share.unwrap() - 44.310282653).abs() < 1e-6);
    }

    #[test]
    fn test_discount_factors() {
        let r = value_cash_flows(&FCFS, 0.10, &perpetuity(0.02), None, 0.0, None).unwrap();
        assert_eq!(r.discount_factors.len(), 5);
        assert_eq!(r.pv_fcfs.len(), 5);
        assert!((r.discount_factors[0] - 1.0 / 1.1).abs() < 1e-15);
        assert!((r.pv_fcfs[0] - 159.4 / 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_terminal_uses_final_discount_factor() {
        let r = value_cash_flows(&FCFS, 0.10, &perpetuity(0.02), None, 0.0, None).unwrap();
        let ratio = r.pv_terminal / r.terminal_value;
        assert!((ratio - r.discount_factors[4]).abs() < 1e-15);
    }

    #[test]
    fn test_growth_equal_to_wacc_rejected() {
        let r = value_cash_flows(&FCFS, 0.10, &perpetuity(0.10), None, 0.0, None);
        assert!(matches!(r, Err(ValuationError::InvalidInput { .. })));
    }

    #[test]
    fn test_growth_above_wacc_rejected() {
        let r = value_cash_flows(&FCFS, 0.10, &perpetuity(0.12), None, 0.0, None);
        assert!(matches!(r, Err(ValuationError::InvalidInput { .. })));
    }

    #[test]
    fn test_empty_fcfs_rejected() {
        let r = value_cash_flows(&[], 0.10, &perpetuity(0.02), None, 0.0, None);
        assert!(matches!(r, Err(ValuationError::InvalidInput { .. })));
    }

    #[test]
    fn test_exit_multiple_requires_ebitda() {
        let terminal = TerminalAssumptions::ExitMultiple { multiple: 10.0 };
        let r = value_cash_flows(&FCFS, 0.10, &terminal, None, 0.0, None);
        assert!(matches!(r, Err(ValuationError::InvalidInput { .. })));

        let r = value_cash_flows(&FCFS, 0.10, &terminal, Some(367.33), 0.0, None).unwrap();
        assert!((r.terminal_value - 3673.3).abs() < 1e-9);
    }

    #[test]
    fn test_price_absent_without_positive_shares() {
        for shares in [None, Some(0.0), Some(-5.0)] {
            let r = value_cash_flows(&FCFS, 0.10, &perpetuity(0.02), None, 0.0, shares).unwrap();
            assert!(r.price_per_share.is_none(), "shares={shares:?}");
        }
    }

    #[test]
    fn test_calculate_dcf_perpetuity() {
        let result = calculate_dcf(&sample_dcf_input()).unwrap();
        let out = &result.result;
        assert_eq!(out.projection.len(), 5);
        assert!((out.valuation.price_per_share.unwrap() - 44.310282653).abs() < 1e-6);
        assert!((out.sum_pv_fcfs + out.valuation.pv_terminal - out.valuation.enterprise_value).abs() < 1e-9);
        assert!(out.terminal_value_pct > 0.0 && out.terminal_value_pct < 1.0);
        assert_eq!(result.methodology, "FCFF DCF (end-of-year discounting)");
        assert_eq!(result.metadata.precision, "ieee754_f64");
    }

    #[test]
    fn test_calculate_dcf_exit_multiple_uses_final_year_ebitda() {
        let mut input = sample_dcf_input();
        input.terminal = TerminalAssumptions::ExitMultiple { multiple: 10.0 };
        let result = calculate_dcf(&input).unwrap();
        let out = &result.result;
        let last_ebitda = out.projection.terminal_ebitda().unwrap();
        assert!((out.valuation.terminal_value - last_ebitda * 10.0).abs() < 1e-9);
        assert!((out.implied_exit_multiple - 10.0).abs() < 1e-12);
        assert!((out.valuation.price_per_share.unwrap() - 55.590317600).abs() < 1e-6);
    }

    #[test]
    fn test_calculate_dcf_warns_on_missing_shares() {
        let mut input = sample_dcf_input();
        input.shares_outstanding = None;
        let result = calculate_dcf(&input).unwrap();
        assert!(result.result.valuation.price_per_share.is_none());
        assert!(result.warnings.iter().any(|w| w.contains("per-share")));
    }

    #[test]
    fn test_calculate_dcf_rejects_zero_years() {
        let mut input = sample_dcf_input();
        input.assumptions.years = 0;
        assert!(calculate_dcf(&input).is_err());
    }

    #[test]
    fn test_terminal_assumptions_serde_tag() {
        let json = r#"{"method":"exit_multiple","multiple":8.5}"#;
        let t: TerminalAssumptions = serde_json::from_str(json).unwrap();
        assert_eq!(t, TerminalAssumptions::ExitMultiple { multiple: 8.5 });
    }
}
