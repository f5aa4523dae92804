use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{ensure_finite, Money, Rate};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Deterministic operating assumptions for a free-cash-flow projection.
/// All rates are decimals (0.08 = 8%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionAssumptions {
    /// Base (year 0) revenue. Year 1 is the first escalated value.
    pub start_revenue: Money,
    /// Number of explicit forecast years
    pub years: u32,
    /// Annual revenue growth, applied every year including year 1
    pub revenue_growth: Rate,
    /// EBITDA as a fraction of revenue
    pub ebitda_margin: Rate,
    /// Depreciation & amortisation as a fraction of revenue
    pub deprec_amor_pct_revenue: Rate,
    /// Capital expenditure as a fraction of revenue
    pub capex_pct_revenue: Rate,
    /// Net working capital level as a fraction of revenue
    pub nwc_pct_revenue: Rate,
    /// Tax rate on positive EBIT
    pub tax_rate: Rate,
}

/// Year-by-year projection. Every sequence has one entry per forecast year,
/// index 0 being year 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearlyProjection {
    pub revenues: Vec<Money>,
    pub ebitdas: Vec<Money>,
    pub ebits: Vec<Money>,
    pub deprec_amor: Vec<Money>,
    pub nopats: Vec<Money>,
    pub nwcs: Vec<Money>,
    pub change_nwcs: Vec<Money>,
    pub capexs: Vec<Money>,
    pub fcfs: Vec<Money>,
}

/// One row of a [`YearlyProjection`], for tabular display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionYear {
    pub year: u32,
    pub revenue: Money,
    pub ebitda: Money,
    pub deprec_amor: Money,
    pub ebit: Money,
    pub nopat: Money,
    pub nwc: Money,
    pub change_nwc: Money,
    pub capex: Money,
    pub fcf: Money,
}

impl ProjectionAssumptions {
    /// Checks the inputs the projection itself never rejects: a positive
    /// starting revenue, at least one year, and finite rates.
    pub fn validate(&self) -> ValuationResult<()> {
        ensure_finite("start_revenue", self.start_revenue)?;
        if self.start_revenue <= 0.0 {
            return Err(ValuationError::invalid(
                "start_revenue",
                "Starting revenue must be positive",
            ));
        }
        if self.years == 0 {
            return Err(ValuationError::invalid(
                "years",
                "At least one forecast year is required",
            ));
        }
        ensure_finite("revenue_growth", self.revenue_growth)?;
        ensure_finite("ebitda_margin", self.ebitda_margin)?;
        ensure_finite("deprec_amor_pct_revenue", self.deprec_amor_pct_revenue)?;
        ensure_finite("capex_pct_revenue", self.capex_pct_revenue)?;
        ensure_finite("nwc_pct_revenue", self.nwc_pct_revenue)?;
        ensure_finite("tax_rate", self.tax_rate)?;
        Ok(())
    }
}

impl YearlyProjection {
    pub fn len(&self) -> usize {
        self.fcfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fcfs.is_empty()
    }

    /// EBITDA of the final forecast year, used by the exit-multiple terminal value.
    pub fn terminal_ebitda(&self) -> Option<Money> {
        self.ebitdas.last().copied()
    }

    pub fn rows(&self) -> Vec<ProjectionYear> {
        (0..self.len())
            .map(|i| ProjectionYear {
                year: i as u32 + 1,
                revenue: self.revenues[i],
                ebitda: self.ebitdas[i],
                deprec_amor: self.deprec_amor[i],
                ebit: self.ebits[i],
                nopat: self.nopats[i],
                nwc: self.nwcs[i],
                change_nwc: self.change_nwcs[i],
                capex: self.capexs[i],
                fcf: self.fcfs[i],
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Project unlevered free cash flow year by year.
///
/// Revenue compounds from `start_revenue` every year. NWC is recomputed from
/// each year's revenue; only the prior year's level is carried forward to
/// form the change, with the base level taken from `start_revenue`. Losses
/// are untaxed and create no carryforward.
///
/// Never fails: inputs are used as given. Call
/// [`ProjectionAssumptions::validate`] first when they come from a user.
pub fn project_cash_flows(assumptions: &ProjectionAssumptions) -> YearlyProjection {
    let n = assumptions.years as usize;
    let mut out = YearlyProjection {
        revenues: Vec::with_capacity(n),
        ebitdas: Vec::with_capacity(n),
        ebits: Vec::with_capacity(n),
        deprec_amor: Vec::with_capacity(n),
        nopats: Vec::with_capacity(n),
        nwcs: Vec::with_capacity(n),
        change_nwcs: Vec::with_capacity(n),
        capexs: Vec::with_capacity(n),
        fcfs: Vec::with_capacity(n),
    };

    let mut revenue = assumptions.start_revenue;
    let mut nwc_prev = assumptions.start_revenue * assumptions.nwc_pct_revenue;

    for _ in 0..assumptions.years {
        revenue *= 1.0 + assumptions.revenue_growth;

        let ebitda = revenue * assumptions.ebitda_margin;
        let da = revenue * assumptions.deprec_amor_pct_revenue;
        let ebit = ebitda - da;

        let tax = ebit.max(0.0) * assumptions.tax_rate;
        let nopat = ebit - tax;

        let nwc = revenue * assumptions.nwc_pct_revenue;
        let change_nwc = nwc - nwc_prev;
        let capex = revenue * assumptions.capex_pct_revenue;

        let fcf = nopat + da - (change_nwc + capex);

        out.revenues.push(revenue);
        out.ebitdas.push(ebitda);
        out.ebits.push(ebit);
        out.deprec_amor.push(da);
        out.nopats.push(nopat);
        out.nwcs.push(nwc);
        out.change_nwcs.push(change_nwc);
        out.capexs.push(capex);
        out.fcfs.push(fcf);

        nwc_prev = nwc;
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_assumptions() -> ProjectionAssumptions {
        ProjectionAssumptions {
            start_revenue: 1000.0,
            years: 5,
            revenue_growth: 0.08,
            ebitda_margin: 0.25,
            deprec_amor_pct_revenue: 0.03,
            capex_pct_revenue: 0.04,
            nwc_pct_revenue: 0.10,
            tax_rate: 0.25,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        let tol = 1e-9 * expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_year1_values() {
        let p = project_cash_flows(&sample_assumptions());

        // Revenue = 1000 * 1.08 = 1080
        assert_close(p.revenues[0], 1080.0);
        // EBITDA = 1080 * 0.25 = 270
        assert_close(p.ebitdas[0], 270.0);
        // D&A = 1080 * 0.03 = 32.4
        assert_close(p.deprec_amor[0], 32.4);
        // EBIT = 270 - 32.4 = 237.6
        assert_close(p.ebits[0], 237.6);
        // NOPAT = 237.6 * 0.75 = 178.2
        assert_close(p.nopats[0], 178.2);
        // NWC change = 108 - 100 = 8
        assert_close(p.change_nwcs[0], 8.0);
        // CapEx = 1080 * 0.04 = 43.2
        assert_close(p.capexs[0], 43.2);
        // FCF = 178.2 + 32.4 - (8 + 43.2) = 159.4
        assert_close(p.fcfs[0], 159.4);
    }

    #[test]
    fn test_sequence_lengths() {
        let p = project_cash_flows(&sample_assumptions());
        assert_eq!(p.len(), 5);
        for seq in [
            &p.revenues,
            &p.ebitdas,
            &p.ebits,
            &p.deprec_amor,
            &p.nopats,
            &p.nwcs,
            &p.change_nwcs,
            &p.capexs,
        ] {
            assert_eq!(seq.len(), 5);
        }
        assert_eq!(p.rows().len(), 5);
        assert_eq!(p.rows()[4].year, 5);
    }

    #[test]
    fn test_final_year_fcf() {
        let p = project_cash_flows(&sample_assumptions());
        assert_close(p.fcfs[4], 216.861940224);
        assert_close(p.terminal_ebitda().unwrap(), 1000.0 * 1.08_f64.powi(5) * 0.25);
    }

    #[test]
    fn test_nwc_change_uses_prior_year_level() {
        let p = project_cash_flows(&sample_assumptions());
        for t in 1..p.len() {
            assert_close(p.change_nwcs[t], p.nwcs[t] - p.nwcs[t - 1]);
        }
    }

    #[test]
    fn test_losses_are_not_taxed() {
        let mut a = sample_assumptions();
        a.ebitda_margin = 0.01; // EBIT negative once D&A is 3%
        let p = project_cash_flows(&a);
        assert!(p.ebits[0] < 0.0);
        assert_eq!(p.nopats[0], p.ebits[0]);
    }

    #[test]
    fn test_zero_years_is_empty() {
        let mut a = sample_assumptions();
        a.years = 0;
        let p = project_cash_flows(&a);
        assert!(p.is_empty());
        assert!(p.terminal_ebitda().is_none());
    }

    #[test]
    fn test_validate_rejects_non_positive_revenue() {
        let mut a = sample_assumptions();
        a.start_revenue = 0.0;
        assert!(a.validate().is_err());
        a.start_revenue = -100.0;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_years() {
        let mut a = sample_assumptions();
        a.years = 0;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nan_rate() {
        let mut a = sample_assumptions();
        a.tax_rate = f64::NAN;
        assert!(a.validate().is_err());
        assert!(sample_assumptions().validate().is_ok());
    }
}
