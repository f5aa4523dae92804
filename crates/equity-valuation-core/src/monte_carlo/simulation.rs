use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{ensure_finite, with_metadata, ComputationOutput, Money, Rate};
use crate::valuation::dcf::{value_cash_flows, TerminalAssumptions};
use crate::valuation::projection::{project_cash_flows, ProjectionAssumptions};
use crate::ValuationResult;

/// Sampled revenue growth is floored here.
pub const MIN_REVENUE_GROWTH: Rate = -0.30;
/// Sampled EBITDA margin is clamped to this range.
pub const MIN_EBITDA_MARGIN: Rate = 0.05;
pub const MAX_EBITDA_MARGIN: Rate = 0.60;
/// Sampled WACC is floored here.
pub const MIN_WACC: Rate = 0.02;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Mean and standard deviation of a normally distributed input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalParams {
    pub mean: f64,
    pub std_dev: f64,
}

/// Distributions for the inputs perturbed on every trial. Each is sampled
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StochasticParams {
    pub revenue_growth: NormalParams,
    pub ebitda_margin: NormalParams,
    pub wacc: NormalParams,
}

/// Input for a Monte Carlo DCF valuation.
///
/// `base.revenue_growth` and `base.ebitda_margin` are replaced by sampled
/// values on every trial; every other field is held fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McDcfInput {
    pub base: ProjectionAssumptions,
    pub stochastic: StochasticParams,
    /// Perpetuity growth used for every trial's terminal value
    pub terminal_growth: Rate,
    #[serde(default)]
    pub net_debt: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares_outstanding: Option<f64>,
    /// Number of trials. Zero is allowed and yields no summary.
    #[serde(default = "default_num_trials")]
    pub num_trials: u32,
    /// Optional seed for reproducibility.
    pub seed: Option<u64>,
}

fn default_num_trials() -> u32 {
    10_000
}

/// The values drawn for one trial, after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialInputs {
    pub revenue_growth: Rate,
    pub ebitda_margin: Rate,
    pub wacc: Rate,
}

impl TrialInputs {
    /// Apply the plausibility bounds, each variable independently.
    pub fn clamped(self) -> Self {
        TrialInputs {
            revenue_growth: self.revenue_growth.max(MIN_REVENUE_GROWTH),
            ebitda_margin: self.ebitda_margin.clamp(MIN_EBITDA_MARGIN, MAX_EBITDA_MARGIN),
            wacc: self.wacc.max(MIN_WACC),
        }
    }
}

/// Percentile summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

/// Summary of the per-share price distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McSummary {
    /// Number of trials that produced a price
    pub count: u32,
    pub mean: f64,
    /// Population standard deviation (divides by n)
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: McPercentiles,
    /// Spread between the 95th and 5th percentiles
    pub p5_p95_range: f64,
}

/// Output of a Monte Carlo DCF simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McDcfOutput {
    pub trials_requested: u32,
    /// Trials that produced a defined price per share
    pub trials_succeeded: u32,
    /// Trials dropped because the valuation rejected the sampled inputs
    pub trials_failed: u32,
    /// Absent when no trial produced a price
    pub summary: Option<McSummary>,
}

enum TrialOutcome {
    Priced(f64),
    Unpriced,
    Rejected,
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

fn sample_normal(rng: &mut StdRng, standard: &Normal, params: &NormalParams) -> f64 {
    let z: f64 = rng.sample(standard);
    params.mean + params.std_dev * z
}

/// Draw one trial's inputs in a fixed order (growth, margin, WACC) and clamp them.
pub fn sample_trial_inputs(
    rng: &mut StdRng,
    standard: &Normal,
    params: &StochasticParams,
) -> TrialInputs {
    TrialInputs {
        revenue_growth: sample_normal(rng, standard, &params.revenue_growth),
        ebitda_margin: sample_normal(rng, standard, &params.ebitda_margin),
        wacc: sample_normal(rng, standard, &params.wacc),
    }
    .clamped()
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Compute the percentile value from a **sorted**, non-empty slice using
/// linear interpolation between order statistics.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

/// Summarise a sample. Returns `None` for an empty sample.
pub fn summarize_distribution(mut values: Vec<f64>) -> Option<McSummary> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    let percentiles = McPercentiles {
        p5: percentile_sorted(&values, 5.0),
        p25: percentile_sorted(&values, 25.0),
        p50: percentile_sorted(&values, 50.0),
        p75: percentile_sorted(&values, 75.0),
        p95: percentile_sorted(&values, 95.0),
    };

    Some(McSummary {
        count: values.len() as u32,
        mean,
        std_dev: variance.sqrt(),
        min: values[0],
        max: values[values.len() - 1],
        p5_p95_range: percentiles.p95 - percentiles.p5,
        percentiles,
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the Monte Carlo DCF and summarise the per-share price distribution.
///
/// Trial `i` draws from its own generator seeded with `seed + i`, so results
/// do not depend on whether trials run sequentially or in parallel. A trial
/// whose sampled WACC does not exceed `terminal_growth` is dropped and
/// counted in `trials_failed`; any other valuation error aborts the run.
pub fn simulate_dcf_distribution(input: &McDcfInput) -> ValuationResult<McDcfOutput> {
    validate_mc_input(input)?;

    let standard = Normal::new(0.0, 1.0).map_err(|e| ValuationError::InvalidInput {
        field: "distribution".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })?;
    let base_seed = input.seed.unwrap_or_else(rand::random::<u64>);

    #[cfg(feature = "parallel")]
    let outcomes = (0..input.num_trials)
        .into_par_iter()
        .map(|i| run_trial(input, &standard, base_seed.wrapping_add(u64::from(i))))
        .collect::<ValuationResult<Vec<TrialOutcome>>>()?;

    #[cfg(not(feature = "parallel"))]
    let outcomes = (0..input.num_trials)
        .map(|i| run_trial(input, &standard, base_seed.wrapping_add(u64::from(i))))
        .collect::<ValuationResult<Vec<TrialOutcome>>>()?;

    let mut prices: Vec<f64> = Vec::with_capacity(outcomes.len());
    let mut failed: u32 = 0;
    for outcome in outcomes {
        match outcome {
            TrialOutcome::Priced(price) => prices.push(price),
            TrialOutcome::Unpriced => {}
            TrialOutcome::Rejected => failed += 1,
        }
    }

    if failed > 0 {
        tracing::warn!(
            failed,
            trials = input.num_trials,
            "dropped Monte Carlo trials with terminal growth >= sampled WACC"
        );
    }

    Ok(McDcfOutput {
        trials_requested: input.num_trials,
        trials_succeeded: prices.len() as u32,
        trials_failed: failed,
        summary: summarize_distribution(prices),
    })
}

/// Run the Monte Carlo DCF and wrap the result with warnings and metadata.
pub fn run_monte_carlo_dcf(input: &McDcfInput) -> ValuationResult<ComputationOutput<McDcfOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let output = simulate_dcf_distribution(input)?;

    if output.trials_failed > 0 {
        warnings.push(format!(
            "{} of {} simulations skipped (terminal_growth >= sampled wacc)",
            output.trials_failed, output.trials_requested
        ));
    }
    if output.summary.is_none() {
        warnings.push("No trial produced a price per share; no distribution to summarise".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo DCF Valuation",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn run_trial(input: &McDcfInput, standard: &Normal, seed: u64) -> ValuationResult<TrialOutcome> {
    let mut rng = StdRng::seed_from_u64(seed);
    let sample = sample_trial_inputs(&mut rng, standard, &input.stochastic);

    let assumptions = ProjectionAssumptions {
        revenue_growth: sample.revenue_growth,
        ebitda_margin: sample.ebitda_margin,
        ..input.base.clone()
    };
    let projection = project_cash_flows(&assumptions);

    let terminal = TerminalAssumptions::Perpetuity {
        terminal_growth: input.terminal_growth,
    };
    match value_cash_flows(
        &projection.fcfs,
        sample.wacc,
        &terminal,
        None,
        input.net_debt,
        input.shares_outstanding,
    ) {
        Ok(result) => Ok(match result.price_per_share {
            Some(price) => TrialOutcome::Priced(price),
            None => TrialOutcome::Unpriced,
        }),
        Err(ValuationError::InvalidInput { .. }) => Ok(TrialOutcome::Rejected),
        Err(e) => Err(e),
    }
}

fn validate_normal(field: &str, params: &NormalParams) -> ValuationResult<()> {
    ensure_finite(field, params.mean)?;
    ensure_finite(field, params.std_dev)?;
    if params.std_dev < 0.0 {
        return Err(ValuationError::invalid(
            field,
            "Standard deviation must be non-negative",
        ));
    }
    Ok(())
}

fn validate_mc_input(input: &McDcfInput) -> ValuationResult<()> {
    input.base.validate()?;
    validate_normal("revenue_growth", &input.stochastic.revenue_growth)?;
    validate_normal("ebitda_margin", &input.stochastic.ebitda_margin)?;
    validate_normal("wacc", &input.stochastic.wacc)?;
    ensure_finite("terminal_growth", input.terminal_growth)?;
    ensure_finite("net_debt", input.net_debt)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: u64 = 42;

    fn normal(mean: f64, std_dev: f64) -> NormalParams {
        NormalParams { mean, std_dev }
    }

    fn basic_mc_input() -> McDcfInput {
        McDcfInput {
            base: ProjectionAssumptions {
                start_revenue: 1000.0,
                years: 5,
                revenue_growth: 0.08,
                ebitda_margin: 0.25,
                deprec_amor_pct_revenue: 0.03,
                capex_pct_revenue: 0.04,
                nwc_pct_revenue: 0.10,
                tax_rate: 0.25,
            },
            stochastic: StochasticParams {
                revenue_growth: normal(0.08, 0.02),
                ebitda_margin: normal(0.25, 0.03),
                wacc: normal(0.10, 0.01),
            },
            terminal_growth: 0.02,
            net_debt: 200.0,
            shares_outstanding: Some(50.0),
            num_trials: 2_000,
            seed: Some(SEED),
        }
    }

    #[test]
    fn test_simulation_runs() {
        let out = simulate_dcf_distribution(&basic_mc_input()).unwrap();
        assert_eq!(out.trials_requested, 2_000);
        let s = out.summary.unwrap();
        assert_eq!(s.count, out.trials_succeeded);
        assert!(s.mean > 0.0);
        assert!(s.std_dev > 0.0);
    }

    #[test]
    fn test_seeded_reproducibility() {
        let input = basic_mc_input();
        let r1 = simulate_dcf_distribution(&input).unwrap();
        let r2 = simulate_dcf_distribution(&input).unwrap();
        assert_eq!(r1, r2);
    }

    #[test]
    fn test_percentile_ordering() {
        let s = simulate_dcf_distribution(&basic_mc_input())
            .unwrap()
            .summary
            .unwrap();
        let p = &s.percentiles;
        assert!(s.min <= p.p5);
        assert!(p.p5 <= p.p25);
        assert!(p.p25 <= p.p50);
        assert!(p.p50 <= p.p75);
        assert!(p.p75 <= p.p95);
        assert!(p.p95 <= s.max);
    }

    #[test]
    fn test_zero_trials_is_no_result() {
        let mut input = basic_mc_input();
        input.num_trials = 0;
        let out = simulate_dcf_distribution(&input).unwrap();
        assert!(out.summary.is_none());
        assert_eq!(out.trials_succeeded, 0);
    }

    #[test]
    fn test_missing_shares_is_no_result() {
        let mut input = basic_mc_input();
        input.shares_outstanding = None;
        let out = simulate_dcf_distribution(&input).unwrap();
        assert!(out.summary.is_none());
        assert_eq!(out.trials_failed, 0);
    }

    #[test]
    fn test_impossible_trials_are_dropped() {
        let mut input = basic_mc_input();
        input.stochastic.wacc = normal(0.04, 0.02);
        input.terminal_growth = 0.04;
        input.num_trials = 1_000;
        let out = run_monte_carlo_dcf(&input).unwrap();
        let r = &out.result;
        assert!(r.trials_failed > 0);
        assert!(r.trials_succeeded > 0);
        assert_eq!(r.trials_failed + r.trials_succeeded, 1_000);
        assert!(out.warnings.iter().any(|w| w.contains("skipped")));
    }

    #[test]
    fn test_clamps() {
        let t = TrialInputs {
            revenue_growth: -0.9,
            ebitda_margin: 0.95,
            wacc: -0.05,
        }
        .clamped();
        assert_eq!(t.revenue_growth, MIN_REVENUE_GROWTH);
        assert_eq!(t.ebitda_margin, MAX_EBITDA_MARGIN);
        assert_eq!(t.wacc, MIN_WACC);

        let t = TrialInputs {
            revenue_growth: 0.05,
            ebitda_margin: 0.01,
            wacc: 0.09,
        }
        .clamped();
        assert_eq!(t.revenue_growth, 0.05);
        assert_eq!(t.ebitda_margin, MIN_EBITDA_MARGIN);
        assert_eq!(t.wacc, 0.09);
    }

    #[test]
    fn test_sampled_inputs_respect_bounds() {
        let standard = Normal::new(0.0, 1.0).unwrap();
        let params = StochasticParams {
            revenue_growth: normal(0.0, 1.0),
            ebitda_margin: normal(0.3, 1.0),
            wacc: normal(0.0, 1.0),
        };
        let mut rng = StdRng::seed_from_u64(SEED);
        for _ in 0..1_000 {
            let t = sample_trial_inputs(&mut rng, &standard, &params);
            assert!(t.revenue_growth >= MIN_REVENUE_GROWTH);
            assert!((MIN_EBITDA_MARGIN..=MAX_EBITDA_MARGIN).contains(&t.ebitda_margin));
            assert!(t.wacc >= MIN_WACC);
        }
    }

    #[test]
    fn test_negative_std_dev_rejected() {
        let mut input = basic_mc_input();
        input.stochastic.wacc = normal(0.10, -0.01);
        assert!(matches!(
            simulate_dcf_distribution(&input),
            Err(ValuationError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_summary_population_std_dev() {
        let s = summarize_distribution(vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.mean, 5.0);
        assert_eq!(s.std_dev, 2.0);
    }

    #[test]
    fn test_summary_linear_percentiles() {
        let s = summarize_distribution(vec![40.0, 10.0, 30.0, 20.0, 50.0]).unwrap();
        assert_eq!(s.percentiles.p50, 30.0);
        assert_eq!(s.percentiles.p25, 20.0);
        // rank = 0.05 * 4 = 0.2 → 10 + 0.2 * 10
        assert!((s.percentiles.p5 - 12.0).abs() < 1e-12);
        assert!((s.percentiles.p95 - 48.0).abs() < 1e-12);
        assert!((s.p5_p95_range - 36.0).abs() < 1e-12);
    }

    #[test]
    fn test_summary_empty_is_none() {
        assert!(summarize_distribution(Vec::new()).is_none());
    }
}
