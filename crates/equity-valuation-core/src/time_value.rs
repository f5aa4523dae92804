use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::ValuationResult;

/// Lower edge of the IRR search interval (a 99% loss per period).
pub const IRR_LOWER_BOUND: Rate = -0.99;
/// Upper edge of the IRR search interval (1,000% per period).
pub const IRR_UPPER_BOUND: Rate = 10.0;

const RATE_TOLERANCE: f64 = 1e-12;
const NPV_TOLERANCE: f64 = 1e-10;
const MAX_NEWTON_ITERATIONS: u32 = 100;
const MAX_BISECTION_ITERATIONS: u32 = 200;

/// Net Present Value of a series of cash flows. Index 0 is undiscounted.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> ValuationResult<Money> {
    if rate <= -1.0 {
        return Err(ValuationError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }
    Ok(npv_at(rate, cash_flows))
}

/// Zero flows are skipped: near the lower bound `(1+r)^t` underflows to 0
/// over long horizons and `0 / 0` would poison the sum with NaN.
fn npv_at(rate: Rate, cash_flows: &[Money]) -> Money {
    let one_plus_r = 1.0 + rate;
    cash_flows
        .iter()
        .enumerate()
        .filter(|(_, cf)| **cf != 0.0)
        .map(|(t, cf)| cf / one_plus_r.powi(t as i32))
        .sum()
}

fn npv_and_derivative(rate: Rate, cash_flows: &[Money]) -> (Money, f64) {
    let one_plus_r = 1.0 + rate;
    let mut npv_val = 0.0;
    let mut dnpv = 0.0;
    for (t, cf) in cash_flows.iter().enumerate().filter(|(_, cf)| **cf != 0.0) {
        npv_val += cf / one_plus_r.powi(t as i32);
        if t > 0 {
            dnpv -= t as f64 * cf / one_plus_r.powi(t as i32 + 1);
        }
    }
    (npv_val, dnpv)
}

/// Internal Rate of Return of evenly spaced cash flows.
///
/// Newton-Raphson starting at `guess`, confined to
/// [`IRR_LOWER_BOUND`, `IRR_UPPER_BOUND`]. If an iterate leaves the interval,
/// the derivative vanishes or the step budget runs out, the solve falls back
/// to bisection over the whole interval. When the NPV has the same sign at
/// both ends no root is bracketed and `NoConvergence` is returned.
pub fn irr(cash_flows: &[Money], guess: Rate) -> ValuationResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(ValuationError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }
    if cash_flows.iter().any(|cf| !cf.is_finite()) {
        return Err(ValuationError::invalid(
            "cash_flows",
            "All cash flows must be finite",
        ));
    }

    let mut rate = guess.clamp(IRR_LOWER_BOUND, IRR_UPPER_BOUND);

    for i in 0..MAX_NEWTON_ITERATIONS {
        let (npv_val, dnpv) = npv_and_derivative(rate, cash_flows);
        if npv_val.abs() < NPV_TOLERANCE {
            tracing::debug!(method = "newton", iterations = i, irr = rate, "IRR solved");
            return Ok(rate);
        }
        if dnpv == 0.0 || !dnpv.is_finite() {
            break;
        }
        let next = rate - npv_val / dnpv;
        if !next.is_finite() || !(IRR_LOWER_BOUND..=IRR_UPPER_BOUND).contains(&next) {
            break;
        }
        if (next - rate).abs() < RATE_TOLERANCE {
            tracing::debug!(method = "newton", iterations = i + 1, irr = next, "IRR solved");
            return Ok(next);
        }
        rate = next;
    }

    tracing::warn!(guess, "Newton-Raphson IRR did not settle; falling back to bisection");
    bisect(cash_flows)
}

fn bisect(cash_flows: &[Money]) -> ValuationResult<Rate> {
    let mut lo = IRR_LOWER_BOUND;
    let mut hi = IRR_UPPER_BOUND;
    let mut f_lo = npv_at(lo, cash_flows);
    let f_hi = npv_at(hi, cash_flows);

    // A signed infinity still brackets; NaN does not.
    if f_lo.is_nan() || f_hi.is_nan() {
        return Err(ValuationError::NoConvergence {
            function: "IRR".into(),
            iterations: 0,
            last_delta: f64::NAN,
        });
    }
    if f_lo == 0.0 {
        return Ok(lo);
    }
    if f_hi == 0.0 {
        return Ok(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        return Err(ValuationError::NoConvergence {
            function: "IRR".into(),
            iterations: 0,
            last_delta: f_hi,
        });
    }

    let mut f_mid = f_hi;
    for i in 0..MAX_BISECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        f_mid = npv_at(mid, cash_flows);
        if f_mid.is_nan() {
            break;
        }
        if f_mid.abs() < NPV_TOLERANCE || 0.5 * (hi - lo) < RATE_TOLERANCE {
            tracing::debug!(method = "bisection", iterations = i + 1, irr = mid, "IRR solved");
            return Ok(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(ValuationError::NoConvergence {
        function: "IRR".into(),
        iterations: MAX_BISECTION_ITERATIONS,
        last_delta: f_mid,
    })
}
