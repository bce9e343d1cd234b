//! Discounted cash-flow measures.

use crate::math::solvers::{NewtonRaphsonSolver, SolverConfig};
use crate::types::{SolverError, TimePoint};

/// Initial IRR guess (10%).
const IRR_INITIAL_GUESS: f64 = 0.10;
/// Lowest rate an IRR iterate may take (-99%).
const IRR_LOWER_BOUND: f64 = -0.99;
/// Highest rate an IRR iterate may take (1000%).
const IRR_UPPER_BOUND: f64 = 10.0;

/// Discount factor `1 / (1 + rate)^year`.
#[inline]
pub fn discount_factor(rate: f64, year: i32) -> f64 {
    1.0 / (1.0 + rate).powi(year)
}

/// Net present value: `Σ value / (1 + rate)^year`.
///
/// # Examples
///
/// ```
/// use cube_core::finance::npv;
/// use cube_core::types::TimePoint;
///
/// let flows = [TimePoint::new(0, -100.0), TimePoint::new(1, 110.0)];
/// assert!(npv(&flows, 0.10).abs() < 0.01);
/// ```
pub fn npv(series: &[TimePoint], rate: f64) -> f64 {
    series
        .iter()
        .map(|p| p.value * discount_factor(rate, p.year))
        .sum()
}

fn npv_derivative(series: &[TimePoint], rate: f64) -> f64 {
    series
        .iter()
        .map(|p| -(p.year as f64) * p.value / (1.0 + rate).powi(p.year + 1))
        .sum()
}

/// Internal rate of return, in percent.
///
/// Newton-Raphson from a 10% guess with tolerance `1e-4` and at most 100
/// iterations; every iterate is clamped to `[-99%, 1000%]`. When the solver
/// stops without converging, the last iterate is reported.
///
/// Returns `0.0` when the series lacks either a negative or a positive flow,
/// since the IRR is undefined there.
///
/// # Examples
///
/// ```
/// use cube_core::finance::irr;
/// use cube_core::types::TimePoint;
///
/// let flows = [TimePoint::new(0, -100.0), TimePoint::new(1, 110.0)];
/// assert!((irr(&flows) - 10.0).abs() < 0.01);
///
/// let no_investment = [TimePoint::new(0, 50.0), TimePoint::new(1, 60.0)];
/// assert_eq!(irr(&no_investment), 0.0);
/// ```
pub fn irr(series: &[TimePoint]) -> f64 {
    let has_negative = series.iter().any(|p| p.value < 0.0);
    let has_positive = series.iter().any(|p| p.value > 0.0);
    if !has_negative || !has_positive {
        return 0.0;
    }

    let solver = NewtonRaphsonSolver::new(SolverConfig::irr())
        .with_bounds(IRR_LOWER_BOUND, IRR_UPPER_BOUND);

    let rate = match solver.find_root(
        |r| npv(series, r),
        |r| npv_derivative(series, r),
        IRR_INITIAL_GUESS,
    ) {
        Ok(rate) => rate,
        Err(SolverError::MaxIterationsExceeded { last, .. }) => last,
        Err(SolverError::DerivativeNearZero { x }) => x,
        Err(SolverError::NumericalInstability(_)) => return 0.0,
    };

    rate * 100.0
}

/// Payback period with linear interpolation inside the crossing year.
///
/// Walks the series in year order accumulating cash; at the first point
/// where the cumulative sum moves from negative to non-negative, the
/// fractional position between the bracketing years is interpolated.
/// Returns `None` when the cumulative sum never recovers.
///
/// # Examples
///
/// ```
/// use cube_core::finance::payback_period;
/// use cube_core::types::TimePoint;
///
/// let flows = [
///     TimePoint::new(0, -100.0),
///     TimePoint::new(1, 40.0),
///     TimePoint::new(2, 40.0),
///     TimePoint::new(3, 40.0),
/// ];
/// // After year 2 we are at -20; year 3 adds 40, so half a year more.
/// assert!((payback_period(&flows).unwrap() - 2.5).abs() < 1e-12);
/// ```
pub fn payback_period(series: &[TimePoint]) -> Option<f64> {
    let mut sorted = series.to_vec();
    sorted.sort_by_key(|p| p.year);

    let mut cumulative = 0.0;
    let mut previous_year: Option<i32> = None;

    for point in &sorted {
        let next = cumulative + point.value;
        if next >= 0.0 {
            // A previous year only exists while the cumulative sum is negative.
            return match previous_year {
                Some(prev) => {
                    let fraction = -cumulative / (next - cumulative);
                    Some(prev as f64 + fraction * (point.year - prev) as f64)
                }
                None => Some(point.year as f64),
            };
        }
        cumulative = next;
        previous_year = Some(point.year);
    }

    None
}

/// Payback period, falling back to `project_life` when never reached.
pub fn payback_period_or(series: &[TimePoint], project_life: f64) -> f64 {
    payback_period(series).unwrap_or(project_life)
}

/// Levelised cost of energy: `NPV(costs) / NPV(energy)`.
///
/// Both series are discounted at the same `rate`. Returns `None` when the
/// discounted energy production is zero.
pub fn lcoe(costs: &[TimePoint], energy: &[TimePoint], rate: f64) -> Option<f64> {
    let energy_npv = npv(energy, rate);
    if energy_npv == 0.0 {
        return None;
    }
    Some(npv(costs, rate) / energy_npv)
}
