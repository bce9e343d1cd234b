//! Debt coverage ratios.
//!
//! Ratio series divide one cash-flow series by another year by year. Years
//! where the denominator is missing or zero produce no ratio point.
//! Summary statistics only consider operational years (`year > 0`).

use super::cashflow::discount_factor;
use crate::types::TimePoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum and average of a ratio series over operational years.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioSummary {
    /// Lowest ratio
    pub min: f64,
    /// Arithmetic mean of the ratios
    pub average: f64,
    /// Year in which the lowest ratio occurs
    pub min_year: i32,
}

fn by_year(series: &[TimePoint]) -> BTreeMap<i32, f64> {
    series.iter().map(|p| (p.year, p.value)).collect()
}

/// Year-by-year `numerator / |denominator|`.
///
/// Denominators are taken by magnitude so that debt service and interest
/// may be stored either as positive amounts or as negative cash flows.
pub fn ratio_series(numerator: &[TimePoint], denominator: &[TimePoint]) -> Vec<TimePoint> {
    let denominators = by_year(denominator);
    let mut ratios: Vec<TimePoint> = numerator
        .iter()
        .filter_map(|p| {
            let d = denominators.get(&p.year)?.abs();
            (d != 0.0).then(|| TimePoint::new(p.year, p.value / d))
        })
        .collect();
    ratios.sort_by_key(|p| p.year);
    ratios
}

/// Debt service coverage ratio: CFADS / debt service.
pub fn dscr(cfads: &[TimePoint], debt_service: &[TimePoint]) -> Vec<TimePoint> {
    ratio_series(cfads, debt_service)
}

/// Interest coverage ratio: EBITDA / interest.
pub fn icr(ebitda: &[TimePoint], interest: &[TimePoint]) -> Vec<TimePoint> {
    ratio_series(ebitda, interest)
}

/// Loan life coverage ratio.
///
/// For every year `t` with an outstanding balance, the CFADS from `t` up to
/// the last year with a positive balance is discounted back to `t` at `rate`
/// and divided by the balance at `t`.
///
/// # Examples
///
/// ```
/// use cube_core::finance::llcr;
/// use cube_core::types::TimePoint;
///
/// let cfads = [TimePoint::new(1, 60.0), TimePoint::new(2, 60.0)];
/// let balance = [TimePoint::new(1, 100.0), TimePoint::new(2, 50.0)];
///
/// let ratios = llcr(&cfads, &balance, 0.0);
/// assert!((ratios[0].value - 1.2).abs() < 1e-12);
/// assert!((ratios[1].value - 1.2).abs() < 1e-12);
/// ```
pub fn llcr(cfads: &[TimePoint], debt_balance: &[TimePoint], rate: f64) -> Vec<TimePoint> {
    let Some(maturity) = debt_balance
        .iter()
        .filter(|p| p.value.abs() > 0.0)
        .map(|p| p.year)
        .max()
    else {
        return Vec::new();
    };

    let cash = by_year(cfads);
    let mut ratios: Vec<TimePoint> = debt_balance
        .iter()
        .filter(|p| p.value.abs() > 0.0)
        .map(|p| {
            let discounted: f64 = cash
                .range(p.year..=maturity)
                .map(|(&year, &value)| value * discount_factor(rate, year - p.year))
                .sum();
            TimePoint::new(p.year, discounted / p.value.abs())
        })
        .collect();
    ratios.sort_by_key(|p| p.year);
    ratios
}

/// Minimum and average over operational years (`year > 0`).
///
/// Returns `None` if no operational year carries a finite ratio.
pub fn summarize_operational(series: &[TimePoint]) -> Option<RatioSummary> {
    let operational: Vec<&TimePoint> = series
        .iter()
        .filter(|p| p.year > 0 && p.value.is_finite())
        .collect();
    let lowest = operational
        .iter()
        .min_by(|a, b| a.value.total_cmp(&b.value))?;
    let average = operational.iter().map(|p| p.value).sum::<f64>() / operational.len() as f64;

    Some(RatioSummary {
        min: lowest.value,
        average,
        min_year: lowest.year,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series(values: &[(i32, f64)]) -> Vec<TimePoint> {
        values.iter().map(|&(y, v)| TimePoint::new(y, v)).collect()
    }

    #[test]
    fn test_dscr_skips_zero_and_missing_denominators() {
        let cfads = series(&[(0, -500.0), (1, 130.0), (2, 120.0), (3, 110.0)]);
        let debt = series(&[(0, 0.0), (1, -100.0), (2, 100.0)]);

        let ratios = dscr(&cfads, &debt);
        assert_eq!(ratios.len(), 2);
        assert_relative_eq!(ratios[0].value, 1.3);
        assert_relative_eq!(ratios[1].value, 1.2);
    }

    #[test]
    fn test_summary_ignores_construction_year() {
        let ratios = series(&[(0, 0.1), (1, 1.5), (2, 1.2), (3, 1.8)]);
        let summary = summarize_operational(&ratios).unwrap();
        assert_relative_eq!(summary.min, 1.2);
        assert_eq!(summary.min_year, 2);
        assert_relative_eq!(summary.average, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_summary_empty() {
        assert!(summarize_operational(&series(&[(0, 1.0)])).is_none());
    }

    #[test]
    fn test_icr() {
        let ebitda = series(&[(1, 300.0)]);
        let interest = series(&[(1, 100.0)]);
        assert_relative_eq!(icr(&ebitda, &interest)[0].value, 3.0);
    }

    #[test]
    fn test_llcr_discounting() {
        let cfads = series(&[(1, 110.0), (2, 121.0)]);
        let balance = series(&[(1, 200.0), (2, 100.0), (3, 0.0)]);
        let ratios = llcr(&cfads, &balance, 0.10);
        assert_eq!(ratios.len(), 2);
        // Year 1: 110 + 121/1.1 = 220 → 220/200
        assert_relative_eq!(ratios[0].value, 1.1, epsilon = 1e-12);
        assert_relative_eq!(ratios[1].value, 1.21, epsilon = 1e-12);
    }
}
