//! Statistical reductions over value slices.
//!
//! Empty input reduces to `0.0` for every statistic so that aggregations
//! over missing data degrade to zero rather than NaN.

/// Smallest value.
pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

/// Largest value.
pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// Sum of values.
pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    sum(values) / values.len() as f64
}

/// Population standard deviation (divides by `n`).
pub fn stdev_population(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Most frequent value; ties go to the value seen first.
pub fn mode(values: &[f64]) -> f64 {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for &v in values {
        match counts.iter_mut().find(|(seen, _)| *seen == v) {
            Some((_, n)) => *n += 1,
            None => counts.push((v, 1)),
        }
    }

    let mut best: Option<(f64, usize)> = None;
    for (v, n) in counts {
        if best.map_or(true, |(_, top)| n > top) {
            best = Some((v, n));
        }
    }
    best.map(|(v, _)| v).unwrap_or(0.0)
}
