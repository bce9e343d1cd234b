//! Financial primitives over `{year, value}` time series.
//!
//! All functions are pure and deterministic, operating with plain `f64`
//! semantics:
//!
//! - [`cashflow`]: NPV, IRR, payback period, LCOE
//! - [`ratios`]: DSCR, LLCR, ICR coverage series and operational summaries
//! - [`stats`]: statistical reductions used by metric aggregations

pub mod cashflow;
pub mod ratios;
pub mod stats;

pub use cashflow::{discount_factor, irr, lcoe, npv, payback_period, payback_period_or};
pub use ratios::{dscr, icr, llcr, ratio_series, summarize_operational, RatioSummary};
pub use stats::{max, mean, min, mode, stdev_population, sum};
