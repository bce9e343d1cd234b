//! Property tests for the financial primitives.

use cube_core::finance::{irr, lcoe, npv, payback_period};
use cube_core::types::TimePoint;
use proptest::prelude::*;

proptest! {
    /// IRR of a two-point flow recovers the rate used to build it.
    #[test]
    fn prop_irr_recovers_rate(rate in 0.001f64..0.8, outlay in 10.0f64..1e6) {
        let flows = vec![
            TimePoint::new(0, -outlay),
            TimePoint::new(1, outlay * (1.0 + rate)),
        ];
        prop_assert!((irr(&flows) - rate * 100.0).abs() < 0.01);
    }

    /// NPV at the IRR is approximately zero for conventional flows.
    #[test]
    fn prop_npv_at_irr_vanishes(outlay in 100.0f64..1e4, annual in 10.0f64..1e3, years in 3i32..25) {
        let mut flows = vec![TimePoint::new(0, -outlay)];
        flows.extend((1..=years).map(|y| TimePoint::new(y, annual)));

        let rate = irr(&flows);
        prop_assume!(rate > -99.0 && rate < 1000.0);
        prop_assert!(npv(&flows, rate / 100.0).abs() < outlay * 1e-3);
    }

    /// Payback lies within the series span when it exists.
    #[test]
    fn prop_payback_within_span(outlay in 1.0f64..1e4, annual in 1.0f64..1e3, years in 1i32..30) {
        let mut flows = vec![TimePoint::new(0, -outlay)];
        flows.extend((1..=years).map(|y| TimePoint::new(y, annual)));

        match payback_period(&flows) {
            Some(p) => prop_assert!(p >= 0.0 && p <= years as f64),
            None => prop_assert!(annual * (years as f64) < outlay),
        }
    }

    /// Scaling costs scales LCOE linearly.
    #[test]
    fn prop_lcoe_linear_in_costs(scale in 0.1f64..10.0, rate in 0.0f64..0.2) {
        let costs = vec![TimePoint::new(1, 100.0), TimePoint::new(2, 80.0)];
        let energy = vec![TimePoint::new(1, 5.0), TimePoint::new(2, 5.0)];
        let scaled: Vec<TimePoint> = costs.iter().map(|p| TimePoint::new(p.year, p.value * scale)).collect();

        let base = lcoe(&costs, &energy, rate).unwrap();
        let bumped = lcoe(&scaled, &energy, rate).unwrap();
        prop_assert!((bumped - base * scale).abs() < 1e-9 * bumped.abs().max(1.0));
    }
}
