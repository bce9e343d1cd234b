//! Onshore wind project-finance registries.
//!
//! Monetary amounts are in k€, energy in MWh, prices in €/MWh. Year 0 is
//! construction; operations run from year 1.
//!
//! Sources:
//!
//! | id                 | type     | notes                                  |
//! |--------------------|----------|----------------------------------------|
//! | `energyProduction` | direct   | P-values, sensitivity variable         |
//! | `electricityPrice` | indirect | P-values, escalated by `priceEscalation` |
//! | `capex`            | direct   | construction cost                      |
//! | `opex`             | indirect | escalated by `opexEscalation`          |
//! | `debtService`      | direct   | senior debt annuity                    |
//! | `debtBalance`      | direct   | opening balance per year               |
//! | `interest`         | direct   | interest part of the annuity           |
//! | `revenue`          | virtual  | energy × price                         |
//! | `cfads`            | virtual  | revenue − opex                         |
//! | `netCashflow`      | virtual  | cfads − capex                          |

use crate::metric::{
    Aggregation, AggregationOp, Dependency, MetricContext, MetricItem, MetricMetadata,
    MetricOperation, MetricOutput, MetricRegistry, MetricType, Parameter,
};
use crate::reference::Reference;
use crate::scenario::to_path;
use crate::source::{
    Multiplier, MultiplierOperation, SourceContext, SourceItem, SourceMetadata, SourceOutput,
    SourceRegistry, SourceType,
};
use cube_core::finance;
use cube_core::types::{CubeError, CubeMetricResult, Percentile, TimePoint};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Annual energy production source.
pub const ENERGY_PRODUCTION: &str = "energyProduction";
/// Electricity price source.
pub const ELECTRICITY_PRICE: &str = "electricityPrice";
/// Construction cost source.
pub const CAPEX: &str = "capex";
/// Operating cost source.
pub const OPEX: &str = "opex";
/// Debt service source.
pub const DEBT_SERVICE: &str = "debtService";
/// Debt balance source.
pub const DEBT_BALANCE: &str = "debtBalance";
/// Interest source.
pub const INTEREST: &str = "interest";
/// Revenue source.
pub const REVENUE: &str = "revenue";
/// Cash flow available for debt service.
pub const CFADS: &str = "cfads";
/// Unlevered project cash flow.
pub const NET_CASHFLOW: &str = "netCashflow";

/// Project NPV metric.
pub const PROJECT_NPV: &str = "projectNpv";
/// Project IRR metric.
pub const PROJECT_IRR: &str = "projectIrr";

const BASE_YEAR: i32 = 1;

// ========================================
// Sources
// ========================================

/// Year-wise combination of two series; a year missing on one side reads 0.
fn zip_years(left: &[TimePoint], right: &[TimePoint], f: impl Fn(f64, f64) -> f64) -> Vec<TimePoint> {
    let mut years: BTreeMap<i32, (f64, f64)> = BTreeMap::new();
    for p in left {
        years.entry(p.year).or_default().0 += p.value;
    }
    for p in right {
        years.entry(p.year).or_default().1 += p.value;
    }
    years
        .into_iter()
        .map(|(year, (l, r))| TimePoint::new(year, f(l, r)))
        .collect()
}

fn combine_sources(
    ctx: &SourceContext<'_>,
    left: &str,
    right: &str,
    f: impl Fn(f64, f64) -> f64,
) -> Result<SourceOutput, CubeError> {
    let mut by_percentile = BTreeMap::new();
    for &p in ctx.available_percentiles {
        let l = ctx
            .processed_series(left, p)
            .ok_or_else(|| CubeError::missing_dependency("source", left))?;
        let r = ctx
            .processed_series(right, p)
            .ok_or_else(|| CubeError::missing_dependency("source", right))?;
        by_percentile.insert(p, zip_years(&l, &r, &f));
    }
    Ok(SourceOutput::ByPercentile(by_percentile))
}

/// Source registry of the wind preset.
pub fn source_registry() -> SourceRegistry {
    SourceRegistry::new()
        .with_reference(Reference::new("priceEscalation", &["settings", "escalation", "priceEscalation"]))
        .with_reference(Reference::new("opexEscalation", &["settings", "escalation", "opexEscalation"]))
        .with_item(
            SourceItem::direct(ENERGY_PRODUCTION, 1, &["simulation", "energyProduction"])
                .with_percentiles()
                .with_metadata(
                    SourceMetadata::new(SourceType::Direct)
                        .named("Energy production")
                        .unit("MWh")
                        .category("production")
                        .sensitivity_variable(),
                ),
        )
        .with_item(
            SourceItem::direct(CAPEX, 2, &["costs", "capex"]).with_metadata(
                SourceMetadata::new(SourceType::Direct)
                    .named("Capital expenditure")
                    .unit("k€")
                    .category("cost"),
            ),
        )
        .with_item(
            SourceItem::direct(DEBT_SERVICE, 3, &["costs", "debtService"]).with_metadata(
                SourceMetadata::new(SourceType::Direct)
                    .named("Debt service")
                    .unit("k€")
                    .category("financing"),
            ),
        )
        .with_item(
            SourceItem::direct(DEBT_BALANCE, 4, &["costs", "debtBalance"]).with_metadata(
                SourceMetadata::new(SourceType::Direct)
                    .named("Debt balance")
                    .unit("k€")
                    .category("financing"),
            ),
        )
        .with_item(
            SourceItem::direct(INTEREST, 5, &["costs", "interest"]).with_metadata(
                SourceMetadata::new(SourceType::Direct)
                    .named("Interest")
                    .unit("k€")
                    .category("financing"),
            ),
        )
        .with_item(
            SourceItem::indirect(ELECTRICITY_PRICE, 1, &["simulation", "electricityPrice"])
                .with_percentiles()
                .with_multiplier(Multiplier::new(
                    "priceEscalation",
                    MultiplierOperation::Compound,
                    BASE_YEAR,
                ))
                .with_metadata(
                    SourceMetadata::new(SourceType::Indirect)
                        .named("Electricity price")
                        .unit("€/MWh")
                        .category("market")
                        .sensitivity_variable(),
                ),
        )
        .with_item(
            SourceItem::indirect(OPEX, 2, &["costs", "opex"])
                .with_multiplier(
                    Multiplier::new("opexEscalation", MultiplierOperation::Compound, BASE_YEAR)
                        .with_filter(|year, _, _| year >= BASE_YEAR),
                )
                .with_metadata(
                    SourceMetadata::new(SourceType::Indirect)
                        .named("Operating expenditure")
                        .unit("k€")
                        .category("cost"),
                ),
        )
        .with_item(
            SourceItem::virtual_source(REVENUE, 1, |_, ctx| {
                combine_sources(ctx, ENERGY_PRODUCTION, ELECTRICITY_PRICE, |mwh, price| {
                    mwh * price / 1000.0
                })
            })
            .with_percentiles()
            .with_metadata(
                SourceMetadata::new(SourceType::Virtual)
                    .named("Revenue")
                    .unit("k€")
                    .category("revenue"),
            ),
        )
        .with_item(
            SourceItem::virtual_source(CFADS, 2, |_, ctx| {
                combine_sources(ctx, REVENUE, OPEX, |revenue, opex| revenue - opex)
            })
            .with_percentiles()
            .with_metadata(
                SourceMetadata::new(SourceType::Virtual)
                    .named("Cash flow available for debt service")
                    .unit("k€")
                    .category("cashflow"),
            ),
        )
        .with_item(
            SourceItem::virtual_source(NET_CASHFLOW, 3, |_, ctx| {
                combine_sources(ctx, CFADS, CAPEX, |cfads, capex| cfads - capex)
            })
            .with_percentiles()
            .with_metadata(
                SourceMetadata::new(SourceType::Virtual)
                    .named("Net project cash flow")
                    .unit("k€")
                    .category("cashflow"),
            ),
        )
}

// ========================================
// Metrics
// ========================================

/// Build one result per available percentile.
///
/// `f` receives the output percentile and the percentile to read sources at.
fn per_percentile<F>(ctx: &MetricContext<'_>, f: F) -> Result<MetricOutput, CubeError>
where
    F: Fn(Percentile, Percentile) -> Result<CubeMetricResult, CubeError>,
{
    ctx.available_percentiles
        .iter()
        .map(|&p| f(p, ctx.custom_percentile.unwrap_or(p)))
        .collect::<Result<Vec<_>, _>>()
        .map(MetricOutput::Results)
}

fn ratio_result(percentile: Percentile, ratios: &[TimePoint]) -> CubeMetricResult {
    match finance::summarize_operational(ratios) {
        Some(summary) => CubeMetricResult::new(percentile, summary.min).with_stats(BTreeMap::from([
            ("average".to_string(), summary.average),
            ("minYear".to_string(), summary.min_year as f64),
        ])),
        None => CubeMetricResult::new(percentile, f64::NAN),
    }
}

/// Metric registry of the wind preset.
pub fn metric_registry() -> MetricRegistry {
    MetricRegistry::new()
        .with_reference(Reference::new("discountRate", &["settings", "financing", "discountRate"]))
        .with_reference(Reference::new("projectLife", &["settings", "project", "projectLife"]))
        .with_reference(Reference::new("capacityMw", &["settings", "project", "capacityMw"]))
        .with_item(
            MetricItem::direct("totalEnergy", 1)
                .with_aggregation(Aggregation::new(ENERGY_PRODUCTION, AggregationOp::Sum, "total").as_default())
                .with_metadata(
                    MetricMetadata::new(MetricType::Direct)
                        .named("Lifetime energy")
                        .unit("MWh")
                        .category("production"),
                ),
        )
        .with_item(
            MetricItem::direct("annualRevenue", 2)
                .with_aggregation(
                    Aggregation::new(REVENUE, AggregationOp::Mean, "mean")
                        .with_filter(|p| p.year >= BASE_YEAR)
                        .as_default(),
                )
                .with_aggregation(
                    Aggregation::new(REVENUE, AggregationOp::Min, "min").with_filter(|p| p.year >= BASE_YEAR),
                )
                .with_aggregation(
                    Aggregation::new(REVENUE, AggregationOp::Max, "max").with_filter(|p| p.year >= BASE_YEAR),
                )
                .with_aggregation(
                    Aggregation::new(REVENUE, AggregationOp::Stdev, "stdev")
                        .with_filter(|p| p.year >= BASE_YEAR),
                )
                .with_metadata(
                    MetricMetadata::new(MetricType::Direct)
                        .named("Annual revenue")
                        .unit("k€")
                        .category("revenue"),
                ),
        )
        .with_item(
            MetricItem::direct(PROJECT_NPV, 3)
                .with_aggregation(
                    Aggregation::new(NET_CASHFLOW, AggregationOp::Npv, "npv")
                        .with_discount_rate(Parameter::reference("discountRate"))
                        .as_default(),
                )
                .with_aggregation(Aggregation::new(NET_CASHFLOW, AggregationOp::Sum, "undiscounted"))
                .with_metadata(
                    MetricMetadata::new(MetricType::Direct)
                        .named("Project NPV")
                        .unit("k€")
                        .category("returns"),
                ),
        )
        .with_item(
            MetricItem::direct(PROJECT_IRR, 4)
                .with_dependency(Dependency::source(NET_CASHFLOW))
                .with_transformer(|deps, ctx| {
                    per_percentile(ctx, |p, read| {
                        let flows = deps.source_series(NET_CASHFLOW, read);
                        Ok(CubeMetricResult::new(p, finance::irr(&flows)))
                    })
                })
                .with_metadata(
                    MetricMetadata::new(MetricType::Direct)
                        .named("Project IRR")
                        .unit("%")
                        .category("returns"),
                ),
        )
        .with_item(
            MetricItem::direct("lcoe", 5)
                .with_dependency(Dependency::source(CAPEX))
                .with_dependency(Dependency::source(OPEX))
                .with_dependency(Dependency::source(ENERGY_PRODUCTION))
                .with_dependency(Dependency::reference("discountRate", &[]))
                .with_transformer(|deps, ctx| {
                    let rate = deps
                        .reference_number("discountRate")
                        .ok_or_else(|| CubeError::missing_dependency("reference", "discountRate"))?;
                    per_percentile(ctx, |p, read| {
                        let mut costs = deps.source_series(CAPEX, read);
                        costs.extend(deps.source_series(OPEX, read));
                        let energy = deps.source_series(ENERGY_PRODUCTION, read);
                        let value = finance::lcoe(&costs, &energy, rate)
                            .map(|k_eur_per_mwh| k_eur_per_mwh * 1000.0)
                            .unwrap_or(f64::NAN);
                        Ok(CubeMetricResult::new(p, value))
                    })
                })
                .with_metadata(
                    MetricMetadata::new(MetricType::Direct)
                        .named("Levelised cost of energy")
                        .unit("€/MWh")
                        .category("cost"),
                ),
        )
        .with_item(
            MetricItem::direct("paybackPeriod", 6)
                .with_dependency(Dependency::source(NET_CASHFLOW))
                .with_transformer(|deps, ctx| {
                    per_percentile(ctx, |p, read| {
                        let flows = deps.source_series(NET_CASHFLOW, read);
                        let life = deps
                            .reference_number("projectLife")
                            .or_else(|| flows.last().map(|tp| tp.year as f64))
                            .unwrap_or(0.0);
                        Ok(CubeMetricResult::new(p, finance::payback_period_or(&flows, life)))
                    })
                })
                .with_metadata(
                    MetricMetadata::new(MetricType::Direct)
                        .named("Payback period")
                        .unit("years")
                        .category("returns"),
                ),
        )
        .with_item(
            MetricItem::direct("minDscr", 7)
                .with_dependency(Dependency::source(CFADS))
                .with_dependency(Dependency::source(DEBT_SERVICE))
                .with_transformer(|deps, ctx| {
                    per_percentile(ctx, |p, read| {
                        let ratios = finance::dscr(
                            &deps.source_series(CFADS, read),
                            &deps.source_series(DEBT_SERVICE, read),
                        );
                        Ok(ratio_result(p, &ratios))
                    })
                })
                .with_metadata(
                    MetricMetadata::new(MetricType::Direct)
                        .named("Minimum DSCR")
                        .unit("x")
                        .category("financing"),
                ),
        )
        .with_item(
            MetricItem::direct("minLlcr", 8)
                .with_dependency(Dependency::source(CFADS))
                .with_dependency(Dependency::source(DEBT_BALANCE))
                .with_dependency(Dependency::reference("debtRate", &["settings", "financing", "debtRate"]))
                .with_transformer(|deps, ctx| {
                    let rate = deps
                        .reference_number("debtRate")
                        .ok_or_else(|| CubeError::missing_dependency("reference", "debtRate"))?;
                    ctx.add_audit_entry("llcr", format!("discounting at debt rate {rate}"), &["debtRate"], None);
                    per_percentile(ctx, |p, read| {
                        let ratios = finance::llcr(
                            &deps.source_series(CFADS, read),
                            &deps.source_series(DEBT_BALANCE, read),
                            rate,
                        );
                        Ok(ratio_result(p, &ratios))
                    })
                })
                .with_metadata(
                    MetricMetadata::new(MetricType::Direct)
                        .named("Minimum LLCR")
                        .unit("x")
                        .category("financing"),
                ),
        )
        .with_item(
            MetricItem::direct("minIcr", 9)
                .with_dependency(Dependency::source(CFADS))
                .with_dependency(Dependency::source(INTEREST))
                .with_transformer(|deps, ctx| {
                    per_percentile(ctx, |p, read| {
                        let ratios = finance::icr(
                            &deps.source_series(CFADS, read),
                            &deps.source_series(INTEREST, read),
                        );
                        Ok(ratio_result(p, &ratios))
                    })
                })
                .with_metadata(
                    MetricMetadata::new(MetricType::Direct)
                        .named("Minimum ICR")
                        .unit("x")
                        .category("financing"),
                ),
        )
        .with_item(
            MetricItem::indirect("npvPerMw", 1)
                .with_dependency(Dependency::metric(PROJECT_NPV))
                .with_transformer(|deps, ctx| {
                    per_percentile(ctx, |p, _| {
                        let npv = deps
                            .metric_value(PROJECT_NPV, p)
                            .ok_or_else(|| CubeError::missing_dependency("metric", PROJECT_NPV))?;
                        Ok(CubeMetricResult::new(p, npv))
                    })
                })
                .with_operation(MetricOperation::new("capacityMw", |npv, _, capacity, _, _| {
                    npv / capacity
                }))
                .with_metadata(
                    MetricMetadata::new(MetricType::Indirect)
                        .named("NPV per MW")
                        .unit("k€/MW")
                        .category("returns"),
                ),
        )
}

/// Scenario paths the preset cannot run without.
pub fn required_paths() -> Vec<Vec<String>> {
    vec![
        to_path(&["settings", "financing", "discountRate"]),
        to_path(&["simulation", "energyProduction"]),
        to_path(&["simulation", "electricityPrice"]),
        to_path(&["costs", "capex"]),
    ]
}

// ========================================
// Sample scenario
// ========================================

/// Installed capacity of the sample project.
pub const SAMPLE_CAPACITY_MW: f64 = 100.0;
/// P50 annual energy production of the sample project.
pub const SAMPLE_P50_ENERGY_MWH: f64 = 300_000.0;
/// P50 first-year electricity price of the sample project.
pub const SAMPLE_P50_PRICE: f64 = 55.0;

fn point(year: i32, value: f64) -> Value {
    json!({ "year": year, "value": value })
}

/// Signed distance from the median: `+1` at P10, `-1` at P90.
fn spread(percentile: Percentile) -> f64 {
    (50.0 - percentile as f64) / 40.0
}

fn keyed_by_percentile(percentiles: &[Percentile], years: i32, value: impl Fn(Percentile) -> f64) -> Value {
    let by_percentile: Map<String, Value> = percentiles
        .iter()
        .map(|&p| {
            let series = (1..=years).map(|y| point(y, value(p))).collect();
            (p.to_string(), Value::Array(series))
        })
        .collect();
    Value::Object(by_percentile)
}

/// Scenario document for a 100 MW project with `years` operating years.
///
/// Energy production follows the exceedance convention (P10 is the high
/// case); prices follow the plain percentile convention (P10 is the low
/// case). Debt is 70% of capex, repaid as an annuity over the project life.
pub fn sample_scenario(percentiles: &[Percentile], years: i32) -> Value {
    let years = years.max(1);
    let capex = 1_200.0 * SAMPLE_CAPACITY_MW;
    let debt_rate: f64 = 0.05;
    let debt = capex * 0.7;
    let annuity = debt * debt_rate / (1.0 - (1.0 + debt_rate).powi(-years));

    let mut debt_service = Vec::new();
    let mut debt_balance = Vec::new();
    let mut interest = Vec::new();
    let mut balance = debt;
    for year in 1..=years {
        let due = balance * debt_rate;
        debt_balance.push(point(year, balance));
        interest.push(point(year, due));
        debt_service.push(point(year, annuity));
        balance -= annuity - due;
    }

    json!({
        "settings": {
            "project": {
                "capacityMw": SAMPLE_CAPACITY_MW,
                "projectLife": years,
                "baseYear": BASE_YEAR
            },
            "financing": {
                "discountRate": 0.08,
                "debtRate": debt_rate,
                "gearing": 0.7
            },
            "escalation": {
                "priceEscalation": 0.02,
                "opexEscalation": 0.025
            }
        },
        "simulation": {
            "energyProduction": keyed_by_percentile(percentiles, years, |p| {
                SAMPLE_P50_ENERGY_MWH * (1.0 + 0.12 * spread(p))
            }),
            "electricityPrice": keyed_by_percentile(percentiles, years, |p| {
                SAMPLE_P50_PRICE * (1.0 - 0.15 * spread(p))
            })
        },
        "costs": {
            "capex": [point(0, capex)],
            "opex": (1..=years).map(|y| point(y, 35.0 * SAMPLE_CAPACITY_MW)).collect::<Vec<_>>(),
            "debtService": debt_service,
            "debtBalance": debt_balance,
            "interest": interest
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::JsonScenario;
    use crate::source::compute_source_data_with_report;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_scenario_shape() {
        let doc = sample_scenario(&[10, 50, 90], 3);
        assert_eq!(doc["simulation"]["energyProduction"]["50"].as_array().unwrap().len(), 3);
        assert_eq!(doc["costs"]["capex"][0]["year"], 0);
        let p10 = doc["simulation"]["energyProduction"]["10"][0]["value"].as_f64().unwrap();
        let p90 = doc["simulation"]["energyProduction"]["90"][0]["value"].as_f64().unwrap();
        assert!(p10 > p90);
    }

    #[test]
    fn test_sample_debt_amortises() {
        let doc = sample_scenario(&[50], 10);
        let balances: Vec<f64> = doc["costs"]["debtBalance"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["value"].as_f64().unwrap())
            .collect();
        assert!(balances.windows(2).all(|w| w[1] < w[0]));
        let annuity = doc["costs"]["debtService"][9]["value"].as_f64().unwrap();
        let last_interest = doc["costs"]["interest"][9]["value"].as_f64().unwrap();
        assert_relative_eq!(balances[9] + last_interest, annuity, max_relative = 1e-9);
    }

    #[test]
    fn test_sources_all_process() {
        let scenario = JsonScenario::new(sample_scenario(&[10, 50, 90], 4));
        let (records, report) =
            compute_source_data_with_report(&source_registry(), &[10, 50, 90], &scenario, None);

        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(records.len(), 10);

        let revenue = records.iter().find(|r| r.id == REVENUE).unwrap();
        // Year 1 price is unescalated.
        assert_relative_eq!(
            revenue.value_at(1, 50).unwrap(),
            SAMPLE_P50_ENERGY_MWH * SAMPLE_P50_PRICE / 1000.0,
            epsilon = 1e-9
        );
        let price = records.iter().find(|r| r.id == ELECTRICITY_PRICE).unwrap();
        assert_relative_eq!(price.value_at(3, 50).unwrap(), SAMPLE_P50_PRICE * 1.02f64.powi(2), epsilon = 1e-9);
    }

    #[test]
    fn test_metrics_all_process() {
        let percentiles = vec![10, 50, 90];
        let scenario = JsonScenario::new(sample_scenario(&percentiles, 20));
        let sources = crate::source::compute_source_data(&source_registry(), &percentiles, &scenario, None);
        let lookup = crate::lookup::SourceLookup::new(&sources);
        let (metrics, report) = crate::metric::compute_metrics_data_with_report(
            &metric_registry(),
            &crate::metric::PercentileInfo::new(percentiles),
            &scenario,
            &lookup,
        );

        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(report.missing_data, 0);

        let metric = |id: &str| metrics.iter().find(|m| m.id == id).unwrap();
        let npv = metric(PROJECT_NPV).value_at(50).unwrap();
        assert_relative_eq!(
            metric("npvPerMw").value_at(50).unwrap(),
            npv / SAMPLE_CAPACITY_MW,
            max_relative = 1e-12
        );

        let irr = metric(PROJECT_IRR).value_at(50).unwrap();
        assert!(irr.is_finite() && irr > 0.0);
        // Energy follows the exceedance convention.
        assert!(metric("totalEnergy").value_at(10).unwrap() > metric("totalEnergy").value_at(90).unwrap());
        assert!(metric("minDscr").stat_at(50, "minYear").is_some());
    }
}
