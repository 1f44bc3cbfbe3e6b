//! Null-aware summary statistics over the fused region set.

use rust_decimal::Decimal;

use crate::model::{ColumnStats, FusionSummary, MatchMethod, MethodCounts, RegionRecord};
use crate::numeric::{percentage, round_dp};

/// Decimal places for column means and completeness.
pub const SUMMARY_DP: u32 = 2;

/// Every numeric column the summary reports on, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricColumn {
    Households,
    PovertyHouseholds,
    AliceHouseholds,
    AboveAliceHouseholds,
    BelowThresholdHouseholds,
    PovertyPct,
    AlicePct,
    AboveAlicePct,
    BelowThresholdPct,
    TotalPopulation,
    MedianHouseholdIncome,
    MedianHomeValue,
    AlicePopulation,
    PovertyPopulation,
    BelowThresholdPopulation,
    PopulationPerHousehold,
    HomeownershipRate,
    UnemploymentRate,
    CollegeDegreeRate,
    ElderlyPopulationRate,
    MinorityPopulationRate,
    WorkFromHomeRate,
}

impl MetricColumn {
    pub const ALL: [MetricColumn; 22] = [
        Self::Households,
        Self::PovertyHouseholds,
        Self::AliceHouseholds,
        Self::AboveAliceHouseholds,
        Self::BelowThresholdHouseholds,
        Self::PovertyPct,
        Self::AlicePct,
        Self::AboveAlicePct,
        Self::BelowThresholdPct,
        Self::TotalPopulation,
        Self::MedianHouseholdIncome,
        Self::MedianHomeValue,
        Self::AlicePopulation,
        Self::PovertyPopulation,
        Self::BelowThresholdPopulation,
        Self::PopulationPerHousehold,
        Self::HomeownershipRate,
        Self::UnemploymentRate,
        Self::CollegeDegreeRate,
        Self::ElderlyPopulationRate,
        Self::MinorityPopulationRate,
        Self::WorkFromHomeRate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Households => "households",
            Self::PovertyHouseholds => "poverty_households",
            Self::AliceHouseholds => "alice_households",
            Self::AboveAliceHouseholds => "above_alice_households",
            Self::BelowThresholdHouseholds => "below_threshold_households",
            Self::PovertyPct => "poverty_pct",
            Self::AlicePct => "alice_pct",
            Self::AboveAlicePct => "above_alice_pct",
            Self::BelowThresholdPct => "below_threshold_pct",
            Self::TotalPopulation => "total_population",
            Self::MedianHouseholdIncome => "median_household_income",
            Self::MedianHomeValue => "median_home_value",
            Self::AlicePopulation => "alice_population",
            Self::PovertyPopulation => "poverty_population",
            Self::BelowThresholdPopulation => "below_threshold_population",
            Self::PopulationPerHousehold => "population_per_household",
            Self::HomeownershipRate => "homeownership_rate",
            Self::UnemploymentRate => "unemployment_rate",
            Self::CollegeDegreeRate => "college_degree_rate",
            Self::ElderlyPopulationRate => "elderly_population_rate",
            Self::MinorityPopulationRate => "minority_population_rate",
            Self::WorkFromHomeRate => "work_from_home_rate",
        }
    }

    pub fn value(self, region: &RegionRecord) -> Option<Decimal> {
        let m = &region.metrics;
        let d = &region.derived;
        let anc = region.ancillary.as_ref();
        let count = |v: Option<i64>| v.map(Decimal::from);
        match self {
            Self::Households => count(m.households),
            Self::PovertyHouseholds => count(m.poverty_households),
            Self::AliceHouseholds => count(m.alice_households),
            Self::AboveAliceHouseholds => count(m.above_alice_households),
            Self::BelowThresholdHouseholds => count(m.below_threshold_households),
            Self::PovertyPct => m.poverty_pct,
            Self::AlicePct => m.alice_pct,
            Self::AboveAlicePct => m.above_alice_pct,
            Self::BelowThresholdPct => m.below_threshold_pct,
            Self::TotalPopulation => count(anc.and_then(|a| a.total_population)),
            Self::MedianHouseholdIncome => count(anc.and_then(|a| a.median_household_income)),
            Self::MedianHomeValue => count(anc.and_then(|a| a.median_home_value)),
            Self::AlicePopulation => count(d.alice_population),
            Self::PovertyPopulation => count(d.poverty_population),
            Self::BelowThresholdPopulation => count(d.below_threshold_population),
            Self::PopulationPerHousehold => d.population_per_household,
            Self::HomeownershipRate => d.homeownership_rate,
            Self::UnemploymentRate => d.unemployment_rate,
            Self::CollegeDegreeRate => d.college_degree_rate,
            Self::ElderlyPopulationRate => d.elderly_population_rate,
            Self::MinorityPopulationRate => d.minority_population_rate,
            Self::WorkFromHomeRate => d.work_from_home_rate,
        }
    }
}

/// Statistics for one column. Nulls count as zero in `sum` but are excluded
/// from `mean`.
pub fn column_stats(column: MetricColumn, regions: &[RegionRecord]) -> ColumnStats {
    let values: Vec<Decimal> = regions.iter().filter_map(|r| column.value(r)).collect();
    let sum: Decimal = values.iter().sum();
    let mean = (!values.is_empty())
        .then(|| round_dp(sum / Decimal::from(values.len()), SUMMARY_DP));
    ColumnStats {
        column: column.name().to_string(),
        non_null: values.len(),
        null: regions.len() - values.len(),
        sum,
        mean,
    }
}

pub fn summarize(regions: &[RegionRecord]) -> FusionSummary {
    let mut methods = MethodCounts::default();
    for r in regions {
        match r.match_method {
            MatchMethod::Exact => methods.exact += 1,
            MatchMethod::Fallback => methods.fallback += 1,
            MatchMethod::Unmatched => methods.unmatched += 1,
        }
    }
    let attribute_matched = methods.exact + methods.fallback;
    let total = regions.len();

    FusionSummary {
        total_regions: total,
        attribute_matched,
        ancillary_matched: regions.iter().filter(|r| r.ancillary.is_some()).count(),
        completeness_pct: percentage(
            i64::try_from(attribute_matched).ok(),
            i64::try_from(total).ok(),
            SUMMARY_DP,
        ),
        methods,
        columns: MetricColumn::ALL
            .iter()
            .map(|c| column_stats(*c, regions))
            .collect(),
    }
}
