//! Ancillary join and cross-dataset derived metrics.
//!
//! Derived values combine a survey percentage with a census count. A missing
//! input or a zero denominator produces a null output; nothing is ever
//! substituted with zero.

use std::collections::HashMap;

use crate::identity::{canonicalize, RegionId};
use crate::model::{
    AncillaryJoinStats, AncillaryStats, AncillaryTable, DerivedMetrics, RegionRecord,
};
use crate::numeric::{add, percentage, ratio, share_of};

/// Decimal places for `population_per_household`.
pub const PER_HOUSEHOLD_DP: u32 = 2;
/// Decimal places for the census-derived rates.
pub const RATE_DP: u32 = 1;

/// Join ancillary rows onto regions by canonical id.
///
/// Rows whose identifier does not canonicalize are counted and dropped. When
/// an id occurs more than once the last row wins.
pub fn attach_ancillary(
    regions: &mut [RegionRecord],
    table: &AncillaryTable,
) -> AncillaryJoinStats {
    let mut stats = AncillaryJoinStats {
        label: table.label.clone(),
        rows: table.rows.len(),
        ..Default::default()
    };

    let mut by_id: HashMap<RegionId, &AncillaryStats> = HashMap::with_capacity(table.rows.len());
    for row in &table.rows {
        match canonicalize(&row.raw_identifier) {
            Ok(id) => {
                if by_id.insert(id, &row.stats).is_some() {
                    stats.duplicate_overwrites += 1;
                }
            }
            Err(err) => {
                tracing::debug!(table = %table.label, error = %err, "dropping ancillary row");
                stats.invalid_identifiers += 1;
            }
        }
    }

    let mut used = 0;
    for region in regions.iter_mut() {
        if let Some(row) = by_id.get(&region.region_id) {
            region.ancillary = Some((*row).clone());
            used += 1;
        }
    }
    stats.matched = used;
    stats.unmatched = by_id.len() - used;
    stats
}

/// Second-order metrics for one region.
pub fn derive_metrics(region: &RegionRecord) -> DerivedMetrics {
    let Some(anc) = &region.ancillary else {
        return DerivedMetrics::default();
    };
    let m = &region.metrics;
    let population = anc.total_population;

    DerivedMetrics {
        alice_population: share_of(population, m.alice_pct),
        poverty_population: share_of(population, m.poverty_pct),
        below_threshold_population: share_of(population, m.below_threshold_pct),
        population_per_household: ratio(population, m.households, PER_HOUSEHOLD_DP),
        homeownership_rate: percentage(
            anc.owner_occupied_housing,
            add(anc.owner_occupied_housing, anc.renter_occupied_housing),
            RATE_DP,
        ),
        unemployment_rate: percentage(anc.unemployed, population, RATE_DP),
        college_degree_rate: percentage(college_graduates(anc), population, RATE_DP),
        elderly_population_rate: percentage(
            add(add(anc.age_65_to_74, anc.age_75_to_84), anc.age_85_plus),
            population,
            RATE_DP,
        ),
        minority_population_rate: percentage(
            population.zip(anc.white_alone).filter(|(p, w)| w <= p).map(|(p, w)| p - w),
            population,
            RATE_DP,
        ),
        work_from_home_rate: percentage(anc.work_from_home, anc.total_commuters, RATE_DP),
    }
}

fn college_graduates(anc: &AncillaryStats) -> Option<i64> {
    let graduate = add(anc.masters_degree, add(anc.professional_degree, anc.doctorate_degree));
    add(anc.bachelors_degree, graduate)
}

/// Fill in `derived` on every region. Only the derived fields are written.
pub fn apply_derived(regions: &mut [RegionRecord]) {
    for region in regions {
        region.derived = derive_metrics(region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AncillaryRow, AttributeMetrics, BoundaryRecord, Geometry, MatchMethod};
    use rust_decimal::Decimal;

    fn region(id: &str) -> RegionRecord {
        RegionRecord::from_boundary(&BoundaryRecord {
            region_id: canonicalize(id).unwrap(),
            display_name: "Harris County".into(),
            state_abbr: "TX".into(),
            county_name: "Harris".into(),
            geometry: Geometry::Polygon(vec![]),
        })
    }

    fn row(id: &str, population: Option<i64>) -> AncillaryRow {
        AncillaryRow {
            raw_identifier: id.into(),
            stats: AncillaryStats { total_population: population, ..Default::default() },
        }
    }

    fn table(rows: Vec<AncillaryRow>) -> AncillaryTable {
        AncillaryTable { label: "ACS".into(), rows }
    }

    #[test]
    fn joins_by_canonical_id_and_counts_leftovers() {
        let mut regions = vec![region("48201"), region("48113")];
        let stats = attach_ancillary(
            &mut regions,
            &table(vec![
                row("48201", Some(1)),
                row("48201.0", Some(2)),
                row("99999", Some(3)),
                row("bogus", Some(4)),
            ]),
        );
        assert_eq!(regions[0].ancillary.as_ref().unwrap().total_population, Some(2));
        assert!(regions[1].ancillary.is_none());
        assert_eq!(stats.rows, 4);
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.invalid_identifiers, 1);
        assert_eq!(stats.duplicate_overwrites, 1);
    }

    #[test]
    fn populations_follow_survey_percentages() {
        let mut r = region("48201");
        r.match_method = MatchMethod::Exact;
        r.metrics = AttributeMetrics {
            households: Some(400),
            alice_pct: Some(Decimal::new(3050, 2)),
            poverty_pct: Some(Decimal::new(1225, 2)),
            below_threshold_pct: Some(Decimal::new(4275, 2)),
            ..Default::default()
        };
        r.ancillary = Some(AncillaryStats {
            total_population: Some(1000),
            owner_occupied_housing: Some(2),
            renter_occupied_housing: Some(1),
            unemployed: Some(45),
            ..Default::default()
        });
        let d = derive_metrics(&r);
        assert_eq!(d.alice_population, Some(305));
        assert_eq!(d.poverty_population, Some(123)); // 122.5 rounds away from zero
        assert_eq!(d.below_threshold_population, Some(428)); // 427.5
        assert_eq!(d.population_per_household, Some(Decimal::new(250, 2)));
        assert_eq!(d.homeownership_rate, Some(Decimal::new(667, 1)));
        assert_eq!(d.unemployment_rate, Some(Decimal::new(45, 1)));
    }

    #[test]
    fn census_rates_use_population_or_commuters() {
        let mut r = region("48201");
        r.ancillary = Some(AncillaryStats {
            total_population: Some(2000),
            bachelors_degree: Some(300),
            masters_degree: Some(100),
            professional_degree: Some(20),
            doctorate_degree: Some(10),
            age_65_to_74: Some(150),
            age_75_to_84: Some(80),
            age_85_plus: Some(25),
            white_alone: Some(1150),
            work_from_home: Some(90),
            total_commuters: Some(800),
            ..Default::default()
        });
        let d = derive_metrics(&r);
        assert_eq!(d.college_degree_rate, Some(Decimal::new(215, 1)));
        assert_eq!(d.elderly_population_rate, Some(Decimal::new(128, 1))); // 12.75
        assert_eq!(d.minority_population_rate, Some(Decimal::new(425, 1)));
        assert_eq!(d.work_from_home_rate, Some(Decimal::new(113, 1))); // 11.25
        assert_eq!(d.college_degree_rate.unwrap().to_string(), "21.5");
    }

    #[test]
    fn census_rates_need_every_term() {
        let mut r = region("48201");
        r.ancillary = Some(AncillaryStats {
            total_population: Some(2000),
            bachelors_degree: Some(300),
            masters_degree: Some(100),
            age_65_to_74: Some(150),
            age_85_plus: Some(25),
            work_from_home: Some(90),
            total_commuters: Some(0),
            ..Default::default()
        });
        let d = derive_metrics(&r);
        assert_eq!(d.college_degree_rate, None);
        assert_eq!(d.elderly_population_rate, None);
        assert_eq!(d.minority_population_rate, None);
        assert_eq!(d.work_from_home_rate, None);

        // More white-alone residents than people is a bad row, not a negative rate.
        r.ancillary = Some(AncillaryStats {
            total_population: Some(100),
            white_alone: Some(120),
            ..Default::default()
        });
        assert_eq!(derive_metrics(&r).minority_population_rate, None);
    }

    #[test]
    fn missing_inputs_give_null_not_zero() {
        let mut r = region("48201");
        r.metrics.alice_pct = Some(Decimal::new(3000, 2));
        r.ancillary = Some(AncillaryStats::default());
        let d = derive_metrics(&r);
        assert_eq!(d, DerivedMetrics::default());

        r.ancillary = None;
        assert_eq!(derive_metrics(&r), DerivedMetrics::default());
    }

    #[test]
    fn zero_denominators_give_null() {
        let mut r = region("48201");
        r.metrics.households = Some(0);
        r.ancillary = Some(AncillaryStats {
            total_population: Some(0),
            owner_occupied_housing: Some(0),
            renter_occupied_housing: Some(0),
            unemployed: Some(0),
            ..Default::default()
        });
        let d = derive_metrics(&r);
        assert_eq!(d.population_per_household, None);
        assert_eq!(d.homeownership_rate, None);
        assert_eq!(d.unemployment_rate, None);
    }

    #[test]
    fn apply_only_touches_derived_fields() {
        let mut regions = vec![region("48201")];
        regions[0].metrics.alice_pct = Some(Decimal::new(5000, 2));
        regions[0].ancillary =
            Some(AncillaryStats { total_population: Some(10), ..Default::default() });
        let before = regions[0].clone();
        apply_derived(&mut regions);
        assert_eq!(regions[0].derived.alice_population, Some(5));
        assert_eq!(regions[0].metrics, before.metrics);
        assert_eq!(regions[0].ancillary, before.ancillary);
        assert_eq!(regions[0].match_method, before.match_method);
    }
}
