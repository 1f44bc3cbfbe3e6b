//! Fused output writers: flat CSV (no geometry), GeoJSON FeatureCollection,
//! and the full JSON result.

use std::fs;
use std::path::Path;

use regionfuse_recon::model::{FusionResult, RegionRecord};
use serde_json::{json, Value};

/// CSV columns in output order.
pub const CSV_COLUMNS: &[&str] = &[
    "region_id",
    "display_name",
    "state_abbr",
    "county_name",
    "match_method",
    "source_label",
    "source_state",
    "source_county",
    "year",
    "households",
    "poverty_households",
    "alice_households",
    "above_alice_households",
    "below_threshold_households",
    "alice_threshold_under_65",
    "alice_threshold_65_plus",
    "poverty_pct",
    "alice_pct",
    "above_alice_pct",
    "below_threshold_pct",
    "total_population",
    "total_housing_units",
    "owner_occupied_housing",
    "renter_occupied_housing",
    "median_household_income",
    "median_home_value",
    "unemployed",
    "alice_population",
    "poverty_population",
    "below_threshold_population",
    "population_per_household",
    "homeownership_rate",
    "unemployment_rate",
    "bachelors_degree",
    "masters_degree",
    "professional_degree",
    "doctorate_degree",
    "age_65_to_74",
    "age_75_to_84",
    "age_85_plus",
    "white_alone",
    "work_from_home",
    "total_commuters",
    "college_degree_rate",
    "elderly_population_rate",
    "minority_population_rate",
    "work_from_home_rate",
];

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_row(r: &RegionRecord) -> Vec<String> {
    let m = &r.metrics;
    let d = &r.derived;
    let src = r.attribute_source.as_ref();
    let anc = r.ancillary.as_ref();
    vec![
        r.region_id.to_string(),
        r.display_name.clone(),
        r.state_abbr.clone(),
        r.county_name.clone(),
        r.match_method.to_string(),
        opt(src.map(|s| s.source_label.clone())),
        opt(src.and_then(|s| s.state_name.clone())),
        opt(src.and_then(|s| s.county_name.clone())),
        opt(src.and_then(|s| s.year)),
        opt(m.households),
        opt(m.poverty_households),
        opt(m.alice_households),
        opt(m.above_alice_households),
        opt(m.below_threshold_households),
        opt(m.alice_threshold_under_65),
        opt(m.alice_threshold_65_plus),
        opt(m.poverty_pct),
        opt(m.alice_pct),
        opt(m.above_alice_pct),
        opt(m.below_threshold_pct),
        opt(anc.and_then(|a| a.total_population)),
        opt(anc.and_then(|a| a.total_housing_units)),
        opt(anc.and_then(|a| a.owner_occupied_housing)),
        opt(anc.and_then(|a| a.renter_occupied_housing)),
        opt(anc.and_then(|a| a.median_household_income)),
        opt(anc.and_then(|a| a.median_home_value)),
        opt(anc.and_then(|a| a.unemployed)),
        opt(d.alice_population),
        opt(d.poverty_population),
        opt(d.below_threshold_population),
        opt(d.population_per_household),
        opt(d.homeownership_rate),
        opt(d.unemployment_rate),
        opt(anc.and_then(|a| a.bachelors_degree)),
        opt(anc.and_then(|a| a.masters_degree)),
        opt(anc.and_then(|a| a.professional_degree)),
        opt(anc.and_then(|a| a.doctorate_degree)),
        opt(anc.and_then(|a| a.age_65_to_74)),
        opt(anc.and_then(|a| a.age_75_to_84)),
        opt(anc.and_then(|a| a.age_85_plus)),
        opt(anc.and_then(|a| a.white_alone)),
        opt(anc.and_then(|a| a.work_from_home)),
        opt(anc.and_then(|a| a.total_commuters)),
        opt(d.college_degree_rate),
        opt(d.elderly_population_rate),
        opt(d.minority_population_rate),
        opt(d.work_from_home_rate),
    ]
}

/// Render regions as CSV. Nulls are empty fields.
pub fn render_csv(regions: &[RegionRecord]) -> Result<String, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS).map_err(|e| e.to_string())?;
    for region in regions {
        writer.write_record(csv_row(region)).map_err(|e| e.to_string())?;
    }
    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

/// Render regions as a GeoJSON FeatureCollection; every non-geometry field
/// becomes a feature property.
pub fn render_geojson(regions: &[RegionRecord]) -> Result<Value, String> {
    let features = regions
        .iter()
        .map(|r| {
            Ok(json!({
                "type": "Feature",
                "properties": serde_json::to_value(r).map_err(|e| e.to_string())?,
                "geometry": serde_json::to_value(&r.geometry).map_err(|e| e.to_string())?,
            }))
        })
        .collect::<Result<Vec<_>, String>>()?;
    Ok(json!({ "type": "FeatureCollection", "features": features }))
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {e}", parent.display()))?;
    }
    fs::write(path, contents).map_err(|e| format!("cannot write {}: {e}", path.display()))
}

pub fn write_csv(path: &Path, regions: &[RegionRecord]) -> Result<(), String> {
    write_file(path, render_csv(regions)?.as_bytes())
}

pub fn write_geojson(path: &Path, regions: &[RegionRecord]) -> Result<(), String> {
    let value = render_geojson(regions)?;
    let text = serde_json::to_string(&value).map_err(|e| e.to_string())?;
    write_file(path, text.as_bytes())
}

pub fn write_json(path: &Path, result: &FusionResult) -> Result<(), String> {
    let text = serde_json::to_string_pretty(result).map_err(|e| e.to_string())?;
    write_file(path, text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regionfuse_recon::identity::canonicalize;
    use regionfuse_recon::model::{BoundaryRecord, Geometry, MatchMethod};
    use rust_decimal::Decimal;

    fn regions() -> Vec<RegionRecord> {
        let mut matched = RegionRecord::from_boundary(&BoundaryRecord {
            region_id: canonicalize("48201").unwrap(),
            display_name: "Harris County".into(),
            state_abbr: "TX".into(),
            county_name: "Harris".into(),
            geometry: Geometry::Polygon(vec![vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![0.0, 0.0]]]),
        });
        matched.match_method = MatchMethod::Exact;
        matched.metrics.households = Some(1000);
        matched.metrics.alice_pct = Some(Decimal::new(3000, 2));
        matched.derived.work_from_home_rate = Some(Decimal::new(113, 1));
        let unmatched = RegionRecord::from_boundary(&BoundaryRecord {
            region_id: canonicalize("1001").unwrap(),
            display_name: "Autauga County, AL".into(),
            state_abbr: "AL".into(),
            county_name: "Autauga".into(),
            geometry: Geometry::MultiPolygon(vec![]),
        });
        vec![matched, unmatched]
    }

    #[test]
    fn csv_has_header_and_empty_nulls() {
        let text = render_csv(&regions()).unwrap();
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let header: Vec<_> = reader.headers().unwrap().iter().map(str::to_owned).collect();
        assert_eq!(header, CSV_COLUMNS);
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(&rows[0][0], "48201");
        assert_eq!(&rows[0][4], "exact");
        assert_eq!(&rows[0][9], "1000");
        assert_eq!(&rows[0][17], "30.00");
        assert_eq!(&rows[1][0], "01001");
        assert_eq!(&rows[1][1], "Autauga County, AL");
        assert_eq!(&rows[1][9], "");

        let wfh = CSV_COLUMNS.iter().position(|c| *c == "work_from_home_rate").unwrap();
        assert_eq!(&rows[0][wfh], "11.3");
        assert_eq!(&rows[1][wfh], "");
        assert_eq!(rows[0].len(), CSV_COLUMNS.len());
    }

    #[test]
    fn geojson_carries_geometry_and_properties() {
        let value = render_geojson(&regions()).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        let first = &value["features"][0];
        assert_eq!(first["geometry"]["type"], "Polygon");
        assert_eq!(first["properties"]["region_id"], "48201");
        assert_eq!(first["properties"]["households"], 1000);
        assert!(first["properties"].get("geometry").is_none());
        assert_eq!(value["features"][1]["geometry"]["type"], "MultiPolygon");
    }

    #[test]
    fn writers_create_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/regions.csv");
        write_csv(&path, &regions()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("region_id,display_name"));
    }
}
