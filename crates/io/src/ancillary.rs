//! Ancillary census table loading.
//!
//! Accepts either the census API response shape (a JSON array of arrays whose
//! first row is the header) or a CSV file. Columns are recognized by ACS
//! variable code (`B01003_001E`) or by a readable name (`Total_Population`,
//! `total population`). Census sentinel values (large negatives) and blanks
//! become nulls.

use std::fmt;

use regionfuse_recon::config::AncillaryKey;
use regionfuse_recon::identity::RegionId;
use regionfuse_recon::model::{AncillaryRow, AncillaryStats, AncillaryTable, RawValue};
use serde_json::Value;

use crate::extract::decode_text;

#[derive(Debug)]
pub enum AncillaryError {
    Json(String),
    Csv(String),
    /// JSON that is not an array of arrays with a header row.
    Shape,
    MissingColumn(String),
}

impl fmt::Display for AncillaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(msg) => write!(f, "ancillary table is not valid JSON: {msg}"),
            Self::Csv(msg) => write!(f, "ancillary table CSV error: {msg}"),
            Self::Shape => {
                write!(f, "ancillary JSON must be an array of arrays with a header row")
            }
            Self::MissingColumn(c) => write!(f, "ancillary table has no '{c}' column"),
        }
    }
}

impl std::error::Error for AncillaryError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stat {
    TotalPopulation,
    TotalHousingUnits,
    OwnerOccupied,
    RenterOccupied,
    MedianHouseholdIncome,
    MedianHomeValue,
    Unemployed,
    BachelorsDegree,
    MastersDegree,
    ProfessionalDegree,
    DoctorateDegree,
    Age65To74,
    Age75To84,
    Age85Plus,
    WhiteAlone,
    WorkFromHome,
    TotalCommuters,
}

/// (variable code, readable name, stat)
const STAT_COLUMNS: &[(&str, &str, Stat)] = &[
    ("B01003_001E", "total_population", Stat::TotalPopulation),
    ("B25001_001E", "total_housing_units", Stat::TotalHousingUnits),
    ("B25003_002E", "owner_occupied_housing", Stat::OwnerOccupied),
    ("B25003_003E", "renter_occupied_housing", Stat::RenterOccupied),
    ("B19013_001E", "median_household_income", Stat::MedianHouseholdIncome),
    ("B25077_001E", "median_home_value", Stat::MedianHomeValue),
    ("B23025_005E", "unemployed", Stat::Unemployed),
    ("B15003_022E", "bachelors_degree", Stat::BachelorsDegree),
    ("B15003_023E", "masters_degree", Stat::MastersDegree),
    ("B15003_024E", "professional_degree", Stat::ProfessionalDegree),
    ("B15003_025E", "doctorate_degree", Stat::DoctorateDegree),
    ("B01001_020E", "age_65_to_74", Stat::Age65To74),
    ("B01001_021E", "age_75_to_84", Stat::Age75To84),
    ("B01001_022E", "age_85_plus", Stat::Age85Plus),
    ("B02001_002E", "white_alone", Stat::WhiteAlone),
    ("B08301_021E", "work_from_home", Stat::WorkFromHome),
    ("B08303_001E", "total_commuters", Stat::TotalCommuters),
];

fn column_key(header: &str) -> String {
    header
        .split(|c: char| c.is_whitespace() || c == '_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn stat_for(header: &str) -> Option<Stat> {
    let key = column_key(header);
    STAT_COLUMNS
        .iter()
        .find(|(code, name, _)| key == code.to_lowercase() || key == *name)
        .map(|(_, _, stat)| *stat)
}

fn set_stat(stats: &mut AncillaryStats, stat: Stat, value: Option<i64>) {
    let slot = match stat {
        Stat::TotalPopulation => &mut stats.total_population,
        Stat::TotalHousingUnits => &mut stats.total_housing_units,
        Stat::OwnerOccupied => &mut stats.owner_occupied_housing,
        Stat::RenterOccupied => &mut stats.renter_occupied_housing,
        Stat::MedianHouseholdIncome => &mut stats.median_household_income,
        Stat::MedianHomeValue => &mut stats.median_home_value,
        Stat::Unemployed => &mut stats.unemployed,
        Stat::BachelorsDegree => &mut stats.bachelors_degree,
        Stat::MastersDegree => &mut stats.masters_degree,
        Stat::ProfessionalDegree => &mut stats.professional_degree,
        Stat::DoctorateDegree => &mut stats.doctorate_degree,
        Stat::Age65To74 => &mut stats.age_65_to_74,
        Stat::Age75To84 => &mut stats.age_75_to_84,
        Stat::Age85Plus => &mut stats.age_85_plus,
        Stat::WhiteAlone => &mut stats.white_alone,
        Stat::WorkFromHome => &mut stats.work_from_home,
        Stat::TotalCommuters => &mut stats.total_commuters,
    };
    *slot = value;
}

/// Parse an ancillary table from JSON (census API) or CSV bytes.
pub fn parse_ancillary(
    label: &str,
    bytes: &[u8],
    key: &AncillaryKey,
) -> Result<AncillaryTable, AncillaryError> {
    let text = decode_text(bytes);
    let grid = if text.trim_start().starts_with('[') {
        json_grid(&text)?
    } else {
        csv_grid(&text)?
    };
    let mut rows_iter = grid.into_iter();
    let header: Vec<String> = rows_iter
        .next()
        .ok_or(AncillaryError::Shape)?
        .iter()
        .map(|v| v.as_text().unwrap_or_default())
        .collect();

    let find = |name: &str| {
        header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| AncillaryError::MissingColumn(name.to_string()))
    };
    let key_columns = match key {
        AncillaryKey::Id(id) => (find(id)?, None),
        AncillaryKey::Parts { state, county } => (find(state)?, Some(find(county)?)),
    };
    let stat_columns: Vec<(usize, Stat)> = header
        .iter()
        .enumerate()
        .filter_map(|(i, h)| stat_for(h).map(|s| (i, s)))
        .collect();

    let rows = rows_iter
        .map(|cells| {
            let cell = |i: usize| cells.get(i).and_then(RawValue::as_text).unwrap_or_default();
            let raw_identifier = match key_columns {
                (id, None) => cell(id),
                (state, Some(county)) => {
                    let (s, c) = (cell(state), cell(county));
                    // An unbuildable pair is kept as-is and rejected at join time.
                    RegionId::from_parts(&s, &c)
                        .map(|id| id.as_str().to_string())
                        .unwrap_or_else(|_| format!("{s}/{c}"))
                }
            };
            let mut stats = AncillaryStats::default();
            for (i, stat) in &stat_columns {
                set_stat(&mut stats, *stat, cells.get(*i).and_then(RawValue::as_count));
            }
            AncillaryRow { raw_identifier, stats }
        })
        .collect();

    Ok(AncillaryTable { label: label.to_string(), rows })
}

fn json_grid(text: &str) -> Result<Vec<Vec<RawValue>>, AncillaryError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| AncillaryError::Json(e.to_string()))?;
    let Value::Array(rows) = value else {
        return Err(AncillaryError::Shape);
    };
    rows.into_iter()
        .map(|row| match row {
            Value::Array(cells) => Ok(cells.into_iter().map(json_cell).collect()),
            _ => Err(AncillaryError::Shape),
        })
        .collect()
}

fn json_cell(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Blank,
        Value::String(s) => RawValue::Text(s),
        Value::Number(n) => n.as_f64().map_or(RawValue::Blank, RawValue::Number),
        other => RawValue::Text(other.to_string()),
    }
}

fn csv_grid(text: &str) -> Result<Vec<Vec<RawValue>>, AncillaryError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    reader
        .records()
        .map(|record| {
            let record = record.map_err(|e| AncillaryError::Csv(e.to_string()))?;
            Ok(record
                .iter()
                .map(|f| if f.trim().is_empty() { RawValue::Blank } else { RawValue::from(f) })
                .collect())
        })
        .collect()
}
