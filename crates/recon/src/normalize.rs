//! Schema normalization - project a raw survey sheet onto the canonical
//! attribute record and compute first-order percentages.
//!
//! Per-state sheets disagree on header spelling and spacing, carry extra
//! columns, and leave trailing blank rows. Only the statically recognized
//! columns for the sheet's [`RecordKind`] are read; everything else is ignored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{
    AttributeMetrics, ExtractStats, FailureKind, NormalizedAttributeRecord, RawExtract, RawRow,
    RawValue, RecordKind, SourceFailure,
};
use crate::numeric::{add, percentage};

/// Decimal places for first-order percentages.
pub const PERCENT_DP: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    State,
    Year,
    Type,
    GeoId,
    DisplayLabel,
    County,
    StateAbbr,
    Households,
    PovertyHouseholds,
    AliceHouseholds,
    AboveAliceHouseholds,
    ThresholdUnder65,
    Threshold65Plus,
}

impl Field {
    fn header(self) -> &'static str {
        match self {
            Self::State => "State",
            Self::Year => "Year",
            Self::Type => "Type",
            Self::GeoId => "GEO id2",
            Self::DisplayLabel => "GEO display_label",
            Self::County => "County",
            Self::StateAbbr => "State Abbr",
            Self::Households => "Households",
            Self::PovertyHouseholds => "Poverty Households",
            Self::AliceHouseholds => "ALICE Households",
            Self::AboveAliceHouseholds => "Above ALICE Households",
            Self::ThresholdUnder65 => "ALICE Threshold - HH under 65",
            Self::Threshold65Plus => "ALICE Threshold - HH 65 years and over",
        }
    }
}

const COUNTY_FIELDS: &[Field] = &[
    Field::State,
    Field::Year,
    Field::GeoId,
    Field::DisplayLabel,
    Field::County,
    Field::StateAbbr,
    Field::Households,
    Field::PovertyHouseholds,
    Field::AliceHouseholds,
    Field::AboveAliceHouseholds,
    Field::ThresholdUnder65,
    Field::Threshold65Plus,
];

const SUBCOUNTY_FIELDS: &[Field] = &[
    Field::State,
    Field::Year,
    Field::Type,
    Field::GeoId,
    Field::DisplayLabel,
    Field::Households,
    Field::PovertyHouseholds,
    Field::AliceHouseholds,
    Field::AboveAliceHouseholds,
    Field::County,
];

const COUNTY_REQUIRED: &[Field] = &[Field::State, Field::GeoId, Field::County, Field::Households];

const SUBCOUNTY_REQUIRED: &[Field] = &[
    Field::State,
    Field::GeoId,
    Field::Type,
    Field::County,
    Field::Households,
];

fn recognized_fields(kind: RecordKind) -> &'static [Field] {
    match kind {
        RecordKind::County => COUNTY_FIELDS,
        RecordKind::Subcounty => SUBCOUNTY_FIELDS,
    }
}

fn required_fields(kind: RecordKind) -> &'static [Field] {
    match kind {
        RecordKind::County => COUNTY_REQUIRED,
        RecordKind::Subcounty => SUBCOUNTY_REQUIRED,
    }
}

/// Header comparison key: whitespace runs collapsed, lowercased.
fn header_key(header: &str) -> String {
    header.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Recognized field → the header spelling this particular sheet uses.
struct ColumnMap {
    headers: HashMap<Field, String>,
}

impl ColumnMap {
    fn resolve(kind: RecordKind, columns: &[String]) -> Result<Self, Vec<String>> {
        let mut headers = HashMap::new();
        for field in recognized_fields(kind) {
            let wanted = header_key(field.header());
            // First matching header wins when a sheet repeats a column.
            if let Some(found) = columns.iter().find(|c| header_key(c) == wanted) {
                headers.insert(*field, found.clone());
            }
        }

        let missing: Vec<String> = required_fields(kind)
            .iter()
            .filter(|f| !headers.contains_key(f))
            .map(|f| f.header().to_string())
            .collect();
        if missing.is_empty() {
            Ok(Self { headers })
        } else {
            Err(missing)
        }
    }

    fn get<'r>(&self, row: &'r RawRow, field: Field) -> Option<&'r RawValue> {
        self.headers.get(&field).and_then(|h| row.cells.get(h))
    }

    fn text(&self, row: &RawRow, field: Field) -> Option<String> {
        self.get(row, field).and_then(RawValue::as_text)
    }

    fn count(&self, row: &RawRow, field: Field) -> Option<i64> {
        self.get(row, field).and_then(RawValue::as_count)
    }

    fn all_blank(&self, row: &RawRow) -> bool {
        self.headers
            .values()
            .all(|h| row.cells.get(h).map_or(true, RawValue::is_blank))
    }
}

/// The normalized records from one extract plus its row accounting.
#[derive(Debug, Clone)]
pub struct NormalizedExtract {
    pub records: Vec<NormalizedAttributeRecord>,
    pub stats: ExtractStats,
}

/// Normalize one extract.
///
/// Returns `Err` only for a structurally unusable sheet (missing required
/// columns). Individual bad rows are dropped and counted in the stats.
pub fn normalize_extract(
    extract: &RawExtract,
    ingested_at: DateTime<Utc>,
) -> Result<NormalizedExtract, SourceFailure> {
    let columns = ColumnMap::resolve(extract.kind, &extract.columns).map_err(|missing_columns| {
        SourceFailure {
            label: extract.label.clone(),
            kind: FailureKind::MalformedSchema { missing_columns },
        }
    })?;

    let mut stats = ExtractStats {
        label: extract.label.clone(),
        kind: extract.kind,
        rows_read: extract.rows.len(),
        blank_rows: 0,
        skipped_rows: 0,
        inconsistent_rows: 0,
        records: 0,
        origin: extract.origin.clone(),
    };
    let mut records = Vec::with_capacity(extract.rows.len());

    for (index, row) in extract.rows.iter().enumerate() {
        if columns.all_blank(row) {
            stats.blank_rows += 1;
            continue;
        }
        match normalize_row(&columns, row, extract, ingested_at) {
            Some(record) => {
                if record.metrics.exceeds_households() {
                    tracing::debug!(
                        source = %extract.label,
                        row = index,
                        households = ?record.metrics.households,
                        "bucket count exceeds households; percentages left null"
                    );
                    stats.inconsistent_rows += 1;
                }
                records.push(record);
            }
            None => {
                tracing::debug!(
                    source = %extract.label,
                    row = index,
                    "skipping row without a usable households count"
                );
                stats.skipped_rows += 1;
            }
        }
    }

    stats.records = records.len();
    if stats.inconsistent_rows > 0 {
        tracing::warn!(
            source = %extract.label,
            rows = stats.inconsistent_rows,
            "rows with bucket counts above their household total"
        );
    }
    Ok(NormalizedExtract { records, stats })
}

fn normalize_row(
    columns: &ColumnMap,
    row: &RawRow,
    extract: &RawExtract,
    ingested_at: DateTime<Utc>,
) -> Option<NormalizedAttributeRecord> {
    let households = columns.count(row, Field::Households)?;
    let metrics = compute_metrics(
        households,
        columns.count(row, Field::PovertyHouseholds),
        columns.count(row, Field::AliceHouseholds),
        columns.count(row, Field::AboveAliceHouseholds),
        columns.count(row, Field::ThresholdUnder65),
        columns.count(row, Field::Threshold65Plus),
    );

    Some(NormalizedAttributeRecord {
        kind: extract.kind,
        raw_identifier: columns.text(row, Field::GeoId),
        state_name: columns.text(row, Field::State),
        county_name: columns.text(row, Field::County),
        state_abbr: columns.text(row, Field::StateAbbr),
        display_label: columns.text(row, Field::DisplayLabel),
        subcounty_type: columns.text(row, Field::Type),
        year: columns.get(row, Field::Year).and_then(RawValue::as_year),
        metrics,
        source_label: extract.label.clone(),
        ingested_at,
    })
}

/// Counts plus percentages of `households`.
///
/// A percentage is computed only when every term is present, `households`
/// is positive, and the numerator fits within `households`.
pub fn compute_metrics(
    households: i64,
    poverty: Option<i64>,
    alice: Option<i64>,
    above_alice: Option<i64>,
    threshold_under_65: Option<i64>,
    threshold_65_plus: Option<i64>,
) -> AttributeMetrics {
    let below_threshold = add(poverty, alice);
    let pct = |numerator: Option<i64>| {
        let bounded = numerator.filter(|n| *n <= households);
        percentage(bounded, Some(households), PERCENT_DP)
    };

    AttributeMetrics {
        households: Some(households),
        poverty_households: poverty,
        alice_households: alice,
        above_alice_households: above_alice,
        below_threshold_households: below_threshold,
        alice_threshold_under_65: threshold_under_65,
        alice_threshold_65_plus: threshold_65_plus,
        poverty_pct: pct(poverty),
        alice_pct: pct(alice),
        above_alice_pct: pct(above_alice),
        below_threshold_pct: pct(below_threshold),
    }
}
