use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identity::{IdentityError, RegionId};

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// One scalar cell as the source sheet stored it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Blank,
    Text(String),
    Number(f64),
}

impl RawValue {
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Blank => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(n) => n.is_nan(),
        }
    }

    /// Trimmed text form; integral numbers print without a fraction.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Blank => None,
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Self::Number(n) if n.is_finite() => Some(if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }),
            Self::Number(_) => None,
        }
    }

    /// A non-negative whole count. Thousands separators are accepted in text;
    /// negative, fractional and non-numeric values are absent.
    pub fn as_count(&self) -> Option<i64> {
        let value = match self {
            Self::Blank => return None,
            Self::Number(n) => *n,
            Self::Text(s) => {
                let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
                if cleaned.is_empty() {
                    return None;
                }
                match cleaned.parse::<i64>() {
                    Ok(n) => return (n >= 0).then_some(n),
                    Err(_) => cleaned.parse::<f64>().ok()?,
                }
            }
        };
        if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value >= 9.0e15 {
            return None;
        }
        Some(value as i64)
    }

    pub fn as_year(&self) -> Option<i32> {
        self.as_count().and_then(|n| i32::try_from(n).ok())
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

/// One source row: column header → raw cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub cells: BTreeMap<String, RawValue>,
}

impl RawRow {
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<RawValue>) {
        self.cells.insert(column.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Which sheet schema a row follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    County,
    Subcounty,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::County => write!(f, "county"),
            Self::Subcounty => write!(f, "subcounty"),
        }
    }
}

/// Where an extract came from, for the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOrigin {
    pub path: String,
    pub sha256: String,
}

/// One pre-loaded sheet of survey rows.
#[derive(Debug, Clone)]
pub struct RawExtract {
    pub label: String,
    pub kind: RecordKind,
    /// Header row in sheet order.
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
    pub origin: Option<SourceOrigin>,
}

// ---------------------------------------------------------------------------
// Normalized attributes
// ---------------------------------------------------------------------------

/// Household counts and first-order percentages for one region.
///
/// Every percentage is `Some` iff its numerator terms and `households` are
/// present, `households > 0`, and the numerator does not exceed
/// `households`. Raw counts are kept as read even when they exceed it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeMetrics {
    pub households: Option<i64>,
    pub poverty_households: Option<i64>,
    pub alice_households: Option<i64>,
    pub above_alice_households: Option<i64>,
    pub below_threshold_households: Option<i64>,
    pub alice_threshold_under_65: Option<i64>,
    pub alice_threshold_65_plus: Option<i64>,
    pub poverty_pct: Option<Decimal>,
    pub alice_pct: Option<Decimal>,
    pub above_alice_pct: Option<Decimal>,
    pub below_threshold_pct: Option<Decimal>,
}

impl AttributeMetrics {
    /// True when any household bucket is larger than the household total.
    pub fn exceeds_households(&self) -> bool {
        let Some(total) = self.households else {
            return false;
        };
        [
            self.poverty_households,
            self.alice_households,
            self.above_alice_households,
            self.below_threshold_households,
        ]
        .into_iter()
        .flatten()
        .any(|count| count > total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedAttributeRecord {
    pub kind: RecordKind,
    pub raw_identifier: Option<String>,
    pub state_name: Option<String>,
    pub county_name: Option<String>,
    pub state_abbr: Option<String>,
    pub display_label: Option<String>,
    pub subcounty_type: Option<String>,
    pub year: Option<i32>,
    pub metrics: AttributeMetrics,
    pub source_label: String,
    pub ingested_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Boundaries
// ---------------------------------------------------------------------------

pub type Position = Vec<f64>;

/// Polygon geometry, carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRecord {
    pub region_id: RegionId,
    pub display_name: String,
    pub state_abbr: String,
    pub county_name: String,
    pub geometry: Geometry,
}

// ---------------------------------------------------------------------------
// Ancillary statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AncillaryStats {
    pub total_population: Option<i64>,
    pub total_housing_units: Option<i64>,
    pub owner_occupied_housing: Option<i64>,
    pub renter_occupied_housing: Option<i64>,
    pub median_household_income: Option<i64>,
    pub median_home_value: Option<i64>,
    pub unemployed: Option<i64>,
    pub bachelors_degree: Option<i64>,
    pub masters_degree: Option<i64>,
    pub professional_degree: Option<i64>,
    pub doctorate_degree: Option<i64>,
    pub age_65_to_74: Option<i64>,
    pub age_75_to_84: Option<i64>,
    pub age_85_plus: Option<i64>,
    pub white_alone: Option<i64>,
    pub work_from_home: Option<i64>,
    pub total_commuters: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AncillaryRow {
    pub raw_identifier: String,
    pub stats: AncillaryStats,
}

#[derive(Debug, Clone, Default)]
pub struct AncillaryTable {
    pub label: String,
    pub rows: Vec<AncillaryRow>,
}

// ---------------------------------------------------------------------------
// Fused output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Fallback,
    Unmatched,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Fallback => write!(f, "fallback"),
            Self::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// Which attribute record a region's metrics came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeProvenance {
    pub source_label: String,
    pub raw_identifier: Option<String>,
    pub state_name: Option<String>,
    pub county_name: Option<String>,
    pub year: Option<i32>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub alice_population: Option<i64>,
    pub poverty_population: Option<i64>,
    pub below_threshold_population: Option<i64>,
    pub population_per_household: Option<Decimal>,
    pub homeownership_rate: Option<Decimal>,
    pub unemployment_rate: Option<Decimal>,
    /// Bachelor's or higher as a share of total population.
    pub college_degree_rate: Option<Decimal>,
    pub elderly_population_rate: Option<Decimal>,
    /// Everyone not reported as white alone.
    pub minority_population_rate: Option<Decimal>,
    /// Share of commuters, not of population.
    pub work_from_home_rate: Option<Decimal>,
}

/// One output row per boundary region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionRecord {
    pub region_id: RegionId,
    pub display_name: String,
    pub state_abbr: String,
    pub county_name: String,
    #[serde(skip_serializing)]
    pub geometry: Geometry,
    pub match_method: MatchMethod,
    #[serde(flatten)]
    pub metrics: AttributeMetrics,
    pub attribute_source: Option<AttributeProvenance>,
    pub ancillary: Option<AncillaryStats>,
    #[serde(flatten)]
    pub derived: DerivedMetrics,
}

impl RegionRecord {
    /// An unmatched region: boundary fields only, every metric null.
    pub fn from_boundary(boundary: &BoundaryRecord) -> Self {
        Self {
            region_id: boundary.region_id.clone(),
            display_name: boundary.display_name.clone(),
            state_abbr: boundary.state_abbr.clone(),
            county_name: boundary.county_name.clone(),
            geometry: boundary.geometry.clone(),
            match_method: MatchMethod::Unmatched,
            metrics: AttributeMetrics::default(),
            attribute_source: None,
            ancillary: None,
            derived: DerivedMetrics::default(),
        }
    }

    pub fn has_attributes(&self) -> bool {
        self.match_method != MatchMethod::Unmatched
    }
}

// ---------------------------------------------------------------------------
// Per-unit failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum FailureKind {
    /// The extract could not be read at all.
    SourceUnavailable { reason: String },
    /// The extract is missing structurally required columns.
    MalformedSchema { missing_columns: Vec<String> },
}

/// One extract that contributed nothing to the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub label: String,
    #[serde(flatten)]
    pub kind: FailureKind,
}

/// Why an attribute record failed both join phases.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No boundary shares the (state, county name) key.
    NoCandidate,
    /// More than one boundary shares the key.
    Ambiguous { candidates: Vec<RegionId> },
    /// State name is not in the 51-entry table.
    UnmappedState,
    /// State or county name is blank.
    MissingName,
    /// The single candidate was already claimed by an exact match.
    RegionAlreadyMatched { region_id: RegionId },
    /// Sub-county records join only by exact id; their County column names
    /// the parent county, not the place itself.
    SubcountyRecord,
}

/// Attribute data with no corresponding boundary record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanedAttribute {
    pub source_label: String,
    pub raw_identifier: Option<String>,
    /// Canonical id when the identifier was valid but had no boundary.
    pub region_id: Option<RegionId>,
    pub identifier_error: Option<IdentityError>,
    pub state_name: Option<String>,
    pub county_name: Option<String>,
    #[serde(flatten)]
    pub reason: UnresolvedReason,
}

impl OrphanedAttribute {
    pub fn is_ambiguous(&self) -> bool {
        matches!(self.reason, UnresolvedReason::Ambiguous { .. })
    }
}

// ---------------------------------------------------------------------------
// Run report + summary
// ---------------------------------------------------------------------------

/// Per-extract row accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractStats {
    pub label: String,
    pub kind: RecordKind,
    pub rows_read: usize,
    pub blank_rows: usize,
    pub skipped_rows: usize,
    /// Kept rows whose bucket counts exceed their household total.
    pub inconsistent_rows: usize,
    pub records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<SourceOrigin>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubcountyTally {
    pub records: usize,
    /// Households summed with blanks counted as zero.
    pub households: i64,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AncillaryJoinStats {
    pub label: String,
    pub rows: usize,
    pub matched: usize,
    pub invalid_identifiers: usize,
    pub unmatched: usize,
    pub duplicate_overwrites: usize,
}

/// Everything that went partially wrong, alongside whatever was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub extracts_processed: usize,
    pub extracts_failed: usize,
    pub failures: Vec<SourceFailure>,
    pub extracts: Vec<ExtractStats>,
    pub blank_rows: usize,
    pub skipped_rows: usize,
    pub inconsistent_rows: usize,
    pub records_normalized: usize,
    pub selected_year: Option<i32>,
    pub records_filtered_by_year: usize,
    pub invalid_identifiers: usize,
    pub exact_matches: usize,
    pub fallback_matches: usize,
    pub duplicate_overwrites: usize,
    /// Orphans with no candidate at all (ambiguous ones are counted apart).
    pub orphaned_attributes: usize,
    pub ambiguous_fallbacks: usize,
    pub orphans: Vec<OrphanedAttribute>,
    pub subcounty: SubcountyTally,
    pub ancillary: Option<AncillaryJoinStats>,
}

impl RunReport {
    pub fn has_partial_failures(&self) -> bool {
        self.extracts_failed > 0
            || !self.orphans.is_empty()
            || self.skipped_rows > 0
            || self.inconsistent_rows > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodCounts {
    pub exact: usize,
    pub fallback: usize,
    pub unmatched: usize,
}

/// Null-aware statistics for one numeric column.
///
/// `mean` only averages non-null values and is `None` when there are none.
/// `sum` counts nulls as zero, so an all-null column has `sum == 0` and
/// `mean == None`; read `non_null` to tell the two apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub column: String,
    pub non_null: usize,
    pub null: usize,
    pub sum: Decimal,
    pub mean: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionSummary {
    pub total_regions: usize,
    pub attribute_matched: usize,
    pub ancillary_matched: usize,
    pub completeness_pct: Option<Decimal>,
    pub methods: MethodCounts,
    pub columns: Vec<ColumnStats>,
}

impl FusionSummary {
    pub fn column(&self, name: &str) -> Option<&ColumnStats> {
        self.columns.iter().find(|c| c.column == name)
    }
}

// ---------------------------------------------------------------------------
// Engine input / output
// ---------------------------------------------------------------------------

/// Everything the engine needs, already materialized in memory.
#[derive(Debug, Clone, Default)]
pub struct FusionInput {
    pub boundaries: Vec<BoundaryRecord>,
    pub extracts: Vec<RawExtract>,
    /// Extracts the loader could not read; passed through to the report.
    pub unavailable: Vec<SourceFailure>,
    pub ancillary: Option<AncillaryTable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FusionMeta {
    pub config_name: String,
    pub record_kind: RecordKind,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FusionResult {
    pub meta: FusionMeta,
    pub summary: FusionSummary,
    pub report: RunReport,
    pub regions: Vec<RegionRecord>,
}
