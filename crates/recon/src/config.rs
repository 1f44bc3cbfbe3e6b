use serde::{Deserialize, Serialize};

use crate::error::FusionError;
use crate::model::RecordKind;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FusionConfig {
    pub name: String,
    /// Which sheet kind is reconciled onto the boundaries.
    #[serde(default = "default_kind")]
    pub kind: RecordKind,
    #[serde(default)]
    pub year: YearSelection,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
    pub boundaries: BoundaryConfig,
    /// Extract paths or glob patterns, relative to the config file.
    pub extracts: Vec<String>,
    #[serde(default)]
    pub ancillary: Option<AncillaryConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_kind() -> RecordKind {
    RecordKind::County
}

// ---------------------------------------------------------------------------
// Year selection
// ---------------------------------------------------------------------------

/// Which survey year(s) to keep after merging.
///
/// Records with no year are always kept; the filter only drops records
/// whose year is known and different.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "YearRepr")]
pub enum YearSelection {
    #[default]
    All,
    Latest,
    Year(i32),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum YearRepr {
    Year(i32),
    Keyword(String),
}

impl TryFrom<YearRepr> for YearSelection {
    type Error = String;

    fn try_from(repr: YearRepr) -> Result<Self, Self::Error> {
        match repr {
            YearRepr::Year(y) => Ok(Self::Year(y)),
            YearRepr::Keyword(k) => match k.as_str() {
                "all" => Ok(Self::All),
                "latest" => Ok(Self::Latest),
                other => Err(format!(
                    "year must be \"all\", \"latest\", or an integer, got \"{other}\""
                )),
            },
        }
    }
}

impl std::fmt::Display for YearSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Latest => write!(f, "latest"),
            Self::Year(y) => write!(f, "{y}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Duplicate policy
// ---------------------------------------------------------------------------

/// What to do when two attribute records land on the same region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Later record (in merge order) replaces the earlier one.
    #[default]
    LastWriteWins,
    /// Abort the run on the first duplicate.
    Reject,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LastWriteWins => write!(f, "last_write_wins"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

// ---------------------------------------------------------------------------
// Boundaries
// ---------------------------------------------------------------------------

/// GeoJSON boundary file and the feature property names to read.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryConfig {
    pub file: String,
    #[serde(default = "default_id_property")]
    pub id_property: String,
    #[serde(default = "default_name_property")]
    pub name_property: String,
    #[serde(default = "default_state_property")]
    pub state_property: String,
    #[serde(default = "default_county_property")]
    pub county_property: String,
}

fn default_id_property() -> String {
    "GEOID".into()
}

fn default_name_property() -> String {
    "NAMELSAD".into()
}

fn default_state_property() -> String {
    "STUSPS".into()
}

fn default_county_property() -> String {
    "NAME".into()
}

// ---------------------------------------------------------------------------
// Ancillary table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AncillaryConfig {
    pub file: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Column holding a full region id. Mutually exclusive with the pair below.
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub state_column: Option<String>,
    #[serde(default)]
    pub county_column: Option<String>,
}

/// How ancillary rows are keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AncillaryKey {
    Id(String),
    Parts { state: String, county: String },
}

impl AncillaryConfig {
    /// Resolved key columns. With nothing configured, the census API's
    /// `state` / `county` columns are assumed.
    pub fn key(&self) -> AncillaryKey {
        match (&self.id_column, &self.state_column, &self.county_column) {
            (Some(id), _, _) => AncillaryKey::Id(id.clone()),
            (None, state, county) => AncillaryKey::Parts {
                state: state.clone().unwrap_or_else(|| "state".into()),
                county: county.clone().unwrap_or_else(|| "county".into()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub json: Option<String>,
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub geojson: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl FusionConfig {
    pub fn from_toml(input: &str) -> Result<Self, FusionError> {
        let config: FusionConfig =
            toml::from_str(input).map_err(|e| FusionError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        if self.name.trim().is_empty() {
            return Err(FusionError::ConfigValidation("name must not be empty".into()));
        }

        if self.boundaries.file.trim().is_empty() {
            return Err(FusionError::ConfigValidation(
                "boundaries.file must not be empty".into(),
            ));
        }

        if self.extracts.is_empty() {
            return Err(FusionError::ConfigValidation(
                "at least one extract path or pattern is required".into(),
            ));
        }
        if let Some(blank) = self.extracts.iter().position(|e| e.trim().is_empty()) {
            return Err(FusionError::ConfigValidation(format!(
                "extracts[{blank}] is empty"
            )));
        }

        if let YearSelection::Year(y) = self.year {
            if !(1900..=2100).contains(&y) {
                return Err(FusionError::ConfigValidation(format!(
                    "year {y} is outside 1900..=2100"
                )));
            }
        }

        if let Some(anc) = &self.ancillary {
            if anc.file.trim().is_empty() {
                return Err(FusionError::ConfigValidation(
                    "ancillary.file must not be empty".into(),
                ));
            }
            let has_parts = anc.state_column.is_some() || anc.county_column.is_some();
            if anc.id_column.is_some() && has_parts {
                return Err(FusionError::ConfigValidation(
                    "ancillary: set either id_column or state_column + county_column, not both"
                        .into(),
                ));
            }
            if anc.state_column.is_some() != anc.county_column.is_some() {
                return Err(FusionError::ConfigValidation(
                    "ancillary: state_column and county_column must be set together".into(),
                ));
            }
        }

        let outputs: Vec<&String> = [&self.output.json, &self.output.csv, &self.output.geojson]
            .into_iter()
            .flatten()
            .collect();
        for (i, a) in outputs.iter().enumerate() {
            if outputs[i + 1..].contains(a) {
                return Err(FusionError::ConfigValidation(format!(
                    "output path '{a}' is used for more than one format"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name = "ALICE 2025"
extracts = ["data/*.xlsx"]

[boundaries]
file = "counties.geojson"
"#;

    #[test]
    fn parse_minimal_uses_defaults() {
        let config = FusionConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.name, "ALICE 2025");
        assert_eq!(config.kind, RecordKind::County);
        assert_eq!(config.year, YearSelection::All);
        assert_eq!(config.duplicates, DuplicatePolicy::LastWriteWins);
        assert_eq!(config.boundaries.id_property, "GEOID");
        assert_eq!(config.boundaries.name_property, "NAMELSAD");
        assert_eq!(config.boundaries.state_property, "STUSPS");
        assert_eq!(config.boundaries.county_property, "NAME");
        assert!(config.ancillary.is_none());
        assert!(config.output.json.is_none());
    }

    #[test]
    fn parse_full() {
        let input = r#"
name = "Full"
kind = "county"
year = "latest"
duplicates = "reject"
extracts = ["a.csv", "b.xlsx"]

[boundaries]
file = "b.geojson"
id_property = "GEOID20"

[ancillary]
file = "acs.json"
label = "ACS 2022"

[output]
json = "out/result.json"
csv = "out/regions.csv"
geojson = "out/regions.geojson"
"#;
        let config = FusionConfig::from_toml(input).unwrap();
        assert_eq!(config.year, YearSelection::Latest);
        assert_eq!(config.duplicates, DuplicatePolicy::Reject);
        assert_eq!(config.boundaries.id_property, "GEOID20");
        let anc = config.ancillary.unwrap();
        assert_eq!(
            anc.key(),
            AncillaryKey::Parts { state: "state".into(), county: "county".into() }
        );
        assert_eq!(config.output.csv.as_deref(), Some("out/regions.csv"));
    }

    #[test]
    fn year_accepts_integer_and_keywords() {
        for (raw, want) in [
            ("2022", YearSelection::Year(2022)),
            ("\"all\"", YearSelection::All),
            ("\"latest\"", YearSelection::Latest),
        ] {
            let input = format!("year = {raw}\n{MINIMAL}");
            assert_eq!(FusionConfig::from_toml(&input).unwrap().year, want);
        }
    }

    #[test]
    fn year_rejects_unknown_keyword() {
        let input = format!("year = \"newest\"\n{MINIMAL}");
        assert!(matches!(
            FusionConfig::from_toml(&input),
            Err(FusionError::ConfigParse(_))
        ));
    }

    #[test]
    fn year_out_of_range_fails_validation() {
        let input = format!("year = 22\n{MINIMAL}");
        assert!(matches!(
            FusionConfig::from_toml(&input),
            Err(FusionError::ConfigValidation(_))
        ));
    }

    #[test]
    fn rejects_empty_extract_list() {
        let input = r#"
name = "x"
extracts = []
[boundaries]
file = "b.geojson"
"#;
        let err = FusionConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("at least one extract"));
    }

    #[test]
    fn rejects_unknown_duplicate_policy() {
        let input = format!("duplicates = \"first_wins\"\n{MINIMAL}");
        assert!(matches!(
            FusionConfig::from_toml(&input),
            Err(FusionError::ConfigParse(_))
        ));
    }

    #[test]
    fn ancillary_id_column_excludes_parts() {
        let input = format!(
            "{MINIMAL}\n[ancillary]\nfile = \"acs.csv\"\nid_column = \"GEOID\"\n\
             state_column = \"st\"\ncounty_column = \"co\"\n"
        );
        assert!(matches!(
            FusionConfig::from_toml(&input),
            Err(FusionError::ConfigValidation(_))
        ));
    }

    #[test]
    fn ancillary_parts_must_be_paired() {
        let input = format!("{MINIMAL}\n[ancillary]\nfile = \"acs.csv\"\nstate_column = \"st\"\n");
        assert!(matches!(
            FusionConfig::from_toml(&input),
            Err(FusionError::ConfigValidation(_))
        ));
    }

    #[test]
    fn ancillary_id_column_key() {
        let input = format!("{MINIMAL}\n[ancillary]\nfile = \"acs.csv\"\nid_column = \"GEOID\"\n");
        let config = FusionConfig::from_toml(&input).unwrap();
        assert_eq!(config.ancillary.unwrap().key(), AncillaryKey::Id("GEOID".into()));
    }

    #[test]
    fn rejects_shared_output_path() {
        let input = format!("{MINIMAL}\n[output]\njson = \"out.txt\"\ncsv = \"out.txt\"\n");
        let err = FusionConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("more than one format"));
    }
}
