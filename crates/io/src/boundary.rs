//! GeoJSON boundary loading.
//!
//! Expects a `FeatureCollection` of Polygon / MultiPolygon features whose
//! properties carry the region id, display name, state abbreviation and
//! county name (TIGER/Line naming by default). Geometry is carried through
//! untouched.

use std::fmt;

use regionfuse_recon::config::BoundaryConfig;
use regionfuse_recon::identity::{canonicalize, IdentityError};
use regionfuse_recon::model::{BoundaryRecord, Geometry};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug)]
pub enum BoundaryError {
    Json(String),
    NotFeatureCollection,
    MissingProperty { feature: usize, property: String },
    InvalidId { feature: usize, error: IdentityError },
    Geometry { feature: usize, message: String },
}

impl fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(msg) => write!(f, "boundary file is not valid JSON: {msg}"),
            Self::NotFeatureCollection => {
                write!(f, "boundary file is not a GeoJSON FeatureCollection")
            }
            Self::MissingProperty { feature, property } => {
                write!(f, "feature {feature}: missing property '{property}'")
            }
            Self::InvalidId { feature, error } => write!(f, "feature {feature}: {error}"),
            Self::Geometry { feature, message } => {
                write!(f, "feature {feature}: unsupported geometry: {message}")
            }
        }
    }
}

impl std::error::Error for BoundaryError {}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    geometry: Value,
}

/// Property value as text; numbers are rendered without a fraction.
fn property_text(props: &Map<String, Value>, key: &str) -> Option<String> {
    match props.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        _ => None,
    }
}

/// Parse a boundary FeatureCollection. Any bad feature fails the whole
/// file: the boundary set is the canonical region list.
pub fn parse_boundaries(
    bytes: &[u8],
    config: &BoundaryConfig,
) -> Result<Vec<BoundaryRecord>, BoundaryError> {
    let collection: FeatureCollection =
        serde_json::from_slice(bytes).map_err(|e| BoundaryError::Json(e.to_string()))?;
    if collection.kind != "FeatureCollection" {
        return Err(BoundaryError::NotFeatureCollection);
    }

    let empty = Map::new();
    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(feature, f)| {
            let props = f.properties.as_ref().unwrap_or(&empty);
            let raw_id = property_text(props, &config.id_property).ok_or_else(|| {
                BoundaryError::MissingProperty { feature, property: config.id_property.clone() }
            })?;
            let region_id =
                canonicalize(&raw_id).map_err(|error| BoundaryError::InvalidId { feature, error })?;
            let geometry: Geometry = serde_json::from_value(f.geometry)
                .map_err(|e| BoundaryError::Geometry { feature, message: e.to_string() })?;

            let county_name = property_text(props, &config.county_property).unwrap_or_default();
            Ok(BoundaryRecord {
                region_id,
                display_name: property_text(props, &config.name_property)
                    .unwrap_or_else(|| county_name.clone()),
                state_abbr: property_text(props, &config.state_property).unwrap_or_default(),
                county_name,
                geometry,
            })
        })
        .collect()
}
