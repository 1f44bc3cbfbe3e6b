use std::fmt;

use crate::identity::RegionId;

/// Run-level failures. Anything scoped to one file, row, or record is
/// reported in the run report instead and never surfaces here.
#[derive(Debug)]
pub enum FusionError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty extract list, bad column pair, etc.).
    ConfigValidation(String),
    /// The boundary dataset is empty; nothing to join against.
    NoBoundaries,
    /// Two boundary records share a region id.
    DuplicateBoundary { region_id: RegionId },
    /// A region was targeted twice under `duplicates = "reject"`.
    DuplicateRegion {
        region_id: RegionId,
        first_source: String,
        second_source: String,
    },
}

impl fmt::Display for FusionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::NoBoundaries => write!(f, "boundary dataset contains no regions"),
            Self::DuplicateBoundary { region_id } => {
                write!(f, "boundary dataset contains region '{region_id}' more than once")
            }
            Self::DuplicateRegion { region_id, first_source, second_source } => write!(
                f,
                "region '{region_id}' supplied by both '{first_source}' and '{second_source}' \
                 (duplicates = \"reject\")"
            ),
        }
    }
}

impl std::error::Error for FusionError {}
