//! Region identity - canonical fixed-width region codes and name equality.
//!
//! Every dataset keys regions a little differently: survey sheets store the
//! county code as a float (`6037.0`), the boundary set as a zero-padded string
//! (`06037`), the census table as separate state and county parts (`06`,
//! `037`). All of them go through [`canonicalize`] before any comparison.

use std::fmt;

use serde::Serialize;

/// Width of a canonical region id (2-digit state + 3-digit county).
pub const REGION_ID_WIDTH: usize = 5;

const STATE_PART_WIDTH: usize = 2;
const COUNTY_PART_WIDTH: usize = 3;

/// A canonical region id: exactly five ASCII digits.
///
/// Only constructible through [`canonicalize`] / [`RegionId::from_parts`],
/// so holding one proves the invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build an id from a split state/county encoding, e.g. `("6", "37")`.
    ///
    /// Each part is zero-padded to its own width; a part longer than its width
    /// is invalid rather than truncated.
    pub fn from_parts(state: &str, county: &str) -> Result<Self, IdentityError> {
        let state_digits = digits_before_point(state)?;
        let county_digits = digits_before_point(county)?;
        if state_digits.len() > STATE_PART_WIDTH || county_digits.len() > COUNTY_PART_WIDTH {
            return Err(IdentityError::TooLong {
                raw: format!("{}/{}", state.trim(), county.trim()),
            });
        }
        canonicalize(&format!("{state_digits:0>2}{county_digits:0>3}"))
    }

    /// Two-digit state prefix.
    pub fn state_part(&self) -> &str {
        &self.0[..STATE_PART_WIDTH]
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a raw identifier could not be canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IdentityError {
    /// Blank, or nothing left before the decimal point.
    Empty { raw: String },
    /// Contains something other than ASCII digits.
    NonNumeric { raw: String },
    /// More than five digits; never right-truncated.
    TooLong { raw: String },
}

impl IdentityError {
    pub fn raw(&self) -> &str {
        match self {
            Self::Empty { raw } | Self::NonNumeric { raw } | Self::TooLong { raw } => raw,
        }
    }
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { raw } => write!(f, "empty region identifier '{raw}'"),
            Self::NonNumeric { raw } => write!(f, "non-numeric region identifier '{raw}'"),
            Self::TooLong { raw } => {
                write!(f, "region identifier '{raw}' is longer than {REGION_ID_WIDTH} digits")
            }
        }
    }
}

impl std::error::Error for IdentityError {}

/// Canonicalize a raw identifier.
///
/// Surrounding whitespace is ignored, everything from the first `.` onward is
/// dropped (float-serialized codes), and the remainder is left-padded with
/// `'0'` to [`REGION_ID_WIDTH`]. No digits are ever invented beyond padding
/// and nothing is truncated on the left.
pub fn canonicalize(raw: &str) -> Result<RegionId, IdentityError> {
    let digits = digits_before_point(raw)?;
    if digits.len() > REGION_ID_WIDTH {
        return Err(IdentityError::TooLong { raw: raw.to_string() });
    }
    Ok(RegionId(format!("{digits:0>5}")))
}

fn digits_before_point(raw: &str) -> Result<&str, IdentityError> {
    let trimmed = raw.trim();
    let integral = match trimmed.find('.') {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    };
    if integral.is_empty() {
        return Err(IdentityError::Empty { raw: raw.to_string() });
    }
    if !integral.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentityError::NonNumeric { raw: raw.to_string() });
    }
    Ok(integral)
}

/// The single definition of name equality for fallback matching.
/// Applied to both the attribute side and the boundary side.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn float_serialized_id_is_padded() {
        assert_eq!(canonicalize("6037.0").unwrap().as_str(), "06037");
        assert_eq!(canonicalize("48201").unwrap().as_str(), "48201");
        assert_eq!(canonicalize(" 1001 ").unwrap().as_str(), "01001");
    }

    #[test]
    fn invalid_ids_are_rejected_not_guessed() {
        assert!(matches!(canonicalize("123456"), Err(IdentityError::TooLong { .. })));
        assert!(matches!(canonicalize("nan"), Err(IdentityError::NonNumeric { .. })));
        assert!(matches!(canonicalize("48-201"), Err(IdentityError::NonNumeric { .. })));
        assert!(matches!(canonicalize(""), Err(IdentityError::Empty { .. })));
        assert!(matches!(canonicalize("   "), Err(IdentityError::Empty { .. })));
        assert!(matches!(canonicalize(".5"), Err(IdentityError::Empty { .. })));
    }

    #[test]
    fn long_id_is_not_right_truncated() {
        let err = canonicalize("1234567").unwrap_err();
        assert_eq!(err.raw(), "1234567");
    }

    #[test]
    fn from_parts_pads_each_part() {
        assert_eq!(RegionId::from_parts("6", "37").unwrap().as_str(), "06037");
        assert_eq!(RegionId::from_parts("48", "201").unwrap().as_str(), "48201");
        assert_eq!(RegionId::from_parts("06", "037").unwrap().state_part(), "06");
        assert!(RegionId::from_parts("123", "1").is_err());
        assert!(RegionId::from_parts("1", "1234").is_err());
        assert!(RegionId::from_parts("", "001").is_err());
    }

    #[test]
    fn name_normalization_trims_and_lowercases() {
        assert_eq!(normalize_name("  Harris "), "harris");
        assert_eq!(normalize_name("St. Louis City"), "st. louis city");
        assert_eq!(normalize_name("HARRIS"), normalize_name("harris"));
    }

    proptest! {
        #[test]
        fn canonicalize_is_idempotent(raw in "\\PC{0,8}") {
            if let Ok(id) = canonicalize(&raw) {
                prop_assert_eq!(canonicalize(id.as_str()), Ok(id.clone()));
                prop_assert_eq!(id.as_str().len(), REGION_ID_WIDTH);
            }
        }

        #[test]
        fn numeric_codes_always_canonicalize(code in 0u32..100_000) {
            let plain = canonicalize(&code.to_string()).unwrap();
            let float = canonicalize(&format!("{code}.0")).unwrap();
            prop_assert_eq!(&plain, &float);
            prop_assert_eq!(plain.as_str().parse::<u32>().unwrap(), code);
        }
    }
}
