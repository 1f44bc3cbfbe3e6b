//! State name → USPS abbreviation (50 states + the District of Columbia).

use crate::identity::normalize_name;

pub const STATE_ABBREVIATIONS: [(&str, &str); 51] = [
    ("Alabama", "AL"),
    ("Alaska", "AK"),
    ("Arizona", "AZ"),
    ("Arkansas", "AR"),
    ("California", "CA"),
    ("Colorado", "CO"),
    ("Connecticut", "CT"),
    ("Delaware", "DE"),
    ("District of Columbia", "DC"),
    ("Florida", "FL"),
    ("Georgia", "GA"),
    ("Hawaii", "HI"),
    ("Idaho", "ID"),
    ("Illinois", "IL"),
    ("Indiana", "IN"),
    ("Iowa", "IA"),
    ("Kansas", "KS"),
    ("Kentucky", "KY"),
    ("Louisiana", "LA"),
    ("Maine", "ME"),
    ("Maryland", "MD"),
    ("Massachusetts", "MA"),
    ("Michigan", "MI"),
    ("Minnesota", "MN"),
    ("Mississippi", "MS"),
    ("Missouri", "MO"),
    ("Montana", "MT"),
    ("Nebraska", "NE"),
    ("Nevada", "NV"),
    ("New Hampshire", "NH"),
    ("New Jersey", "NJ"),
    ("New Mexico", "NM"),
    ("New York", "NY"),
    ("North Carolina", "NC"),
    ("North Dakota", "ND"),
    ("Ohio", "OH"),
    ("Oklahoma", "OK"),
    ("Oregon", "OR"),
    ("Pennsylvania", "PA"),
    ("Rhode Island", "RI"),
    ("South Carolina", "SC"),
    ("South Dakota", "SD"),
    ("Tennessee", "TN"),
    ("Texas", "TX"),
    ("Utah", "UT"),
    ("Vermont", "VT"),
    ("Virginia", "VA"),
    ("Washington", "WA"),
    ("West Virginia", "WV"),
    ("Wisconsin", "WI"),
    ("Wyoming", "WY"),
];

/// Look up the abbreviation for a full state name. Unmapped names (territories,
/// typos, abbreviations passed as names) return `None`.
pub fn state_abbreviation(state_name: &str) -> Option<&'static str> {
    let wanted = normalize_name(state_name);
    STATE_ABBREVIATIONS
        .iter()
        .find(|(name, _)| normalize_name(name) == wanted)
        .map(|(_, abbr)| *abbr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn table_has_unique_names_and_codes() {
        let names: HashSet<_> = STATE_ABBREVIATIONS.iter().map(|(n, _)| *n).collect();
        let codes: HashSet<_> = STATE_ABBREVIATIONS.iter().map(|(_, c)| *c).collect();
        assert_eq!(names.len(), 51);
        assert_eq!(codes.len(), 51);
    }

    #[test]
    fn lookup_is_case_and_whitespace_insensitive() {
        assert_eq!(state_abbreviation("Texas"), Some("TX"));
        assert_eq!(state_abbreviation(" new york "), Some("NY"));
        assert_eq!(state_abbreviation("DISTRICT OF COLUMBIA"), Some("DC"));
    }

    #[test]
    fn unmapped_names_return_none() {
        assert_eq!(state_abbreviation("Puerto Rico"), None);
        assert_eq!(state_abbreviation("TX"), None);
        assert_eq!(state_abbreviation(""), None);
    }
}
