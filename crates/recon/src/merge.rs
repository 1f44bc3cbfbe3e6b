//! Ordered merge of per-extract normalization results.
//!
//! Normalization runs in parallel, but duplicate resolution is
//! last-write-wins, so the concatenation order must not depend on
//! scheduling. Extracts are put in [`extract_order`] before normalization and
//! results are concatenated in exactly that order.

use std::cmp::Ordering;

use crate::config::YearSelection;
use crate::model::{ExtractStats, NormalizedAttributeRecord, RawExtract, SourceFailure};
use crate::normalize::NormalizedExtract;

/// The merge ordering key: label, then record kind.
pub fn extract_order(a: &RawExtract, b: &RawExtract) -> Ordering {
    (a.label.as_str(), a.kind).cmp(&(b.label.as_str(), b.kind))
}

/// Extracts in merge order. The sort is stable, so extracts with equal
/// keys keep their relative input order.
pub fn sort_extracts(extracts: &[RawExtract]) -> Vec<&RawExtract> {
    let mut ordered: Vec<&RawExtract> = extracts.iter().collect();
    ordered.sort_by(|a, b| extract_order(a, b));
    ordered
}

#[derive(Debug, Default)]
pub struct MergedRecords {
    pub records: Vec<NormalizedAttributeRecord>,
    pub stats: Vec<ExtractStats>,
    pub failures: Vec<SourceFailure>,
}

/// Concatenate per-extract results in the order given.
pub fn merge_ordered(
    results: impl IntoIterator<Item = Result<NormalizedExtract, SourceFailure>>,
) -> MergedRecords {
    let mut merged = MergedRecords::default();
    for result in results {
        match result {
            Ok(extract) => {
                merged.records.extend(extract.records);
                merged.stats.push(extract.stats);
            }
            Err(failure) => merged.failures.push(failure),
        }
    }
    merged
}

/// Outcome of [`select_year`].
#[derive(Debug)]
pub struct YearFiltered {
    pub records: Vec<NormalizedAttributeRecord>,
    pub selected: Option<i32>,
    pub dropped: usize,
}

/// Apply a year selection, preserving order among the kept records.
pub fn select_year(
    records: Vec<NormalizedAttributeRecord>,
    selection: YearSelection,
) -> YearFiltered {
    let target = match selection {
        YearSelection::All => None,
        YearSelection::Latest => records.iter().filter_map(|r| r.year).max(),
        YearSelection::Year(y) => Some(y),
    };

    let Some(year) = target else {
        return YearFiltered { records, selected: None, dropped: 0 };
    };

    let before = records.len();
    let kept: Vec<_> = records
        .into_iter()
        .filter(|r| r.year.map_or(true, |y| y == year))
        .collect();
    YearFiltered {
        dropped: before - kept.len(),
        records: kept,
        selected: Some(year),
    }
}
