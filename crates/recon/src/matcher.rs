//! Two-phase reconciliation of attribute records onto boundary regions.
//!
//! Phase 1 joins on the canonical region id. Phase 2 runs only after phase 1
//! has finished and only for records phase 1 could not place: it joins on
//! `(state abbreviation, county name)` and accepts a hit only when exactly one
//! boundary has that key and phase 1 did not already claim it.

use std::collections::HashMap;

use crate::config::DuplicatePolicy;
use crate::error::FusionError;
use crate::identity::{canonicalize, normalize_name, IdentityError, RegionId};
use crate::model::{
    AttributeProvenance, BoundaryRecord, MatchMethod, NormalizedAttributeRecord,
    OrphanedAttribute, RecordKind, RegionRecord, UnresolvedReason,
};
use crate::states::state_abbreviation;

/// Regions in boundary order, plus everything that could not be placed.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub regions: Vec<RegionRecord>,
    pub orphans: Vec<OrphanedAttribute>,
    pub invalid_identifiers: usize,
    pub exact_matches: usize,
    pub fallback_matches: usize,
    pub duplicate_overwrites: usize,
}

/// A record waiting for phase 2, with what phase 1 learned about its id.
struct Pending<'a> {
    record: &'a NormalizedAttributeRecord,
    region_id: Option<RegionId>,
    identifier_error: Option<IdentityError>,
}

struct Slot<'a> {
    method: MatchMethod,
    record: &'a NormalizedAttributeRecord,
}

struct Assignments<'a> {
    slots: Vec<Option<Slot<'a>>>,
    policy: DuplicatePolicy,
    duplicate_overwrites: usize,
}

impl<'a> Assignments<'a> {
    fn assign(
        &mut self,
        index: usize,
        method: MatchMethod,
        record: &'a NormalizedAttributeRecord,
        boundaries: &[BoundaryRecord],
    ) -> Result<(), FusionError> {
        if let Some(previous) = &self.slots[index] {
            if self.policy == DuplicatePolicy::Reject {
                return Err(FusionError::DuplicateRegion {
                    region_id: boundaries[index].region_id.clone(),
                    first_source: previous.record.source_label.clone(),
                    second_source: record.source_label.clone(),
                });
            }
            tracing::debug!(
                region = %boundaries[index].region_id,
                previous = %previous.record.source_label,
                replacement = %record.source_label,
                "duplicate region; later record wins"
            );
            self.duplicate_overwrites += 1;
        }
        self.slots[index] = Some(Slot { method, record });
        Ok(())
    }
}

/// Index boundaries by id, rejecting an empty or duplicated boundary set.
fn index_boundaries(
    boundaries: &[BoundaryRecord],
) -> Result<HashMap<&RegionId, usize>, FusionError> {
    if boundaries.is_empty() {
        return Err(FusionError::NoBoundaries);
    }
    let mut by_id = HashMap::with_capacity(boundaries.len());
    for (i, b) in boundaries.iter().enumerate() {
        if by_id.insert(&b.region_id, i).is_some() {
            return Err(FusionError::DuplicateBoundary { region_id: b.region_id.clone() });
        }
    }
    Ok(by_id)
}

fn name_key(state_abbr: &str, county_name: &str) -> (String, String) {
    (normalize_name(state_abbr), normalize_name(county_name))
}

/// Reconcile `records` (already in merge order) onto `boundaries`.
///
/// Every boundary appears exactly once in the output, in input order.
/// Fallback matches copy attribute metrics and provenance only; the
/// region's identity and geometry always come from the boundary.
pub fn reconcile(
    boundaries: &[BoundaryRecord],
    records: &[NormalizedAttributeRecord],
    policy: DuplicatePolicy,
) -> Result<Reconciliation, FusionError> {
    let by_id = index_boundaries(boundaries)?;

    let mut assignments = Assignments {
        slots: boundaries.iter().map(|_| None).collect(),
        policy,
        duplicate_overwrites: 0,
    };
    let mut invalid_identifiers = 0;
    let mut pending = Vec::new();

    // Phase 1: exact id join.
    for record in records {
        let canonical = match record.raw_identifier.as_deref() {
            Some(raw) => canonicalize(raw),
            None => Err(IdentityError::Empty { raw: String::new() }),
        };
        match canonical {
            Ok(id) => match by_id.get(&id) {
                Some(&index) => {
                    assignments.assign(index, MatchMethod::Exact, record, boundaries)?
                }
                None => {
                    pending.push(Pending { record, region_id: Some(id), identifier_error: None })
                }
            },
            Err(err) => {
                tracing::debug!(
                    source = %record.source_label,
                    error = %err,
                    "invalid region identifier"
                );
                invalid_identifiers += 1;
                pending.push(Pending { record, region_id: None, identifier_error: Some(err) });
            }
        }
    }

    let owned_by_exact: Vec<bool> = assignments.slots.iter().map(Option::is_some).collect();

    // Phase 2: fallback on (state, county name).
    let mut by_name: HashMap<(String, String), Vec<usize>> = HashMap::new();
    for (i, b) in boundaries.iter().enumerate() {
        by_name.entry(name_key(&b.state_abbr, &b.county_name)).or_default().push(i);
    }

    let mut orphans = Vec::new();
    for p in pending {
        match fallback_target(&p, &by_name, &owned_by_exact, boundaries) {
            Ok(index) => {
                tracing::debug!(
                    region = %boundaries[index].region_id,
                    source = %p.record.source_label,
                    "fallback name match"
                );
                assignments.assign(index, MatchMethod::Fallback, p.record, boundaries)?;
            }
            Err(reason) => orphans.push(OrphanedAttribute {
                source_label: p.record.source_label.clone(),
                raw_identifier: p.record.raw_identifier.clone(),
                region_id: p.region_id,
                identifier_error: p.identifier_error,
                state_name: p.record.state_name.clone(),
                county_name: p.record.county_name.clone(),
                reason,
            }),
        }
    }

    let mut exact_matches = 0;
    let mut fallback_matches = 0;
    let regions = boundaries
        .iter()
        .zip(assignments.slots)
        .map(|(boundary, slot)| {
            let mut region = RegionRecord::from_boundary(boundary);
            if let Some(Slot { method, record }) = slot {
                match method {
                    MatchMethod::Exact => exact_matches += 1,
                    MatchMethod::Fallback => fallback_matches += 1,
                    MatchMethod::Unmatched => {}
                }
                region.match_method = method;
                region.metrics = record.metrics.clone();
                region.attribute_source = Some(provenance(record));
            }
            region
        })
        .collect();

    Ok(Reconciliation {
        regions,
        orphans,
        invalid_identifiers,
        exact_matches,
        fallback_matches,
        duplicate_overwrites: assignments.duplicate_overwrites,
    })
}

fn fallback_target(
    pending: &Pending<'_>,
    by_name: &HashMap<(String, String), Vec<usize>>,
    owned_by_exact: &[bool],
    boundaries: &[BoundaryRecord],
) -> Result<usize, UnresolvedReason> {
    if pending.record.kind == RecordKind::Subcounty {
        return Err(UnresolvedReason::SubcountyRecord);
    }
    let non_blank = |s: &Option<String>| {
        s.as_deref().filter(|v| !v.trim().is_empty()).map(str::to_owned)
    };
    let (Some(state), Some(county)) =
        (non_blank(&pending.record.state_name), non_blank(&pending.record.county_name))
    else {
        return Err(UnresolvedReason::MissingName);
    };
    let abbr = state_abbreviation(&state).ok_or(UnresolvedReason::UnmappedState)?;

    match by_name.get(&name_key(abbr, &county)).map(Vec::as_slice) {
        None | Some([]) => Err(UnresolvedReason::NoCandidate),
        Some([index]) if owned_by_exact[*index] => Err(UnresolvedReason::RegionAlreadyMatched {
            region_id: boundaries[*index].region_id.clone(),
        }),
        Some([index]) => Ok(*index),
        Some(many) => Err(UnresolvedReason::Ambiguous {
            candidates: many.iter().map(|i| boundaries[*i].region_id.clone()).collect(),
        }),
    }
}

fn provenance(record: &NormalizedAttributeRecord) -> AttributeProvenance {
    AttributeProvenance {
        source_label: record.source_label.clone(),
        raw_identifier: record.raw_identifier.clone(),
        state_name: record.state_name.clone(),
        county_name: record.county_name.clone(),
        year: record.year,
        ingested_at: record.ingested_at,
    }
}
