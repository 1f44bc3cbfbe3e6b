use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::config::FusionConfig;
use crate::derived::{apply_derived, attach_ancillary};
use crate::error::FusionError;
use crate::matcher::reconcile;
use crate::merge::{merge_ordered, select_year, sort_extracts};
use crate::model::{
    FusionInput, FusionMeta, FusionResult, NormalizedAttributeRecord, RecordKind, RunReport,
    SubcountyTally,
};
use crate::normalize::normalize_extract;
use crate::summary::summarize;

/// Run the fusion pipeline per config, stamping records with the current time.
pub fn run(config: &FusionConfig, input: &FusionInput) -> Result<FusionResult, FusionError> {
    run_at(config, input, Utc::now())
}

/// Run the fusion pipeline with an explicit ingestion timestamp.
pub fn run_at(
    config: &FusionConfig,
    input: &FusionInput,
    ingested_at: DateTime<Utc>,
) -> Result<FusionResult, FusionError> {
    if input.boundaries.is_empty() {
        return Err(FusionError::NoBoundaries);
    }

    // Normalize every extract in parallel; collect keeps merge order.
    let ordered = sort_extracts(&input.extracts);
    let normalized: Vec<_> = ordered
        .par_iter()
        .map(|extract| normalize_extract(extract, ingested_at))
        .collect();
    let merged = merge_ordered(normalized);

    let mut report = RunReport {
        extracts_processed: merged.stats.len(),
        blank_rows: merged.stats.iter().map(|s| s.blank_rows).sum(),
        skipped_rows: merged.stats.iter().map(|s| s.skipped_rows).sum(),
        inconsistent_rows: merged.stats.iter().map(|s| s.inconsistent_rows).sum(),
        records_normalized: merged.records.len(),
        ..Default::default()
    };
    report.failures = input.unavailable.iter().cloned().chain(merged.failures).collect();
    report.extracts_failed = report.failures.len();
    report.extracts = merged.stats;
    for failure in &report.failures {
        tracing::warn!(source = %failure.label, failure = ?failure.kind, "extract skipped");
    }
    tracing::info!(
        extracts = report.extracts_processed,
        failed = report.extracts_failed,
        records = report.records_normalized,
        "normalization complete"
    );

    let filtered = select_year(merged.records, config.year);
    report.selected_year = filtered.selected;
    report.records_filtered_by_year = filtered.dropped;

    let (targets, others): (Vec<_>, Vec<_>) =
        filtered.records.into_iter().partition(|r| r.kind == config.kind);
    report.subcounty = tally_subcounty(&targets, &others);

    let mut fused = reconcile(&input.boundaries, &targets, config.duplicates)?;
    report.invalid_identifiers = fused.invalid_identifiers;
    report.exact_matches = fused.exact_matches;
    report.fallback_matches = fused.fallback_matches;
    report.duplicate_overwrites = fused.duplicate_overwrites;
    report.ambiguous_fallbacks = fused.orphans.iter().filter(|o| o.is_ambiguous()).count();
    report.orphaned_attributes = fused.orphans.len() - report.ambiguous_fallbacks;
    tracing::info!(
        regions = fused.regions.len(),
        exact = fused.exact_matches,
        fallback = fused.fallback_matches,
        orphans = report.orphaned_attributes,
        ambiguous = report.ambiguous_fallbacks,
        "reconciliation complete"
    );
    if fused.duplicate_overwrites > 0 {
        tracing::warn!(
            overwrites = fused.duplicate_overwrites,
            "duplicate regions resolved by last write"
        );
    }
    report.orphans = std::mem::take(&mut fused.orphans);

    let mut regions = fused.regions;
    if let Some(table) = &input.ancillary {
        let joined = attach_ancillary(&mut regions, table);
        tracing::info!(
            table = %joined.label,
            matched = joined.matched,
            unmatched = joined.unmatched,
            invalid = joined.invalid_identifiers,
            "ancillary join complete"
        );
        report.ancillary = Some(joined);
    }
    apply_derived(&mut regions);

    let summary = summarize(&regions);

    Ok(FusionResult {
        meta: FusionMeta {
            config_name: config.name.clone(),
            record_kind: config.kind,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: ingested_at.to_rfc3339(),
        },
        summary,
        report,
        regions,
    })
}

/// Tally sub-county records whether or not they were the reconciled kind.
fn tally_subcounty(
    targets: &[NormalizedAttributeRecord],
    others: &[NormalizedAttributeRecord],
) -> SubcountyTally {
    let mut tally = SubcountyTally::default();
    for record in targets.iter().chain(others) {
        if record.kind != RecordKind::Subcounty {
            continue;
        }
        tally.records += 1;
        tally.households += record.metrics.households.unwrap_or(0);
        let kind = record.subcounty_type.clone().unwrap_or_else(|| "unknown".into());
        *tally.by_type.entry(kind).or_insert(0) += 1;
    }
    tally
}
