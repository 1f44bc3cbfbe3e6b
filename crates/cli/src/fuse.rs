//! `rfuse run | validate | canonicalize`: config-driven boundary fusion.

use std::path::{Path, PathBuf};

use regionfuse_io::ancillary::parse_ancillary;
use regionfuse_io::boundary::parse_boundaries;
use regionfuse_io::export::{write_csv, write_geojson, write_json};
use regionfuse_io::extract::{label_from_resource, load_extracts};
use regionfuse_io::{Fetch, FsFetch};
use regionfuse_recon::model::{FailureKind, FusionInput, FusionResult, SourceFailure};
use regionfuse_recon::{canonicalize, FusionConfig, FusionError};
use serde_json::json;

use crate::exit_codes::{
    EXIT_ERROR, EXIT_FUSE_INVALID_CONFIG, EXIT_FUSE_INVALID_ID, EXIT_FUSE_PARTIAL,
    EXIT_FUSE_RUNTIME,
};
use crate::CliError;

fn fuse_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError::new(code, msg)
}

fn engine_err(err: FusionError) -> CliError {
    let code = match err {
        FusionError::ConfigParse(_) | FusionError::ConfigValidation(_) => EXIT_FUSE_INVALID_CONFIG,
        _ => EXIT_FUSE_RUNTIME,
    };
    fuse_err(code, err.to_string())
}

fn read_config(config_path: &Path) -> Result<FusionConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        CliError::args(format!("cannot read config {}: {e}", config_path.display()))
    })?;
    FusionConfig::from_toml(&config_str).map_err(engine_err)
}

fn base_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expanded extract resources, plus patterns that matched nothing.
struct ExtractResources {
    resources: Vec<String>,
    empty_patterns: Vec<SourceFailure>,
}

/// Expand glob entries against the config directory. Literal paths pass
/// through unchanged so a missing file is reported by the loader.
fn expand_extracts(base: &Path, entries: &[String]) -> Result<ExtractResources, CliError> {
    let mut out = ExtractResources { resources: Vec::new(), empty_patterns: Vec::new() };
    for entry in entries {
        if !is_glob(entry) {
            out.resources.push(entry.clone());
            continue;
        }
        let full = base.join(entry);
        let paths = glob::glob(&full.to_string_lossy()).map_err(|e| {
            fuse_err(EXIT_FUSE_INVALID_CONFIG, format!("invalid extract pattern '{entry}': {e}"))
        })?;
        let mut matched: Vec<PathBuf> =
            paths.filter_map(Result::ok).filter(|p| p.is_file()).collect();
        matched.sort();
        if matched.is_empty() {
            tracing::warn!(pattern = %entry, "extract pattern matched no files");
            out.empty_patterns.push(SourceFailure {
                label: entry.clone(),
                kind: FailureKind::SourceUnavailable { reason: "pattern matched no files".into() },
            });
        }
        for path in matched {
            let relative = path.strip_prefix(base).unwrap_or(&path);
            out.resources.push(relative.to_string_lossy().into_owned());
        }
    }
    Ok(out)
}

fn build_input(config: &FusionConfig, base: &Path) -> Result<FusionInput, CliError> {
    let fetch = FsFetch::new(base);

    let boundary_bytes = fetch.fetch(&config.boundaries.file).map_err(|e| {
        fuse_err(EXIT_FUSE_RUNTIME, format!("cannot read boundaries {}: {}", e.resource, e.reason))
    })?;
    let boundaries = parse_boundaries(&boundary_bytes, &config.boundaries).map_err(|e| {
        fuse_err(EXIT_FUSE_RUNTIME, format!("{}: {e}", config.boundaries.file))
    })?;
    tracing::info!(file = %config.boundaries.file, regions = boundaries.len(), "loaded boundaries");

    let expanded = expand_extracts(base, &config.extracts)?;
    let load = load_extracts(&fetch, &expanded.resources);

    let ancillary = match &config.ancillary {
        Some(anc) => {
            let label = anc.label.clone().unwrap_or_else(|| label_from_resource(&anc.file));
            let bytes = fetch.fetch(&anc.file).map_err(|e| {
                let msg = format!("cannot read ancillary {}: {}", e.resource, e.reason);
                fuse_err(EXIT_FUSE_RUNTIME, msg)
                    .with_hint("remove the [ancillary] table to run without census data")
            })?;
            let table = parse_ancillary(&label, &bytes, &anc.key())
                .map_err(|e| fuse_err(EXIT_FUSE_RUNTIME, format!("{}: {e}", anc.file)))?;
            tracing::info!(file = %anc.file, rows = table.rows.len(), "loaded ancillary table");
            Some(table)
        }
        None => None,
    };

    Ok(FusionInput {
        boundaries,
        extracts: load.extracts,
        unavailable: expanded.empty_patterns.into_iter().chain(load.failures).collect(),
        ancillary,
    })
}

fn write_outputs(
    result: &FusionResult,
    config: &FusionConfig,
    base: &Path,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let runtime = |msg: String| fuse_err(EXIT_FUSE_RUNTIME, msg);

    let json_path = output_file.or_else(|| config.output.json.as_ref().map(|p| base.join(p)));
    if let Some(path) = json_path {
        write_json(&path, result).map_err(runtime)?;
        eprintln!("wrote {}", path.display());
    }
    if let Some(csv) = &config.output.csv {
        let path = base.join(csv);
        write_csv(&path, &result.regions).map_err(runtime)?;
        eprintln!("wrote {}", path.display());
    }
    if let Some(geojson) = &config.output.geojson {
        let path = base.join(geojson);
        write_geojson(&path, &result.regions).map_err(runtime)?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

fn print_summary(result: &FusionResult) {
    let s = &result.summary;
    let r = &result.report;
    let completeness = s
        .completeness_pct
        .map(|p| format!("{p}%"))
        .unwrap_or_else(|| "n/a".into());
    eprintln!(
        "fused {} region(s): {} exact, {} fallback, {} unmatched ({} complete)",
        s.total_regions, s.methods.exact, s.methods.fallback, s.methods.unmatched, completeness,
    );
    eprintln!(
        "extracts: {} processed, {} failed; {} record(s) normalized, {} skipped row(s)",
        r.extracts_processed, r.extracts_failed, r.records_normalized, r.skipped_rows,
    );
    if !r.orphans.is_empty() {
        eprintln!(
            "orphaned: {} attribute record(s) ({} ambiguous, {} invalid id)",
            r.orphans.len(),
            r.ambiguous_fallbacks,
            r.invalid_identifiers,
        );
    }
    if r.inconsistent_rows > 0 {
        eprintln!(
            "inconsistent: {} row(s) with bucket counts above households (percentages null)",
            r.inconsistent_rows
        );
    }
    if r.duplicate_overwrites > 0 {
        eprintln!(
            "duplicates: {} region(s) overwritten by a later extract",
            r.duplicate_overwrites
        );
    }
    for failure in &r.failures {
        match &failure.kind {
            FailureKind::SourceUnavailable { reason } => {
                eprintln!("  unavailable: {} ({reason})", failure.label)
            }
            FailureKind::MalformedSchema { missing_columns } => {
                let missing = missing_columns.join(", ");
                eprintln!("  malformed:   {} (missing {missing})", failure.label)
            }
        }
    }
    if let Some(anc) = &r.ancillary {
        eprintln!(
            "ancillary '{}': {} of {} row(s) matched, {} unmatched, {} invalid id",
            anc.label, anc.matched, anc.rows, anc.unmatched, anc.invalid_identifiers,
        );
    }
}

pub fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    strict: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let base = base_dir(&config_path);

    let input = build_input(&config, base)?;
    let result = regionfuse_recon::run(&config, &input).map_err(engine_err)?;

    write_outputs(&result, &config, base, output_file)?;

    if json_output {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| fuse_err(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    }

    if !quiet {
        print_summary(&result);
    }

    if strict && result.report.has_partial_failures() {
        return Err(fuse_err(
            EXIT_FUSE_PARTIAL,
            "run completed with partial failures",
        )
        .with_hint("see report.failures, report.orphans and report.extracts in the JSON result"));
    }
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    eprintln!(
        "valid: {} fusion '{}' with {} extract source(s){}",
        config.kind,
        config.name,
        config.extracts.len(),
        if config.ancillary.is_some() { " and an ancillary table" } else { "" },
    );
    Ok(())
}

pub fn cmd_canonicalize(ids: &[String], json_output: bool) -> Result<(), CliError> {
    let results: Vec<_> = ids.iter().map(|raw| (raw, canonicalize(raw))).collect();
    let invalid = results.iter().filter(|(_, r)| r.is_err()).count();

    if json_output {
        let rows: Vec<_> = results
            .iter()
            .map(|(raw, r)| match r {
                Ok(id) => json!({ "input": raw, "region_id": id }),
                Err(e) => json!({ "input": raw, "error": e }),
            })
            .collect();
        let json_str = serde_json::to_string_pretty(&rows)
            .map_err(|e| fuse_err(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    } else {
        for (raw, r) in &results {
            match r {
                Ok(id) => println!("{raw}\t{id}"),
                Err(e) => eprintln!("{raw}\t{e}"),
            }
        }
    }

    if invalid > 0 {
        return Err(fuse_err(EXIT_FUSE_INVALID_ID, format!("{invalid} invalid identifier(s)")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_detection() {
        assert!(is_glob("data/*.csv"));
        assert!(is_glob("data/20??_*.xlsx"));
        assert!(!is_glob("data/Texas.csv"));
    }

    #[test]
    fn expand_keeps_literals_and_sorts_matches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/b.csv"), "x").unwrap();
        std::fs::write(dir.path().join("data/a.csv"), "x").unwrap();

        let entries = vec!["data/*.csv".to_string(), "missing.csv".to_string()];
        let out = expand_extracts(dir.path(), &entries).unwrap();
        assert_eq!(out.resources, vec!["data/a.csv", "data/b.csv", "missing.csv"]);
        assert!(out.empty_patterns.is_empty());
    }

    #[test]
    fn empty_pattern_is_reported_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let out = expand_extracts(dir.path(), &["*.xlsx".to_string()]).unwrap();
        assert!(out.resources.is_empty());
        assert_eq!(out.empty_patterns.len(), 1);
        assert_eq!(out.empty_patterns[0].label, "*.xlsx");
    }

    #[test]
    fn base_dir_of_bare_file_is_cwd() {
        assert_eq!(base_dir(Path::new("fuse.toml")), Path::new("."));
        assert_eq!(base_dir(Path::new("cfg/fuse.toml")), Path::new("cfg"));
    }
}
