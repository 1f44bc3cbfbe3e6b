//! Survey extract loading: CSV and Excel-family workbooks into [`RawExtract`]s.

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use regionfuse_recon::model::{
    FailureKind, RawExtract, RawRow, RawValue, RecordKind, SourceFailure, SourceOrigin,
};

use crate::fetch::{sha256_hex, Fetch};

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Extracts that loaded, plus the sources that could not be read at all.
#[derive(Debug, Default)]
pub struct ExtractLoad {
    pub extracts: Vec<RawExtract>,
    pub failures: Vec<SourceFailure>,
}

/// Fetch and parse every resource. A bad source is recorded and skipped.
pub fn load_extracts(fetch: &dyn Fetch, resources: &[String]) -> ExtractLoad {
    let mut load = ExtractLoad::default();
    for resource in resources {
        match load_source(fetch, resource) {
            Ok(extracts) => {
                tracing::debug!(resource = %resource, sheets = extracts.len(), "loaded extract");
                load.extracts.extend(extracts);
            }
            Err(reason) => {
                tracing::warn!(resource = %resource, reason = %reason, "extract unavailable");
                load.failures.push(SourceFailure {
                    label: label_from_resource(resource),
                    kind: FailureKind::SourceUnavailable { reason },
                });
            }
        }
    }
    load
}

fn load_source(fetch: &dyn Fetch, resource: &str) -> Result<Vec<RawExtract>, String> {
    let bytes = fetch.fetch(resource).map_err(|e| e.reason)?;
    let label = label_from_resource(resource);
    let origin = SourceOrigin { path: resource.to_string(), sha256: sha256_hex(&bytes) };

    let mut extracts = if is_workbook(resource) {
        parse_workbook(&label, bytes)?
    } else {
        vec![parse_csv(&label, &bytes)?]
    };
    for extract in &mut extracts {
        extract.origin = Some(origin.clone());
    }
    Ok(extracts)
}

fn is_workbook(resource: &str) -> bool {
    Path::new(resource)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| WORKBOOK_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Source label from a file name.
///
/// Survey files are named `<year>_<publisher>_<State Words>_Data_Sheet.xlsx`;
/// the label is the state words joined by spaces. Any other name uses the
/// file stem as-is.
pub fn label_from_resource(resource: &str) -> String {
    let stem = Path::new(resource)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(resource);
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() >= 5 {
        parts[2..parts.len() - 2].join(" ")
    } else {
        stem.to_string()
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Decode as UTF-8, falling back to Windows-1252 (common for Excel-exported CSVs).
pub fn decode_text(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    let mut best = b',';
    let mut best_score = 0u64;
    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        let target = counts.first().copied().unwrap_or(0);
        if target <= 1 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }
    best
}

/// Parse one CSV sheet. A `Type` column marks it as a sub-county sheet.
pub fn parse_csv(label: &str, bytes: &[u8]) -> Result<RawExtract, String> {
    let content = decode_text(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(&content))
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        let row: RawRow = columns
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.trim().is_empty())
            .map(|(header, field)| {
                let value = if field.trim().is_empty() {
                    RawValue::Blank
                } else {
                    RawValue::from(field)
                };
                (header.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok(RawExtract {
        label: label.to_string(),
        kind: infer_kind(&columns),
        columns,
        rows,
        origin: None,
    })
}

fn infer_kind(columns: &[String]) -> RecordKind {
    if columns.iter().any(|c| c.trim().eq_ignore_ascii_case("type")) {
        RecordKind::Subcounty
    } else {
        RecordKind::County
    }
}

// ---------------------------------------------------------------------------
// Workbooks
// ---------------------------------------------------------------------------

fn sheet_kind(name: &str) -> Option<RecordKind> {
    match name.trim().to_ascii_lowercase().as_str() {
        "county" => Some(RecordKind::County),
        "subcounty" => Some(RecordKind::Subcounty),
        _ => None,
    }
}

fn cell_value(cell: &Data) -> RawValue {
    match cell {
        Data::Empty => RawValue::Blank,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Float(n) => RawValue::Number(*n),
        Data::Int(n) => RawValue::Number(*n as f64),
        Data::Bool(b) => RawValue::Text(if *b { "TRUE" } else { "FALSE" }.into()),
        Data::Error(e) => RawValue::Text(format!("#{e:?}")),
        Data::DateTime(dt) => RawValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawValue::Text(s.clone()),
    }
}

/// Parse the `County` and `Subcounty` sheets of a workbook (xlsx, xls, xlsb, ods).
/// Other sheets are ignored.
pub fn parse_workbook(label: &str, bytes: Vec<u8>) -> Result<Vec<RawExtract>, String> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| format!("Failed to open workbook: {e}"))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut extracts = Vec::new();
    for sheet_name in &sheet_names {
        let Some(kind) = sheet_kind(sheet_name) else {
            continue;
        };
        let range = workbook
            .worksheet_range(sheet_name)
            .map_err(|e| format!("Failed to read sheet '{sheet_name}': {e}"))?;

        let mut rows_iter = range.rows();
        let columns: Vec<String> = match rows_iter.next() {
            Some(header) => header
                .iter()
                .map(|c| cell_value(c).as_text().unwrap_or_default())
                .collect(),
            None => Vec::new(),
        };

        let rows = rows_iter
            .map(|cells| {
                columns
                    .iter()
                    .zip(cells.iter())
                    .filter(|(header, _)| !header.is_empty())
                    .map(|(header, cell)| (header.clone(), cell_value(cell)))
                    .collect::<RawRow>()
            })
            .collect();

        extracts.push(RawExtract {
            label: label.to_string(),
            kind,
            columns,
            rows,
            origin: None,
        });
    }

    if extracts.is_empty() {
        return Err(format!(
            "workbook has no County or Subcounty sheet (found: {})",
            sheet_names.join(", ")
        ));
    }
    Ok(extracts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetch;

    const COUNTY_CSV: &str = "State,Year,GEO id2,County,Households,\
Poverty Households,ALICE Households,Above ALICE Households\n\
Texas,2022,48201.0,Harris,1000,150,300,550\n\
Texas,2022,,Dallas,200,20,40,140\n\
,,,,,,,\n";

    #[test]
    fn labels_follow_survey_file_naming() {
        assert_eq!(label_from_resource("data/2025_ALICE_Texas_Data_Sheet.xlsx"), "Texas");
        assert_eq!(label_from_resource("2025_ALICE_New_York_Data_Sheet.xlsx"), "New York");
        assert_eq!(label_from_resource("/tmp/ohio.csv"), "ohio");
    }

    #[test]
    fn csv_rows_keep_blanks_distinct_from_values() {
        let extract = parse_csv("Texas", COUNTY_CSV.as_bytes()).unwrap();
        assert_eq!(extract.kind, RecordKind::County);
        assert_eq!(extract.columns.len(), 8);
        assert_eq!(extract.rows.len(), 3);
        assert_eq!(extract.rows[0].cells["GEO id2"], RawValue::from("48201.0"));
        assert_eq!(extract.rows[1].cells["GEO id2"], RawValue::Blank);
        assert!(extract.rows[2].cells.values().all(RawValue::is_blank));
    }

    #[test]
    fn csv_with_type_column_is_subcounty() {
        let csv = "State;Type;GEO id2;County;Households\nOhio;Place;3900000001;Franklin;10\n";
        let extract = parse_csv("Ohio", csv.as_bytes()).unwrap();
        assert_eq!(extract.kind, RecordKind::Subcounty);
        assert_eq!(extract.rows[0].cells["Type"], RawValue::from("Place"));
    }

    #[test]
    fn windows_1252_csv_is_decoded() {
        let mut bytes = b"State,County,Households\nNew Mexico,Do".to_vec();
        bytes.push(0xF1); // n-tilde in Windows-1252
        bytes.extend_from_slice(b"a Ana,10\n");
        let extract = parse_csv("New Mexico", &bytes).unwrap();
        assert_eq!(extract.rows[0].cells["County"], RawValue::from("Do\u{f1}a Ana"));
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let mut bytes = "\u{feff}".as_bytes().to_vec();
        bytes.extend_from_slice(COUNTY_CSV.as_bytes());
        let extract = parse_csv("Texas", &bytes).unwrap();
        assert_eq!(extract.columns[0], "State");
    }

    #[test]
    fn workbook_cells_map_to_raw_values() {
        assert_eq!(cell_value(&Data::Float(6037.0)), RawValue::Number(6037.0));
        assert_eq!(cell_value(&Data::Int(12)), RawValue::Number(12.0));
        assert_eq!(cell_value(&Data::Empty), RawValue::Blank);
        assert_eq!(cell_value(&Data::String("Harris".into())), RawValue::from("Harris"));
    }

    #[test]
    fn sheet_names_select_kind() {
        assert_eq!(sheet_kind("County"), Some(RecordKind::County));
        assert_eq!(sheet_kind(" subcounty "), Some(RecordKind::Subcounty));
        assert_eq!(sheet_kind("Notes"), None);
    }

    #[test]
    fn unreadable_workbook_is_a_source_failure() {
        let mut fetch = MemoryFetch::new();
        fetch.insert("2025_ALICE_Texas_Data_Sheet.xlsx", b"not a zip".to_vec());
        fetch.insert("ohio.csv", COUNTY_CSV.as_bytes().to_vec());
        let load = load_extracts(
            &fetch,
            &[
                "2025_ALICE_Texas_Data_Sheet.xlsx".to_string(),
                "ohio.csv".to_string(),
                "missing.csv".to_string(),
            ],
        );
        assert_eq!(load.extracts.len(), 1);
        assert_eq!(load.extracts[0].label, "ohio");
        let origin = load.extracts[0].origin.as_ref().unwrap();
        assert_eq!(origin.path, "ohio.csv");
        assert_eq!(origin.sha256.len(), 64);

        let labels: Vec<_> = load.failures.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Texas", "missing"]);
        assert!(matches!(load.failures[0].kind, FailureKind::SourceUnavailable { .. }));
    }
}
