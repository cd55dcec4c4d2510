use std::path::{Path, PathBuf};

use calamine::{Reader, Xlsx, open_workbook};

use super::ann::parse_count;
use super::fragments::escape;
use super::{RulesetEntry, SkippedRow};

const FRC_MARKER: &str = "FRC=";
pub const DEFAULT_FRC: f64 = 0.0;

/// File names the EO engine writes into its output directory.
#[derive(Debug, Clone)]
pub struct EoArtifacts {
    pub results_workbook: PathBuf,
    pub skipped_rows: PathBuf,
    pub ruleset: PathBuf,
    pub backcheck_image: PathBuf,
    pub contour_image: PathBuf,
    pub histogram_image: PathBuf,
}

impl EoArtifacts {
    pub fn new(dir: &Path, stem: &str) -> Self {
        let file = |suffix: &str| dir.join(format!("{stem}_{suffix}"));
        Self {
            results_workbook: file("Results.xlsx"),
            skipped_rows: file("SkippedRows.csv"),
            ruleset: file("Ruleset.csv"),
            backcheck_image: file("Backcheck.png"),
            contour_image: file("Contour.png"),
            histogram_image: file("Histogram.png"),
        }
    }
}

/// Reads the `FRC=<decimal>;` statistic out of the EO diagnostic text.
/// The diagnostic grammar belongs to the engine, so this is best effort and
/// never fails: no marker or no number yields `None`.
pub fn extract_frc(diagnostic: Option<&str>) -> Option<f64> {
    let text = diagnostic?;
    let start = text.find(FRC_MARKER)? + FRC_MARKER.len();
    let rest = &text[start..];
    let value = rest.split(';').next().unwrap_or(rest).trim();
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn frc_or_default(diagnostic: Option<&str>) -> f64 {
    extract_frc(diagnostic).unwrap_or_else(|| {
        if let Some(text) = diagnostic.filter(|t| !t.trim().is_empty()) {
            tracing::warn!(diagnostic = %text, "No FRC value in EO output, using default");
        }
        DEFAULT_FRC
    })
}

/// First sheet of the results workbook as an HTML table; empty when the
/// workbook is absent or unreadable.
pub fn workbook_table(path: &Path) -> String {
    if !path.exists() {
        return String::new();
    }
    match first_sheet_rows(path) {
        Ok(rows) => rows_to_table(&rows),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read EO results workbook");
            String::new()
        }
    }
}

fn first_sheet_rows(path: &Path) -> Result<Vec<Vec<String>>, String> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e| format!("failed to open workbook: {e}"))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| "workbook has no sheets".to_string())?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| format!("failed to read sheet {sheet}: {e}"))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect())
}

pub fn rows_to_table(rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let mut html = String::from(r#"<table class="table center octaveTable" border="1">"#);
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(&escape(cell));
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}

/// Samples the EO engine excluded. An absent side-file is an empty list;
/// a malformed one is logged and treated as empty.
pub fn read_skipped_rows(path: &Path) -> Vec<SkippedRow> {
    read_side_file(path, "skipped rows", |records| {
        let mut records = records.into_iter();
        let Some(header) = records.next() else {
            return Ok(Vec::new());
        };
        Ok(records
            .filter(|r| r.iter().any(|v| !v.is_empty()))
            .map(|record| {
                SkippedRow::from_columns(header.iter().cloned().zip(record))
            })
            .collect())
    })
}

/// Rules the EO standardization applied; rule in the first column, count in the last.
pub fn read_ruleset(path: &Path) -> Vec<RulesetEntry> {
    read_side_file(path, "ruleset", |records| {
        records
            .into_iter()
            .skip(1)
            .filter(|r| r.iter().any(|v| !v.is_empty()))
            .map(|record| {
                let rule = record.first().cloned().unwrap_or_default();
                let raw = record.last().map(String::as_str).unwrap_or_default();
                if record.len() < 2 {
                    return Err(format!("ruleset row has no count: {record:?}"));
                }
                let count = parse_count(raw).ok_or_else(|| format!("invalid count {raw:?} for {rule}"))?;
                Ok(RulesetEntry { rule, count })
            })
            .collect()
    })
}

fn read_side_file<T>(
    path: &Path,
    what: &str,
    parse: impl FnOnce(Vec<Vec<String>>) -> Result<Vec<T>, String>,
) -> Vec<T> {
    if !path.exists() {
        return Vec::new();
    }
    let result = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| parse_delimited(&text))
        .and_then(parse);

    match result {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to parse EO {what}, continuing without it");
            Vec::new()
        }
    }
}

/// Comma-separated records with double-quote escaping.
pub fn parse_delimited(text: &str) -> Result<Vec<Vec<String>>, String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records
        .into_iter()
        .map(|r| r.into_iter().map(|f| f.trim().to_string()).collect())
        .collect())
}
