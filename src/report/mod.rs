pub mod ann;
pub mod assets;
pub mod eo;
pub mod flowchart;
pub mod fragments;
pub mod render;

use std::collections::BTreeMap;

use serde::Serialize;

pub use flowchart::FlowchartCounts;
pub use render::{HtmlRenderer, Renderer};

/// Columns of the standardized dataset, in display order.
pub const DATA_HEADERS: [&str; 6] = [
    "ts_datetime",
    "ts_frc",
    "hh_datetime",
    "hh_frc",
    "ts_wattemp",
    "ts_cond",
];

/// One input sample excluded from a stage, with the reason it was excluded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkippedRow {
    pub reason: String,
    pub values: BTreeMap<String, String>,
}

impl SkippedRow {
    /// Builds a row from named columns; a column called `reason` (any case)
    /// becomes the exclusion reason.
    pub fn from_columns(columns: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut row = SkippedRow::default();
        for (name, value) in columns {
            if name.trim().eq_ignore_ascii_case("reason") {
                row.reason = value;
            } else {
                row.values.insert(name, value);
            }
        }
        row
    }

    /// Web-stage rows are stored on the dataset record as JSON objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self::from_columns(object.iter().map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })))
    }
}

/// A standardization rule and how many samples it affected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulesetEntry {
    pub rule: String,
    pub count: u64,
}

/// Drops rules that affected no samples; order of the rest is preserved.
pub fn retain_applied(entries: Vec<RulesetEntry>) -> Vec<RulesetEntry> {
    entries.into_iter().filter(|e| e.count > 0).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfidenceLevel {
    MinDecay,
    OptimumDecay,
    MaxDecay,
    Unknown,
}

impl ConfidenceLevel {
    pub fn from_code(code: &str) -> Self {
        match code {
            "minDecay" => ConfidenceLevel::MinDecay,
            "optimumDecay" => ConfidenceLevel::OptimumDecay,
            "maxDecay" => ConfidenceLevel::MaxDecay,
            _ => ConfidenceLevel::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceLevel::MinDecay => "Minimum Decay Scenario",
            ConfidenceLevel::OptimumDecay => "Optimum/Balanced Decay Scenario",
            ConfidenceLevel::MaxDecay => "Maximum Decay Scenario",
            ConfidenceLevel::Unknown => "Unknown",
        }
    }
}

/// What the ANN engine contributed to the report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnnSection {
    pub results_table: String,
    pub version: String,
    pub delta_t: String,
    pub frc_image: Option<String>,
    pub skipped_table: String,
    pub skipped_count: u64,
    pub ruleset: Vec<RulesetEntry>,
    pub diagnostic: Option<String>,
}

/// What the EO engine contributed to the report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EoSection {
    pub results_table: String,
    pub backcheck_image: Option<String>,
    pub contour_image: Option<String>,
    pub histogram_image: Option<String>,
    pub skipped: Vec<SkippedRow>,
    pub ruleset: Vec<RulesetEntry>,
    pub frc: f64,
    pub diagnostic: Option<String>,
}

/// The single reconciled view handed to the renderer. Built once per request.
#[derive(Debug, Clone, Serialize)]
pub struct ReportModel {
    pub report_date: String,
    pub country_name: String,
    pub project_name: String,
    pub field_site_name: String,
    pub dataset_name: String,
    pub num_samples: u64,
    pub num_optimize: String,
    pub confidence_level: String,
    pub data_headers: Vec<&'static str>,
    pub web_skipped: Vec<SkippedRow>,
    pub ann: AnnSection,
    pub eo: EoSection,
    pub flowchart: FlowchartCounts,
}
