use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MISSING_PARAMETERS: &str =
    "Missing one of the parameters: filename, recipient, country, project, fieldsite, dataset";

/// Raw query string of `GET /analysis`. Every field is optional here so that
/// validation can report a single client error instead of a rejection per field.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AnalysisQuery {
    pub filename: Option<String>,
    pub recipient: Option<String>,
    pub country: Option<String>,
    pub project: Option<String>,
    pub fieldsite: Option<String>,
    pub dataset: Option<String>,
    pub prefix: Option<String>,
}

/// A validated analysis request. Immutable once admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    pub filename: String,
    pub recipient: String,
    pub country: String,
    pub project: String,
    pub field_site: String,
    pub dataset_id: String,
    pub debug_prefix: Option<String>,
}

impl TryFrom<AnalysisQuery> for AnalysisRequest {
    type Error = AppError;

    fn try_from(query: AnalysisQuery) -> Result<Self, Self::Error> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        let (
            Some(filename),
            Some(recipient),
            Some(country),
            Some(project),
            Some(field_site),
            Some(dataset_id),
        ) = (
            present(query.filename),
            present(query.recipient),
            present(query.country),
            present(query.project),
            present(query.fieldsite),
            present(query.dataset),
        )
        else {
            return Err(AppError::Validation(MISSING_PARAMETERS.to_string()));
        };

        check_name_component("filename", &filename)?;
        let debug_prefix = present(query.prefix);
        if let Some(prefix) = &debug_prefix {
            check_name_component("prefix", prefix)?;
        }

        Ok(Self {
            filename,
            recipient,
            country,
            project,
            field_site,
            dataset_id,
            debug_prefix,
        })
    }
}

impl AnalysisRequest {
    /// Local name of the dataset: the blob name, prefixed when a debug prefix was given.
    /// It namespaces the request's working directory.
    pub fn staged_filename(&self) -> String {
        match &self.debug_prefix {
            Some(prefix) => format!("{prefix}-{}", self.filename),
            None => self.filename.clone(),
        }
    }

    /// Blob prefix under which everything produced for this dataset is published.
    pub fn analysis_prefix(&self) -> String {
        format!(
            "{}/{}/{}/analysis",
            self.project, self.field_site, self.dataset_id
        )
    }

    /// Segments of a `name__...__optimize__confidence.csv` filename.
    pub fn filename_parts(&self) -> FilenameParts {
        FilenameParts::parse(&self.staged_filename())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameParts {
    pub dataset_name: String,
    pub num_optimize: String,
    pub confidence_code: String,
}

impl FilenameParts {
    pub fn parse(filename: &str) -> Self {
        let segments: Vec<&str> = filename.split("__").collect();
        let last = segments.last().copied().unwrap_or_default();
        let num_optimize = if segments.len() >= 2 {
            segments[segments.len() - 2]
        } else {
            ""
        };

        Self {
            dataset_name: segments.first().copied().unwrap_or_default().to_string(),
            num_optimize: num_optimize.to_string(),
            confidence_code: strip_csv(last).to_string(),
        }
    }
}

/// The staged filename names a directory under the work dir and is substituted
/// into engine command lines, so its parts are restricted to `[A-Za-z0-9._-]`
/// and may not be made of dots alone.
fn check_name_component(param: &str, value: &str) -> Result<(), AppError> {
    let safe = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !safe || value.chars().all(|c| c == '.') {
        return Err(AppError::Validation(format!(
            "{param} may only contain letters, digits, '.', '_' and '-': {value}"
        )));
    }
    Ok(())
}

fn strip_csv(name: &str) -> &str {
    name.strip_suffix(".csv").unwrap_or(name)
}

/// Display name of a `Name-identifier` style parameter.
pub fn display_name(value: &str) -> &str {
    value.split('-').next().unwrap_or(value)
}
