use std::fmt::Write;

use super::fragments::escape;
use super::{ReportModel, RulesetEntry, SkippedRow};
use crate::error::AppError;

/// Turns an assembled report into document bytes. Implementations keep no
/// state between calls.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// File extension of the produced document, without the dot.
    fn extension(&self) -> &'static str;

    async fn render(&self, model: &ReportModel) -> Result<Vec<u8>, AppError>;
}

/// Self-contained HTML document with all images inlined.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse;margin:1em auto}\
td,th{padding:4px 8px}\
.center{text-align:center}\
.flowchart td{border:1px solid #666}\
img{max-width:100%}";

#[async_trait::async_trait]
impl Renderer for HtmlRenderer {
    fn extension(&self) -> &'static str {
        "html"
    }

    #[tracing::instrument(name = "report.render", skip_all, fields(report.bytes))]
    async fn render(&self, model: &ReportModel) -> Result<Vec<u8>, AppError> {
        let html = render_html(model).map_err(|e| AppError::Render(e.to_string()))?;
        tracing::Span::current().record("report.bytes", html.len());
        Ok(html.into_bytes())
    }
}

fn render_html(m: &ReportModel) -> Result<String, std::fmt::Error> {
    let mut out = String::new();

    write!(
        out,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>SWOT Analysis Report - {}</title><style>{}</style></head><body>",
        escape(&m.dataset_name),
        STYLE
    )?;

    write!(out, "<h1>SWOT Analysis Report</h1><table>")?;
    for (label, value) in [
        ("Report date", m.report_date.as_str()),
        ("Country", m.country_name.as_str()),
        ("Project", m.project_name.as_str()),
        ("Field site", m.field_site_name.as_str()),
        ("Dataset", m.dataset_name.as_str()),
        ("Optimization target (hours)", m.num_optimize.as_str()),
        ("Confidence level", m.confidence_level.as_str()),
    ] {
        write!(out, "<tr><th>{label}</th><td>{}</td></tr>", escape(value))?;
    }
    write!(out, "<tr><th>Samples</th><td>{}</td></tr></table>", m.num_samples)?;

    let f = &m.flowchart;
    write!(
        out,
        "<h2>Data standardization</h2><table class=\"flowchart center\">\
         <tr><td>Input samples</td><td>{}</td></tr>\
         <tr><td>Excluded during upload</td><td>{}</td></tr>\
         <tr><td>Remaining</td><td>{}</td></tr>\
         <tr><td>Excluded by EO analysis</td><td>{}</td></tr>\
         <tr><td>Remaining</td><td>{}</td></tr>\
         <tr><td>Excluded by ANN analysis</td><td>{}</td></tr>\
         <tr><td>Remaining</td><td>{}</td></tr></table>",
        f.input_count,
        f.excluded_by_web,
        f.remaining_after_web,
        f.excluded_by_eo,
        f.remaining_after_eo,
        f.excluded_by_ann,
        f.remaining_after_ann,
    )?;

    write_skipped(&mut out, "Samples excluded during upload", &m.web_skipped)?;

    write!(out, "<h2>Engineering optimization (EO)</h2>")?;
    write!(
        out,
        "<p>Recommended household FRC target: <strong>{:.1} mg/L</strong></p>",
        m.eo.frc
    )?;
    out.push_str(&m.eo.results_table);
    for image in [&m.eo.backcheck_image, &m.eo.contour_image, &m.eo.histogram_image]
        .into_iter()
        .flatten()
    {
        write!(out, "<img src=\"{image}\">")?;
    }
    write_ruleset(&mut out, "EO standardization rules", &m.eo.ruleset)?;
    write_skipped(&mut out, "Samples excluded by EO", &m.eo.skipped)?;

    write!(out, "<h2>Artificial neural network (ANN)</h2>")?;
    if !m.ann.version.is_empty() {
        write!(out, "<p>Model version: {}</p>", escape(&m.ann.version))?;
    }
    if !m.ann.delta_t.is_empty() {
        write!(
            out,
            "<p>Average time between tapstand and household: {}</p>",
            escape(&m.ann.delta_t)
        )?;
    }
    out.push_str(&m.ann.results_table);
    if let Some(image) = &m.ann.frc_image {
        write!(out, "<img src=\"{image}\">")?;
    }
    write_ruleset(&mut out, "ANN standardization rules", &m.ann.ruleset)?;
    write!(
        out,
        "<p>Samples excluded by ANN: {}</p>",
        m.ann.skipped_count
    )?;
    out.push_str(&m.ann.skipped_table);

    write!(out, "</body></html>")?;
    Ok(out)
}

fn write_ruleset(out: &mut String, title: &str, entries: &[RulesetEntry]) -> std::fmt::Result {
    if entries.is_empty() {
        return Ok(());
    }
    write!(out, "<h3>{title}</h3><table border=\"1\"><tr><th>Rule</th><th>Samples</th></tr>")?;
    for entry in entries {
        write!(out, "<tr><td>{}</td><td>{}</td></tr>", escape(&entry.rule), entry.count)?;
    }
    out.push_str("</table>");
    Ok(())
}

fn write_skipped(out: &mut String, title: &str, rows: &[SkippedRow]) -> std::fmt::Result {
    if rows.is_empty() {
        return Ok(());
    }
    write!(out, "<h3>{title}</h3><table border=\"1\"><tr>")?;
    for header in super::DATA_HEADERS {
        write!(out, "<th>{header}</th>")?;
    }
    out.push_str("<th>Reason</th></tr>");
    for row in rows {
        out.push_str("<tr>");
        for header in super::DATA_HEADERS {
            let value = row.values.get(header).map(String::as_str).unwrap_or("");
            write!(out, "<td>{}</td>", escape(value))?;
        }
        write!(out, "<td>{}</td></tr>", escape(&row.reason))?;
    }
    out.push_str("</table>");
    Ok(())
}
