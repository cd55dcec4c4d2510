use super::RulesetEntry;
use super::fragments::{self, Selector};

/// Fragments lifted out of the ANN engine's generated HTML page.
/// Every missing fragment is simply empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnDocument {
    pub results_table: String,
    pub version: String,
    pub delta_t: String,
    pub skipped_table: String,
    pub skipped_count: u64,
    pub ruleset: Vec<RulesetEntry>,
}

impl AnnDocument {
    pub fn parse(html: &str) -> Self {
        let results_table = fragments::find(html, Selector::Id("annTable"))
            .map(|table| format!(r#"<table class="table center" border="1">{}</table>"#, table.inner))
            .unwrap_or_default();

        let skipped_count_text =
            fragments::text_content(&fragments::inner_or_empty(html, Selector::Id("pythonSkipped_count")));
        let skipped_count = parse_count(&skipped_count_text).unwrap_or_else(|| {
            if !skipped_count_text.is_empty() {
                tracing::warn!(value = %skipped_count_text, "Unparsable ANN skipped count, using 0");
            }
            0
        });

        let ruleset = fragments::find(html, Selector::Id("ann_ruleset"))
            .map(|table| parse_ruleset(&table.outer))
            .unwrap_or_default();

        Self {
            results_table,
            version: fragments::inner_or_empty(html, Selector::Class("swot_version"))
                .trim()
                .to_string(),
            delta_t: fragments::inner_or_empty(html, Selector::Class("time_difference"))
                .trim()
                .to_string(),
            skipped_table: fragments::outer_or_empty(html, Selector::Id("pythonSkipped")),
            skipped_count,
            ruleset,
        }
    }
}

/// Rule name in the first cell, affected sample count in the last.
/// Rows whose count does not parse (headers, totals) are ignored.
fn parse_ruleset(table: &str) -> Vec<RulesetEntry> {
    fragments::table_rows(table)
        .into_iter()
        .filter_map(|cells| {
            let rule = cells.first()?.clone();
            let count = parse_count(cells.last()?)?;
            (cells.len() >= 2 && !rule.is_empty()).then_some(RulesetEntry { rule, count })
        })
        .collect()
}

pub(crate) fn parse_count(text: &str) -> Option<u64> {
    let text = text.trim();
    text.parse::<u64>().ok().or_else(|| {
        // some engines write integral counts as floats
        let value = text.parse::<f64>().ok()?;
        (value >= 0.0 && value.fract() == 0.0).then_some(value as u64)
    })
}
