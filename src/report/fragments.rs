//! Just enough HTML handling to lift fragments out of engine-generated pages.
//! Engine documents are machine-written and well-formed, so elements are
//! located by tag matching rather than a full parser.

use std::sync::LazyLock;

use regex::Regex;

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<(/?)([A-Za-z][A-Za-z0-9]*)((?:[^>"']|"[^"]*"|'[^']*')*?)(/?)>"#)
        .expect("valid tag regex")
});
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid attribute regex")
});
static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").expect("valid row regex"));
static CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<t([dh])\b[^>]*>(.*?)</t[dh]\s*>").expect("valid cell regex")
});
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid strip regex"));

const VOID_ELEMENTS: [&str; 8] = ["br", "hr", "img", "input", "meta", "link", "col", "wbr"];

#[derive(Debug, Clone, Copy)]
pub enum Selector<'a> {
    Id(&'a str),
    Class(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub outer: String,
    pub inner: String,
}

impl Selector<'_> {
    fn matches(&self, attributes: &str) -> bool {
        ATTR.captures_iter(attributes).any(|cap| {
            let name = &cap[1];
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map_or("", |m| m.as_str());
            match self {
                Selector::Id(id) => name.eq_ignore_ascii_case("id") && value == *id,
                Selector::Class(class) => {
                    name.eq_ignore_ascii_case("class")
                        && value.split_whitespace().any(|c| c == *class)
                }
            }
        })
    }
}

/// First element matching `selector`, or `None` when absent or unterminated.
pub fn find(html: &str, selector: Selector<'_>) -> Option<Element> {
    let mut tags = TAG.captures_iter(html);

    let (open, tag_name, self_closing) = tags.by_ref().find_map(|cap| {
        let is_closing = !cap[1].is_empty();
        if is_closing || !selector.matches(&cap[3]) {
            return None;
        }
        let whole = cap.get(0)?;
        let name = cap[2].to_ascii_lowercase();
        let self_closing = !cap[4].is_empty() || VOID_ELEMENTS.contains(&name.as_str());
        Some((whole, name, self_closing))
    })?;

    if self_closing {
        return Some(Element {
            outer: open.as_str().to_string(),
            inner: String::new(),
        });
    }

    let mut depth = 1usize;
    for cap in tags {
        if !cap[2].eq_ignore_ascii_case(&tag_name) {
            continue;
        }
        let Some(whole) = cap.get(0) else { continue };
        if !cap[1].is_empty() {
            depth -= 1;
            if depth == 0 {
                return Some(Element {
                    outer: html[open.start()..whole.end()].to_string(),
                    inner: html[open.end()..whole.start()].to_string(),
                });
            }
        } else if cap[4].is_empty() {
            depth += 1;
        }
    }

    None
}

/// Inner markup of the first matching element, or an empty string.
pub fn inner_or_empty(html: &str, selector: Selector<'_>) -> String {
    find(html, selector).map(|e| e.inner).unwrap_or_default()
}

/// Outer markup of the first matching element, or an empty string.
pub fn outer_or_empty(html: &str, selector: Selector<'_>) -> String {
    find(html, selector).map(|e| e.outer).unwrap_or_default()
}

/// Text with markup removed and the common entities decoded.
pub fn text_content(html: &str) -> String {
    ANY_TAG
        .replace_all(html, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Data rows of a table as cell text. Rows made only of `<th>` cells are skipped.
pub fn table_rows(html: &str) -> Vec<Vec<String>> {
    ROW.captures_iter(html)
        .filter_map(|row| {
            let cells: Vec<(bool, String)> = CELL
                .captures_iter(&row[1])
                .map(|cell| (&cell[1] == "h" || &cell[1] == "H", text_content(&cell[2])))
                .collect();
            if cells.is_empty() || cells.iter().all(|(header, _)| *header) {
                None
            } else {
                Some(cells.into_iter().map(|(_, text)| text).collect())
            }
        })
        .collect()
}

/// Minimal escaping for text placed into generated markup.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
