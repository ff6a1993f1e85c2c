use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::constants::{HTML_CELL_TAGS, HTML_ROW_TAG, HTML_TABLE_TAG};
use crate::error::{Result, ScraperError};
use crate::pipeline::loader::{Document, XmlElement};

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(HTML_ROW_TAG).expect("static row selector is valid"));

/// Rows of string cells, exactly as extracted. Rows may differ in length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawTable {
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_rectangular(&self) -> bool {
        self.rows.windows(2).all(|w| w[0].len() == w[1].len())
    }
}

/// Extract the `index`-th table matched by `selector`.
///
/// For HTML the selector is CSS; for XML it is a slash path (see [`select_xml`]).
#[instrument(skip(doc), fields(format = %doc.format()))]
pub fn extract_table(doc: &Document, selector: &str, index: usize) -> Result<RawTable> {
    let table = match doc {
        Document::Html(html) => extract_html(html, selector, index)?,
        Document::Xml(root) => extract_xml(root, selector, index)?,
    };
    info!(
        "Extracted table {} matching '{}' with {} rows",
        index,
        selector,
        table.row_count()
    );
    Ok(table)
}

/// Every table matched by `selector`, in document order. Used by the CLI to
/// preview what a selector picks up.
pub fn extract_all_tables(doc: &Document, selector: &str) -> Result<Vec<RawTable>> {
    match doc {
        Document::Html(html) => {
            let selector_parsed = parse_selector(selector)?;
            Ok(html.select(&selector_parsed).map(html_table_rows).collect())
        }
        Document::Xml(root) => Ok(select_xml(root, selector)?
            .into_iter()
            .map(xml_table_rows)
            .collect()),
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ScraperError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn extract_html(html: &Html, selector: &str, index: usize) -> Result<RawTable> {
    let selector_parsed = parse_selector(selector)?;
    let matches: Vec<ElementRef> = html.select(&selector_parsed).collect();
    debug!("Selector '{}' matched {} element(s)", selector, matches.len());

    let table = matches.get(index).ok_or_else(|| ScraperError::NotFound {
        selector: selector.to_string(),
        index,
        found: matches.len(),
    })?;
    Ok(html_table_rows(*table))
}

fn html_table_rows(table: ElementRef) -> RawTable {
    let owns_row = |row: &ElementRef| {
        !is_table(table) || owning_table(*row).map(|t| t.id()) == Some(table.id())
    };
    let rows = table
        .select(&ROW_SELECTOR)
        .filter(owns_row)
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| HTML_CELL_TAGS.contains(&cell.value().name()))
                .map(|cell| collapse_ws(&cell.text().collect::<String>()))
                .collect()
        })
        .collect();
    RawTable::new(rows)
}

fn is_table(element: ElementRef) -> bool {
    element.value().name() == HTML_TABLE_TAG
}

/// Nearest enclosing `<table>` of a row; rows of nested tables belong to the
/// inner table, not the one that was selected.
fn owning_table(row: ElementRef) -> Option<ElementRef> {
    row.ancestors().filter_map(ElementRef::wrap).find(|e| is_table(*e))
}

fn extract_xml(root: &XmlElement, selector: &str, index: usize) -> Result<RawTable> {
    let matches = select_xml(root, selector)?;
    debug!("Path '{}' matched {} element(s)", selector, matches.len());

    let table = matches.get(index).ok_or_else(|| ScraperError::NotFound {
        selector: selector.to_string(),
        index,
        found: matches.len(),
    })?;
    Ok(xml_table_rows(table))
}

fn xml_table_rows(table: &XmlElement) -> RawTable {
    let rows = table
        .children
        .iter()
        .map(|row| {
            if row.children.is_empty() {
                vec![collapse_ws(&row.text)]
            } else {
                row.children
                    .iter()
                    .map(|cell| collapse_ws(&cell.deep_text()))
                    .collect()
            }
        })
        .collect();
    RawTable::new(rows)
}

/// Resolve a slash path against an XML tree.
///
/// `a/b/c` walks from the root, whose name must match `a`. A leading `//` lets the
/// first segment match at any depth. `*` matches any element, and names match
/// either the qualified name or the local part after `prefix:`.
pub fn select_xml<'a>(root: &'a XmlElement, path: &str) -> Result<Vec<&'a XmlElement>> {
    let (anywhere, rest) = match path.strip_prefix("//") {
        Some(rest) => (true, rest),
        None => (false, path.trim_start_matches('/')),
    };
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ScraperError::Selector {
            selector: path.to_string(),
            message: "empty path segment".to_string(),
        });
    }

    let mut current: Vec<&XmlElement> = if anywhere {
        let mut found = Vec::new();
        collect_descendants(root, segments[0], &mut found);
        found
    } else if name_matches(root, segments[0]) {
        vec![root]
    } else {
        Vec::new()
    };

    for segment in &segments[1..] {
        current = current
            .into_iter()
            .flat_map(|el| el.children.iter().filter(|c| name_matches(c, segment)))
            .collect();
    }
    Ok(current)
}

fn collect_descendants<'a>(el: &'a XmlElement, name: &str, out: &mut Vec<&'a XmlElement>) {
    if name_matches(el, name) {
        out.push(el);
    }
    for child in &el.children {
        collect_descendants(child, name, out);
    }
}

fn name_matches(el: &XmlElement, segment: &str) -> bool {
    segment == "*" || el.name == segment || el.local_name() == segment
}

/// Collapse runs of whitespace (non-breaking spaces included) to one space and trim.
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
