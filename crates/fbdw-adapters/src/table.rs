//! Generic HTML table → [`Record`] extraction.

use std::collections::HashMap;
use std::sync::LazyLock;

use fbdw_core::{Record, Value};
use scraper::element_ref::Select;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").expect("table selector"));
static HEADER_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("thead tr").expect("header row selector"));
static BODY_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tbody > tr").expect("body row selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").expect("cell selector"));

/// Which table of a page to extract, matched against the table's `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableHint {
    Overall,
    /// Never matches an id that also contains `overall`.
    Home,
    Away,
    IdContains(String),
}

impl TableHint {
    fn needle(&self) -> &str {
        match self {
            Self::Overall => "overall",
            Self::Home => "home",
            Self::Away => "away",
            Self::IdContains(needle) => needle,
        }
    }

    /// `Some(2)` for a whole `_`-token match, `Some(1)` for a plain substring match.
    pub fn score(&self, table_id: &str) -> Option<u8> {
        let id = table_id.to_lowercase();
        let needle = self.needle().to_lowercase();
        if needle.is_empty() || !id.contains(&needle) {
            return None;
        }
        if matches!(self, Self::Home) && id.contains("overall") {
            return None;
        }

        let id_tokens: Vec<&str> = id.split('_').collect();
        let needle_tokens: Vec<&str> = needle.split('_').collect();
        let whole_token = id_tokens
            .windows(needle_tokens.len())
            .any(|window| window == needle_tokens.as_slice());
        Some(if whole_token { 2 } else { 1 })
    }
}

fn best_match<'a>(tables: impl Iterator<Item = ElementRef<'a>>, hint: &TableHint) -> Option<ElementRef<'a>> {
    let mut best: Option<(u8, ElementRef<'a>)> = None;
    for table in tables {
        let Some(score) = table.value().attr("id").and_then(|id| hint.score(id)) else {
            continue;
        };
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, table));
            if score == 2 {
                break;
            }
        }
    }
    best.map(|(_, table)| table)
}

/// Best matching table in the live document, ignoring tables hidden in comments.
pub fn find_table<'a>(doc: &'a Html, hint: &TableHint) -> Option<ElementRef<'a>> {
    best_match(doc.select(&TABLE), hint)
}

fn commented_tables(doc: &Html) -> Vec<Html> {
    doc.tree
        .nodes()
        .filter_map(|node| node.value().as_comment())
        .filter_map(|comment| {
            let text: &str = comment;
            text.contains("<table").then(|| Html::parse_fragment(text))
        })
        .collect()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect()
}

fn header_names(header_row: ElementRef<'_>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    header_row
        .select(&CELL)
        .map(|cell| {
            let text = cell_text(cell);
            let name = if text.is_empty() {
                let el = cell.value();
                el.attr("data-stat")
                    .filter(|v| !v.trim().is_empty())
                    .or_else(|| el.attr("aria-label").filter(|v| !v.trim().is_empty()))
                    .unwrap_or("unknown")
                    .trim()
                    .to_string()
            } else {
                text
            };

            let earlier = seen.entry(name.clone()).or_insert(0);
            let unique = if *earlier == 0 {
                name
            } else {
                format!("{name}_{earlier}")
            };
            *earlier += 1;
            unique
        })
        .collect()
}

/// Lazy walk over the body rows of one table.
pub struct TableRows<'a> {
    headers: Vec<String>,
    rows: Select<'a, 'static>,
}

impl TableRows<'_> {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for TableRows<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        for row in self.rows.by_ref() {
            if row
                .value()
                .classes()
                .any(|class| class == "thead" || class == "spacer")
            {
                continue;
            }

            // Short rows keep only the cells they have.
            let record: Record = self
                .headers
                .iter()
                .zip(row.select(&CELL).map(cell_text))
                .map(|(header, text)| (header.clone(), Value::Text(text)))
                .collect();
            if record.len() > 1 {
                return Some(record);
            }
        }
        None
    }
}

/// Row iterator for a located table; `None` when it has no usable header row.
pub fn table_rows<'a>(table: ElementRef<'a>) -> Option<TableRows<'a>> {
    let header_row = table.select(&HEADER_ROW).last()?;
    let headers = header_names(header_row);
    if headers.is_empty() {
        return None;
    }
    Some(TableRows {
        headers,
        rows: table.select(&BODY_ROW),
    })
}

/// Records of the table matching `hint`; empty (with a warning) when there is none.
///
/// Live tables are scanned first, then tables the page ships inside HTML comments.
pub fn extract_table(doc: &Html, hint: &TableHint) -> Vec<Record> {
    let hidden = commented_tables(doc);
    let candidates = doc
        .select(&TABLE)
        .chain(hidden.iter().flat_map(|fragment| fragment.select(&TABLE)));

    let Some(table) = best_match(candidates, hint) else {
        warn!(?hint, "table not found");
        return Vec::new();
    };
    let table_id = table.value().attr("id").unwrap_or_default();
    let Some(rows) = table_rows(table) else {
        warn!(?hint, table_id, "table has no header row");
        return Vec::new();
    };

    let records: Vec<Record> = rows.collect();
    debug!(?hint, table_id, rows = records.len(), "extracted table");
    records
}
