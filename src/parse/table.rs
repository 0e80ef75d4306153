//! Header-driven HTML table parsing.
//!
//! dsebd.org pages carry their data in Bootstrap-style bordered tables. The
//! first `tr` of the `table.table.table-bordered` element names the columns;
//! every other row is data. Rows are mapped to records positionally: the text
//! of the i-th `td` lands under the i-th header name.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// One parsed table row: an ordered column-name → cell-text mapping.
pub type Record = serde_json::Map<String, Value>;

/// All rows of one parsed table snapshot, in document order.
pub type Dataset = Vec<Record>;

/// Row selector for pages where the header `tr` is part of the matched set
/// and has to be skipped by the mapper.
pub const BORDERED_ROWS: &str = "table.table-bordered tr";

/// Row selector for pages where only `tbody` rows are data and the header
/// lives outside the matched set.
pub const BORDERED_BODY_ROWS: &str = "table.table-bordered tbody tr";

const HEADER_ROW: &str = "table.table.table-bordered tr";

/// Concatenated descendant text of an element, trimmed.
fn text_of(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Column names from the first row of header cells in the document.
///
/// Returns an empty list when no matching table or header row exists; a
/// zero-length schema means "no data here", not an error.
pub fn header_row(doc: &Html) -> Vec<String> {
    let rows = Selector::parse(HEADER_ROW).expect("header row selector should be valid");
    let cells = Selector::parse("th").expect("header cell selector should be valid");

    match doc.select(&rows).next() {
        Some(first) => first.select(&cells).map(|th| text_of(&th)).collect(),
        None => Vec::new(),
    }
}

/// Map every selected row to a [`Record`] keyed by `headers`.
///
/// With `skip_first` the row at index 0 is discarded — used when the row
/// selector also matches the header row. Cell text is trimmed and has all
/// commas removed so thousands-grouped numbers come out as plain digit
/// strings. Rows shorter than the schema pad the remaining keys with empty
/// strings; cells beyond the schema are dropped; a duplicate header name
/// keeps only the last cell mapped to it.
///
/// Panics if `row_selector` is not valid CSS; callers pass the constants
/// above.
pub fn map_rows(doc: &Html, row_selector: &str, headers: &[String], skip_first: bool) -> Dataset {
    let rows = Selector::parse(row_selector).expect("row selector should be valid");
    let cells = Selector::parse("td").expect("cell selector should be valid");

    let mut data = Vec::new();
    for (index, row) in doc.select(&rows).enumerate() {
        if index == 0 && skip_first {
            continue;
        }
        let row_cells: Vec<String> = row
            .select(&cells)
            .map(|td| text_of(&td).replace(',', ""))
            .collect();

        let mut record = Record::new();
        for (i, header) in headers.iter().enumerate() {
            let value = row_cells.get(i).cloned().unwrap_or_default();
            record.insert(header.clone(), Value::String(value));
        }
        data.push(record);
    }
    data
}

/// Parse a raw HTML body into a [`Dataset`]: extract the header schema, then
/// map the rows selected by `row_selector`.
///
/// The parsed `scraper::Html` document is confined to this call so it never
/// has to live across an await point (it is not `Send`).
pub fn parse_table(html: &str, row_selector: &str, skip_first: bool) -> Dataset {
    let doc = Html::parse_document(html);
    let headers = header_row(&doc);
    map_rows(&doc, row_selector, &headers, skip_first)
}
