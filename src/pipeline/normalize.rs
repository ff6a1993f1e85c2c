use tracing::{debug, instrument};

use crate::error::{Result, ScraperError};
use crate::pipeline::extract::RawTable;
use crate::pipeline::record::{Record, Value};

/// Drop the first `skip_rows` rows and turn the rest into records keyed by `headers`.
///
/// Every remaining row must have exactly `headers.len()` cells; rows are never
/// truncated or padded.
#[instrument(skip(table, headers), fields(rows = table.row_count(), columns = headers.len()))]
pub fn normalize(table: RawTable, skip_rows: usize, headers: &[String]) -> Result<Vec<Record>> {
    if let Some(dup) = first_duplicate(headers) {
        return Err(ScraperError::Config(format!("duplicate header '{}'", dup)));
    }

    let skipped = skip_rows.min(table.rows.len());
    debug!("Skipping {} leading row(s)", skipped);

    for (row_index, row) in table.rows.iter().enumerate().skip(skip_rows) {
        if row.len() != headers.len() {
            return Err(ScraperError::SchemaMismatch {
                row: row_index,
                expected: headers.len(),
                found: row.len(),
            });
        }
    }

    let records = table
        .rows
        .into_iter()
        .skip(skip_rows)
        .map(|row| {
            headers
                .iter()
                .cloned()
                .zip(row.into_iter().map(Value::Text))
                .collect::<Record>()
        })
        .collect();
    Ok(records)
}

pub(crate) fn first_duplicate(names: &[String]) -> Option<&str> {
    names
        .iter()
        .enumerate()
        .find(|(i, name)| names[..*i].contains(name))
        .map(|(_, name)| name.as_str())
}
