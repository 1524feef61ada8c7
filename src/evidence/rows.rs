//! Row key normalization.

use crate::db::Row;
use tracing::warn;

/// Lower-cases every key of every row. Values and row order are untouched.
///
/// Keys that collide after lower-casing keep their first position and take the
/// value of the last occurrence.
pub fn standardize_rows(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter().map(standardize_row).collect()
}

fn standardize_row(row: Row) -> Row {
    let mut lowered = Row::new();
    for (key, value) in row {
        let lower = key.to_lowercase();
        if lowered.insert(lower, value).is_some() {
            warn!("Column {} collides with another column after lower-casing", key);
        }
    }
    lowered
}
