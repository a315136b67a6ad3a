//! Replacing a source table with its filtered, ordered copy and back.

use rowsift_table::{Document, RowId, TableId};
use tracing::debug;

/// Show `rows` of `source`, in that order, in place of `source`.
///
/// Any copy from an earlier pass is discarded first, so a source never has
/// more than one derived table.
pub fn materialize(doc: &mut Document, source: TableId, rows: &[RowId]) -> Option<TableId> {
    doc.remove_derived(source);
    let derived = doc.insert_derived(source, rows)?;
    doc.set_hidden(source, true);
    debug!(%source, %derived, rows = rows.len(), "materialized table");
    Some(derived)
}

/// Remove the derived copy of `source` and show `source` again. Returns
/// whether a copy was removed.
pub fn restore(doc: &mut Document, source: TableId) -> bool {
    let removed = doc.remove_derived(source);
    doc.set_hidden(source, false);
    removed
}
