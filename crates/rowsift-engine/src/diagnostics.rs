use std::fmt;

use rowsift_table::RowId;
use serde::Serialize;

use crate::cache::RowCacheEntry;

/// What the cache knows about one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDiagnostics {
    /// The row that was asked about.
    pub row: RowId,
    /// The row the cached state belongs to. Differs from `row` for rows of a
    /// materialized table.
    pub source_row: RowId,
    /// Whether the row exists in the document.
    pub found: bool,
    pub entry: Option<RowCacheEntry>,
}

impl fmt::Display for RowDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.row)?;
        if self.source_row != self.row {
            write!(f, " (copy of {})", self.source_row)?;
        }
        writeln!(f)?;
        if !self.found {
            return write!(f, "  not in the document");
        }
        let Some(entry) = &self.entry else {
            return write!(f, "  uncached");
        };

        writeln!(f, "  variables: {}", entry.variable_mapping)?;
        write!(f, "  filter: {}", if entry.filter_result { "PASS" } else { "FAIL" })?;
        if let Some(err) = &entry.filter_error {
            write!(f, " (error: {err})")?;
        }
        writeln!(f)?;
        match entry.sort_value {
            Some(value) => write!(f, "  sort: {value}")?,
            None => write!(f, "  sort: not evaluated")?,
        }
        if let Some(err) = &entry.sort_error {
            write!(f, " (error: {err})")?;
        }
        Ok(())
    }
}
