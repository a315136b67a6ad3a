//! Dry runs over the first few rows. Nothing here touches the row cache or
//! the document.

use std::fmt;

use rowsift_common::{FilterSortConfig, VariableMapping, is_truthy};
use rowsift_table::{Document, Row, RowId, SelectorError, TableId, parse_selector};
use serde::Serialize;
use tracing::warn;

use crate::client::Evaluate;
use crate::extract::VariableExtractor;

/// Rows shown by a filter preview and values shown per variable.
pub const DEFAULT_PREVIEW_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "UPPERCASE")]
pub enum PreviewOutcome {
    Pass,
    Fail,
    Error(String),
}

impl fmt::Display for PreviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviewOutcome::Pass => f.write_str("PASS"),
            PreviewOutcome::Fail => f.write_str("FAIL"),
            PreviewOutcome::Error(message) => write!(f, "ERROR({message})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterPreviewRow {
    /// 1-based position among the previewed rows.
    pub index: usize,
    pub row: RowId,
    pub outcome: PreviewOutcome,
    pub variables: VariableMapping,
}

impl fmt::Display for FilterPreviewRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: {} (vars: {})", self.index, self.outcome, self.variables)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariablePreview {
    pub name: String,
    pub values: Vec<String>,
}

impl fmt::Display for VariablePreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            write!(f, "{}: No data", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.values.join(", "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TableInfo {
    pub table_count: usize,
    pub row_count: usize,
    /// Passing rows of the last pass, when one has run for this configuration.
    pub passed_count: Option<usize>,
}

impl fmt::Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.table_count == 1 { "table" } else { "tables" };
        write!(f, "{} {noun}, {} rows", self.table_count, self.row_count)?;
        if let Some(passed) = self.passed_count {
            write!(f, " (filtered: {passed})")?;
        }
        Ok(())
    }
}

/// Source tables `config` selects, in document order. An unusable table
/// selector selects nothing.
pub(crate) fn matched_tables(
    doc: &Document,
    config: &FilterSortConfig,
) -> Result<Vec<TableId>, SelectorError> {
    parse_selector(&config.table_selector)
        .map(|selector| doc.query_tables(&selector))
        .inspect_err(|err| warn!(%err, "table selector matches nothing"))
}

/// Body rows of the matched tables, in document order.
pub(crate) fn selected_rows<'d>(doc: &'d Document, config: &FilterSortConfig) -> Vec<&'d Row> {
    matched_tables(doc, config)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|id| doc.table(id))
        .flat_map(|table| table.rows.iter())
        .collect()
}

pub(crate) async fn preview_filter<E: Evaluate>(
    evaluator: &E,
    doc: &Document,
    config: &FilterSortConfig,
    limit: usize,
) -> Vec<FilterPreviewRow> {
    let extractor = VariableExtractor::new(&config.vars);
    let rows: Vec<(RowId, VariableMapping)> = selected_rows(doc, config)
        .into_iter()
        .take(limit)
        .map(|row| (row.id, extractor.extract(row)))
        .collect();

    let outcomes = futures_util::future::join_all(
        rows.iter()
            .map(|(_, mapping)| evaluator.evaluate(&config.filter_expr, mapping)),
    )
    .await;

    rows.into_iter()
        .zip(outcomes)
        .enumerate()
        .map(|(idx, ((row, variables), outcome))| FilterPreviewRow {
            index: idx + 1,
            row,
            outcome: match outcome {
                Ok(value) if is_truthy(&value) => PreviewOutcome::Pass,
                Ok(_) => PreviewOutcome::Fail,
                Err(err) => PreviewOutcome::Error(err.to_string()),
            },
            variables,
        })
        .collect()
}

pub(crate) fn preview_variables(
    doc: &Document,
    config: &FilterSortConfig,
    limit: usize,
) -> Vec<VariablePreview> {
    let extractor = VariableExtractor::new(&config.vars);
    let rows: Vec<&Row> = selected_rows(doc, config).into_iter().take(limit).collect();
    extractor
        .names()
        .enumerate()
        .map(|(idx, name)| VariablePreview {
            name: name.to_string(),
            values: rows
                .iter()
                .filter_map(|row| extractor.preview(idx, row))
                .collect(),
        })
        .collect()
}

pub(crate) fn table_info(doc: &Document, config: &FilterSortConfig) -> TableInfo {
    let tables = matched_tables(doc, config).unwrap_or_default();
    let row_count = tables
        .iter()
        .filter_map(|id| doc.table(*id))
        .map(|t| t.rows.len())
        .sum();
    TableInfo {
        table_count: tables.len(),
        row_count,
        passed_count: None,
    }
}
