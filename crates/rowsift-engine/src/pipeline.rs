//! The filter/sort pass.
//!
//! A pass runs table by table. For each matched table every row is
//! extracted, every filter evaluation is issued concurrently, and nothing
//! moves on until all of them have settled. Passing rows are then keyed by
//! the sort expression (again all at once), ordered, and finally
//! materialized in place of the source table.
//!
//! Evaluation failures never abort a pass: a failed filter excludes the
//! row, a failed sort key becomes [`SortValue::Error`].
//!
//! The document lock doubles as the pass lock, so passes, previews and
//! diagnostics never observe a half-finished pass.

use std::fmt;

use futures_util::future;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use rowsift_common::{FilterSortConfig, VariableMapping, is_truthy};
use rowsift_table::{Document, Row, RowId, Table, TableId};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{Instrument, debug, info, info_span};

use crate::cache::{CacheLookup, RowCache, RowCacheEntry};
use crate::client::Evaluate;
use crate::diagnostics::RowDiagnostics;
use crate::extract::VariableExtractor;
use crate::materialize::{materialize, restore};
use crate::preview::{
    self, DEFAULT_PREVIEW_LIMIT, FilterPreviewRow, TableInfo, VariablePreview, matched_tables,
};
use crate::sort::{SortValue, order_descending};

/// Where a pass currently is. Returns to `Idle` once the pass is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PassStage {
    #[default]
    Idle,
    Extracting,
    EvaluatingFilter,
    Partitioning,
    EvaluatingSort,
    Ordering,
    Materializing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Rows evaluated by a filter preview, values shown per variable.
    pub preview_limit: usize,
    /// Evaluations in flight at once within one table.
    pub max_in_flight: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            max_in_flight: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub source: TableId,
    pub derived: Option<TableId>,
    pub passed_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PassSummary {
    pub passed_count: usize,
    pub total_count: usize,
    pub tables: Vec<TableSummary>,
    /// Set when the table selector could not be used and nothing matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_error: Option<String>,
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} rows passed in {} table(s)",
            self.passed_count,
            self.total_count,
            self.tables.len()
        )?;
        if let Some(err) = &self.selector_error {
            write!(f, "; {err}")?;
        }
        Ok(())
    }
}

/// Runs filter/sort passes over one document.
pub struct FilterPipeline<E> {
    evaluator: E,
    document: AsyncMutex<Document>,
    cache: Mutex<RowCache>,
    stage: Mutex<PassStage>,
    config: PipelineConfig,
}

impl<E: Evaluate> FilterPipeline<E> {
    pub fn new(evaluator: E, document: Document) -> Self {
        Self::with_config(evaluator, document, PipelineConfig::default())
    }

    pub fn with_config(evaluator: E, document: Document, config: PipelineConfig) -> Self {
        Self {
            evaluator,
            document: AsyncMutex::new(document),
            cache: Mutex::new(RowCache::new()),
            stage: Mutex::new(PassStage::Idle),
            config,
        }
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage(&self) -> PassStage {
        *self.stage.lock()
    }

    /// Exclusive access to the document. Waits for a running pass.
    pub async fn document(&self) -> AsyncMutexGuard<'_, Document> {
        self.document.lock().await
    }

    pub fn into_document(self) -> Document {
        self.document.into_inner()
    }

    pub fn cache_lookup(&self, row: RowId) -> CacheLookup {
        self.cache.lock().lookup(row)
    }

    /// Filter and sort every table `config` selects and show the result in
    /// place of each source table.
    pub async fn run_filter_pass(&self, config: &FilterSortConfig) -> PassSummary {
        let config = config.clone().normalized();
        let mut doc = self.document.lock().await;
        let span = info_span!("filter_pass", tables = %config.table_selector);
        let summary = self.pass(&mut doc, &config).instrument(span).await;
        self.set_stage(PassStage::Idle);
        summary
    }

    async fn pass(&self, doc: &mut Document, config: &FilterSortConfig) -> PassSummary {
        let generation = self.cache.lock().begin_pass(config);
        let mut summary = PassSummary::default();
        let sources = match matched_tables(doc, config) {
            Ok(sources) => sources,
            Err(err) => {
                summary.selector_error = Some(err.to_string());
                Vec::new()
            }
        };

        for &source in &sources {
            doc.remove_derived(source);
        }
        self.cache.lock().retain(doc.row_ids());

        let extractor = VariableExtractor::new(&config.vars);
        let mut plans = Vec::with_capacity(sources.len());
        for &source in &sources {
            let Some(table) = doc.table(source) else {
                continue;
            };
            let ordered = self.order_table(table, &extractor, config).await;
            plans.push((source, table.rows.len(), ordered));
        }

        self.set_stage(PassStage::Materializing);
        for (source, total_count, ordered) in plans {
            let derived = materialize(doc, source, &ordered);
            summary.passed_count += ordered.len();
            summary.total_count += total_count;
            summary.tables.push(TableSummary {
                source,
                derived,
                passed_count: ordered.len(),
                total_count,
            });
        }

        info!(
            generation,
            passed = summary.passed_count,
            total = summary.total_count,
            tables = summary.tables.len(),
            "filter pass complete"
        );
        summary
    }

    /// Passing rows of `table` in display order. Every row of the table has
    /// a current cache entry afterwards.
    async fn order_table(
        &self,
        table: &Table,
        extractor: &VariableExtractor,
        config: &FilterSortConfig,
    ) -> Vec<RowId> {
        let in_flight = self.config.max_in_flight.max(1);

        self.set_stage(PassStage::Extracting);
        let mapped: Vec<(RowId, VariableMapping)> = table
            .rows
            .iter()
            .map(|row| (row.id, extractor.extract(row)))
            .collect();

        self.set_stage(PassStage::EvaluatingFilter);
        let filter = config.filter_expr.as_str();
        stream::iter(mapped)
            .map(|(row, mapping)| async move {
                let (passed, error) = match self.evaluator.evaluate(filter, &mapping).await {
                    Ok(value) => (is_truthy(&value), None),
                    Err(err) => {
                        debug!(%row, %err, "filter failed closed");
                        (false, Some(err.to_string()))
                    }
                };
                self.cache
                    .lock()
                    .put(row, RowCacheEntry::new(mapping, passed, error));
            })
            .buffer_unordered(in_flight)
            .for_each(|()| future::ready(()))
            .await;

        self.set_stage(PassStage::Partitioning);
        let passing: Vec<RowId> = {
            let cache = self.cache.lock();
            table
                .row_ids()
                .filter(|id| cache.get(*id).is_some_and(|entry| entry.filter_result))
                .collect()
        };
        debug!(
            table = %table.id,
            passed = passing.len(),
            total = table.rows.len(),
            "partitioned"
        );

        let Some(sort_expr) = config.sort_expr() else {
            return passing;
        };

        self.set_stage(PassStage::EvaluatingSort);
        let keyed: Vec<(RowId, SortValue)> = stream::iter(passing)
            .map(|row| async move {
                let mapping = self.cached_mapping(row);
                let outcome = self.evaluator.evaluate(sort_expr, &mapping).await;
                let (value, error) = SortValue::from_outcome(outcome);
                if let Some(err) = &error {
                    debug!(%row, %err, "sort key is an error");
                }
                self.cache.lock().set_sort_value(row, value, error);
                (row, value)
            })
            .buffered(in_flight)
            .collect()
            .await;

        self.set_stage(PassStage::Ordering);
        order_descending(keyed)
    }

    fn cached_mapping(&self, row: RowId) -> VariableMapping {
        self.cache
            .lock()
            .get(row)
            .map(|entry| entry.variable_mapping.clone())
            .unwrap_or_default()
    }

    fn set_stage(&self, stage: PassStage) {
        *self.stage.lock() = stage;
    }

    /// Forget everything computed for the rows `config` selects. The next
    /// lookup of any row reports it uncached. Returns how many entries were
    /// dropped.
    pub async fn invalidate_cache(&self, config: &FilterSortConfig) -> usize {
        let config = config.clone().normalized();
        let doc = self.document.lock().await;
        let rows: Vec<RowId> = preview::selected_rows(&doc, &config)
            .into_iter()
            .map(|row| row.id)
            .collect();

        let mut cache = self.cache.lock();
        cache.invalidate();
        let dropped = cache.invalidate_all(rows);
        debug!(dropped, "row cache invalidated");
        dropped
    }

    /// Remove derived tables and show the sources `config` selects again.
    /// Returns how many derived tables were removed.
    pub async fn clear_filter(&self, config: &FilterSortConfig) -> usize {
        let config = config.clone().normalized();
        let mut doc = self.document.lock().await;
        let sources = matched_tables(&doc, &config).unwrap_or_default();
        let removed = sources
            .into_iter()
            .filter(|source| restore(&mut doc, *source))
            .count();
        debug!(removed, "filter cleared");
        removed
    }

    /// Evaluate the filter over the first rows without touching the cache
    /// or the document.
    pub async fn preview_filter(&self, config: &FilterSortConfig) -> Vec<FilterPreviewRow> {
        let config = config.clone().normalized();
        let doc = self.document.lock().await;
        preview::preview_filter(&self.evaluator, &doc, &config, self.config.preview_limit).await
    }

    /// The first values of each variable.
    pub async fn preview_variables(&self, config: &FilterSortConfig) -> Vec<VariablePreview> {
        let config = config.clone().normalized();
        let doc = self.document.lock().await;
        preview::preview_variables(&doc, &config, self.config.preview_limit)
    }

    /// Matched tables and rows, plus the passing count when the cache holds
    /// a pass for exactly this configuration.
    pub async fn table_info(&self, config: &FilterSortConfig) -> TableInfo {
        let config = config.clone().normalized();
        let doc = self.document.lock().await;
        let mut info = preview::table_info(&doc, &config);

        let cache = self.cache.lock();
        if cache.is_current_for(&config) {
            let passed = preview::selected_rows(&doc, &config)
                .into_iter()
                .filter(|row| cache.get(row.id).is_some_and(|entry| entry.filter_result))
                .count();
            info.passed_count = Some(passed);
        }
        info
    }

    /// Cached state of `row`. Rows of a derived table report their source
    /// row's state.
    pub async fn row_diagnostics(&self, row: RowId) -> RowDiagnostics {
        let doc = self.document.lock().await;
        let found = doc.row(row);
        let source_row = found.map_or(row, Row::source_id);
        let entry = match found {
            Some(_) => self.cache.lock().get(source_row).cloned(),
            None => None,
        };
        RowDiagnostics {
            row,
            source_row,
            found: found.is_some(),
            entry,
        }
    }
}

impl<E> fmt::Debug for FilterPipeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterPipeline")
            .field("stage", &*self.stage.lock())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use rowsift_common::{VarValue, VariableDefinition};
    use rowsift_table::{RowSpec, TableSpec};
    use serde_json::{Value as JsonValue, json};

    /// Understands just enough expressions for these tests: `true`,
    /// `v1 > N`, `v1`, and anything else fails.
    struct Scripted;

    impl Evaluate for Scripted {
        async fn evaluate(&self, expr: &str, vars: &VariableMapping) -> Result<JsonValue, EvalError> {
            tokio::task::yield_now().await;
            let v1 = vars.get("v1").and_then(VarValue::as_number).unwrap_or(0.0);
            if expr == "true" {
                return Ok(json!(true));
            }
            if expr == "v1" {
                return Ok(json!(v1));
            }
            if let Some(bound) = expr.strip_prefix("v1 > ") {
                let bound: f64 = bound
                    .parse()
                    .map_err(|_| EvalError::Evaluation("bad bound".into()))?;
                return Ok(json!(v1 > bound));
            }
            Err(EvalError::Evaluation(format!("{expr} is not defined")))
        }
    }

    fn document(values: &[&str]) -> Document {
        let mut doc = Document::new();
        doc.push_table(TableSpec {
            id: Some("t".into()),
            rows: values.iter().map(|v| RowSpec::from_texts([*v])).collect(),
            ..TableSpec::default()
        });
        doc
    }

    fn config(filter: &str, sort: &str) -> FilterSortConfig {
        FilterSortConfig {
            table_selector: "table".into(),
            filter_expr: filter.into(),
            sort_expression: sort.into(),
            vars: vec![VariableDefinition::number("v1", "td:nth-child(1)")],
        }
    }

    async fn shown(pipeline: &FilterPipeline<Scripted>) -> Vec<String> {
        let doc = pipeline.document().await;
        doc.tables()
            .iter()
            .filter(|t| !t.hidden)
            .flat_map(|t| t.rows.iter().map(Row::text_content))
            .collect()
    }

    #[tokio::test]
    async fn filters_then_sorts_descending() {
        let pipeline = FilterPipeline::new(Scripted, document(&["5", "15", "abc", "7"]));
        let summary = pipeline.run_filter_pass(&config("v1 > 0", "v1")).await;

        assert_eq!(summary.passed_count, 3);
        assert_eq!(summary.total_count, 4);
        assert_eq!(summary.tables.len(), 1);
        assert!(summary.tables[0].derived.is_some());
        assert_eq!(shown(&pipeline).await, ["15", "7", "5"]);
        assert_eq!(pipeline.stage(), PassStage::Idle);
    }

    #[tokio::test]
    async fn keeps_document_order_without_sort() {
        let pipeline = FilterPipeline::new(Scripted, document(&["5", "15", "12"]));
        pipeline.run_filter_pass(&config("v1 > 10", "  ")).await;
        assert_eq!(shown(&pipeline).await, ["15", "12"]);
    }

    #[tokio::test]
    async fn failing_filters_exclude_rows_and_are_recorded() {
        let pipeline = FilterPipeline::new(Scripted, document(&["5", "15"]));
        let summary = pipeline
            .run_filter_pass(&config("nonexistentFn()", ""))
            .await;
        assert_eq!(summary.passed_count, 0);

        let first = pipeline.document().await.tables()[0].rows[0].id;
        let entry = pipeline.cache_lookup(first);
        let entry = entry.entry().unwrap();
        assert!(!entry.filter_result);
        assert!(entry.filter_error.as_deref().unwrap().contains("nonexistentFn"));
    }

    #[tokio::test]
    async fn failing_sort_keys_lead_the_order() {
        let pipeline = FilterPipeline::new(Scripted, document(&["5", "15"]));
        pipeline.run_filter_pass(&config("true", "v1")).await;
        assert_eq!(shown(&pipeline).await, ["15", "5"]);

        pipeline.run_filter_pass(&config("true", "boom")).await;
        assert_eq!(shown(&pipeline).await, ["5", "15"]);
        let first = pipeline.document().await.tables()[0].rows[0].id;
        let lookup = pipeline.cache_lookup(first);
        assert_eq!(lookup.entry().unwrap().sort_value, Some(SortValue::Error));
    }

    #[tokio::test]
    async fn repeated_passes_replace_the_derived_table() {
        let pipeline = FilterPipeline::new(Scripted, document(&["5", "15"]));
        pipeline.run_filter_pass(&config("true", "")).await;
        pipeline.run_filter_pass(&config("v1 > 10", "")).await;

        let doc = pipeline.document().await;
        assert_eq!(doc.tables().len(), 2);
        assert!(doc.tables()[0].hidden);
        assert_eq!(doc.tables()[1].rows.len(), 1);
    }

    #[tokio::test]
    async fn unusable_table_selector_matches_nothing() {
        let pipeline = FilterPipeline::new(Scripted, document(&["5"]));
        let summary = pipeline
            .run_filter_pass(&FilterSortConfig {
                table_selector: "table >".into(),
                ..config("true", "")
            })
            .await;
        assert_eq!(summary.total_count, 0);
        assert!(summary.selector_error.is_some());
        assert_eq!(pipeline.document().await.tables().len(), 1);
    }

    #[tokio::test]
    async fn clear_and_invalidate() {
        let pipeline = FilterPipeline::new(Scripted, document(&["5", "15"]));
        let cfg = config("v1 > 10", "");
        pipeline.run_filter_pass(&cfg).await;

        let info = pipeline.table_info(&cfg).await;
        assert_eq!((info.table_count, info.row_count, info.passed_count), (1, 2, Some(1)));
        let other = pipeline.table_info(&config("true", "")).await;
        assert_eq!(other.passed_count, None);

        assert_eq!(pipeline.invalidate_cache(&cfg).await, 2);
        let first = pipeline.document().await.tables()[0].rows[0].id;
        assert_eq!(pipeline.cache_lookup(first), CacheLookup::Uncached);

        assert_eq!(pipeline.clear_filter(&cfg).await, 1);
        let doc = pipeline.into_document();
        assert_eq!(doc.tables().len(), 1);
        assert!(!doc.tables()[0].hidden);
    }

    #[tokio::test]
    async fn diagnostics_follow_copies_to_their_source() {
        let pipeline = FilterPipeline::new(Scripted, document(&["15"]));
        pipeline.run_filter_pass(&config("v1 > 10", "v1")).await;

        let (source, copy) = {
            let doc = pipeline.document().await;
            (doc.tables()[0].rows[0].id, doc.tables()[1].rows[0].id)
        };
        let report = pipeline.row_diagnostics(copy).await;
        assert_eq!(report.source_row, source);
        let entry = report.entry.as_ref().unwrap();
        assert_eq!(entry.variable_mapping.get("v1"), Some(&VarValue::Number(15.0)));
        assert_eq!(entry.sort_value, Some(SortValue::Number(15.0)));
        assert!(report.to_string().contains("filter: PASS"));

        let missing = pipeline.row_diagnostics(RowId::new(999)).await;
        assert!(!missing.found);
    }

    #[tokio::test]
    async fn previews_leave_state_alone() {
        let values: Vec<String> = (1..=12).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let pipeline = FilterPipeline::new(Scripted, document(&refs));
        let cfg = config("v1 > 5", "");

        let rows = pipeline.preview_filter(&cfg).await;
        assert_eq!(rows.len(), DEFAULT_PREVIEW_LIMIT);
        assert_eq!(rows[0].to_string(), "Row 1: FAIL (vars: {v1: 1})");
        assert_eq!(rows[5].outcome, preview::PreviewOutcome::Pass);

        let vars = pipeline.preview_variables(&cfg).await;
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].values.len(), DEFAULT_PREVIEW_LIMIT);
        assert_eq!(vars[0].values[9], "10");

        let first = rows[0].row;
        assert_eq!(pipeline.cache_lookup(first), CacheLookup::Uncached);
        assert_eq!(pipeline.document().await.tables().len(), 1);
    }
}
