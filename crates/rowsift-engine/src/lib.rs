//! Filtering and sorting table rows with sandboxed expressions.
//!
//! [`FilterPipeline`] extracts a [`VariableMapping`](rowsift_common::VariableMapping)
//! per row, asks an [`Evaluate`] implementation whether the row passes and
//! what it sorts by, caches the outcome per row, and replaces each matched
//! table with a filtered, ordered copy. [`EvaluatorClient`] is the
//! [`Evaluate`] implementation that talks to a sandbox.

pub mod cache;
pub mod client;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod materialize;
pub mod pipeline;
pub mod preview;
pub mod sort;

pub use cache::{CacheLookup, RowCache, RowCacheEntry};
pub use client::{ClientConfig, DEFAULT_TIMEOUT, Evaluate, EvaluatorClient};
pub use diagnostics::RowDiagnostics;
pub use error::EvalError;
pub use extract::{VariableExtractor, extract};
pub use pipeline::{FilterPipeline, PassStage, PassSummary, PipelineConfig, TableSummary};
pub use preview::{
    DEFAULT_PREVIEW_LIMIT, FilterPreviewRow, PreviewOutcome, TableInfo, VariablePreview,
};
pub use sort::{SORT_ERROR, SortValue, compare_desc, order_descending};
