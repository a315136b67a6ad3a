//! Tabular documents for rowsift.
//!
//! A [`Document`] is an ordered list of [`Table`]s made of header rows and
//! body rows. Every row gets a stable [`RowId`] from the document that owns
//! it, which is what per-row derived state is keyed by. Tables and cells are
//! located with a small CSS selector dialect (see [`selector`]).

pub mod document;
pub mod error;
pub mod load;
pub mod selector;

pub use document::{Cell, CellTag, DERIVED_CLASS, Document, Row, RowId, Table, TableId};
pub use error::{LoadError, SelectorError};
pub use load::{CellSpec, DocumentSpec, RowSpec, TableSpec};
pub use selector::{Element, SelectorList, SiblingPosition, parse_selector};
