//! Loading documents from JSON and CSV.
//!
//! The JSON format is deliberately loose: a row is either a plain array of
//! cells or an object with `cells`, and a cell is either a string, a number
//! or an object with `text` plus optional markup attributes.
//!
//! ```json
//! { "tables": [ {
//!     "id": "prices",
//!     "header": [["Item", "Price"]],
//!     "rows": [["Tea", 4.5], { "cells": ["Cake", { "text": "12", "classes": ["num"] }] }]
//! } ] }
//! ```

use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::document::{Cell, CellTag, Document, Row, Table, TableId};
use crate::error::LoadError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSpec {
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Header rows. Their cells default to `th`.
    #[serde(default)]
    pub header: Vec<RowSpec>,
    #[serde(default)]
    pub rows: Vec<RowSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowSpec {
    Cells(Vec<CellSpec>),
    Detailed {
        cells: Vec<CellSpec>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        classes: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: BTreeMap<String, String>,
    },
}

impl RowSpec {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RowSpec::Cells(texts.into_iter().map(|t| CellSpec::Text(t.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellSpec {
    Text(String),
    Number(serde_json::Number),
    Detailed {
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<CellTag>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        classes: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: BTreeMap<String, String>,
    },
}

impl CellSpec {
    fn into_cell(self, default_tag: CellTag) -> Cell {
        match self {
            CellSpec::Text(text) => Cell::new(default_tag, text),
            CellSpec::Number(n) => Cell::new(default_tag, n.to_string()),
            CellSpec::Detailed {
                text,
                tag,
                id,
                classes,
                attributes,
            } => Cell {
                tag: tag.unwrap_or(default_tag),
                id,
                classes,
                attributes,
                text,
            },
        }
    }
}

impl TableSpec {
    /// Read a CSV table: the first record is the header row, the rest are
    /// body rows. Records may have differing lengths.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut records = reader.records();
        let mut spec = TableSpec::default();
        if let Some(first) = records.next() {
            spec.header.push(RowSpec::from_texts(first?.iter()));
        }
        for record in records {
            spec.rows.push(RowSpec::from_texts(record?.iter()));
        }
        Ok(spec)
    }
}

impl Document {
    pub fn from_spec(spec: DocumentSpec) -> Self {
        let mut doc = Document::new();
        for table in spec.tables {
            doc.push_table(table);
        }
        doc
    }

    pub fn from_json_str(json: &str) -> Result<Self, LoadError> {
        let spec: DocumentSpec = serde_json::from_str(json)?;
        Ok(Self::from_spec(spec))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let spec: DocumentSpec = serde_json::from_reader(reader)?;
        Ok(Self::from_spec(spec))
    }

    /// Append a table read from CSV.
    pub fn push_csv<R: Read>(&mut self, reader: R) -> Result<TableId, LoadError> {
        let spec = TableSpec::from_csv_reader(reader)?;
        Ok(self.push_table(spec))
    }

    /// Append a table, assigning ids to it and all of its rows.
    pub fn push_table(&mut self, spec: TableSpec) -> TableId {
        let header = spec
            .header
            .into_iter()
            .map(|row| self.build_row(row, CellTag::Th))
            .collect();
        let rows = spec
            .rows
            .into_iter()
            .map(|row| self.build_row(row, CellTag::Td))
            .collect();
        let id = self.alloc_table_id();
        self.push(Table {
            id,
            element_id: spec.id,
            classes: spec.classes,
            attributes: spec.attributes,
            header,
            rows,
            hidden: false,
            derived_from: None,
        })
    }

    fn build_row(&mut self, spec: RowSpec, default_tag: CellTag) -> Row {
        let (cells, classes, attributes) = match spec {
            RowSpec::Cells(cells) => (cells, Vec::new(), BTreeMap::new()),
            RowSpec::Detailed {
                cells,
                classes,
                attributes,
            } => (cells, classes, attributes),
        };
        Row {
            id: self.alloc_row_id(),
            origin: None,
            cells: cells.into_iter().map(|c| c.into_cell(default_tag)).collect(),
            classes,
            attributes,
        }
    }
}
