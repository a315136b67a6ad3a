use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::SelectorError;
use crate::selector::{Element, SelectorList, SiblingPosition, parse_selector};

/// Class carried by every materialized table.
pub const DERIVED_CLASS: &str = "rowsift-filtered";

/// Stable identity of a row within one [`Document`]. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(u64);

impl RowId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(u32);

impl TableId {
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellTag {
    #[default]
    Td,
    Th,
}

impl CellTag {
    pub fn as_str(self) -> &'static str {
        match self {
            CellTag::Td => "td",
            CellTag::Th => "th",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Cell {
    pub tag: CellTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    pub text: String,
}

impl Cell {
    pub fn new(tag: CellTag, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn text_content(&self) -> &str {
        &self.text
    }
}

fn common_attribute<'a>(
    name: &str,
    id: Option<&'a str>,
    classes: &'a [String],
    attributes: &'a BTreeMap<String, String>,
) -> Option<Cow<'a, str>> {
    match name {
        "id" => id.map(Cow::Borrowed),
        "class" if classes.is_empty() => None,
        "class" => Some(Cow::Owned(classes.join(" "))),
        _ => attributes.get(name).map(|v| Cow::Borrowed(v.as_str())),
    }
}

impl Element for Cell {
    fn local_name(&self) -> &str {
        self.tag.as_str()
    }

    fn element_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
        common_attribute(name, self.id.as_deref(), &self.classes, &self.attributes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub id: RowId,
    /// Source row this one was copied from, for rows of a materialized table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<RowId>,
    pub cells: Vec<Cell>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Row {
    /// First cell matching `selector`, in cell order.
    pub fn query(&self, selector: &SelectorList) -> Option<&Cell> {
        selector.first_match(&self.cells)
    }

    /// The row this one stands for: its origin if it is a copy, else itself.
    pub fn source_id(&self) -> RowId {
        self.origin.unwrap_or(self.id)
    }

    /// Cell texts joined by tabs.
    pub fn text_content(&self) -> String {
        self.cells
            .iter()
            .map(Cell::text_content)
            .collect::<Vec<_>>()
            .join("\t")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub id: TableId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    pub header: Vec<Row>,
    pub rows: Vec<Row>,
    pub hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<TableId>,
}

impl Table {
    pub fn is_derived(&self) -> bool {
        self.derived_from.is_some()
    }

    pub fn row_ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.rows.iter().map(|r| r.id)
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }
}

impl Element for Table {
    fn local_name(&self) -> &str {
        "table"
    }

    fn element_id(&self) -> Option<&str> {
        self.element_id.as_deref()
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
        common_attribute(
            name,
            self.element_id.as_deref(),
            &self.classes,
            &self.attributes,
        )
    }
}

/// An ordered collection of tables. Allocates every row and table id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Document {
    tables: Vec<Table>,
    #[serde(skip)]
    next_row: u64,
    #[serde(skip)]
    next_table: u32,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    pub fn table_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn alloc_row_id(&mut self) -> RowId {
        self.next_row += 1;
        RowId(self.next_row)
    }

    pub(crate) fn alloc_table_id(&mut self) -> TableId {
        self.next_table += 1;
        TableId(self.next_table)
    }

    pub(crate) fn push(&mut self, table: Table) -> TableId {
        let id = table.id;
        self.tables.push(table);
        id
    }

    /// Source tables matching `selector`, in document order.
    ///
    /// Materialized tables never match, and sibling positions count source
    /// tables only, so repeated passes see the same positions.
    pub fn query_tables(&self, selector: &SelectorList) -> Vec<TableId> {
        let sources: Vec<&Table> = self.tables.iter().filter(|t| !t.is_derived()).collect();
        let count = sources.len();
        sources
            .iter()
            .enumerate()
            .filter(|(idx, t)| selector.matches(**t, SiblingPosition::new(idx + 1, count)))
            .map(|(_, t)| t.id)
            .collect()
    }

    pub fn select_tables(&self, selector: &str) -> Result<Vec<TableId>, SelectorError> {
        let selector = parse_selector(selector)?;
        Ok(self.query_tables(&selector))
    }

    /// Find a body or header row anywhere in the document.
    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.tables
            .iter()
            .flat_map(|t| t.header.iter().chain(t.rows.iter()))
            .find(|r| r.id == id)
    }

    /// Ids of every body row of every table.
    pub fn row_ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.tables.iter().flat_map(Table::row_ids)
    }

    pub fn derived_of(&self, source: TableId) -> Option<TableId> {
        self.tables
            .iter()
            .find(|t| t.derived_from == Some(source))
            .map(|t| t.id)
    }

    /// Drop every materialized table built from `source`. Returns whether
    /// anything was removed.
    pub fn remove_derived(&mut self, source: TableId) -> bool {
        let before = self.tables.len();
        self.tables.retain(|t| t.derived_from != Some(source));
        self.tables.len() != before
    }

    pub fn set_hidden(&mut self, table: TableId, hidden: bool) -> bool {
        match self.table_mut(table) {
            Some(t) => {
                t.hidden = hidden;
                true
            }
            None => false,
        }
    }

    /// Build a table mirroring `source`'s header and holding copies of
    /// `rows` in the given order, and insert it right after `source`.
    ///
    /// Copies get fresh ids and point back to the source row through
    /// `origin`. Ids that are not body rows of `source` are skipped. The
    /// source table itself is left untouched.
    pub fn insert_derived(&mut self, source: TableId, rows: &[RowId]) -> Option<TableId> {
        let index = self.tables.iter().position(|t| t.id == source)?;
        let src = &self.tables[index];

        let element_id = src.element_id.as_ref().map(|id| format!("{id}-filtered"));
        let mut classes = src.classes.clone();
        if !classes.iter().any(|c| c == DERIVED_CLASS) {
            classes.push(DERIVED_CLASS.to_string());
        }
        let attributes = src.attributes.clone();
        let header: Vec<Row> = src.header.clone();
        let positions: FxHashMap<RowId, usize> = src
            .rows
            .iter()
            .enumerate()
            .map(|(pos, row)| (row.id, pos))
            .collect();
        let body: Vec<Row> = rows
            .iter()
            .filter_map(|id| positions.get(id).map(|&pos| src.rows[pos].clone()))
            .collect();

        let header = header
            .into_iter()
            .map(|row| self.copy_row(row))
            .collect();
        let body = body.into_iter().map(|row| self.copy_row(row)).collect();
        let id = self.alloc_table_id();
        self.tables.insert(
            index + 1,
            Table {
                id,
                element_id,
                classes,
                attributes,
                header,
                rows: body,
                hidden: false,
                derived_from: Some(source),
            },
        );
        Some(id)
    }

    fn copy_row(&mut self, row: Row) -> Row {
        let origin = row.source_id();
        Row {
            id: self.alloc_row_id(),
            origin: Some(origin),
            ..row
        }
    }
}
