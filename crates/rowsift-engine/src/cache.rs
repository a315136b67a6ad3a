//! Per-row derived state.
//!
//! Entries are stamped with the generation of the pass that wrote them.
//! Starting a pass, or invalidating, bumps the generation, which makes every
//! older entry stale at once without walking the map.

use rowsift_common::{FilterSortConfig, VariableMapping};
use rowsift_table::RowId;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::sort::SortValue;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowCacheEntry {
    pub variable_mapping: VariableMapping,
    pub filter_result: bool,
    /// Why the filter failed closed, if it did.
    pub filter_error: Option<String>,
    /// `None` until the row passes and a sort expression is evaluated.
    pub sort_value: Option<SortValue>,
    pub sort_error: Option<String>,
    #[serde(skip)]
    generation: u64,
}

impl RowCacheEntry {
    pub fn new(variable_mapping: VariableMapping, filter_result: bool, filter_error: Option<String>) -> Self {
        Self {
            variable_mapping,
            filter_result,
            filter_error,
            sort_value: None,
            sort_error: None,
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Nothing computed under the current configuration.
    Uncached,
    Current(RowCacheEntry),
}

impl CacheLookup {
    pub fn entry(&self) -> Option<&RowCacheEntry> {
        match self {
            CacheLookup::Uncached => None,
            CacheLookup::Current(entry) => Some(entry),
        }
    }
}

#[derive(Debug, Default)]
pub struct RowCache {
    entries: FxHashMap<RowId, RowCacheEntry>,
    generation: u64,
    /// The configuration the current generation was computed under.
    config: Option<FilterSortConfig>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new generation for `config`. Everything written before is
    /// stale from here on.
    pub fn begin_pass(&mut self, config: &FilterSortConfig) -> u64 {
        self.generation = self.generation.saturating_add(1);
        self.config = Some(config.clone());
        self.generation
    }

    /// Whether current entries were computed under `config`.
    pub fn is_current_for(&self, config: &FilterSortConfig) -> bool {
        self.config.as_ref() == Some(config)
    }

    pub fn put(&mut self, row: RowId, mut entry: RowCacheEntry) {
        entry.generation = self.generation;
        self.entries.insert(row, entry);
    }

    /// Record the sort outcome of a current entry. Returns `false` when the
    /// row has no current entry.
    pub fn set_sort_value(&mut self, row: RowId, value: SortValue, error: Option<String>) -> bool {
        match self.entries.get_mut(&row) {
            Some(entry) if entry.generation == self.generation => {
                entry.sort_value = Some(value);
                entry.sort_error = error;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, row: RowId) -> Option<&RowCacheEntry> {
        self.entries
            .get(&row)
            .filter(|entry| entry.generation == self.generation)
    }

    pub fn lookup(&self, row: RowId) -> CacheLookup {
        match self.get(row) {
            Some(entry) => CacheLookup::Current(entry.clone()),
            None => CacheLookup::Uncached,
        }
    }

    /// Drop the entries of `rows`.
    pub fn invalidate_all(&mut self, rows: impl IntoIterator<Item = RowId>) -> usize {
        rows.into_iter()
            .filter(|row| self.entries.remove(row).is_some())
            .count()
    }

    /// Make every entry stale and forget the configuration.
    pub fn invalidate(&mut self) {
        self.generation = self.generation.saturating_add(1);
        self.config = None;
    }

    /// Keep only entries for rows that still exist.
    pub fn retain(&mut self, live: impl IntoIterator<Item = RowId>) {
        let live: FxHashSet<RowId> = live.into_iter().collect();
        self.entries.retain(|row, _| live.contains(row));
    }

    /// Stored entries, current or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsift_common::VarValue;

    fn entry(passed: bool) -> RowCacheEntry {
        let mapping = [("v1", VarValue::Number(1.0))].into_iter().collect();
        RowCacheEntry::new(mapping, passed, None)
    }

    #[test]
    fn entries_go_stale_when_a_new_pass_starts() {
        let mut cache = RowCache::new();
        let config = FilterSortConfig::default();
        let row = RowId::new(1);

        assert_eq!(cache.lookup(row), CacheLookup::Uncached);
        cache.begin_pass(&config);
        cache.put(row, entry(true));
        assert!(cache.lookup(row).entry().unwrap().filter_result);
        assert!(cache.is_current_for(&config));

        let changed = FilterSortConfig {
            filter_expr: "false".into(),
            ..config.clone()
        };
        cache.begin_pass(&changed);
        assert!(!cache.is_current_for(&config));
        assert_eq!(cache.lookup(row), CacheLookup::Uncached);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sort_values_only_attach_to_current_entries() {
        let mut cache = RowCache::new();
        let row = RowId::new(7);
        cache.begin_pass(&FilterSortConfig::default());
        assert!(!cache.set_sort_value(row, SortValue::Number(3.0), None));

        cache.put(row, entry(true));
        assert!(cache.set_sort_value(row, SortValue::Error, Some("boom".into())));
        let current = cache.get(row).unwrap();
        assert_eq!(current.sort_value, Some(SortValue::Error));
        assert_eq!(current.sort_error.as_deref(), Some("boom"));

        cache.invalidate();
        assert!(!cache.set_sort_value(row, SortValue::Number(1.0), None));
        assert!(cache.get(row).is_none());
    }

    #[test]
    fn invalidate_and_retain_drop_entries() {
        let mut cache = RowCache::new();
        cache.begin_pass(&FilterSortConfig::default());
        for raw in 1..=4 {
            cache.put(RowId::new(raw), entry(raw % 2 == 0));
        }
        assert_eq!(cache.invalidate_all([RowId::new(1), RowId::new(9)]), 1);
        cache.retain([RowId::new(2), RowId::new(3)]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(RowId::new(4)).is_none());
    }
}
