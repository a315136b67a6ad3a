//! Per-origin configuration persistence.
//!
//! The store is one JSON object on disk mapping
//! `table_filter_state::<hex sha256 of the origin>` to a configuration.
//! Writes replace the file atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rowsift_common::FilterSortConfig;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const KEY_PREFIX: &str = "table_filter_state::";

/// Storage key for the configuration of `origin`.
pub fn storage_key(origin: &str) -> String {
    format!("{KEY_PREFIX}{}", hex::encode(Sha256::digest(origin.as_bytes())))
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    entries: BTreeMap<String, JsonValue>,
}

impl SettingsStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("settings file {} is not a JSON object", path.display()))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configuration saved for `origin`, or the default one. An entry
    /// that no longer imports is ignored.
    pub fn load(&self, origin: &str) -> FilterSortConfig {
        let key = storage_key(origin);
        let Some(raw) = self.entries.get(&key) else {
            return FilterSortConfig::default();
        };
        match serde_json::from_value(raw.clone()) {
            Ok(config) => config,
            Err(err) => {
                warn!(origin, %err, "ignoring unreadable saved configuration");
                FilterSortConfig::default()
            }
        }
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.entries.contains_key(&storage_key(origin))
    }

    pub fn save(&mut self, origin: &str, config: &FilterSortConfig) -> Result<()> {
        let value = serde_json::to_value(config).context("failed to encode configuration")?;
        self.entries.insert(storage_key(origin), value);
        self.flush()
    }

    pub fn remove(&mut self, origin: &str) -> Result<bool> {
        let removed = self.entries.remove(&storage_key(origin)).is_some();
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    fn flush(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let mut file = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to stage settings in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut file, &self.entries)
            .context("failed to encode settings")?;
        file.write_all(b"\n")?;
        file.persist(&self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_hash_the_origin() {
        let key = storage_key("https://example.com");
        assert!(key.starts_with(KEY_PREFIX));
        let digest = &key[KEY_PREFIX.len()..];
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, storage_key("https://example.org"));
        assert_eq!(
            storage_key(""),
            format!("{KEY_PREFIX}e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }
}
