//! Loading documents and configurations named on the command line.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use rowsift_common::FilterSortConfig;
use rowsift_table::{Document, DocumentSpec, TableSpec};
use tracing::{info, warn};

use crate::settings::SettingsStore;

/// Read every path into one document, in order. `.csv` files contribute a
/// single table whose element id is the file stem; anything else is read as
/// a JSON document.
pub fn load_document<P: AsRef<Path>>(paths: &[P]) -> Result<Document> {
    let mut doc = Document::new();
    for path in paths {
        append(&mut doc, path.as_ref())?;
    }
    Ok(doc)
}

fn append(doc: &mut Document, path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        let mut spec = TableSpec::from_csv_reader(reader)
            .with_context(|| format!("failed to load {}", path.display()))?;
        spec.id = path.file_stem().map(|stem| stem.to_string_lossy().into_owned());
        doc.push_table(spec);
    } else {
        let spec: DocumentSpec = serde_json::from_reader(reader)
            .with_context(|| format!("failed to load {}", path.display()))?;
        for table in spec.tables {
            doc.push_table(table);
        }
    }
    info!(path = %path.display(), tables = doc.tables().len(), "loaded");
    Ok(())
}

/// Import a configuration file. Non-fatal issues are logged.
pub fn load_config(path: &Path) -> Result<FilterSortConfig> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let config = FilterSortConfig::from_json_slice(&bytes)
        .with_context(|| format!("failed to import {}", path.display()))?;
    for issue in config.validate() {
        warn!(%issue, "configuration issue");
    }
    Ok(config)
}

/// The configuration to use: an explicit file first, then the one saved for
/// `origin`, then the default.
pub fn resolve_config(
    file: Option<&Path>,
    origin: Option<&str>,
    settings: &Path,
) -> Result<FilterSortConfig> {
    if let Some(path) = file {
        return load_config(path);
    }
    match origin {
        Some(origin) => Ok(SettingsStore::open(settings)?.load(origin)),
        None => Ok(FilterSortConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_and_json_inputs_share_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("prices.csv");
        fs::write(&csv, "price,label\n5,a\n15,b\n").unwrap();
        let json = dir.path().join("more.json");
        fs::write(&json, r#"{"tables": [{"id": "extra", "rows": [["1"], ["2"], ["3"]]}]}"#).unwrap();

        let doc = load_document(&[&csv, &json]).unwrap();
        assert_eq!(doc.tables().len(), 2);
        assert_eq!(doc.tables()[0].element_id.as_deref(), Some("prices"));
        assert_eq!(doc.tables()[0].rows.len(), 2);
        assert_eq!(doc.tables()[1].element_id.as_deref(), Some("extra"));

        let ids: Vec<u64> = doc.row_ids().map(|id| id.get()).collect();
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn config_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("settings.json");
        let config = resolve_config(None, Some("https://example.com"), &settings).unwrap();
        assert_eq!(config, FilterSortConfig::default());
        assert_eq!(resolve_config(None, None, &settings).unwrap(), FilterSortConfig::default());
    }

    #[test]
    fn incomplete_config_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tableSelector": "table"}}"#).unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("invalid configuration document"));
    }
}
