//! Turning a row into a variable mapping.

use rowsift_common::{VarType, VarValue, VariableDefinition, VariableMapping, parse_float_prefix};
use rowsift_table::{Row, SelectorList, SelectorError, parse_selector};
use tracing::warn;

/// Shown in variable previews when a selector cannot be used.
pub const PREVIEW_ERROR: &str = "ERROR";

#[derive(Debug, Clone)]
struct CompiledVariable {
    name: String,
    var_type: VarType,
    /// `Ok(None)` for an empty selector.
    selector: Result<Option<SelectorList>, SelectorError>,
}

impl CompiledVariable {
    fn value(&self, row: &Row) -> VarValue {
        let Ok(Some(selector)) = &self.selector else {
            return self.var_type.zero();
        };
        match row.query(selector) {
            Some(cell) => convert(cell.text_content(), self.var_type),
            None => self.var_type.zero(),
        }
    }
}

/// Variable definitions with their selectors parsed once, ready to be
/// applied to many rows.
///
/// Extraction never fails: a selector that does not parse, or finds
/// nothing, yields the type's zero value.
#[derive(Debug, Clone)]
pub struct VariableExtractor {
    vars: Vec<CompiledVariable>,
}

impl VariableExtractor {
    pub fn new(defs: &[VariableDefinition]) -> Self {
        let vars = defs
            .iter()
            .map(|def| {
                let name = match def.name.trim() {
                    "" => rowsift_common::DEFAULT_VAR_NAME.to_string(),
                    name => name.to_string(),
                };
                let text = def.selector.trim();
                let selector = if text.is_empty() {
                    Ok(None)
                } else {
                    parse_selector(text).map(Some).inspect_err(|err| {
                        warn!(var = %name, %err, "variable selector will read as empty");
                    })
                };
                CompiledVariable {
                    name,
                    var_type: def.var_type,
                    selector,
                }
            })
            .collect();
        Self { vars }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|v| v.name.as_str())
    }

    /// Variables whose selector failed to parse, with the reason.
    pub fn selector_errors(&self) -> impl Iterator<Item = (&str, &SelectorError)> {
        self.vars.iter().filter_map(|v| match &v.selector {
            Err(err) => Some((v.name.as_str(), err)),
            Ok(_) => None,
        })
    }

    /// Read every variable from `row`. Later definitions win on duplicate
    /// names.
    pub fn extract(&self, row: &Row) -> VariableMapping {
        let mut mapping = VariableMapping::new();
        for var in &self.vars {
            mapping.insert(var.name.clone(), var.value(row));
        }
        mapping
    }

    /// Display form of variable `index` for `row`: the value, or
    /// [`PREVIEW_ERROR`] when the selector does not parse.
    pub fn preview(&self, index: usize, row: &Row) -> Option<String> {
        let var = self.vars.get(index)?;
        Some(match &var.selector {
            Err(_) => PREVIEW_ERROR.to_string(),
            Ok(_) => var.value(row).to_string(),
        })
    }
}

/// One-shot form of [`VariableExtractor::extract`].
pub fn extract(row: &Row, defs: &[VariableDefinition]) -> VariableMapping {
    VariableExtractor::new(defs).extract(row)
}

fn convert(text: &str, var_type: VarType) -> VarValue {
    let text = text.trim();
    match var_type {
        VarType::Text => VarValue::Text(text.to_string()),
        VarType::Number => {
            let n = parse_float_prefix(text);
            VarValue::Number(if n.is_finite() { n } else { 0.0 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rowsift_table::{Document, RowSpec, TableSpec};

    fn doc_with(rows: Vec<RowSpec>) -> Document {
        let mut doc = Document::new();
        doc.push_table(TableSpec {
            rows,
            ..TableSpec::default()
        });
        doc
    }

    fn first_row(doc: &Document) -> &Row {
        &doc.tables()[0].rows[0]
    }

    #[test]
    fn reads_trimmed_text_and_number_prefixes() {
        let doc = doc_with(vec![RowSpec::from_texts(["  Widget ", "12.5 kg", "n/a"])]);
        let defs = [
            VariableDefinition::text("name", "td:nth-child(1)"),
            VariableDefinition::number("weight", "td:nth-child(2)"),
            VariableDefinition::number("missing", "td:nth-child(3)"),
        ];
        let mapping = extract(first_row(&doc), &defs);
        assert_eq!(mapping.get("name"), Some(&VarValue::from("Widget")));
        assert_eq!(mapping.get("weight"), Some(&VarValue::Number(12.5)));
        assert_eq!(mapping.get("missing"), Some(&VarValue::Number(0.0)));
    }

    #[test]
    fn absent_and_invalid_selectors_degrade_to_zero_values() {
        let doc = doc_with(vec![RowSpec::from_texts(["5"])]);
        let defs = [
            VariableDefinition::number("far", "td:nth-child(9)"),
            VariableDefinition::text("empty", ""),
            VariableDefinition::text("broken", "td >"),
            VariableDefinition::number("also_broken", "td:hover"),
        ];
        let extractor = VariableExtractor::new(&defs);
        let mapping = extractor.extract(first_row(&doc));
        assert_eq!(mapping.get("far"), Some(&VarValue::Number(0.0)));
        assert_eq!(mapping.get("empty"), Some(&VarValue::from("")));
        assert_eq!(mapping.get("broken"), Some(&VarValue::from("")));
        assert_eq!(mapping.get("also_broken"), Some(&VarValue::Number(0.0)));

        let broken: Vec<&str> = extractor.selector_errors().map(|(name, _)| name).collect();
        assert_eq!(broken, ["broken", "also_broken"]);
    }

    #[test]
    fn overflowing_numbers_are_zero() {
        let doc = doc_with(vec![RowSpec::from_texts(["1e999"])]);
        let mapping = extract(first_row(&doc), &[VariableDefinition::number("v", "td")]);
        assert_eq!(mapping.get("v"), Some(&VarValue::Number(0.0)));
    }

    #[test]
    fn blank_names_become_the_default_and_duplicates_keep_the_last() {
        let doc = doc_with(vec![RowSpec::from_texts(["a", "b"])]);
        let defs = [
            VariableDefinition::text("  ", "td:nth-child(1)"),
            VariableDefinition::text("x", "td:nth-child(1)"),
            VariableDefinition::text("x", "td:nth-child(2)"),
        ];
        let extractor = VariableExtractor::new(&defs);
        assert_eq!(extractor.names().collect::<Vec<_>>(), ["v", "x", "x"]);
        let mapping = extractor.extract(first_row(&doc));
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("v"), Some(&VarValue::from("a")));
        assert_eq!(mapping.get("x"), Some(&VarValue::from("b")));
    }

    #[test]
    fn preview_marks_unusable_selectors() {
        let doc = doc_with(vec![RowSpec::from_texts(["15"])]);
        let defs = [
            VariableDefinition::number("v1", "td"),
            VariableDefinition::number("v2", "td ~ td"),
        ];
        let extractor = VariableExtractor::new(&defs);
        let row = first_row(&doc);
        assert_eq!(extractor.preview(0, row).as_deref(), Some("15"));
        assert_eq!(extractor.preview(1, row).as_deref(), Some(PREVIEW_ERROR));
        assert_eq!(extractor.preview(2, row), None);
    }

    proptest! {
        #[test]
        fn extraction_is_total(
            cells in prop::collection::vec(".{0,12}", 0..5),
            selector in ".{0,16}",
            numeric in any::<bool>(),
        ) {
            let doc = doc_with(vec![RowSpec::from_texts(cells)]);
            let var_type = if numeric { VarType::Number } else { VarType::Text };
            let defs = [VariableDefinition::new("v", selector, var_type)];
            let mapping = extract(first_row(&doc), &defs);
            let value = mapping.get("v").cloned();
            prop_assert!(value.is_some());
            match value {
                Some(VarValue::Number(n)) => prop_assert!(n.is_finite() && numeric),
                Some(VarValue::Text(_)) => prop_assert!(!numeric),
                None => unreachable!(),
            }
        }
    }
}
