//! The filter/sort configuration document.
//!
//! This is the unit that gets persisted, imported and exported. The field
//! names on the wire are camelCase so documents written by the browser
//! tooling load unchanged.

use std::collections::HashSet;
use std::io::Read;
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ConfigError, ConfigIssue};
use crate::value::VarType;

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier regex must compile"));

pub const DEFAULT_TABLE_SELECTOR: &str = "table";
pub const DEFAULT_FILTER_EXPR: &str = "true";
pub const DEFAULT_VAR_NAME: &str = "v";

/// Names the evaluator binds itself; a variable with one of these names is
/// unreachable from expressions.
pub const RESERVED_NAMES: &[&str] = &[
    "Math", "Array", "Object", "Date", "document", "window", "console",
];

fn default_var_name() -> String {
    DEFAULT_VAR_NAME.to_string()
}

/// One named, row-relative variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct VariableDefinition {
    #[serde(default = "default_var_name")]
    pub name: String,
    /// Row-relative selector; empty means "no element".
    #[serde(default)]
    pub selector: String,
    #[serde(rename = "type", default)]
    pub var_type: VarType,
}

impl VariableDefinition {
    pub fn new(name: impl Into<String>, selector: impl Into<String>, var_type: VarType) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            var_type,
        }
    }

    pub fn number(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::new(name, selector, VarType::Number)
    }

    pub fn text(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::new(name, selector, VarType::Text)
    }
}

/// Table selector, filter, optional sort and the ordered variable list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[schemars(
    title = "rowsift filter/sort configuration",
    description = "Row variables, a boolean filter expression and an optional sort expression applied to matching tables."
)]
pub struct FilterSortConfig {
    pub table_selector: String,
    pub filter_expr: String,
    /// Empty means "keep document order".
    #[serde(default)]
    pub sort_expression: String,
    pub vars: Vec<VariableDefinition>,
}

impl Default for FilterSortConfig {
    fn default() -> Self {
        Self {
            table_selector: DEFAULT_TABLE_SELECTOR.to_string(),
            filter_expr: DEFAULT_FILTER_EXPR.to_string(),
            sort_expression: String::new(),
            vars: (1..=3)
                .map(|i| VariableDefinition::text(format!("v{i}"), format!("td:nth-child({i})")))
                .collect(),
        }
    }
}

impl FilterSortConfig {
    /// Import a document from a JSON string. Missing required fields reject
    /// the whole document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::from_parse)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(bytes).map_err(ConfigError::from_parse)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        serde_json::from_reader(reader).map_err(ConfigError::from_parse)
    }

    /// Pretty JSON in the export format.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Trim every field and substitute the defaults for blank ones.
    pub fn normalize(&mut self) {
        trim_or_default(&mut self.table_selector, DEFAULT_TABLE_SELECTOR);
        trim_or_default(&mut self.filter_expr, DEFAULT_FILTER_EXPR);
        self.sort_expression = self.sort_expression.trim().to_string();
        for var in &mut self.vars {
            trim_or_default(&mut var.name, DEFAULT_VAR_NAME);
            var.selector = var.selector.trim().to_string();
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// The sort expression, if one is configured.
    pub fn sort_expr(&self) -> Option<&str> {
        let expr = self.sort_expression.trim();
        (!expr.is_empty()).then_some(expr)
    }

    /// Report non-fatal problems. An empty list means the configuration is
    /// clean; a non-empty one is still usable.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.table_selector.trim().is_empty() {
            issues.push(ConfigIssue::new(
                "tableSelector",
                format!("blank selector falls back to `{DEFAULT_TABLE_SELECTOR}`"),
            ));
        }
        if self.filter_expr.trim().is_empty() {
            issues.push(ConfigIssue::new(
                "filterExpr",
                format!("blank filter falls back to `{DEFAULT_FILTER_EXPR}`"),
            ));
        }

        let mut seen = HashSet::new();
        for (idx, var) in self.vars.iter().enumerate() {
            let name = var.name.trim();
            let path = format!("vars[{idx}].name");
            if !IDENT.is_match(name) {
                issues.push(ConfigIssue::new(
                    &path,
                    format!("`{name}` is not an identifier and cannot be referenced"),
                ));
            } else if RESERVED_NAMES.contains(&name) {
                issues.push(ConfigIssue::new(
                    &path,
                    format!("`{name}` is shadowed by a built-in"),
                ));
            }
            if !seen.insert(name) {
                issues.push(ConfigIssue::new(
                    &path,
                    format!("duplicate variable `{name}`; the last definition wins"),
                ));
            }
            if var.selector.trim().is_empty() {
                issues.push(ConfigIssue::new(
                    format!("vars[{idx}].selector"),
                    "empty selector always yields the zero value",
                ));
            }
        }

        issues
    }

    /// JSON Schema of the import/export document.
    pub fn json_schema() -> JsonValue {
        schemars::schema_for!(FilterSortConfig).to_value()
    }
}

fn trim_or_default(field: &mut String, default: &str) {
    let trimmed = field.trim();
    *field = if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    };
}
