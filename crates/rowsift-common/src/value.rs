use std::collections::BTreeMap;
use std::fmt::{self, Display};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// How the trimmed text of a located element is turned into a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    /// Leading decimal prefix of the text; anything non-numeric becomes `0`.
    Number,
    /// The trimmed text as-is (possibly empty).
    #[default]
    Text,
}

impl VarType {
    /// The value a variable of this type takes when nothing could be read.
    pub fn zero(self) -> VarValue {
        match self {
            VarType::Number => VarValue::Number(0.0),
            VarType::Text => VarValue::Text(String::new()),
        }
    }
}

impl Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Number => f.write_str("number"),
            VarType::Text => f.write_str("text"),
        }
    }
}

/// A single extracted variable value.
///
/// Numbers are always finite: the extractor never lets NaN or an infinity
/// into a mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Number(f64),
    Text(String),
}

impl VarValue {
    pub fn var_type(&self) -> VarType {
        match self {
            VarValue::Number(_) => VarType::Number,
            VarValue::Text(_) => VarType::Text,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            VarValue::Number(n) => Some(*n),
            VarValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            VarValue::Number(_) => None,
            VarValue::Text(s) => Some(s),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            VarValue::Number(n) => JsonValue::from(*n),
            VarValue::Text(s) => JsonValue::String(s.clone()),
        }
    }
}

impl Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Number(n) => write!(f, "{n}"),
            VarValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for VarValue {
    fn from(n: f64) -> Self {
        VarValue::Number(n)
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::Text(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        VarValue::Text(s)
    }
}

/// Variable name → value for one row.
///
/// Later inserts under the same name replace earlier ones, so duplicate
/// definitions resolve to the last one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableMapping(BTreeMap<String, VarValue>);

impl VariableMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: VarValue) -> Option<VarValue> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&VarValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VarValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The JSON object that travels inside an evaluation request.
    pub fn to_json_map(&self) -> JsonMap<String, JsonValue> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, VarValue)> for VariableMapping {
    fn from_iter<I: IntoIterator<Item = (K, VarValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl Display for VariableMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (name, value)) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            match value {
                VarValue::Number(n) => write!(f, "{name}: {n}")?,
                VarValue::Text(s) => write!(f, "{name}: {s:?}")?,
            }
        }
        f.write_str("}")
    }
}
