use rhai::{Array, Dynamic, Engine, FLOAT, Map, Scope};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::{builtins, dialect};

/// Resource limits for a single evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Engine operations before the evaluation is aborted.
    pub max_operations: u64,
    pub max_expr_depth: usize,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 100_000,
            max_expr_depth: 64,
            max_call_levels: 16,
            max_string_size: 64 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

/// Evaluates one expression at a time against a variable mapping.
///
/// The engine only accepts expressions (no statements, no `import`, no
/// `eval`), has no access to the host document, and never panics or
/// unwinds on bad input: every failure comes back as the engine's error
/// message.
pub struct SafeEvaluator {
    engine: Engine,
}

impl SafeEvaluator {
    pub fn new(limits: &SandboxLimits) -> Self {
        let mut engine = Engine::new();
        engine
            .set_max_operations(limits.max_operations)
            .set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth)
            .set_max_call_levels(limits.max_call_levels)
            .set_max_string_size(limits.max_string_size)
            .set_max_array_size(limits.max_array_size)
            .set_max_map_size(limits.max_map_size)
            .set_fast_operators(false)
            .set_module_resolver(rhai::module_resolvers::DummyModuleResolver::new())
            .on_print(|text| tracing::debug!(target: "rowsift::console", "{text}"))
            .on_debug(|text, _, _| tracing::debug!(target: "rowsift::console", "{text}"));
        engine.disable_symbol("eval");
        builtins::register(&mut engine);
        Self { engine }
    }

    /// Evaluate `expr` with `vars` bound as free identifiers.
    ///
    /// The result is returned as the engine produced it, converted to JSON;
    /// callers decide how to coerce it.
    pub fn evaluate(&self, expr: &str, vars: &JsonMap<String, JsonValue>) -> Result<JsonValue, String> {
        let mut scope = Scope::new();
        for (name, value) in vars {
            scope.push_dynamic(name.as_str(), json_to_dynamic(value));
        }
        builtins::push_globals(&mut scope);

        let source = dialect::normalize(expr);
        let value = self
            .engine
            .eval_expression_with_scope::<Dynamic>(&mut scope, &source)
            .map_err(|err| err.to_string())?;
        Ok(self.dynamic_to_json(value))
    }

    fn dynamic_to_json(&self, value: Dynamic) -> JsonValue {
        if value.is_unit() {
            JsonValue::Null
        } else if let Ok(b) = value.as_bool() {
            JsonValue::Bool(b)
        } else if let Ok(i) = value.as_int() {
            JsonValue::from(i)
        } else if let Ok(f) = value.as_float() {
            float_to_json(f)
        } else if value.is_string() || value.is_char() {
            JsonValue::String(value.to_string())
        } else if value.is_array() {
            let items = value.cast::<Array>();
            JsonValue::Array(items.into_iter().map(|v| self.dynamic_to_json(v)).collect())
        } else if value.is_map() {
            let map = value.cast::<Map>();
            JsonValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k.to_string(), self.dynamic_to_json(v)))
                    .collect(),
            )
        } else {
            JsonValue::String(self.engine.map_type_name(value.type_name()).to_string())
        }
    }
}

impl Default for SafeEvaluator {
    fn default() -> Self {
        Self::new(&SandboxLimits::default())
    }
}

/// NaN and the infinities have no JSON form and cross as `null`.
fn float_to_json(f: FLOAT) -> JsonValue {
    JsonNumber::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
}

/// Numbers always enter the engine as floats.
fn json_to_dynamic(value: &JsonValue) -> Dynamic {
    match value {
        JsonValue::Null => Dynamic::UNIT,
        JsonValue::Bool(b) => Dynamic::from_bool(*b),
        JsonValue::Number(n) => Dynamic::from_float(n.as_f64().unwrap_or(FLOAT::NAN)),
        JsonValue::String(s) => Dynamic::from(s.clone()),
        JsonValue::Array(items) => Dynamic::from_array(items.iter().map(json_to_dynamic).collect()),
        JsonValue::Object(map) => {
            let map: Map = map
                .iter()
                .map(|(k, v)| (k.as_str().into(), json_to_dynamic(v)))
                .collect();
            Dynamic::from_map(map)
        }
    }
}
