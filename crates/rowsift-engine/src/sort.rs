//! Sort value coercion and the descending order applied to passing rows.

use std::cmp::Ordering;
use std::fmt;

use rowsift_common::{format_number, parse_number_strict};
use rowsift_table::RowId;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::EvalError;

/// Text stored for a row whose sort expression failed or did not produce a
/// number.
pub const SORT_ERROR: &str = "ERROR";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortValue {
    Number(f64),
    Error,
}

impl SortValue {
    /// Coerce a sort expression result. Numbers pass through, booleans count
    /// as `1`/`0`, strings must be numeric as a whole. Everything else,
    /// including NaN, is [`SortValue::Error`].
    pub fn from_json(value: &JsonValue) -> Self {
        let n = match value {
            JsonValue::Number(n) => n.as_f64().unwrap_or(f64::NAN),
            JsonValue::Bool(b) => f64::from(u8::from(*b)),
            JsonValue::String(s) => parse_number_strict(s),
            JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => f64::NAN,
        };
        if n.is_nan() {
            SortValue::Error
        } else {
            SortValue::Number(n)
        }
    }

    /// The value to cache for an evaluation outcome, with the error message
    /// when there is one.
    pub fn from_outcome(outcome: Result<JsonValue, EvalError>) -> (Self, Option<String>) {
        match outcome {
            Ok(value) => match SortValue::from_json(&value) {
                SortValue::Error => (SortValue::Error, Some(format!("not a number: {value}"))),
                number => (number, None),
            },
            Err(err) => (SortValue::Error, Some(err.to_string())),
        }
    }

    pub fn as_number(self) -> Option<f64> {
        match self {
            SortValue::Number(n) => Some(n),
            SortValue::Error => None,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, SortValue::Error)
    }
}

impl fmt::Display for SortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortValue::Number(n) => f.write_str(&format_number(*n)),
            SortValue::Error => f.write_str(SORT_ERROR),
        }
    }
}

impl Serialize for SortValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SortValue::Number(n) => serializer.serialize_f64(*n),
            SortValue::Error => serializer.serialize_str(SORT_ERROR),
        }
    }
}

impl<'de> Deserialize<'de> for SortValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(SortValue::Number(n)),
            Raw::Text(text) if text == SORT_ERROR => Ok(SortValue::Error),
            Raw::Text(text) => Err(D::Error::custom(format!(
                "expected a number or {SORT_ERROR:?}, got {text:?}"
            ))),
        }
    }
}

/// Descending comparison: `Less` means `a` comes first.
///
/// Two numbers compare numerically. Any pair involving an error compares by
/// display text, case-insensitively first, which puts `ERROR` ahead of every
/// number.
pub fn compare_desc(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Number(x), SortValue::Number(y)) => y.partial_cmp(x).unwrap_or(Ordering::Equal),
        _ => text_compare(&b.to_string(), &a.to_string()),
    }
}

fn text_compare(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Stable descending sort of keyed rows. Rows with equal keys keep their
/// relative order.
pub fn order_descending(mut keyed: Vec<(RowId, SortValue)>) -> Vec<RowId> {
    keyed.sort_by(|(_, a), (_, b)| compare_desc(a, b));
    keyed.into_iter().map(|(row, _)| row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn rows(keys: &[SortValue]) -> Vec<(RowId, SortValue)> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| (RowId::new(i as u64 + 1), *k))
            .collect()
    }

    fn ids(order: &[RowId]) -> Vec<u64> {
        order.iter().map(|r| r.get()).collect()
    }

    #[test]
    fn coercion() {
        assert_eq!(SortValue::from_json(&json!(15)), SortValue::Number(15.0));
        assert_eq!(SortValue::from_json(&json!(true)), SortValue::Number(1.0));
        assert_eq!(SortValue::from_json(&json!(" 2.5 ")), SortValue::Number(2.5));
        assert_eq!(SortValue::from_json(&json!("")), SortValue::Number(0.0));
        assert_eq!(SortValue::from_json(&json!("12px")), SortValue::Error);
        assert_eq!(SortValue::from_json(&JsonValue::Null), SortValue::Error);
        assert_eq!(SortValue::from_json(&json!([1])), SortValue::Error);
    }

    #[test]
    fn outcome_keeps_the_reason() {
        let (value, error) = SortValue::from_outcome(Err(EvalError::Evaluation("boom".into())));
        assert_eq!(value, SortValue::Error);
        assert_eq!(error.as_deref(), Some("boom"));

        let (value, error) = SortValue::from_outcome(Ok(json!("abc")));
        assert_eq!(value, SortValue::Error);
        assert!(error.unwrap().contains("abc"));

        assert_eq!(SortValue::from_outcome(Ok(json!(3))), (SortValue::Number(3.0), None));
    }

    #[test]
    fn numbers_sort_high_to_low_and_ties_keep_document_order() {
        let order = order_descending(rows(&[
            SortValue::Number(5.0),
            SortValue::Number(15.0),
            SortValue::Number(5.0),
            SortValue::Number(-1.0),
        ]));
        assert_eq!(ids(&order), [2, 1, 3, 4]);
    }

    #[test]
    fn errors_sort_ahead_of_numbers() {
        let order = order_descending(rows(&[
            SortValue::Number(5.0),
            SortValue::Error,
            SortValue::Number(9.0),
            SortValue::Error,
        ]));
        assert_eq!(ids(&order), [2, 4, 3, 1]);
    }

    #[test]
    fn display_and_serde() {
        assert_eq!(SortValue::Number(15.0).to_string(), "15");
        assert_eq!(SortValue::Error.to_string(), SORT_ERROR);
        assert_eq!(serde_json::to_value(SortValue::Error).unwrap(), json!("ERROR"));
        assert_eq!(serde_json::to_value(SortValue::Number(1.5)).unwrap(), json!(1.5));
        let back: SortValue = serde_json::from_value(json!("ERROR")).unwrap();
        assert_eq!(back, SortValue::Error);
    }

    fn sort_value() -> impl Strategy<Value = SortValue> {
        prop_oneof![
            4 => (-1.0e6..1.0e6f64).prop_map(SortValue::Number),
            1 => Just(SortValue::Error),
        ]
    }

    proptest! {
        #[test]
        fn numeric_neighbours_are_non_increasing(keys in prop::collection::vec(sort_value(), 0..40)) {
            let keyed = rows(&keys);
            let order = order_descending(keyed.clone());
            prop_assert_eq!(order.len(), keys.len());

            let numbers: Vec<f64> = order
                .iter()
                .filter_map(|id| keys[id.get() as usize - 1].as_number())
                .collect();
            for pair in numbers.windows(2) {
                prop_assert!(pair[0] >= pair[1]);
            }

            // equal keys stay in document order
            for pair in order.windows(2) {
                let (a, b) = (keys[pair[0].get() as usize - 1], keys[pair[1].get() as usize - 1]);
                if compare_desc(&a, &b) == Ordering::Equal {
                    prop_assert!(pair[0] < pair[1]);
                }
            }
        }
    }
}
