//! Scalar coercions shared by the extractor, the sandbox built-ins and the
//! pipeline.
//!
//! All of them follow the loose conventions of browser scripting: numbers are
//! read from the longest leading decimal prefix, and truthiness treats `0`,
//! `""` and `null` as false.

use serde_json::Value as JsonValue;

/// Parse the longest leading decimal number of `text`.
///
/// Leading whitespace is skipped, an optional sign is honoured and
/// `Infinity` is recognised. Returns NaN when no digits are found
/// (`"abc"`, `""`, `"."`, `"-"`).
pub fn parse_float_prefix(text: &str) -> f64 {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    if s[end..].starts_with("Infinity") {
        return if bytes[0] == b'-' {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac_end = end + 1;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - (end + 1);
        end = frac_end;
    }
    if digits == 0 {
        return f64::NAN;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().unwrap_or(f64::NAN)
}

/// Parse the leading integer of `text` in the given radix (2..=36).
///
/// Without a radix, a `0x`/`0X` prefix selects base 16 and anything else
/// base 10. Returns NaN when no digit is valid in the radix.
pub fn parse_int_prefix(text: &str, radix: Option<u32>) -> f64 {
    let s = text.trim_start();
    let (negative, mut rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let has_hex_prefix = rest.starts_with("0x") || rest.starts_with("0X");
    let radix = match radix {
        Some(0) | None if has_hex_prefix => 16,
        Some(0) | None => 10,
        Some(r) if !(2..=36).contains(&r) => return f64::NAN,
        Some(r) => r,
    };
    if radix == 16 && has_hex_prefix {
        rest = &rest[2..];
    }

    let mut value = 0f64;
    let mut any = false;
    for ch in rest.chars() {
        let Some(d) = ch.to_digit(radix) else { break };
        value = value * f64::from(radix) + f64::from(d);
        any = true;
    }
    match (any, negative) {
        (false, _) => f64::NAN,
        (true, true) => -value,
        (true, false) => value,
    }
}

/// Parse a whole string as a number, `Number("...")` style.
///
/// Surrounding whitespace is ignored and blank text is `0`. Any trailing
/// garbage makes the result NaN.
pub fn parse_number_strict(text: &str) -> f64 {
    let s = text.trim();
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust also accepts "inf"/"nan" spellings, which the scripting
    // convention does not.
    if s.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// Boolean coercion of an evaluation result.
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

/// Render a number the way script engines print it (`15`, `1.5`, `NaN`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}
