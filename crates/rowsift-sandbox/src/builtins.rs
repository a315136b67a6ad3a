//! The whitelist of globals visible to expressions.
//!
//! Free functions are registered on the engine. Namespace objects (`Math`,
//! `Date`, `Array`, `Object`) and the inert `document`/`window`/`console`
//! stand-ins are values of opaque types pushed into every evaluation scope
//! after the row variables, so they shadow variables of the same name.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use rand::Rng;
use rhai::{Array, Dynamic, Engine, EvalAltResult, FLOAT, INT, ImmutableString, Map, Scope};
use rowsift_common::{
    format_number, parse_float_prefix, parse_int_prefix, parse_number_strict,
};

/// Characters `encodeURIComponent` leaves alone besides ASCII alphanumerics.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, Copy)]
pub struct MathNs;
#[derive(Debug, Clone, Copy)]
pub struct DateNs;
#[derive(Debug, Clone, Copy)]
pub struct ArrayNs;
#[derive(Debug, Clone, Copy)]
pub struct ObjectNs;
#[derive(Debug, Clone, Copy)]
pub struct DocumentStub;
#[derive(Debug, Clone, Copy)]
pub struct ConsoleStub;

/// Script-style numeric conversion (`Number(x)`).
pub fn to_number(value: &Dynamic) -> FLOAT {
    if let Ok(f) = value.as_float() {
        f
    } else if let Ok(i) = value.as_int() {
        i as FLOAT
    } else if let Ok(b) = value.as_bool() {
        if b { 1.0 } else { 0.0 }
    } else if value.is_string() {
        parse_number_strict(&to_text(value))
    } else if let Ok(c) = value.as_char() {
        parse_number_strict(c.encode_utf8(&mut [0; 4]))
    } else {
        FLOAT::NAN
    }
}

/// Script-style string conversion (`String(x)`).
pub fn to_text(value: &Dynamic) -> String {
    if value.is_unit() {
        "null".to_string()
    } else if let Ok(f) = value.as_float() {
        format_number(f)
    } else if value.is_array() {
        value
            .read_lock::<Array>()
            .map(|items| items.iter().map(to_text).collect::<Vec<_>>().join(","))
            .unwrap_or_default()
    } else if value.is_map() {
        "[object Object]".to_string()
    } else {
        value.to_string()
    }
}

/// Script-style truthiness (`Boolean(x)`).
pub fn to_bool(value: &Dynamic) -> bool {
    if value.is_unit() {
        false
    } else if let Ok(b) = value.as_bool() {
        b
    } else if let Ok(f) = value.as_float() {
        f != 0.0 && !f.is_nan()
    } else if let Ok(i) = value.as_int() {
        i != 0
    } else if value.is_string() {
        !to_text(value).is_empty()
    } else {
        true
    }
}

fn parse_float(value: &Dynamic) -> FLOAT {
    match value.as_float() {
        Ok(f) => f,
        Err(_) => parse_float_prefix(&to_text(value)),
    }
}

fn parse_int(value: &Dynamic, radix: Option<u32>) -> FLOAT {
    parse_int_prefix(&to_text(value), radix).trunc()
}

fn fold(args: &[Dynamic], init: FLOAT, pick: fn(FLOAT, FLOAT) -> FLOAT) -> FLOAT {
    args.iter().map(to_number).fold(init, |acc, n| {
        if acc.is_nan() || n.is_nan() {
            FLOAT::NAN
        } else {
            pick(acc, n)
        }
    })
}

fn math_unary(engine: &mut Engine, name: &str, f: fn(FLOAT) -> FLOAT) {
    engine.register_fn(name, move |_: &mut MathNs, x: Dynamic| f(to_number(&x)));
}

/// Register `$name` on namespace `$ns` for zero to eight arguments, with
/// the arguments bound to `$args` as a slice.
macro_rules! variadic {
    ($engine:expr, $ns:ty, $name:literal, |$args:ident| $body:expr) => {{
        $engine
            .register_fn($name, |_: &mut $ns| {
                let $args: &[Dynamic] = &[];
                $body
            })
            .register_fn($name, |_: &mut $ns, a: Dynamic| {
                let $args: &[Dynamic] = &[a];
                $body
            })
            .register_fn($name, |_: &mut $ns, a: Dynamic, b: Dynamic| {
                let $args: &[Dynamic] = &[a, b];
                $body
            })
            .register_fn($name, |_: &mut $ns, a: Dynamic, b: Dynamic, c: Dynamic| {
                let $args: &[Dynamic] = &[a, b, c];
                $body
            })
            .register_fn($name, |_: &mut $ns, a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic| {
                let $args: &[Dynamic] = &[a, b, c, d];
                $body
            })
            .register_fn(
                $name,
                |_: &mut $ns, a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic, e: Dynamic| {
                    let $args: &[Dynamic] = &[a, b, c, d, e];
                    $body
                },
            )
            .register_fn(
                $name,
                |_: &mut $ns, a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic, e: Dynamic, f: Dynamic| {
                    let $args: &[Dynamic] = &[a, b, c, d, e, f];
                    $body
                },
            )
            .register_fn(
                $name,
                |_: &mut $ns,
                 a: Dynamic,
                 b: Dynamic,
                 c: Dynamic,
                 d: Dynamic,
                 e: Dynamic,
                 f: Dynamic,
                 g: Dynamic| {
                    let $args: &[Dynamic] = &[a, b, c, d, e, f, g];
                    $body
                },
            )
            .register_fn(
                $name,
                |_: &mut $ns,
                 a: Dynamic,
                 b: Dynamic,
                 c: Dynamic,
                 d: Dynamic,
                 e: Dynamic,
                 f: Dynamic,
                 g: Dynamic,
                 h: Dynamic| {
                    let $args: &[Dynamic] = &[a, b, c, d, e, f, g, h];
                    $body
                },
            );
    }};
}

fn log_console(level: tracing::Level, args: &[Dynamic]) {
    let line = args.iter().map(to_text).collect::<Vec<_>>().join(" ");
    match level {
        tracing::Level::ERROR => tracing::error!(target: "rowsift::console", "{line}"),
        tracing::Level::WARN => tracing::warn!(target: "rowsift::console", "{line}"),
        _ => tracing::info!(target: "rowsift::console", "{line}"),
    }
}

/// Register every whitelisted function and namespace method on `engine`.
pub fn register(engine: &mut Engine) {
    engine
        .register_fn("parseFloat", |x: Dynamic| parse_float(&x))
        .register_fn("parseInt", |x: Dynamic| parse_int(&x, None))
        .register_fn("parseInt", |x: Dynamic, radix: Dynamic| {
            let radix = to_number(&radix);
            let radix = (radix.is_finite() && radix >= 0.0).then_some(radix as u32);
            parse_int(&x, radix)
        })
        .register_fn("Number", |x: Dynamic| to_number(&x))
        .register_fn("String", |x: Dynamic| to_text(&x))
        .register_fn("Boolean", |x: Dynamic| to_bool(&x))
        .register_fn("isNaN", |x: Dynamic| to_number(&x).is_nan())
        .register_fn("isFinite", |x: Dynamic| to_number(&x).is_finite())
        .register_fn("encodeURIComponent", |x: Dynamic| {
            utf8_percent_encode(&to_text(&x), URI_COMPONENT).to_string()
        })
        .register_fn(
            "decodeURIComponent",
            |x: Dynamic| -> Result<String, Box<EvalAltResult>> {
                let text = to_text(&x);
                percent_decode_str(&text)
                    .decode_utf8()
                    .map(|s| s.into_owned())
                    .map_err(|_| "URIError: URI malformed".into())
            },
        );

    register_math(engine);

    engine
        .register_type_with_name::<DateNs>("Date")
        .register_fn("now", |_: &mut DateNs| {
            chrono::Utc::now().timestamp_millis() as FLOAT
        });

    engine
        .register_type_with_name::<ArrayNs>("Array")
        .register_fn("isArray", |_: &mut ArrayNs, x: Dynamic| x.is_array());

    engine
        .register_type_with_name::<ObjectNs>("Object")
        .register_fn("keys", |_: &mut ObjectNs, x: Dynamic| -> Array {
            match x.try_cast::<Map>() {
                Some(map) => map.keys().map(|k| Dynamic::from(k.to_string())).collect(),
                None => Array::new(),
            }
        })
        .register_fn("values", |_: &mut ObjectNs, x: Dynamic| -> Array {
            match x.try_cast::<Map>() {
                Some(map) => map.into_values().collect(),
                None => Array::new(),
            }
        });

    engine
        .register_type_with_name::<DocumentStub>("document")
        .register_fn("getElementById", |_: &mut DocumentStub, _: Dynamic| ())
        .register_fn("querySelector", |_: &mut DocumentStub, _: Dynamic| ())
        .register_fn("querySelectorAll", |_: &mut DocumentStub, _: Dynamic| {
            Array::new()
        });

    engine.register_type_with_name::<ConsoleStub>("console");
    variadic!(engine, ConsoleStub, "log", |args| log_console(tracing::Level::INFO, args));
    variadic!(engine, ConsoleStub, "info", |args| log_console(tracing::Level::INFO, args));
    variadic!(engine, ConsoleStub, "warn", |args| log_console(tracing::Level::WARN, args));
    variadic!(engine, ConsoleStub, "error", |args| log_console(tracing::Level::ERROR, args));

    register_properties(engine);
    register_operators(engine);
}

/// `length` on strings and arrays. Strings count characters.
fn register_properties(engine: &mut Engine) {
    engine
        .register_get("length", |s: &mut ImmutableString| s.chars().count() as INT)
        .register_get("length", |a: &mut Array| a.len() as INT);
}

fn compare_mixed(engine: &mut Engine, op: &str, f: fn(FLOAT, FLOAT) -> bool) {
    engine
        .register_fn(op, move |a: ImmutableString, b: INT| f(parse_number_strict(&a), b as FLOAT))
        .register_fn(op, move |a: ImmutableString, b: FLOAT| f(parse_number_strict(&a), b))
        .register_fn(op, move |a: INT, b: ImmutableString| f(a as FLOAT, parse_number_strict(&b)))
        .register_fn(op, move |a: FLOAT, b: ImmutableString| f(a, parse_number_strict(&b)));
}

fn arithmetic_mixed(engine: &mut Engine, op: &str, f: fn(FLOAT, FLOAT) -> FLOAT) {
    engine
        .register_fn(op, move |a: ImmutableString, b: INT| f(parse_number_strict(&a), b as FLOAT))
        .register_fn(op, move |a: ImmutableString, b: FLOAT| f(parse_number_strict(&a), b))
        .register_fn(op, move |a: INT, b: ImmutableString| f(a as FLOAT, parse_number_strict(&b)))
        .register_fn(op, move |a: FLOAT, b: ImmutableString| f(a, parse_number_strict(&b)))
        .register_fn(op, move |a: ImmutableString, b: ImmutableString| {
            f(parse_number_strict(&a), parse_number_strict(&b))
        });
}

/// Script operator semantics the engine lacks.
///
/// Ordering a string against a number compares numerically. `-`, `*`, `/`
/// and `%` convert strings to numbers (`+` keeps concatenating). Integer
/// division yields a float. `!` applies truthiness to non-boolean operands.
/// Equality stays strict: values of different types are never equal.
///
/// Requires fast operators to be off so the integer `/` override is seen.
fn register_operators(engine: &mut Engine) {
    compare_mixed(engine, ">", |a, b| a > b);
    compare_mixed(engine, ">=", |a, b| a >= b);
    compare_mixed(engine, "<", |a, b| a < b);
    compare_mixed(engine, "<=", |a, b| a <= b);

    arithmetic_mixed(engine, "-", |a, b| a - b);
    arithmetic_mixed(engine, "*", |a, b| a * b);
    arithmetic_mixed(engine, "/", |a, b| a / b);
    arithmetic_mixed(engine, "%", |a, b| a % b);

    engine
        .register_fn("/", |a: INT, b: INT| a as FLOAT / b as FLOAT)
        .register_fn("!", |s: ImmutableString| s.is_empty())
        .register_fn("!", |x: FLOAT| x == 0.0 || x.is_nan())
        .register_fn("!", |x: INT| x == 0)
        .register_fn("!", |_: ()| true)
        .register_fn("!", |_: Array| false)
        .register_fn("!", |_: Map| false);
}

fn register_math(engine: &mut Engine) {
    engine
        .register_type_with_name::<MathNs>("Math")
        .register_get("PI", |_: &mut MathNs| std::f64::consts::PI)
        .register_get("E", |_: &mut MathNs| std::f64::consts::E);

    math_unary(engine, "abs", FLOAT::abs);
    math_unary(engine, "ceil", FLOAT::ceil);
    math_unary(engine, "floor", FLOAT::floor);
    // round half up, as scripts do (-2.5 rounds to -2)
    math_unary(engine, "round", |x| (x + 0.5).floor());
    math_unary(engine, "trunc", FLOAT::trunc);
    math_unary(engine, "sign", |x| if x == 0.0 || x.is_nan() { x } else { x.signum() });
    math_unary(engine, "sqrt", FLOAT::sqrt);
    math_unary(engine, "cbrt", FLOAT::cbrt);
    math_unary(engine, "exp", FLOAT::exp);
    math_unary(engine, "log", FLOAT::ln);
    math_unary(engine, "log10", FLOAT::log10);
    math_unary(engine, "log2", FLOAT::log2);

    engine
        .register_fn("pow", |_: &mut MathNs, x: Dynamic, y: Dynamic| {
            to_number(&x).powf(to_number(&y))
        })
        .register_fn("random", |_: &mut MathNs| -> FLOAT {
            rand::thread_rng().r#gen()
        });

    variadic!(engine, MathNs, "min", |args| fold(args, FLOAT::INFINITY, FLOAT::min));
    variadic!(engine, MathNs, "max", |args| fold(args, FLOAT::NEG_INFINITY, FLOAT::max));
}

/// Push the namespace objects and stand-ins into `scope`.
pub fn push_globals(scope: &mut Scope<'_>) {
    scope
        .push("Math", MathNs)
        .push("Date", DateNs)
        .push("Array", ArrayNs)
        .push("Object", ObjectNs)
        .push("document", DocumentStub)
        .push("window", Map::new())
        .push("console", ConsoleStub);
}

