//! Source rewrites applied before an expression reaches the script engine.
//!
//! Users write expressions in browser-script style. Three spellings differ
//! from the engine's own syntax and are rewritten outside string literals:
//! `===`/`!==` become `==`/`!=`, single-quoted strings become double-quoted
//! ones, and every operand of `&&`/`||` is wrapped in `Boolean(..)` so the
//! operators accept any value by truthiness. Logical operators therefore
//! always yield booleans.

use std::borrow::Cow;
use std::iter::Peekable;
use std::str::Chars;

pub fn normalize(expr: &str) -> Cow<'_, str> {
    let spelled = respell(expr);
    if !spelled.contains("&&") && !spelled.contains("||") {
        return spelled;
    }
    let mut out = String::with_capacity(spelled.len() + 16);
    rewrite_group(&mut spelled.chars().peekable(), None, true, &mut out);
    Cow::Owned(out)
}

fn respell(expr: &str) -> Cow<'_, str> {
    if !expr.contains("==") && !expr.contains('\'') {
        return Cow::Borrowed(expr);
    }

    let mut out = String::with_capacity(expr.len());
    let mut chars = expr.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' | '`' => {
                out.push(ch);
                copy_literal(&mut chars, ch, &mut out);
            }
            '\'' => {
                out.push('"');
                let mut escaped = false;
                for c in chars.by_ref() {
                    if escaped {
                        // `\'` needs no escape inside double quotes
                        if c != '\'' {
                            out.push('\\');
                        }
                        out.push(c);
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '\'' {
                        break;
                    } else {
                        if c == '"' {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                }
                out.push('"');
            }
            '=' | '!' if chars.peek() == Some(&'=') => {
                out.push(ch);
                out.push('=');
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
            }
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

fn copy_literal(chars: &mut Peekable<Chars<'_>>, quote: char, out: &mut String) {
    let mut escaped = false;
    for c in chars.by_ref() {
        out.push(c);
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            break;
        }
    }
}

/// Copy one bracketed group (or the whole expression when `closer` is
/// `None`), wrapping logical operands when `wrap` is set. Returns whether
/// the closing bracket was consumed.
fn rewrite_group(chars: &mut Peekable<Chars<'_>>, closer: Option<char>, wrap: bool, out: &mut String) -> bool {
    let mut operands = Vec::new();
    let mut ops = Vec::new();
    let mut current = String::new();
    let mut closed = false;
    while let Some(ch) = chars.next() {
        if Some(ch) == closer {
            closed = true;
            break;
        }
        match ch {
            '"' | '`' => {
                current.push(ch);
                copy_literal(chars, ch, &mut current);
            }
            '(' | '[' | '{' => {
                let close = match ch {
                    '(' => ')',
                    '[' => ']',
                    _ => '}',
                };
                current.push(ch);
                // map literal bodies hold `key: value` pairs
                if rewrite_group(chars, Some(close), ch != '{', &mut current) {
                    current.push(close);
                }
            }
            '&' | '|' if wrap && chars.peek() == Some(&ch) => {
                chars.next();
                operands.push(std::mem::take(&mut current));
                ops.push(if ch == '&' { "&&" } else { "||" });
            }
            ',' | ';' => {
                operands.push(std::mem::take(&mut current));
                emit_operands(&operands, &ops, out);
                operands.clear();
                ops.clear();
                out.push(ch);
            }
            _ => current.push(ch),
        }
    }
    operands.push(current);
    emit_operands(&operands, &ops, out);
    closed
}

fn emit_operands(operands: &[String], ops: &[&str], out: &mut String) {
    if ops.is_empty() {
        operands.iter().for_each(|operand| out.push_str(operand));
        return;
    }
    for (idx, operand) in operands.iter().enumerate() {
        if idx > 0 {
            out.push_str(ops[idx - 1]);
        }
        let body = operand.trim();
        let lead = &operand[..operand.len() - operand.trim_start().len()];
        let trail = &operand[operand.trim_end().len()..];
        out.push_str(lead);
        out.push_str("Boolean(");
        out.push_str(body);
        out.push(')');
        out.push_str(trail);
    }
}
