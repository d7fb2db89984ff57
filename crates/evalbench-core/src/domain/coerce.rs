//! Literal coercion driven by declared type hints.
//!
//! Problem authors often write test values as strings (`"42"`, `"[1, 2]"`,
//! `"'abc'"`). Before a value crosses the sandbox boundary it is converted to
//! the shape its declared type suggests. Anything that cannot be converted is
//! passed through unchanged; the comparator decides what that means.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Number, Value};

fn optional_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*Optional\[(.*)\]\s*$").expect("static regex"))
}

fn trailing_comma_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([\]}])").expect("static regex"))
}

/// Strip one level of `Optional[...]`.
pub fn base_type(declared_type: &str) -> &str {
    optional_pattern()
        .captures(declared_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or_else(|| declared_type.trim())
}

/// Coerce `value` toward `declared_type`.
pub fn coerce_literal(declared_type: &str, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    let ty = base_type(declared_type);
    let unquoted = match value {
        Value::String(s) => Some(unquote(s)),
        _ => None,
    };

    match ty {
        "int" => match (value, unquoted) {
            (Value::Number(n), _) => match (n.as_i64(), n.as_f64()) {
                (Some(_), _) => value.clone(),
                (None, Some(f)) if f.is_finite() => Value::from(f.trunc() as i64),
                _ => value.clone(),
            },
            (_, Some(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| value.clone()),
            _ => value.clone(),
        },
        "float" => match (value, unquoted) {
            (Value::Number(n), _) => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
            (_, Some(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        },
        "str" => match (value, unquoted) {
            (_, Some(s)) => Value::String(s.to_string()),
            (Value::Number(n), _) => Value::String(n.to_string()),
            _ => value.clone(),
        },
        "bool" => match value {
            Value::Bool(b) => Value::Bool(*b),
            Value::String(s) => Value::Bool(unquote(s).eq_ignore_ascii_case("true")),
            _ => Value::Bool(false),
        },
        container if container.contains('[') => match unquoted {
            Some(s) => parse_python_literal(s).unwrap_or_else(|| value.clone()),
            None => value.clone(),
        },
        _ => value.clone(),
    }
}

fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' || first == b'"') && first == last {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Parse a Python-style literal (`[1, 2]`, `('a', True)`, `{'k': None}`)
/// into JSON. Returns `None` when the text is not a plain literal.
pub fn parse_python_literal(text: &str) -> Option<Value> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let mut literal = String::new();
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    if inner == '\\' {
                        if let Some(escaped) = chars.next() {
                            literal.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                        }
                    } else if inner == c {
                        closed = true;
                        break;
                    } else {
                        literal.push(inner);
                    }
                }
                if !closed {
                    return None;
                }
                out.push_str(&serde_json::to_string(&literal).ok()?);
            }
            '(' => out.push('['),
            ')' => out.push(']'),
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "True" | "true" => out.push_str("true"),
                    "False" | "false" => out.push_str("false"),
                    "None" | "null" => out.push_str("null"),
                    // exponents in floats like 1e5
                    w if w.starts_with('e') || w.starts_with('E') => out.push_str(w),
                    _ => return None,
                }
            }
            other => out.push(other),
        }
    }

    let cleaned = trailing_comma_pattern().replace_all(&out, "$1");
    serde_json::from_str(&cleaned).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_type_unwraps_optional() {
        assert_eq!(base_type("Optional[int]"), "int");
        assert_eq!(base_type("List[int]"), "List[int]");
    }

    #[test]
    fn test_int_coercion() {
        assert_eq!(coerce_literal("int", &json!("42")), json!(42));
        assert_eq!(coerce_literal("int", &json!("'-3'")), json!(-3));
        assert_eq!(coerce_literal("int", &json!(4.9)), json!(4));
        assert_eq!(coerce_literal("int", &json!("abc")), json!("abc"));
    }

    #[test]
    fn test_float_coercion() {
        assert_eq!(coerce_literal("float", &json!("1.5")), json!(1.5));
        assert_eq!(coerce_literal("float", &json!(2)), json!(2.0));
    }

    #[test]
    fn test_str_and_bool_coercion() {
        assert_eq!(coerce_literal("str", &json!("'hello'")), json!("hello"));
        assert_eq!(coerce_literal("str", &json!(5)), json!("5"));
        assert_eq!(coerce_literal("bool", &json!("True")), json!(true));
        assert_eq!(coerce_literal("bool", &json!("no")), json!(false));
        assert_eq!(coerce_literal("bool", &json!(true)), json!(true));
    }

    #[test]
    fn test_null_stays_null() {
        assert_eq!(coerce_literal("Optional[int]", &Value::Null), Value::Null);
    }

    #[test]
    fn test_container_literals() {
        assert_eq!(coerce_literal("List[int]", &json!("[1, 2, 3]")), json!([1, 2, 3]));
        assert_eq!(
            coerce_literal("Tuple[str, bool]", &json!("('a', True)")),
            json!(["a", true])
        );
        assert_eq!(
            coerce_literal("Dict[str, Optional[int]]", &json!("{'k': None,}")),
            json!({"k": null})
        );
        assert_eq!(coerce_literal("List[int]", &json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn test_unparseable_literal_passes_through() {
        assert_eq!(
            coerce_literal("List[int]", &json!("[x for x in y]")),
            json!("[x for x in y]")
        );
    }
}
