//! Canonical, stable string rendering of values.
//!
//! This is what `format()`/`string()` (see `registry::builtins`) and
//! diagnostics use; its shape is part of the crate's external contract
//! (spec §6), so changes here are format-breaking.
use std::fmt::{self, Display};

use super::{MapKey, Value};

fn render_duration(seconds: i64, nanos: i32) -> String {
    if nanos == 0 {
        format!("{seconds}s")
    } else {
        let mut frac = format!("{:09}", nanos.unsigned_abs());
        while frac.ends_with('0') {
            frac.pop();
        }
        format!("{seconds}.{frac}s")
    }
}

fn render_quoted_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a value the way it appears nested inside a list/map/struct:
/// strings are quoted, everything else is the same as top-level rendering.
fn render_nested(value: &Value) -> String {
    match value {
        Value::String(s) => render_quoted_string(s),
        other => other.to_string(),
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::Double(d) => {
                if d.fract() == 0.0 && d.is_finite() {
                    write!(f, "{d:.1}")
                } else {
                    write!(f, "{d}")
                }
            }
            Value::String(s) => write!(f, "{s}"),
            Value::Bytes(b) => {
                for byte in b.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Duration(d) => write!(f, "{}", render_duration(d.seconds, d.nanos)),
            Value::Timestamp(t) => write!(f, "{}", t.0.to_rfc3339()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", render_nested(item))?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let key_str = match key {
                        MapKey::String(s) => render_quoted_string(s),
                        other => other.to_string(),
                    };
                    write!(f, "{key_str}: {}", render_nested(value))?;
                }
                write!(f, "}}")
            }
            Value::Struct(s) => {
                write!(f, "{} {{", s.type_name)?;
                for (i, (name, value)) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {}", render_nested(value))?;
                }
                write!(f, "}}")
            }
            Value::Type(t) => write!(f, "{t}"),
            Value::Error(e) => write!(f, "{e}"),
            Value::Unknown(u) => write!(f, "{u}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_renders_with_trimmed_fraction() {
        let v = Value::Duration(super::Duration::new(123, 456));
        assert_eq!(v.to_string(), "123.000000456s");
    }

    #[test]
    fn double_always_shows_decimal_point() {
        assert_eq!(Value::Double(1.0).to_string(), "1.0");
        assert_eq!(Value::Double(1.5).to_string(), "1.5");
    }

    #[test]
    fn list_renders_nested_strings_quoted() {
        let v = Value::list(vec![Value::string("a"), Value::Int(1)]);
        assert_eq!(v.to_string(), "[\"a\", 1]");
    }

    #[test]
    fn error_and_unknown_render_per_spec() {
        assert_eq!(Value::error("boom").to_string(), "<error: boom>");
        assert_eq!(Value::unknown("x.y").to_string(), "<unknown: x.y>");
    }
}
