//! Value equality and ordering.
//!
//! The language's `==` is cross-type for numerics and propagates errors and
//! unknowns found *inside* a container even though the container values
//! themselves are not error/unknown (the evaluator's `Call` step only
//! short-circuits on the top-level arguments, see `eval::step`).
use std::cmp::Ordering;

use super::{MapKey, Value};

fn numeric_eq(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return false;
    }
    a == b
}

/// Cross-type numeric equality: int/uint/double compare by mathematical
/// value. NaN is never equal to anything, including itself; ±Infinity
/// equals itself only.
fn numbers_equal(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a == b),
        (Value::Uint(a), Value::Uint(b)) => Some(a == b),
        (Value::Double(a), Value::Double(b)) => Some(numeric_eq(*a, *b)),
        (Value::Int(a), Value::Uint(b)) | (Value::Uint(b), Value::Int(a)) => {
            Some(*a >= 0 && *a as u64 == *b)
        }
        (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => {
            Some(numeric_eq(*a as f64, *b))
        }
        (Value::Uint(a), Value::Double(b)) | (Value::Double(b), Value::Uint(a)) => {
            Some(numeric_eq(*a as f64, *b))
        }
        _ => None,
    }
}

pub(crate) fn map_key_to_value(key: &MapKey) -> Value {
    match key {
        MapKey::Bool(b) => Value::Bool(*b),
        MapKey::Int(i) => Value::Int(*i),
        MapKey::Uint(u) => Value::Uint(*u),
        MapKey::String(s) => Value::String(s.clone()),
    }
}

/// Full language-level equality. Returns `Value::Bool` for a definite
/// answer, or propagates the first `Value::Error`/`Value::Unknown` found
/// while comparing nested elements.
pub fn equal(a: &Value, b: &Value) -> Value {
    if a.is_error() {
        return a.clone();
    }
    if b.is_error() {
        return b.clone();
    }
    if a.is_unknown() {
        return a.clone();
    }
    if b.is_unknown() {
        return b.clone();
    }

    if let Some(eq) = numbers_equal(a, b) {
        return Value::Bool(eq);
    }

    match (a, b) {
        (Value::Null, Value::Null) => Value::Bool(true),
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(a == b),
        (Value::String(a), Value::String(b)) => Value::Bool(a.as_bytes() == b.as_bytes()),
        (Value::Bytes(a), Value::Bytes(b)) => Value::Bool(a == b),
        (Value::Duration(a), Value::Duration(b)) => {
            Value::Bool(a.seconds == b.seconds && a.nanos == b.nanos)
        }
        (Value::Timestamp(a), Value::Timestamp(b)) => Value::Bool(a.0 == b.0),
        (Value::Type(a), Value::Type(b)) => Value::Bool(a == b),
        (Value::List(a), Value::List(b)) => {
            if a.len() != b.len() {
                return Value::Bool(false);
            }
            for (x, y) in a.iter().zip(b.iter()) {
                match equal(x, y) {
                    Value::Bool(true) => continue,
                    Value::Bool(false) => return Value::Bool(false),
                    propagated => return propagated,
                }
            }
            Value::Bool(true)
        }
        (Value::Map(a), Value::Map(b)) => {
            if a.len() != b.len() {
                return Value::Bool(false);
            }
            for (key, a_value) in a.iter() {
                let Some(b_value) = b.get(key) else {
                    return Value::Bool(false);
                };
                match equal(a_value, b_value) {
                    Value::Bool(true) => continue,
                    Value::Bool(false) => return Value::Bool(false),
                    propagated => return propagated,
                }
            }
            Value::Bool(true)
        }
        (Value::Struct(a), Value::Struct(b)) => {
            if a.type_name != b.type_name || a.fields.len() != b.fields.len() {
                return Value::Bool(false);
            }
            for (name, a_value) in a.fields.iter() {
                let Some(b_value) = b.fields.get(name) else {
                    return Value::Bool(false);
                };
                match equal(a_value, b_value) {
                    Value::Bool(true) => continue,
                    Value::Bool(false) => return Value::Bool(false),
                    propagated => return propagated,
                }
            }
            Value::Bool(true)
        }
        // Cross-kind comparisons (that aren't numeric) are simply unequal.
        _ => Value::Bool(false),
    }
}

/// Ordering for `< <= > >=`, used once the numeric/string comparability of
/// the operands has been established by overload resolution. Returns
/// `None` for kinds the language does not order.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Uint(a), Value::Uint(b)) => a.partial_cmp(b),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Uint(b)) => {
            if *a < 0 {
                Some(Ordering::Less)
            } else {
                (*a as u64).partial_cmp(b)
            }
        }
        (Value::Uint(a), Value::Int(b)) => compare(&Value::Int(*b), &Value::Uint(*a)).map(Ordering::reverse),
        (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Uint(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Uint(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => a.as_bytes().partial_cmp(b.as_bytes()),
        (Value::Bytes(a), Value::Bytes(b)) => a.as_ref().partial_cmp(b.as_ref()),
        (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
        (Value::Duration(a), Value::Duration(b)) => {
            (a.seconds, a.nanos).partial_cmp(&(b.seconds, b.nanos))
        }
        (Value::Timestamp(a), Value::Timestamp(b)) => a.0.partial_cmp(&b.0),
        _ => None,
    }
}

/// Membership test for the `in` operator: linear scan for lists, key
/// lookup for maps.
pub fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match haystack {
        Value::List(items) => Some(items.iter().any(|item| matches!(equal(item, needle), Value::Bool(true)))),
        Value::Map(entries) => {
            let key_as_value = |k: &MapKey| map_key_to_value(k);
            Some(entries.keys().any(|k| matches!(equal(&key_as_value(k), needle), Value::Bool(true))))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_type_numeric_equality() {
        assert_eq!(equal(&Value::Int(3), &Value::Double(3.0)), Value::Bool(true));
        assert_eq!(equal(&Value::Uint(3), &Value::Int(3)), Value::Bool(true));
        assert_eq!(equal(&Value::Int(-1), &Value::Uint(1)), Value::Bool(false));
    }

    #[test]
    fn nan_never_equal() {
        assert_eq!(equal(&Value::Double(f64::NAN), &Value::Double(f64::NAN)), Value::Bool(false));
    }

    #[test]
    fn infinity_equals_itself_only() {
        assert_eq!(
            equal(&Value::Double(f64::INFINITY), &Value::Double(f64::INFINITY)),
            Value::Bool(true)
        );
        assert_eq!(
            equal(&Value::Double(f64::INFINITY), &Value::Double(f64::NEG_INFINITY)),
            Value::Bool(false)
        );
    }

    #[test]
    fn lists_equal_pairwise_at_same_size() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let c = Value::list(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(equal(&a, &b), Value::Bool(true));
        assert_eq!(equal(&a, &c), Value::Bool(false));
    }

    #[test]
    fn error_in_nested_list_propagates() {
        let a = Value::list(vec![Value::error("boom")]);
        let b = Value::list(vec![Value::Int(1)]);
        assert!(equal(&a, &b).is_error());
    }

    #[test]
    fn cross_kind_non_numeric_is_false_not_error() {
        assert_eq!(equal(&Value::Bool(true), &Value::string("true")), Value::Bool(false));
    }
}
