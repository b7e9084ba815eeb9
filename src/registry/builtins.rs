//! The concrete built-in overload set: arithmetic, comparisons, `in`,
//! `size()`, conversions, `type()`, and `format()`.
//!
//! Grounded in the worked examples of the testable-properties scenarios;
//! not exhaustive, hosts register more through [`crate::env::Environment`]
//! and [`super::Registry`] the same way.
use crate::env::{BuildError, Environment, Overload, Strictness};
use crate::value::{equality, Duration, Type, Value};

use super::adapters;
use super::Registry;

/// Register the built-in overload set into both `env` (so the checker can
/// type-check calls to it) and `registry` (so the evaluator can invoke
/// it). `_&&_`, `_||_`, and `_?:_` are declared here purely so the
/// checker accepts and types them; the planner lowers them directly to
/// short-circuiting jumps and never dispatches through the registry.
pub fn install(env: &mut Environment, registry: &mut Registry) -> Result<(), BuildError> {
    install_logical(env)?;
    install_arithmetic(env, registry)?;
    install_comparisons(env, registry)?;
    install_containers(env, registry)?;
    install_conversions(env, registry)?;
    install_strings(env, registry)?;
    Ok(())
}

fn install_logical(env: &mut Environment) -> Result<(), BuildError> {
    env.declare_function("_&&_", Overload::global("logical_and_bool_bool", vec![Type::Bool, Type::Bool], Type::Bool))?;
    env.declare_function("_||_", Overload::global("logical_or_bool_bool", vec![Type::Bool, Type::Bool], Type::Bool))?;
    env.declare_function(
        "_?:_",
        Overload::global("conditional", vec![Type::Bool, Type::Dyn, Type::Dyn], Type::Dyn),
    )?;
    env.declare_function("!_", Overload::global("logical_not_bool", vec![Type::Bool], Type::Bool))?;
    Ok(())
}

fn int_binop(registry: &mut Registry, id: &str, f: impl Fn(i64, i64) -> Value + 'static) {
    registry.register(id.to_string(), Strictness::Strict, move |args| {
        let a = match adapters::as_int64(&args[0]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let b = match adapters::as_int64(&args[1]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        f(a, b)
    });
}

fn uint_binop(registry: &mut Registry, id: &str, f: impl Fn(u64, u64) -> Value + 'static) {
    registry.register(id.to_string(), Strictness::Strict, move |args| {
        let a = match adapters::as_uint64(&args[0]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let b = match adapters::as_uint64(&args[1]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        f(a, b)
    });
}

fn double_binop(registry: &mut Registry, id: &str, f: impl Fn(f64, f64) -> Value + 'static) {
    registry.register(id.to_string(), Strictness::Strict, move |args| {
        let a = match adapters::as_double(&args[0]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let b = match adapters::as_double(&args[1]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        f(a, b)
    });
}

fn install_arithmetic(env: &mut Environment, registry: &mut Registry) -> Result<(), BuildError> {
    for (symbol, id_suffix) in [("+", "add"), ("-", "subtract"), ("*", "multiply")] {
        let name = format!("_{symbol}_");
        env.declare_function(
            name.clone(),
            Overload::global(format!("{id_suffix}_int64_int64"), vec![Type::Int, Type::Int], Type::Int),
        )?;
        env.declare_function(
            name.clone(),
            Overload::global(format!("{id_suffix}_uint64_uint64"), vec![Type::Uint, Type::Uint], Type::Uint),
        )?;
        env.declare_function(
            name,
            Overload::global(format!("{id_suffix}_double_double"), vec![Type::Double, Type::Double], Type::Double),
        )?;
    }
    env.declare_function("_+_", Overload::global("add_string_string", vec![Type::String, Type::String], Type::String))?;
    env.declare_function("_+_", Overload::global("add_bytes_bytes", vec![Type::Bytes, Type::Bytes], Type::Bytes))?;
    env.declare_function(
        "_+_",
        Overload::global("add_list_list", vec![Type::list(Type::Dyn), Type::list(Type::Dyn)], Type::list(Type::Dyn)),
    )?;
    env.declare_function("_/_", Overload::global("divide_int64_int64", vec![Type::Int, Type::Int], Type::Int))?;
    env.declare_function("_/_", Overload::global("divide_uint64_uint64", vec![Type::Uint, Type::Uint], Type::Uint))?;
    env.declare_function("_/_", Overload::global("divide_double_double", vec![Type::Double, Type::Double], Type::Double))?;
    env.declare_function("_%_", Overload::global("modulo_int64_int64", vec![Type::Int, Type::Int], Type::Int))?;
    env.declare_function("_%_", Overload::global("modulo_uint64_uint64", vec![Type::Uint, Type::Uint], Type::Uint))?;
    env.declare_function("-_", Overload::global("negate_int64", vec![Type::Int], Type::Int))?;
    env.declare_function("-_", Overload::global("negate_double", vec![Type::Double], Type::Double))?;

    int_binop(registry, "add_int64_int64", |a, b| a.checked_add(b).map(Value::Int).unwrap_or_else(|| Value::error("integer overflow")));
    uint_binop(registry, "add_uint64_uint64", |a, b| a.checked_add(b).map(Value::Uint).unwrap_or_else(|| Value::error("integer overflow")));
    double_binop(registry, "add_double_double", |a, b| Value::Double(a + b));
    registry.register("add_string_string", Strictness::Strict, |args| {
        let a = match adapters::as_string(&args[0]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let b = match adapters::as_string(&args[1]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        Value::string(format!("{a}{b}"))
    });
    registry.register("add_bytes_bytes", Strictness::Strict, |args| {
        let a = match adapters::as_bytes(&args[0]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let b = match adapters::as_bytes(&args[1]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        Value::bytes(a.iter().chain(b.iter()).copied().collect::<Vec<u8>>())
    });
    registry.register("add_list_list", Strictness::Strict, |args| {
        let a = match adapters::as_list(&args[0]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let b = match adapters::as_list(&args[1]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        Value::list(a.iter().cloned().chain(b.iter().cloned()).collect())
    });

    int_binop(registry, "subtract_int64_int64", |a, b| a.checked_sub(b).map(Value::Int).unwrap_or_else(|| Value::error("integer overflow")));
    uint_binop(registry, "subtract_uint64_uint64", |a, b| a.checked_sub(b).map(Value::Uint).unwrap_or_else(|| Value::error("unsigned underflow")));
    double_binop(registry, "subtract_double_double", |a, b| Value::Double(a - b));

    int_binop(registry, "multiply_int64_int64", |a, b| a.checked_mul(b).map(Value::Int).unwrap_or_else(|| Value::error("integer overflow")));
    uint_binop(registry, "multiply_uint64_uint64", |a, b| a.checked_mul(b).map(Value::Uint).unwrap_or_else(|| Value::error("integer overflow")));
    double_binop(registry, "multiply_double_double", |a, b| Value::Double(a * b));

    int_binop(registry, "divide_int64_int64", |a, b| if b == 0 { Value::error("division by zero") } else { Value::Int(a / b) });
    uint_binop(registry, "divide_uint64_uint64", |a, b| if b == 0 { Value::error("division by zero") } else { Value::Uint(a / b) });
    double_binop(registry, "divide_double_double", |a, b| Value::Double(a / b));

    int_binop(registry, "modulo_int64_int64", |a, b| if b == 0 { Value::error("modulus by zero") } else { Value::Int(a % b) });
    uint_binop(registry, "modulo_uint64_uint64", |a, b| if b == 0 { Value::error("modulus by zero") } else { Value::Uint(a % b) });

    registry.register("negate_int64", Strictness::Strict, |args| match adapters::as_int64(&args[0]) {
        Ok(i) => i.checked_neg().map(Value::Int).unwrap_or_else(|| Value::error("integer overflow")),
        Err(e) => e,
    });
    registry.register("negate_double", Strictness::Strict, |args| match adapters::as_double(&args[0]) {
        Ok(d) => Value::Double(-d),
        Err(e) => e,
    });
    registry.register("logical_not_bool", Strictness::Strict, |args| match adapters::as_bool(&args[0]) {
        Ok(b) => Value::Bool(!b),
        Err(e) => e,
    });

    Ok(())
}

fn install_comparisons(env: &mut Environment, registry: &mut Registry) -> Result<(), BuildError> {
    env.declare_function("_==_", Overload::global("equals", vec![Type::Dyn, Type::Dyn], Type::Bool))?;
    env.declare_function("_!=_", Overload::global("not_equals", vec![Type::Dyn, Type::Dyn], Type::Bool))?;
    env.declare_function("_<_", Overload::global("less_than", vec![Type::Dyn, Type::Dyn], Type::Bool))?;
    env.declare_function("_<=_", Overload::global("less_equals", vec![Type::Dyn, Type::Dyn], Type::Bool))?;
    env.declare_function("_>_", Overload::global("greater_than", vec![Type::Dyn, Type::Dyn], Type::Bool))?;
    env.declare_function("_>=_", Overload::global("greater_equals", vec![Type::Dyn, Type::Dyn], Type::Bool))?;

    registry.register("equals", Strictness::Strict, |args| equality::equal(&args[0], &args[1]));
    registry.register("not_equals", Strictness::Strict, |args| match equality::equal(&args[0], &args[1]) {
        Value::Bool(b) => Value::Bool(!b),
        other => other,
    });
    registry.register("less_than", Strictness::Strict, |args| compare_with(&args[0], &args[1], std::cmp::Ordering::is_lt));
    registry.register("less_equals", Strictness::Strict, |args| compare_with(&args[0], &args[1], std::cmp::Ordering::is_le));
    registry.register("greater_than", Strictness::Strict, |args| compare_with(&args[0], &args[1], std::cmp::Ordering::is_gt));
    registry.register("greater_equals", Strictness::Strict, |args| compare_with(&args[0], &args[1], std::cmp::Ordering::is_ge));

    Ok(())
}

fn compare_with(a: &Value, b: &Value, f: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    match equality::compare(a, b) {
        Some(ordering) => Value::Bool(f(ordering)),
        None => Value::error(format!("'{}' and '{}' are not comparable", a.dynamic_type(), b.dynamic_type())),
    }
}

fn install_containers(env: &mut Environment, registry: &mut Registry) -> Result<(), BuildError> {
    env.declare_function("_in_", Overload::global("in_list_or_map", vec![Type::Dyn, Type::Dyn], Type::Bool))?;
    env.declare_function("size", Overload::member("size_container", vec![Type::Dyn], Type::Int))?;

    registry.register("in_list_or_map", Strictness::Strict, |args| match equality::contains(&args[1], &args[0]) {
        Some(b) => Value::Bool(b),
        None => Value::error("'in' is not defined for this container"),
    });
    registry.register("size_container", Strictness::Strict, |args| match &args[0] {
        Value::String(s) => Value::Int(s.chars().count() as i64),
        Value::Bytes(b) => Value::Int(b.len() as i64),
        Value::List(items) => Value::Int(items.len() as i64),
        Value::Map(entries) => Value::Int(entries.len() as i64),
        other => Value::error(format!("size() is not defined for '{}'", other.dynamic_type())),
    });

    Ok(())
}

fn install_conversions(env: &mut Environment, registry: &mut Registry) -> Result<(), BuildError> {
    env.declare_function("string", Overload::global("to_string", vec![Type::Dyn], Type::String))?;
    env.declare_function("int", Overload::global("to_int", vec![Type::Dyn], Type::Int))?;
    env.declare_function("uint", Overload::global("to_uint", vec![Type::Dyn], Type::Uint))?;
    env.declare_function("double", Overload::global("to_double", vec![Type::Dyn], Type::Double))?;
    env.declare_function("bool", Overload::global("to_bool", vec![Type::Dyn], Type::Bool))?;
    env.declare_function("bytes", Overload::global("to_bytes", vec![Type::Dyn], Type::Bytes))?;
    env.declare_function("duration_value", Overload::global("to_duration_double", vec![Type::Double], Type::Duration))?;
    env.declare_function("duration_value", Overload::global("to_duration_int64", vec![Type::Int], Type::Duration))?;
    env.declare_function("duration_value", Overload::global("to_duration_string", vec![Type::String], Type::Duration))?;
    env.declare_function("type", Overload::global("type_of", vec![Type::Dyn], Type::Type))?;
    env.declare_function(
        "format",
        Overload::global("format_string", vec![Type::String, Type::list(Type::Dyn)], Type::String),
    )?;

    registry.register("to_string", Strictness::Strict, |args| Value::string(args[0].to_string()));
    registry.register("to_int", Strictness::Strict, |args| match &args[0] {
        Value::Int(i) => Value::Int(*i),
        Value::Uint(u) => i64::try_from(*u).map(Value::Int).unwrap_or_else(|_| Value::error("uint out of int range")),
        Value::Double(d) => Value::Int(*d as i64),
        Value::String(s) => s.parse::<i64>().map(Value::Int).unwrap_or_else(|_| Value::error(format!("cannot convert '{s}' to int"))),
        other => Value::error(format!("cannot convert '{}' to int", other.dynamic_type())),
    });
    registry.register("to_uint", Strictness::Strict, |args| match &args[0] {
        Value::Uint(u) => Value::Uint(*u),
        Value::Int(i) => u64::try_from(*i).map(Value::Uint).unwrap_or_else(|_| Value::error("int out of uint range")),
        Value::Double(d) => Value::Uint(*d as u64),
        Value::String(s) => s.parse::<u64>().map(Value::Uint).unwrap_or_else(|_| Value::error(format!("cannot convert '{s}' to uint"))),
        other => Value::error(format!("cannot convert '{}' to uint", other.dynamic_type())),
    });
    registry.register("to_double", Strictness::Strict, |args| match &args[0] {
        Value::Double(d) => Value::Double(*d),
        Value::Int(i) => Value::Double(*i as f64),
        Value::Uint(u) => Value::Double(*u as f64),
        Value::String(s) => s.parse::<f64>().map(Value::Double).unwrap_or_else(|_| Value::error(format!("cannot convert '{s}' to double"))),
        other => Value::error(format!("cannot convert '{}' to double", other.dynamic_type())),
    });
    registry.register("to_bool", Strictness::Strict, |args| match &args[0] {
        Value::Bool(b) => Value::Bool(*b),
        Value::String(s) => match s.as_ref() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::error(format!("cannot convert '{s}' to bool")),
        },
        other => Value::error(format!("cannot convert '{}' to bool", other.dynamic_type())),
    });
    registry.register("to_bytes", Strictness::Strict, |args| match &args[0] {
        Value::Bytes(b) => Value::Bytes(b.clone()),
        Value::String(s) => Value::bytes(s.as_bytes().to_vec()),
        other => Value::error(format!("cannot convert '{}' to bytes", other.dynamic_type())),
    });
    registry.register("type_of", Strictness::Strict, |args| Value::Type(args[0].dynamic_type()));
    registry.register("format_string", Strictness::Strict, |args| format_impl(args));
    registry.register("to_duration_double", Strictness::Strict, |args| match adapters::as_double(&args[0]) {
        Ok(d) => Value::Duration(Duration::from_fractional_seconds(d)),
        Err(e) => e,
    });
    registry.register("to_duration_int64", Strictness::Strict, |args| match adapters::as_int64(&args[0]) {
        Ok(i) => Value::Duration(Duration::new(i, 0)),
        Err(e) => e,
    });
    registry.register("to_duration_string", Strictness::Strict, |args| match adapters::as_string(&args[0]) {
        Ok(s) => s
            .trim()
            .strip_suffix('s')
            .unwrap_or(&s)
            .parse::<f64>()
            .map(|seconds| Value::Duration(Duration::from_fractional_seconds(seconds)))
            .unwrap_or_else(|_| Value::error(format!("cannot convert '{s}' to duration"))),
        Err(e) => e,
    });

    Ok(())
}

fn install_strings(env: &mut Environment, registry: &mut Registry) -> Result<(), BuildError> {
    env.declare_function("lowerAscii", Overload::member("lower_ascii_string", vec![Type::String], Type::String))?;
    env.declare_function(
        "split",
        Overload::member("split_string_string", vec![Type::String, Type::String], Type::list(Type::String)),
    )?;
    env.declare_function(
        "matches",
        Overload::member("matches_string_string", vec![Type::String, Type::String], Type::Bool),
    )?;

    registry.register("lower_ascii_string", Strictness::Strict, |args| match adapters::as_string(&args[0]) {
        Ok(s) => Value::string(s.to_ascii_lowercase()),
        Err(e) => e,
    });
    registry.register("split_string_string", Strictness::Strict, |args| {
        let receiver = match adapters::as_string(&args[0]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let sep = match adapters::as_string(&args[1]) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let parts = if sep.is_empty() {
            receiver.chars().map(|c| Value::string(c.to_string())).collect()
        } else {
            receiver.split(sep.as_ref()).map(Value::string).collect()
        };
        Value::list(parts)
    });
    registry.register("matches_string_string", Strictness::Strict, |_args| {
        Value::error("matches() requires a host-registered regex overload")
    });

    Ok(())
}

fn format_impl(args: &[Value]) -> Value {
    let fmt = match adapters::as_string(&args[0]) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let items = match adapters::as_list(&args[1]) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut out = String::new();
    let mut arg_iter = items.iter();
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(clause) = chars.next() else {
            return Value::error("format: trailing '%' with no clause");
        };
        match clause {
            '%' => out.push('%'),
            's' => {
                let Some(v) = arg_iter.next() else {
                    return Value::error("format: missing argument for %s");
                };
                out.push_str(&v.to_string());
            }
            'd' => {
                let Some(v) = arg_iter.next() else {
                    return Value::error("format: missing argument for %d");
                };
                match as_integral(v) {
                    Ok(i) => out.push_str(&i.to_string()),
                    Err(e) => return e,
                }
            }
            'f' => {
                let mut precision = None;
                if chars.peek() == Some(&'.') {
                    chars.next();
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied() {
                        if d.is_ascii_digit() {
                            digits.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    precision = digits.parse::<usize>().ok();
                }
                let Some(v) = arg_iter.next() else {
                    return Value::error("format: missing argument for %f");
                };
                let d = match adapters::as_double(v) {
                    Ok(d) => d,
                    Err(e) => return e,
                };
                match precision {
                    Some(p) => out.push_str(&format!("{d:.p$}")),
                    None => out.push_str(&d.to_string()),
                }
            }
            'e' => {
                let Some(v) = arg_iter.next() else {
                    return Value::error("format: missing argument for %e");
                };
                let d = match adapters::as_double(v) {
                    Ok(d) => d,
                    Err(e) => return e,
                };
                out.push_str(&format!("{d:e}"));
            }
            'b' => {
                let Some(v) = arg_iter.next() else {
                    return Value::error("format: missing argument for %b");
                };
                match v {
                    Value::Bool(b) => out.push_str(if *b { "1" } else { "0" }),
                    other => match as_integral(other) {
                        Ok(i) => out.push_str(&format!("{i:b}")),
                        Err(e) => return e,
                    },
                }
            }
            'x' => {
                let Some(v) = arg_iter.next() else {
                    return Value::error("format: missing argument for %x");
                };
                match as_integral(v) {
                    Ok(i) => out.push_str(&format!("{i:x}")),
                    Err(e) => return e,
                }
            }
            'X' => {
                let Some(v) = arg_iter.next() else {
                    return Value::error("format: missing argument for %X");
                };
                match as_integral(v) {
                    Ok(i) => out.push_str(&format!("{i:X}")),
                    Err(e) => return e,
                }
            }
            'o' => {
                let Some(v) = arg_iter.next() else {
                    return Value::error("format: missing argument for %o");
                };
                match as_integral(v) {
                    Ok(i) => out.push_str(&format!("{i:o}")),
                    Err(e) => return e,
                }
            }
            other => return Value::error(format!("format: unrecognized clause '%{other}'")),
        }
    }

    Value::string(out)
}

fn as_integral(v: &Value) -> Result<i128, Value> {
    match v {
        Value::Int(i) => Ok(*i as i128),
        Value::Uint(u) => Ok(*u as i128),
        other => Err(Value::error(format!("expected an integer, found '{}'", other.dynamic_type()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed() -> (Environment, Registry) {
        let mut env = Environment::new();
        let mut registry = Registry::new();
        install(&mut env, &mut registry).unwrap();
        (env, registry)
    }

    #[test]
    fn installs_without_overload_collisions() {
        let (_env, _registry) = installed();
    }

    #[test]
    fn int_addition_dispatches() {
        let (_env, registry) = installed();
        let overload = registry.get("add_int64_int64").unwrap();
        assert_eq!((overload.func)(&[Value::Int(1), Value::Int(2)]), Value::Int(3));
    }

    #[test]
    fn division_by_zero_is_an_error_value() {
        let (_env, registry) = installed();
        let overload = registry.get("divide_int64_int64").unwrap();
        assert!((overload.func)(&[Value::Int(1), Value::Int(0)]).is_error());
    }

    #[test]
    fn format_renders_decimal_and_string_clauses() {
        let (_env, registry) = installed();
        let overload = registry.get("format_string").unwrap();
        let result = (overload.func)(&[Value::string("%s has %d items"), Value::list(vec![Value::string("cart"), Value::Int(3)])]);
        assert_eq!(result, Value::string("cart has 3 items"));
    }

    #[test]
    fn lower_ascii_lowercases() {
        let (_env, registry) = installed();
        let overload = registry.get("lower_ascii_string").unwrap();
        assert_eq!((overload.func)(&[Value::string("HeLLo")]), Value::string("hello"));
    }

    #[test]
    fn split_on_empty_separator_splits_into_characters() {
        let (_env, registry) = installed();
        let overload = registry.get("split_string_string").unwrap();
        let result = (overload.func)(&[Value::string("ab"), Value::string("")]);
        assert_eq!(result, Value::list(vec![Value::string("a"), Value::string("b")]));
    }

    #[test]
    fn duration_value_converts_fractional_seconds() {
        let (_env, registry) = installed();
        let overload = registry.get("to_duration_double").unwrap();
        let result = (overload.func)(&[Value::Double(123.000000456)]);
        assert_eq!(result, Value::Duration(crate::value::Duration::new(123, 456)));
    }
}
