//! Native adapters between host-level Rust types and [`Value`].
use std::rc::Rc;

use crate::value::{CelMap, Value};

pub fn as_bool(v: &Value) -> Result<bool, Value> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => Err(type_mismatch("bool", other)),
    }
}

pub fn as_int64(v: &Value) -> Result<i64, Value> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(type_mismatch("int", other)),
    }
}

pub fn as_uint64(v: &Value) -> Result<u64, Value> {
    match v {
        Value::Uint(u) => Ok(*u),
        other => Err(type_mismatch("uint", other)),
    }
}

pub fn as_double(v: &Value) -> Result<f64, Value> {
    match v {
        Value::Double(d) => Ok(*d),
        other => Err(type_mismatch("double", other)),
    }
}

pub fn as_string(v: &Value) -> Result<Rc<str>, Value> {
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Err(type_mismatch("string", other)),
    }
}

pub fn as_bytes(v: &Value) -> Result<Rc<[u8]>, Value> {
    match v {
        Value::Bytes(b) => Ok(b.clone()),
        other => Err(type_mismatch("bytes", other)),
    }
}

pub fn as_list(v: &Value) -> Result<Rc<Vec<Value>>, Value> {
    match v {
        Value::List(items) => Ok(items.clone()),
        other => Err(type_mismatch("list", other)),
    }
}

pub fn as_map(v: &Value) -> Result<Rc<CelMap>, Value> {
    match v {
        Value::Map(entries) => Ok(entries.clone()),
        other => Err(type_mismatch("map", other)),
    }
}

fn type_mismatch(expected: &str, found: &Value) -> Value {
    Value::error(format!("expected {expected}, found {}", found.dynamic_type()))
}
