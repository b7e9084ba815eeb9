//! The value/type model: the runtime value sum, the type sum, equality,
//! assignability, and canonical rendering.
pub mod equality;
pub mod render;
pub mod types;

use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

pub use self::types::Type;

/// A stable node id assigned by the (external) parser. Every expression
/// node, and therefore every diagnostic and runtime error, is attributable
/// to one of these.
pub type AstId = i64;

/// A length of time, represented the way the value model specifies it:
/// whole seconds plus a sub-second nanosecond remainder. `nanos` is always
/// in `[0, 1_000_000_000)`; the sign lives entirely on `seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duration {
    pub seconds: i64,
    pub nanos: i32,
}

impl Duration {
    pub fn new(seconds: i64, nanos: i32) -> Duration {
        Duration { seconds, nanos }
    }

    pub fn from_fractional_seconds(value: f64) -> Duration {
        let seconds = value.trunc() as i64;
        let nanos = ((value.fract()) * 1_000_000_000.0).round() as i32;
        Duration { seconds, nanos }
    }

    pub fn as_fractional_seconds(&self) -> f64 {
        self.seconds as f64 + self.nanos as f64 / 1_000_000_000.0
    }
}

/// An instant on the UTC line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

/// A struct value, opaque to the core: a named record of fields the
/// evaluator never interprets beyond field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub type_name: Rc<str>,
    pub fields: Rc<IndexMap<String, Value>>,
}

/// A map key. The language restricts map keys to bool/int/uint/string;
/// this type encodes that restriction at the Rust level rather than
/// re-checking it on every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(Rc<str>),
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::Uint(u) => write!(f, "{u}"),
            MapKey::String(s) => write!(f, "{s}"),
        }
    }
}

pub type CelMap = IndexMap<MapKey, Value>;

/// A propagating failure. Carries a human-readable message and, when it
/// arose from evaluating a specific AST node, that node's id.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub message: String,
    pub id: Option<AstId>,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> ErrorValue {
        ErrorValue {
            message: message.into(),
            id: None,
        }
    }

    pub fn at(message: impl Into<String>, id: AstId) -> ErrorValue {
        ErrorValue {
            message: message.into(),
            id: Some(id),
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<error: {}>", self.message)
    }
}

/// A propagating set of unresolved attribute paths, used for partial
/// evaluation. Attribute patterns are dotted names such as `request.auth`;
/// the set is order-preserving so repeated unions render deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnknownValue {
    pub patterns: IndexSet<String>,
}

impl UnknownValue {
    pub fn single(pattern: impl Into<String>) -> UnknownValue {
        let mut patterns = IndexSet::new();
        patterns.insert(pattern.into());
        UnknownValue { patterns }
    }

    /// Commutative union of two unknown sets, preserving first-seen order.
    pub fn union(&self, other: &UnknownValue) -> UnknownValue {
        let mut patterns = self.patterns.clone();
        for p in &other.patterns {
            patterns.insert(p.clone());
        }
        UnknownValue { patterns }
    }
}

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<unknown: {}>", self.patterns.iter().cloned().collect::<Vec<_>>().join(", "))
    }
}

/// A runtime value.
///
/// `Value` is a closed sum over the language's built-in kinds. Host-defined
/// opaque types (§9 of the design notes) are not modeled here; a crate
/// embedding this evaluator that needs open-world extensibility is expected
/// to thread host values through [`StructValue`] or through its own
/// `Struct`-like convention, since this core never inspects struct payloads
/// beyond field lookup.
///
/// `PartialEq` here is structural equality (used for Rust-side comparisons
/// such as test assertions), not the language's `==`: the language-level
/// operator with cross-type numeric rules and error/unknown propagation
/// lives in [`equality::equal`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Rc<str>),
    Bytes(Rc<[u8]>),
    Duration(Duration),
    Timestamp(Timestamp),
    List(Rc<Vec<Value>>),
    Map(Rc<CelMap>),
    Struct(StructValue),
    Type(Type),
    Error(Rc<ErrorValue>),
    Unknown(UnknownValue),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(Rc::from(s.into()))
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(Rc::from(b.into()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn map(entries: CelMap) -> Value {
        Value::Map(Rc::new(entries))
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::new(ErrorValue::new(message)))
    }

    pub fn error_at(message: impl Into<String>, id: AstId) -> Value {
        Value::Error(Rc::new(ErrorValue::at(message, id)))
    }

    pub fn unknown(pattern: impl Into<String>) -> Value {
        Value::Unknown(UnknownValue::single(pattern))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    /// The dynamic type of this value.
    pub fn dynamic_type(&self) -> Type {
        match self {
            Value::Null => Type::NullType,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Uint(_) => Type::Uint,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Bytes(_) => Type::Bytes,
            Value::Duration(_) => Type::Duration,
            Value::Timestamp(_) => Type::Timestamp,
            Value::List(items) => {
                let elem = items.first().map(Value::dynamic_type).unwrap_or(Type::Dyn);
                Type::list(elem)
            }
            Value::Map(entries) => {
                let (k, v) = entries
                    .iter()
                    .next()
                    .map(|(k, v)| {
                        let kt = match k {
                            MapKey::Bool(_) => Type::Bool,
                            MapKey::Int(_) => Type::Int,
                            MapKey::Uint(_) => Type::Uint,
                            MapKey::String(_) => Type::String,
                        };
                        (kt, v.dynamic_type())
                    })
                    .unwrap_or((Type::Dyn, Type::Dyn));
                Type::map(k, v)
            }
            Value::Struct(s) => Type::Struct(s.type_name.to_string()),
            Value::Type(_) => Type::Type,
            Value::Error(_) => Type::Dyn,
            Value::Unknown(_) => Type::Dyn,
        }
    }

    /// The language's zero-value test: emptiness for containers, the
    /// conventional default for primitives.
    pub fn is_zero_value(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::Int(i) => *i == 0,
            Value::Uint(u) => *u == 0,
            Value::Double(d) => *d == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Duration(d) => d.seconds == 0 && d.nanos == 0,
            Value::Timestamp(t) => t.0 == DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            Value::Struct(s) => s.fields.is_empty(),
            Value::Type(_) | Value::Error(_) | Value::Unknown(_) => false,
        }
    }
}
