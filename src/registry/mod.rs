//! Host function registration and native-value adapters.
pub mod adapters;
pub mod builtins;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::env::Strictness;
use crate::value::Value;

pub type NativeFn = Rc<dyn Fn(&[Value]) -> Value>;

/// A registered native implementation of one overload id.
#[derive(Clone)]
pub struct RegisteredOverload {
    pub strictness: Strictness,
    pub func: NativeFn,
}

impl fmt::Debug for RegisteredOverload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredOverload").field("strictness", &self.strictness).finish_non_exhaustive()
    }
}

/// Indexes native implementations by overload id. Distinct from
/// [`crate::env::Environment`], which tracks the *declared signatures* the
/// checker reasons about; this only holds what the evaluator calls at
/// runtime.
#[derive(Clone, Default)]
pub struct Registry {
    overloads: HashMap<String, RegisteredOverload>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn register(&mut self, id: impl Into<String>, strictness: Strictness, func: impl Fn(&[Value]) -> Value + 'static) -> &mut Registry {
        self.overloads.insert(
            id.into(),
            RegisteredOverload {
                strictness,
                func: Rc::new(func),
            },
        );
        self
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredOverload> {
        self.overloads.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.overloads.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_invokes_a_native_overload() {
        let mut registry = Registry::new();
        registry.register("add_int64_int64", Strictness::Strict, |args| {
            let Value::Int(a) = &args[0] else { return Value::error("bad arg") };
            let Value::Int(b) = &args[1] else { return Value::error("bad arg") };
            Value::Int(a + b)
        });
        let overload = registry.get("add_int64_int64").unwrap();
        assert_eq!((overload.func)(&[Value::Int(1), Value::Int(2)]), Value::Int(3));
    }
}
