//! The type sum and its assignability relation.
use std::fmt::{self, Display};

/// A type in the expression language.
///
/// `Type` values are themselves first-class (see [`crate::value::Value::Type`]),
/// so this enum doubles as the runtime representation of a type witness.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    NullType,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Duration,
    Timestamp,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    /// A host-defined parameterized type, e.g. a protobuf message kind.
    Opaque(String, Vec<Type>),
    Function {
        result: Box<Type>,
        args: Vec<Type>,
    },
    TypeParam(String),
    Struct(String),
    /// A null-admitting wrapper around a primitive, e.g. `wrapper(int)`.
    Wrapper(Box<Type>),
    /// The type of type values themselves.
    Type,
    /// The top type: accepts and is accepted by everything.
    Dyn,
}

impl Type {
    pub fn list(element: Type) -> Type {
        Type::List(Box::new(element))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn wrapper(primitive: Type) -> Type {
        Type::Wrapper(Box::new(primitive))
    }

    pub fn function(result: Type, args: Vec<Type>) -> Type {
        Type::Function {
            result: Box::new(result),
            args,
        }
    }

    /// Whether a value of type `self` may be used wherever `to` is expected.
    ///
    /// This is the `to ← from` relation of the spec: reflexive, `dyn`
    /// absorbs and accepts anything, wrappers admit `null_type` in addition
    /// to their inner primitive, parameterized types require matching name
    /// and componentwise-assignable parameters, and type parameters unify
    /// with anything.
    pub fn is_assignable_to(&self, to: &Type) -> bool {
        match (self, to) {
            (a, b) if a == b => true,
            (_, Type::Dyn) | (Type::Dyn, _) => true,
            (Type::TypeParam(_), _) | (_, Type::TypeParam(_)) => true,
            (Type::NullType, Type::Wrapper(_)) => true,
            (from, Type::Wrapper(inner)) => from.is_assignable_to(inner),
            (Type::List(a), Type::List(b)) => a.is_assignable_to(b) && b.is_assignable_to(a),
            (Type::Map(ak, av), Type::Map(bk, bv)) => {
                ak.is_assignable_to(bk) && bk.is_assignable_to(ak) && av.is_assignable_to(bv) && bv.is_assignable_to(av)
            }
            (
                Type::Opaque(an, aps),
                Type::Opaque(bn, bps),
            ) => an == bn && aps.len() == bps.len() && aps.iter().zip(bps).all(|(a, b)| a.is_assignable_to(b) && b.is_assignable_to(a)),
            (
                Type::Function { result: ar, args: aa },
                Type::Function { result: br, args: ba },
            ) => {
                ar.is_assignable_to(br)
                    && aa.len() == ba.len()
                    && aa.iter().zip(ba).all(|(a, b)| a.is_assignable_to(b))
            }
            _ => false,
        }
    }

    /// The set of type-parameter names occurring anywhere in this type.
    pub fn type_params(&self) -> Vec<String> {
        let mut found = vec![];
        self.collect_type_params(&mut found);
        found
    }

    fn collect_type_params(&self, out: &mut Vec<String>) {
        match self {
            Type::TypeParam(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Type::List(inner) | Type::Wrapper(inner) => inner.collect_type_params(out),
            Type::Map(k, v) => {
                k.collect_type_params(out);
                v.collect_type_params(out);
            }
            Type::Opaque(_, params) => {
                for p in params {
                    p.collect_type_params(out);
                }
            }
            Type::Function { result, args } => {
                result.collect_type_params(out);
                for a in args {
                    a.collect_type_params(out);
                }
            }
            _ => {}
        }
    }

    /// True when this type contains no unresolved type parameters.
    pub fn is_concrete(&self) -> bool {
        self.type_params().is_empty()
    }

    /// Substitute every occurrence of a bound type parameter with its
    /// inferred type. Used once overload resolution has unified a set of
    /// type-parameter bindings against concrete argument types.
    pub fn substitute(&self, bindings: &std::collections::HashMap<String, Type>) -> Type {
        match self {
            Type::TypeParam(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::List(inner) => Type::list(inner.substitute(bindings)),
            Type::Wrapper(inner) => Type::wrapper(inner.substitute(bindings)),
            Type::Map(k, v) => Type::map(k.substitute(bindings), v.substitute(bindings)),
            Type::Opaque(name, params) => {
                Type::Opaque(name.clone(), params.iter().map(|p| p.substitute(bindings)).collect())
            }
            Type::Function { result, args } => Type::Function {
                result: Box::new(result.substitute(bindings)),
                args: args.iter().map(|a| a.substitute(bindings)).collect(),
            },
            other => other.clone(),
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::NullType => write!(f, "null_type"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Uint => write!(f, "uint"),
            Type::Double => write!(f, "double"),
            Type::String => write!(f, "string"),
            Type::Bytes => write!(f, "bytes"),
            Type::Duration => write!(f, "duration"),
            Type::Timestamp => write!(f, "timestamp"),
            Type::List(elem) => write!(f, "list({elem})"),
            Type::Map(k, v) => write!(f, "map({k}, {v})"),
            Type::Opaque(name, params) => {
                write!(f, "{name}")?;
                if !params.is_empty() {
                    write!(f, "(")?;
                    for (i, p) in params.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{p}")?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            Type::Function { result, args } => {
                write!(f, "function(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ") -> {result}")
            }
            Type::TypeParam(name) => write!(f, "{name}"),
            Type::Struct(name) => write!(f, "{name}"),
            Type::Wrapper(inner) => write!(f, "wrapper({inner})"),
            Type::Type => write!(f, "type"),
            Type::Dyn => write!(f, "dyn"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_types_are_assignable() {
        assert!(Type::Int.is_assignable_to(&Type::Int));
    }

    #[test]
    fn dyn_accepts_and_is_accepted_by_anything() {
        assert!(Type::Int.is_assignable_to(&Type::Dyn));
        assert!(Type::Dyn.is_assignable_to(&Type::String));
    }

    #[test]
    fn wrapper_admits_null_and_inner_primitive() {
        let wrapped = Type::wrapper(Type::Int);
        assert!(Type::NullType.is_assignable_to(&wrapped));
        assert!(Type::Int.is_assignable_to(&wrapped));
        assert!(!Type::String.is_assignable_to(&wrapped));
    }

    #[test]
    fn parameterized_types_are_invariant_in_their_parameter() {
        let list_int = Type::list(Type::Int);
        let list_dyn = Type::list(Type::Dyn);
        assert!(list_int.is_assignable_to(&list_dyn));
        assert!(list_dyn.is_assignable_to(&list_int));
        assert!(!Type::list(Type::Int).is_assignable_to(&Type::list(Type::String)));
    }

    #[test]
    fn type_param_unifies_with_anything() {
        assert!(Type::Int.is_assignable_to(&Type::TypeParam("T".into())));
        assert!(Type::TypeParam("T".into()).is_assignable_to(&Type::String));
    }

    #[test]
    fn substitute_replaces_bound_parameters() {
        let mut bindings = std::collections::HashMap::new();
        bindings.insert("T".to_owned(), Type::Int);
        let ty = Type::list(Type::TypeParam("T".into()));
        assert_eq!(ty.substitute(&bindings), Type::list(Type::Int));
    }
}
