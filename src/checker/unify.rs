//! Type-parameter unification for overload resolution (spec §4.1).
use std::collections::HashMap;

use crate::value::Type;

/// Does `actual` fit the (possibly parameterized) declared type `decl`,
/// recording any type-parameter bindings discovered along the way?
///
/// This differs from [`Type::is_assignable_to`], which treats type
/// parameters as accepting anything without recording what they bound to;
/// unification needs the binding so the overload's declared result type
/// can be substituted afterwards.
pub fn unify(decl: &Type, actual: &Type, bindings: &mut HashMap<String, Type>) -> bool {
    if let Type::TypeParam(name) = decl {
        return match bindings.get(name) {
            Some(bound) => bound.is_assignable_to(actual) && actual.is_assignable_to(bound),
            None => {
                bindings.insert(name.clone(), actual.clone());
                true
            }
        };
    }

    if decl.type_params().is_empty() {
        return actual.is_assignable_to(decl);
    }

    match (decl, actual) {
        (Type::List(d), Type::List(a)) => unify(d, a, bindings),
        (Type::List(d), Type::Dyn) => unify(d, &Type::Dyn, bindings),
        (Type::Map(dk, dv), Type::Map(ak, av)) => unify(dk, ak, bindings) && unify(dv, av, bindings),
        (Type::Map(dk, dv), Type::Dyn) => unify(dk, &Type::Dyn, bindings) && unify(dv, &Type::Dyn, bindings),
        (Type::Wrapper(d), Type::NullType) => {
            let _ = unify(d, &Type::Dyn, bindings);
            true
        }
        (Type::Wrapper(d), _) => unify(d, actual, bindings),
        (Type::Opaque(dn, dps), Type::Opaque(an, aps)) if dn == an && dps.len() == aps.len() => {
            dps.iter().zip(aps).all(|(d, a)| unify(d, a, bindings))
        }
        (Type::Opaque(..), Type::Dyn) => true,
        (Type::Function { result: dr, args: da }, Type::Function { result: ar, args: aa }) if da.len() == aa.len() => {
            unify(dr, ar, bindings) && da.iter().zip(aa).all(|(d, a)| unify(d, a, bindings))
        }
        (Type::Function { .. }, Type::Dyn) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_a_fresh_type_parameter() {
        let mut bindings = HashMap::new();
        assert!(unify(&Type::TypeParam("T".into()), &Type::Int, &mut bindings));
        assert_eq!(bindings.get("T"), Some(&Type::Int));
    }

    #[test]
    fn rejects_inconsistent_rebinding() {
        let mut bindings = HashMap::new();
        assert!(unify(&Type::TypeParam("T".into()), &Type::Int, &mut bindings));
        assert!(!unify(&Type::TypeParam("T".into()), &Type::String, &mut bindings));
    }

    #[test]
    fn unifies_through_list_parameter() {
        let mut bindings = HashMap::new();
        assert!(unify(&Type::list(Type::TypeParam("T".into())), &Type::list(Type::String), &mut bindings));
        assert_eq!(bindings.get("T"), Some(&Type::String));
    }

    #[test]
    fn concrete_decl_falls_back_to_assignability() {
        let mut bindings = HashMap::new();
        assert!(unify(&Type::Dyn, &Type::Int, &mut bindings));
        assert!(!unify(&Type::Int, &Type::String, &mut bindings));
    }
}
