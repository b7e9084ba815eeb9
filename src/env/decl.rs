//! Variable and function declarations.
use crate::value::Type;

/// A variable declaration: a (possibly dotted, e.g. `request.auth`) name
/// bound to a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
    pub name: String,
    pub type_: Type,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, type_: Type) -> VariableDecl {
        VariableDecl {
            name: name.into(),
            type_,
        }
    }
}

/// Whether an overload receives arguments strictly (after error/unknown
/// propagation has already been applied to them) or lazily (sees the raw,
/// possibly error/unknown, values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Strict,
    Lazy,
}

/// One concrete signature of a function name.
///
/// For a member overload (`is_member`), `args[0]` is the receiver's type
/// and the remaining entries are the call-site arguments; this is what
/// lets two member overloads of the same call arity but different
/// receivers (e.g. `string.size()` vs. `list(dyn).size()`) coexist
/// without colliding.
///
/// Two overloads of the same function collide, and must be rejected at
/// registration, when they share a receiver flag and their argument lists
/// (receiver included) are pairwise mutually assignable (spec §3.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overload {
    pub id: String,
    pub is_member: bool,
    pub args: Vec<Type>,
    pub result: Type,
    pub strictness: Strictness,
}

impl Overload {
    pub fn global(id: impl Into<String>, args: Vec<Type>, result: Type) -> Overload {
        Overload {
            id: id.into(),
            is_member: false,
            args,
            result,
            strictness: Strictness::Strict,
        }
    }

    pub fn member(id: impl Into<String>, args: Vec<Type>, result: Type) -> Overload {
        Overload {
            id: id.into(),
            is_member: true,
            args,
            result,
            strictness: Strictness::Strict,
        }
    }

    pub fn lazy(mut self) -> Overload {
        self.strictness = Strictness::Lazy;
        self
    }

    /// Type-parameter names occurring anywhere in this overload's signature.
    pub fn type_params(&self) -> Vec<String> {
        let mut found = self.result.type_params();
        for arg in &self.args {
            for name in arg.type_params() {
                if !found.contains(&name) {
                    found.push(name);
                }
            }
        }
        found
    }

    /// Whether `self` and `other` collide under the spec's overload
    /// collision rule: same receiver flag, same arity, and pairwise
    /// mutually assignable argument types.
    pub fn collides_with(&self, other: &Overload) -> bool {
        if self.is_member != other.is_member || self.args.len() != other.args.len() {
            return false;
        }
        self.args
            .iter()
            .zip(&other.args)
            .all(|(a, b)| a.is_assignable_to(b) && b.is_assignable_to(a))
    }
}

/// A function name bound to a non-empty set of overloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub overloads: Vec<Overload>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>) -> FunctionDecl {
        FunctionDecl {
            name: name.into(),
            overloads: vec![],
        }
    }

    /// `arity` is the number of call-site arguments, excluding the
    /// receiver for member overloads.
    pub fn overloads_for_arity(&self, arity: usize, is_member: bool) -> Vec<&Overload> {
        self.overloads
            .iter()
            .filter(|o| {
                o.is_member == is_member
                    && o.args.len() == arity + if is_member { 1 } else { 0 }
            })
            .collect()
    }
}
