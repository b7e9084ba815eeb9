//! The declaration environment: variable decls, function decls with
//! overload sets, the container namespace, and the set of accepted
//! type-parameter names.
mod decl;
mod error;

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

pub use self::decl::{FunctionDecl, Overload, Strictness, VariableDecl};
pub use self::error::BuildError;

use crate::value::Type;

/// A mutable builder for the set of names a checked expression may
/// reference: variables, functions (as overload sets), the container
/// namespace used for qualified-name resolution, and the type-parameter
/// names the checker is allowed to leave unresolved (e.g. when checking
/// the body of a generic macro-expanded comprehension).
#[derive(Debug, Clone, Default)]
pub struct Environment {
    variables: HashMap<String, Type>,
    functions: HashMap<String, FunctionDecl>,
    container: Vec<String>,
    accepted_type_params: HashSet<String>,
}

impl Environment {
    pub fn new() -> Environment {
        Environment::default()
    }

    /// Set the container namespace, e.g. `"com.example"`. Qualified-name
    /// resolution (§4.1) tries a candidate prefixed by each suffix of this
    /// path, longest first.
    pub fn with_container(mut self, container: impl AsRef<str>) -> Environment {
        let container = container.as_ref();
        self.container = if container.is_empty() {
            vec![]
        } else {
            container.split('.').map(str::to_owned).collect()
        };
        self
    }

    pub fn accept_type_param(mut self, name: impl Into<String>) -> Environment {
        self.accepted_type_params.insert(name.into());
        self
    }

    pub fn accepts_type_param(&self, name: &str) -> bool {
        self.accepted_type_params.contains(name)
    }

    /// Declare a variable. Errors if a variable of the same name is
    /// already declared (build errors, unlike check issues, are reported
    /// synchronously rather than collected).
    pub fn declare_variable(&mut self, decl: VariableDecl) -> Result<(), BuildError> {
        trace!("declaring variable '{}' : {}", decl.name, decl.type_);
        if self.variables.contains_key(&decl.name) {
            return Err(BuildError::new(format!(
                "variable '{}' is already declared",
                decl.name
            )));
        }
        self.variables.insert(decl.name.clone(), decl.type_);
        Ok(())
    }

    /// Declare a function overload, rejecting collisions per spec §3.3:
    /// same receiver flag, same arity, pairwise mutually-assignable args.
    pub fn declare_function(&mut self, name: impl Into<String>, overload: Overload) -> Result<(), BuildError> {
        let name = name.into();
        debug!("declaring overload '{}' for function '{}'", overload.id, name);

        for param in overload.type_params() {
            if !self.accepted_type_params.contains(&param) {
                return Err(BuildError::new(format!(
                    "overload '{}' uses unaccepted type parameter '{param}'",
                    overload.id
                )));
            }
        }

        let decl = self
            .functions
            .entry(name.clone())
            .or_insert_with(|| FunctionDecl::new(name.clone()));

        for existing in &decl.overloads {
            if existing.id == overload.id {
                if existing == &overload {
                    return Ok(());
                }
                return Err(BuildError::new(format!(
                    "overload id '{}' already registered with a different signature",
                    overload.id
                )));
            }
            if existing.collides_with(&overload) {
                return Err(BuildError::new(format!(
                    "overload '{}' collides with existing overload '{}' on function '{name}'",
                    overload.id, existing.id
                )));
            }
        }

        decl.overloads.push(overload);
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<&Type> {
        self.variables.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.get(name)
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn contains_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Find a declared overload by its id, regardless of which function
    /// name it is filed under. Used by the evaluator to pick, among a
    /// `Call` step's candidate overload ids, the one whose declared
    /// argument types fit the concrete runtime values.
    pub fn overload_by_id(&self, id: &str) -> Option<&Overload> {
        self.functions.values().find_map(|decl| decl.overloads.iter().find(|o| o.id == id))
    }

    /// Suffixes of the container path, longest first, ending with the
    /// empty prefix. Used by the checker to build qualified-name
    /// candidates for an identifier chain.
    pub fn container_prefixes(&self) -> Vec<String> {
        let mut prefixes = vec![];
        for start in 0..self.container.len() {
            prefixes.push(self.container[start..].join("."));
        }
        prefixes.push(String::new());
        prefixes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_variable() {
        let mut env = Environment::new();
        env.declare_variable(VariableDecl::new("x", Type::Int)).unwrap();
        let err = env.declare_variable(VariableDecl::new("x", Type::String)).unwrap_err();
        assert!(err.message.contains("already declared"));
    }

    #[test]
    fn rejects_colliding_overloads() {
        let mut env = Environment::new();
        env.declare_function("f", Overload::global("f_int", vec![Type::Int], Type::Bool))
            .unwrap();
        let err = env
            .declare_function("f", Overload::global("f_int_again", vec![Type::Int], Type::String))
            .unwrap_err();
        assert!(err.message.contains("collides"));
    }

    #[test]
    fn distinct_receiver_flags_do_not_collide() {
        let mut env = Environment::new();
        env.declare_function("f", Overload::global("f_global", vec![Type::Int], Type::Bool))
            .unwrap();
        env.declare_function("f", Overload::member("f_member", vec![Type::Int], Type::Bool))
            .unwrap();
        assert_eq!(env.function("f").unwrap().overloads.len(), 2);
    }

    #[test]
    fn dyn_overloads_always_collide() {
        let mut env = Environment::new();
        env.declare_function("f", Overload::global("f_dyn", vec![Type::Dyn], Type::Bool))
            .unwrap();
        let err = env
            .declare_function("f", Overload::global("f_int", vec![Type::Int], Type::Bool))
            .unwrap_err();
        assert!(err.message.contains("collides"));
    }

    #[test]
    fn container_prefixes_are_longest_first() {
        let env = Environment::new().with_container("a.b.c");
        assert_eq!(env.container_prefixes(), vec!["a.b.c", "b.c", "c", ""]);
    }

    #[test]
    fn overload_by_id_finds_across_function_names() {
        let mut env = Environment::new();
        env.declare_function("f", Overload::global("f_int", vec![Type::Int], Type::Bool)).unwrap();
        env.declare_function("g", Overload::global("g_string", vec![Type::String], Type::Bool)).unwrap();
        assert_eq!(env.overload_by_id("g_string").unwrap().args, vec![Type::String]);
        assert!(env.overload_by_id("missing").is_none());
    }

    #[test]
    fn rejects_unaccepted_type_parameter() {
        let mut env = Environment::new();
        let err = env
            .declare_function(
                "identity",
                Overload::global("identity_T", vec![Type::TypeParam("T".into())], Type::TypeParam("T".into())),
            )
            .unwrap_err();
        assert!(err.message.contains("unaccepted"));
    }
}
