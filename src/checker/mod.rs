//! Name resolution, overload resolution, and type inference.
mod issue;
mod unify;

use std::collections::HashMap;

use log::{debug, trace, warn};

pub use self::issue::{CheckIssue, CheckResult, Reference, Severity};

use crate::ast::{Expr, ExprKind};
use crate::env::Environment;
use crate::limits::Limits;
use crate::value::Type;

/// Check `ast` against `env` using default [`Limits`].
pub fn check(ast: &Expr, env: &Environment) -> CheckResult {
    check_with_limits(ast, env, &Limits::default())
}

/// Check `ast` against `env`, enforcing `limits`'s complexity limit during
/// traversal.
pub fn check_with_limits(ast: &Expr, env: &Environment, limits: &Limits) -> CheckResult {
    debug!("entering check");
    let mut checker = Checker {
        env,
        limits: *limits,
        node_count: 0,
        budget_exceeded: false,
        scope: vec![],
        types: HashMap::new(),
        references: HashMap::new(),
        issues: vec![],
    };
    checker.check_expr(ast);
    debug!("leaving check with {} issue(s)", checker.issues.len());
    CheckResult {
        types: checker.types,
        references: checker.references,
        issues: checker.issues,
    }
}

struct Checker<'a> {
    env: &'a Environment,
    limits: Limits,
    node_count: usize,
    budget_exceeded: bool,
    /// Stack of local scopes (comprehension bodies, `cel.bind` bodies);
    /// each maps an unqualified local name to its inferred type and
    /// whether it's a lazy (`cel.bind`) binding.
    scope: Vec<HashMap<String, (Type, bool)>>,
    types: HashMap<crate::value::AstId, Type>,
    references: HashMap<crate::value::AstId, Reference>,
    issues: Vec<CheckIssue>,
}

impl<'a> Checker<'a> {
    fn issue(&mut self, severity: Severity, message: impl Into<String>, id: crate::value::AstId) {
        self.issues.push(CheckIssue::new(severity, message, id));
    }

    fn record(&mut self, id: crate::value::AstId, ty: Type, reference: Option<Reference>) {
        self.types.insert(id, ty);
        if let Some(reference) = reference {
            self.references.insert(id, reference);
        }
    }

    fn local(&self, name: &str) -> Option<(Type, bool)> {
        self.scope.iter().rev().find_map(|frame| frame.get(name).cloned())
    }

    fn check_expr(&mut self, expr: &Expr) -> Type {
        self.node_count += 1;
        if self.node_count > self.limits.complexity_limit {
            if !self.budget_exceeded {
                self.budget_exceeded = true;
                self.issue(Severity::Error, "expression exceeds the checker's complexity limit", expr.id);
            }
            return Type::Dyn;
        }
        trace!("checking node {}", expr.id);

        let ty = match &expr.kind {
            ExprKind::Const(literal) => self.check_const(literal),
            ExprKind::Ident(name) => self.check_qualified_chain(expr.id, &[name.clone()]),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => self.check_select(expr, operand, field, *test_only),
            ExprKind::Call { target, function, args } => self.check_call(expr, target.as_deref(), function, args),
            ExprKind::List {
                elements,
                optional_indices,
            } => self.check_list(elements, optional_indices),
            ExprKind::Map { type_name, entries } => self.check_map_or_struct(type_name.as_deref(), entries),
            ExprKind::Comprehension(c) => self.check_comprehension(expr.id, c),
            ExprKind::Bind { name, init, body } => self.check_bind(name, init, body),
        };

        self.types.insert(expr.id, ty.clone());
        ty
    }

    fn check_const(&self, literal: &crate::ast::Literal) -> Type {
        use crate::ast::Literal;
        match literal {
            Literal::Null => Type::NullType,
            Literal::Bool(_) => Type::Bool,
            Literal::Int(_) => Type::Int,
            Literal::Uint(_) => Type::Uint,
            Literal::Double(_) => Type::Double,
            Literal::String(_) => Type::String,
            Literal::Bytes(_) => Type::Bytes,
            Literal::Duration(_) => Type::Duration,
            Literal::Timestamp(_) => Type::Timestamp,
        }
    }

    /// Resolves an identifier/select chain per the name-resolution rule:
    /// try qualified variable candidates (longest chain first, each
    /// prefixed by each suffix of the container path); on failure, fall
    /// back to a comprehension-scoped local for a bare (length-1) name,
    /// since a qualified declaration always wins over a same-named local.
    fn check_qualified_chain(&mut self, id: crate::value::AstId, chain: &[String]) -> Type {
        if let Some((matched_len, qualified_name, var_type)) = self.resolve_variable_candidate(chain) {
            let result = self.fold_remaining_selects(id, var_type, &chain[matched_len..]);
            self.record(id, result.clone(), Some(Reference::Variable(qualified_name)));
            return result;
        }

        if let Some((local_type, is_lazy)) = self.local(&chain[0]) {
            let result = self.fold_remaining_selects(id, local_type, &chain[1..]);
            let reference = if is_lazy {
                Reference::Lazy(chain[0].clone())
            } else {
                Reference::Local(chain[0].clone())
            };
            self.record(id, result.clone(), Some(reference));
            return result;
        }

        self.issue(Severity::Error, format!("undeclared reference to '{}'", chain.join(".")), id);
        self.record(id, Type::Dyn, None);
        Type::Dyn
    }

    fn resolve_variable_candidate(&self, chain: &[String]) -> Option<(usize, String, Type)> {
        for len in (1..=chain.len()).rev() {
            let name = chain[..len].join(".");
            for prefix in self.env.container_prefixes() {
                let candidate = if prefix.is_empty() { name.clone() } else { format!("{prefix}.{name}") };
                if let Some(ty) = self.env.variable(&candidate) {
                    return Some((len, candidate, ty.clone()));
                }
            }
        }
        None
    }

    fn fold_remaining_selects(&mut self, id: crate::value::AstId, base: Type, remaining: &[String]) -> Type {
        let mut current = base;
        for _ in remaining {
            current = match &current {
                Type::Map(_, v) => (**v).clone(),
                Type::Struct(_) | Type::Dyn => Type::Dyn,
                other => {
                    self.issue(Severity::Error, format!("cannot select a field on type '{other}'"), id);
                    Type::Dyn
                }
            };
        }
        current
    }

    fn check_select(&mut self, expr: &Expr, operand: &Expr, field: &str, test_only: bool) -> Type {
        if !test_only {
            if let Some(chain) = expr.qualified_name_chain() {
                return self.check_qualified_chain(expr.id, &chain);
            }
        }

        let operand_ty = self.check_expr(operand);
        if test_only {
            return Type::Bool;
        }
        match &operand_ty {
            Type::Map(_, v) => (**v).clone(),
            Type::Struct(_) | Type::Dyn => Type::Dyn,
            other => {
                self.issue(
                    Severity::Error,
                    format!("cannot select field '{field}' on type '{other}'"),
                    expr.id,
                );
                Type::Dyn
            }
        }
    }

    fn check_call(&mut self, expr: &Expr, target: Option<&Expr>, function: &str, args: &[Expr]) -> Type {
        let target_ty = target.map(|t| self.check_expr(t));
        let arg_tys: Vec<Type> = args.iter().map(|a| self.check_expr(a)).collect();

        let is_member = target.is_some();
        let candidate_names: Vec<String> = if is_member {
            vec![function.to_string()]
        } else {
            self.env
                .container_prefixes()
                .into_iter()
                .map(|p| if p.is_empty() { function.to_string() } else { format!("{p}.{function}") })
                .collect()
        };

        let mut full_args = vec![];
        if let Some(t) = target_ty {
            full_args.push(t);
        }
        full_args.extend(arg_tys);

        let mut any_declared = false;
        for name in &candidate_names {
            let Some(decl) = self.env.function(name) else { continue };
            any_declared = true;
            let overloads = decl.overloads_for_arity(args.len(), is_member);
            if overloads.is_empty() {
                continue;
            }
            let mut applicable = vec![];
            for ov in overloads {
                let mut bindings = HashMap::new();
                if full_args.len() == ov.args.len() && full_args.iter().zip(&ov.args).all(|(actual, decl_ty)| unify::unify(decl_ty, actual, &mut bindings)) {
                    applicable.push((ov, ov.result.substitute(&bindings)));
                }
            }
            if applicable.is_empty() {
                continue;
            }
            let ids: Vec<String> = applicable.iter().map(|(ov, _)| ov.id.clone()).collect();
            let mut result: Option<Type> = None;
            for (_, ty) in &applicable {
                result = Some(match result {
                    None => ty.clone(),
                    Some(prev) if prev == *ty => prev,
                    Some(_) => Type::Dyn,
                });
            }
            let result = result.unwrap_or(Type::Dyn);
            self.record(expr.id, result.clone(), Some(Reference::Overloads(ids)));
            return result;
        }

        if any_declared {
            self.issue(
                Severity::Error,
                format!("no matching overload for '{function}' with {} argument(s)", args.len()),
                expr.id,
            );
        } else {
            self.issue(Severity::Error, format!("undeclared reference to '{function}'"), expr.id);
        }
        self.record(expr.id, Type::Dyn, None);
        Type::Dyn
    }

    fn check_list(&mut self, elements: &[Expr], optional_indices: &[usize]) -> Type {
        let _ = optional_indices;
        let mut element_ty: Option<Type> = None;
        for element in elements {
            let ty = self.check_expr(element);
            element_ty = Some(match element_ty {
                None => ty,
                Some(prev) if prev == ty => prev,
                Some(_) => Type::Dyn,
            });
        }
        Type::list(element_ty.unwrap_or(Type::Dyn))
    }

    fn check_map_or_struct(&mut self, type_name: Option<&str>, entries: &[crate::ast::Entry]) -> Type {
        use crate::ast::EntryKey;

        if let Some(type_name) = type_name {
            for entry in entries {
                self.check_expr(&entry.value);
                if let EntryKey::Expr(key_expr) = &entry.key {
                    self.check_expr(key_expr);
                }
            }
            return Type::Struct(type_name.to_string());
        }

        let mut key_ty: Option<Type> = None;
        let mut value_ty: Option<Type> = None;
        for entry in entries {
            let k = match &entry.key {
                EntryKey::Expr(key_expr) => self.check_expr(key_expr),
                EntryKey::Field(name) => {
                    warn!("map literal entry uses a bare field name '{name}' without a key expression");
                    Type::String
                }
            };
            let v = self.check_expr(&entry.value);
            key_ty = Some(match key_ty {
                None => k,
                Some(prev) if prev == k => prev,
                Some(_) => Type::Dyn,
            });
            value_ty = Some(match value_ty {
                None => v,
                Some(prev) if prev == v => prev,
                Some(_) => Type::Dyn,
            });
        }
        Type::map(key_ty.unwrap_or(Type::Dyn), value_ty.unwrap_or(Type::Dyn))
    }

    fn check_comprehension(&mut self, id: crate::value::AstId, c: &crate::ast::Comprehension) -> Type {
        let iter_ty = self.check_expr(&c.iter_range);
        let element_ty = match &iter_ty {
            Type::List(e) => (**e).clone(),
            Type::Map(k, _) => (**k).clone(),
            Type::Dyn => Type::Dyn,
            other => {
                self.issue(
                    Severity::Error,
                    format!("comprehension iter-range must be a list or map, found '{other}'"),
                    c.iter_range.id,
                );
                Type::Dyn
            }
        };
        let accu_ty = self.check_expr(&c.accu_init);

        self.scope.push(HashMap::new());
        {
            let frame = self.scope.last_mut().expect("just pushed");
            frame.insert(c.iter_var.clone(), (element_ty, false));
            frame.insert(c.accu_var.clone(), (accu_ty.clone(), false));
        }

        let cond_ty = self.check_expr(&c.loop_condition);
        if cond_ty != Type::Dyn && !cond_ty.is_assignable_to(&Type::Bool) {
            self.issue(
                Severity::Error,
                format!("comprehension loop condition must be bool, found '{cond_ty}'"),
                c.loop_condition.id,
            );
        }
        let step_ty = self.check_expr(&c.loop_step);
        if !step_ty.is_assignable_to(&accu_ty) {
            self.issue(
                Severity::Error,
                format!("comprehension loop step type '{step_ty}' is not assignable to accumulator type '{accu_ty}'"),
                c.loop_step.id,
            );
        }
        let result_ty = self.check_expr(&c.result);
        self.scope.pop();

        self.record(id, result_ty.clone(), None);
        result_ty
    }

    fn check_bind(&mut self, name: &str, init: &Expr, body: &Expr) -> Type {
        let init_ty = self.check_expr(init);
        self.scope.push(HashMap::new());
        self.scope.last_mut().expect("just pushed").insert(name.to_string(), (init_ty, true));
        let body_ty = self.check_expr(body);
        self.scope.pop();
        body_ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Comprehension, Entry, Expr, Literal};
    use crate::env::{Overload, VariableDecl};

    #[test]
    fn undeclared_reference_is_an_error() {
        let env = Environment::new();
        let ast = Expr::ident(1, "x");
        let result = check(&ast, &env);
        assert!(!result.is_valid());
        assert_eq!(result.types.get(&1), Some(&Type::Dyn));
    }

    #[test]
    fn declared_variable_resolves() {
        let mut env = Environment::new();
        env.declare_variable(VariableDecl::new("x", Type::Int)).unwrap();
        let ast = Expr::ident(1, "x");
        let result = check(&ast, &env);
        assert!(result.is_valid());
        assert_eq!(result.types.get(&1), Some(&Type::Int));
        assert_eq!(result.references.get(&1), Some(&Reference::Variable("x".to_string())));
    }

    #[test]
    fn qualified_declaration_wins_over_comprehension_variable() {
        let mut env = Environment::new();
        env.declare_variable(VariableDecl::new("x.y", Type::String)).unwrap();

        let comprehension = Comprehension {
            iter_var: "x".to_string(),
            iter_range: Box::new(Expr::list(1, vec![Expr::constant(2, Literal::Int(1))], vec![])),
            accu_var: "out".to_string(),
            accu_init: Box::new(Expr::constant(3, Literal::Bool(false))),
            loop_condition: Box::new(Expr::constant(4, Literal::Bool(true))),
            loop_step: Box::new(Expr::constant(5, Literal::Bool(true))),
            result: Box::new(Expr::select(6, Expr::ident(7, "x"), "y", false)),
        };
        let ast = Expr::comprehension(8, comprehension);

        let result = check(&ast, &env);
        assert!(result.is_valid());
        assert_eq!(result.types.get(&6), Some(&Type::String));
        assert_eq!(result.references.get(&6), Some(&Reference::Variable("x.y".to_string())));
    }

    #[test]
    fn unqualified_name_falls_back_to_comprehension_variable() {
        let env = Environment::new();
        let comprehension = Comprehension {
            iter_var: "x".to_string(),
            iter_range: Box::new(Expr::list(1, vec![Expr::constant(2, Literal::Int(1))], vec![])),
            accu_var: "out".to_string(),
            accu_init: Box::new(Expr::constant(3, Literal::Bool(false))),
            loop_condition: Box::new(Expr::constant(4, Literal::Bool(true))),
            loop_step: Box::new(Expr::constant(5, Literal::Bool(true))),
            result: Box::new(Expr::ident(6, "x")),
        };
        let ast = Expr::comprehension(7, comprehension);
        let result = check(&ast, &env);
        assert!(result.is_valid());
        assert_eq!(result.types.get(&6), Some(&Type::Int));
        assert_eq!(result.references.get(&6), Some(&Reference::Local("x".to_string())));
    }

    #[test]
    fn single_matching_overload_resolves() {
        let mut env = Environment::new();
        env.declare_function("double", Overload::global("double_int", vec![Type::Int], Type::Int))
            .unwrap();
        let ast = Expr::call(1, None, "double", vec![Expr::constant(2, Literal::Int(3))]);
        let result = check(&ast, &env);
        assert!(result.is_valid());
        assert_eq!(result.types.get(&1), Some(&Type::Int));
        assert_eq!(result.references.get(&1), Some(&Reference::Overloads(vec!["double_int".to_string()])));
    }

    #[test]
    fn no_matching_overload_is_an_error() {
        let mut env = Environment::new();
        env.declare_function("double", Overload::global("double_int", vec![Type::Int], Type::Int))
            .unwrap();
        let ast = Expr::call(1, None, "double", vec![Expr::constant(2, Literal::String("x".into()))]);
        let result = check(&ast, &env);
        assert!(!result.is_valid());
    }

    #[test]
    fn calling_a_name_with_no_declaration_at_all_is_undeclared_not_a_bad_overload() {
        let env = Environment::new();
        let ast = Expr::call(1, None, "foo", vec![Expr::constant(2, Literal::Int(1))]);
        let result = check(&ast, &env);
        assert!(!result.is_valid());
        assert!(result.issues.iter().any(|issue| issue.message == "undeclared reference to 'foo'"));
    }

    #[test]
    fn calling_a_declared_name_with_the_wrong_arity_is_a_bad_overload_not_undeclared() {
        let mut env = Environment::new();
        env.declare_function("foo", Overload::global("foo_int_int", vec![Type::Int, Type::Int], Type::Int))
            .unwrap();
        let ast = Expr::call(1, None, "foo", vec![Expr::constant(2, Literal::Int(1)), Expr::constant(3, Literal::Int(2)), Expr::constant(4, Literal::Int(3))]);
        let result = check(&ast, &env);
        assert!(!result.is_valid());
        assert!(result.issues.iter().any(|issue| issue.message.contains("no matching overload") && issue.message.contains("foo")));
    }

    #[test]
    fn struct_literal_checks_field_values_and_types_to_its_name() {
        let env = Environment::new();
        let ast = Expr::strukt(1, "my.Thing", vec![Entry::field("a", Expr::constant(2, Literal::Int(1)))]);
        let result = check(&ast, &env);
        assert!(result.is_valid());
        assert_eq!(result.types.get(&1), Some(&Type::Struct("my.Thing".to_string())));
    }

    #[test]
    fn bind_resolves_lazily_in_its_body() {
        let env = Environment::new();
        let ast = Expr::bind(1, "x", Expr::constant(2, Literal::Int(5)), Expr::ident(3, "x"));
        let result = check(&ast, &env);
        assert!(result.is_valid());
        assert_eq!(result.types.get(&3), Some(&Type::Int));
        assert_eq!(result.references.get(&3), Some(&Reference::Lazy("x".to_string())));
    }

    #[test]
    fn complexity_limit_stops_traversal() {
        let env = Environment::new();
        let ast = Expr::list(
            1,
            (0..10).map(|i| Expr::constant(i + 2, Literal::Int(i))).collect(),
            vec![],
        );
        let limits = Limits::new().with_complexity_limit(3);
        let result = check_with_limits(&ast, &env, &limits);
        assert!(!result.is_valid());
    }
}
