//! Scenario 8 from the concrete-evaluation worked examples: an unknown
//! variable's absorbing and propagating behavior through `&&`/`||`, and
//! through the ternary operator.
use policy_expr::ast::{Expr, Literal};
use policy_expr::checker;
use policy_expr::env::{Environment, VariableDecl};
use policy_expr::eval::{self, MapActivation};
use policy_expr::planner;
use policy_expr::registry::{builtins, Registry};
use policy_expr::value::{Type, Value};

fn with_x_declared() -> (Environment, Registry) {
    let mut env = Environment::new();
    let mut registry = Registry::new();
    builtins::install(&mut env, &mut registry).unwrap();
    env.declare_variable(VariableDecl::new("x", Type::Bool)).unwrap();
    (env, registry)
}

fn run_with_unknown_x(ast: &Expr, env: &Environment, registry: &Registry) -> Value {
    let checked = checker::check(ast, env);
    assert!(checked.is_valid(), "expected a valid check, got issues: {:?}", checked.issues);
    let program = planner::plan(ast, &checked);
    let activation = MapActivation::new().with("x", Value::unknown("x"));
    eval::eval(&program, env, registry, &activation).expect("evaluation should not hit a fatal error")
}

#[test]
fn unknown_and_false_absorbs_to_false() {
    let (env, registry) = with_x_declared();
    let ast = Expr::call(1, None, "_&&_", vec![Expr::ident(2, "x"), Expr::constant(3, Literal::Bool(false))]);
    assert_eq!(run_with_unknown_x(&ast, &env, &registry), Value::Bool(false));
}

#[test]
fn unknown_and_true_propagates_the_unknown() {
    let (env, registry) = with_x_declared();
    let ast = Expr::call(1, None, "_&&_", vec![Expr::ident(2, "x"), Expr::constant(3, Literal::Bool(true))]);
    let result = run_with_unknown_x(&ast, &env, &registry);
    match result {
        Value::Unknown(u) => assert!(u.patterns.contains("x")),
        other => panic!("expected Unknown({{x}}), got {other:?}"),
    }
}

#[test]
fn unknown_or_true_absorbs_to_true() {
    let (env, registry) = with_x_declared();
    let ast = Expr::call(1, None, "_||_", vec![Expr::ident(2, "x"), Expr::constant(3, Literal::Bool(true))]);
    assert_eq!(run_with_unknown_x(&ast, &env, &registry), Value::Bool(true));
}

#[test]
fn unknown_or_false_propagates_the_unknown() {
    let (env, registry) = with_x_declared();
    let ast = Expr::call(1, None, "_||_", vec![Expr::ident(2, "x"), Expr::constant(3, Literal::Bool(false))]);
    assert!(run_with_unknown_x(&ast, &env, &registry).is_unknown());
}

#[test]
fn ternary_on_an_unknown_condition_evaluates_neither_branch() {
    let (env, registry) = with_x_declared();
    let ast = Expr::call(
        1,
        None,
        "_?:_",
        vec![Expr::ident(2, "x"), Expr::constant(3, Literal::Int(1)), Expr::constant(4, Literal::Int(2))],
    );
    assert!(run_with_unknown_x(&ast, &env, &registry).is_unknown());
}
