//! Scenarios 3 and 4 from the concrete-evaluation worked examples:
//! qualified-name priority (`x.y` over `x` then select `.y`) and the
//! checker's two distinct "name didn't work out" diagnostics.
use policy_expr::ast::{Expr, Literal};
use policy_expr::checker::{self, Severity};
use policy_expr::env::{Environment, Overload, VariableDecl};
use policy_expr::eval::{self, MapActivation};
use policy_expr::planner;
use policy_expr::registry::{builtins, Registry};
use policy_expr::value::{CelMap, MapKey, Type, Value};

#[test]
fn dotted_name_resolves_the_longest_declared_qualified_variable() {
    let mut env = Environment::new();
    let mut registry = Registry::new();
    builtins::install(&mut env, &mut registry).unwrap();
    env.declare_variable(VariableDecl::new("x", Type::Int)).unwrap();
    env.declare_variable(VariableDecl::new("x.y", Type::map(Type::String, Type::Int))).unwrap();

    // `x.y.z`: `x.y` must resolve as the declared map variable, `.z` as a
    // map lookup on it, not `x` followed by two selects.
    let ast = Expr::select(3, Expr::select(2, Expr::ident(1, "x"), "y", false), "z", false);
    let checked = checker::check(&ast, &env);
    assert!(checked.is_valid(), "expected a valid check, got issues: {:?}", checked.issues);
    assert_eq!(checked.type_of(3), Some(&Type::Int));

    let mut map = CelMap::new();
    map.insert(MapKey::String("w".into()), Value::Int(1));
    let activation = MapActivation::new().with("x", Value::Int(5)).with("x.y", Value::map(map));

    let program = planner::plan(&ast, &checked);
    let result = eval::eval(&program, &env, &registry, &activation).expect("evaluation should not hit a fatal error");
    assert!(result.is_error());
    match &result {
        Value::Error(e) => assert!(e.message.contains('z'), "expected the missing-key error to mention 'z', got: {}", e.message),
        other => panic!("expected an error value, got {other:?}"),
    }
}

#[test]
fn calling_an_undeclared_function_is_an_undeclared_reference() {
    let env = Environment::new();
    let ast = Expr::call(1, None, "foo", vec![Expr::constant(2, Literal::Int(1)), Expr::constant(3, Literal::Int(2))]);
    let checked = checker::check(&ast, &env);
    assert!(!checked.is_valid());
    assert!(checked.issues.iter().any(|issue| issue.severity == Severity::Error && issue.message == "undeclared reference to 'foo'"));
}

#[test]
fn calling_a_declared_function_with_the_wrong_arity_fails_overload_resolution() {
    let mut env = Environment::new();
    env.declare_function("foo", Overload::global("foo_int_int", vec![Type::Int, Type::Int], Type::Int)).unwrap();

    let ast = Expr::call(
        1,
        None,
        "foo",
        vec![Expr::constant(2, Literal::Int(1)), Expr::constant(3, Literal::Int(2)), Expr::constant(4, Literal::Int(3))],
    );
    let checked = checker::check(&ast, &env);
    assert!(!checked.is_valid());
    // `foo` is declared, just not for three arguments: this is a distinct
    // diagnostic from an outright undeclared name.
    assert!(checked
        .issues
        .iter()
        .any(|issue| issue.severity == Severity::Error && issue.message.contains("foo") && issue.message.contains("no matching overload")));
}
