//! Scenarios 5 and 6 from the concrete-evaluation worked examples:
//! string member overloads (`lowerAscii`, `split`), plus the environment's
//! overload-collision rejection.
use policy_expr::ast::{Expr, Literal};
use policy_expr::checker;
use policy_expr::env::{Environment, Overload};
use policy_expr::eval::{self, MapActivation};
use policy_expr::planner;
use policy_expr::registry::{builtins, Registry};
use policy_expr::value::{Type, Value};

fn fresh() -> (Environment, Registry) {
    let mut env = Environment::new();
    let mut registry = Registry::new();
    builtins::install(&mut env, &mut registry).unwrap();
    (env, registry)
}

fn run(ast: &Expr, env: &Environment, registry: &Registry) -> Value {
    let checked = checker::check(ast, env);
    assert!(checked.is_valid(), "expected a valid check, got issues: {:?}", checked.issues);
    let program = planner::plan(ast, &checked);
    eval::eval(&program, env, registry, &MapActivation::new()).expect("evaluation should not hit a fatal error")
}

#[test]
fn lower_ascii_matches_a_manually_lowercased_literal() {
    let (env, registry) = fresh();
    let receiver = Expr::constant(1, Literal::String("UPPER lower".to_string()));
    let lowered = Expr::call(2, Some(receiver), "lowerAscii", vec![]);
    let ast = Expr::call(3, None, "_==_", vec![lowered, Expr::constant(4, Literal::String("upper lower".to_string()))]);
    assert_eq!(run(&ast, &env, &registry), Value::Bool(true));
}

#[test]
fn split_on_empty_separator_yields_one_entry_per_character() {
    let (env, registry) = fresh();
    let receiver = Expr::constant(1, Literal::String("hello world!".to_string()));
    let ast = Expr::call(2, Some(receiver), "split", vec![Expr::constant(3, Literal::String(String::new()))]);
    let result = run(&ast, &env, &registry);
    match &result {
        Value::List(items) => {
            assert_eq!(items.len(), 12);
            let joined: String = items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.to_string(),
                    other => panic!("expected a string element, found {other:?}"),
                })
                .collect();
            assert_eq!(joined, "hello world!");
        }
        other => panic!("expected a list, found {other:?}"),
    }
}

#[test]
fn overload_collision_on_mutually_assignable_argument_lists_is_rejected() {
    let mut env = Environment::new();
    env.declare_function("f", Overload::global("f_dyn", vec![Type::Dyn], Type::Bool)).unwrap();
    let err = env.declare_function("f", Overload::global("f_int", vec![Type::Int], Type::Bool)).unwrap_err();
    assert!(!err.message.is_empty());
}

#[test]
fn format_string_renders_decimal_and_string_clauses_end_to_end() {
    let (env, registry) = fresh();
    let ast = Expr::call(
        1,
        None,
        "format",
        vec![
            Expr::constant(2, Literal::String("%s has %d items".to_string())),
            Expr::list(3, vec![Expr::constant(4, Literal::String("cart".to_string())), Expr::constant(5, Literal::Int(3))], vec![]),
        ],
    );
    assert_eq!(run(&ast, &env, &registry), Value::string("cart has 3 items"));
}
