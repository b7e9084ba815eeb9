//! Scenario 2 from the concrete-evaluation worked examples:
//! `[1,2,3].exists(x, x*x > 10)` and comprehension variable scoping.
use policy_expr::ast::{Comprehension, Expr, Literal};
use policy_expr::checker;
use policy_expr::env::{Environment, VariableDecl};
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

/// `[1,2,3].exists(x, x*x > 10)`, hand-expanded the way a `.exists()`
/// macro call lowers: `found` starts `false`, the loop keeps going while
/// `!found`, and each step ORs in whether the current element satisfies
/// the predicate.
fn exists_over_list(elements: Vec<i64>, id_base: i64) -> Expr {
    let mut id = id_base;
    let mut next_id = || {
        id += 1;
        id
    };

    let comprehension = Comprehension {
        iter_var: "x".to_string(),
        iter_range: Box::new(Expr::list(next_id(), elements.into_iter().map(|v| Expr::constant(next_id(), Literal::Int(v))).collect(), vec![])),
        accu_var: "found".to_string(),
        accu_init: Box::new(Expr::constant(next_id(), Literal::Bool(false))),
        loop_condition: Box::new(Expr::call(next_id(), None, "!_", vec![Expr::ident(next_id(), "found")])),
        loop_step: Box::new(Expr::call(
            next_id(),
            None,
            "_||_",
            vec![
                Expr::ident(next_id(), "found"),
                Expr::call(
                    next_id(),
                    None,
                    "_>_",
                    vec![
                        Expr::call(next_id(), None, "_*_", vec![Expr::ident(next_id(), "x"), Expr::ident(next_id(), "x")]),
                        Expr::constant(next_id(), Literal::Int(10)),
                    ],
                ),
            ],
        )),
        result: Box::new(Expr::ident(next_id(), "found")),
    };
    Expr::comprehension(next_id(), comprehension)
}

#[test]
fn exists_finds_an_element_whose_square_exceeds_ten() {
    let (env, registry) = fresh();
    let ast = exists_over_list(vec![1, 2, 3], 100);
    assert_eq!(run(&ast, &env, &registry), Value::Bool(true));
}

#[test]
fn exists_returns_false_when_no_element_matches() {
    let (env, registry) = fresh();
    let ast = exists_over_list(vec![1, 2], 100);
    assert_eq!(run(&ast, &env, &registry), Value::Bool(false));
}

#[test]
fn comprehension_variable_does_not_leak_to_sibling_expressions() {
    let (env, registry) = fresh();

    let comprehension = Comprehension {
        iter_var: "x".to_string(),
        iter_range: Box::new(Expr::list(2, vec![Expr::constant(3, Literal::Int(1))], vec![])),
        accu_var: "found".to_string(),
        accu_init: Box::new(Expr::constant(4, Literal::Bool(false))),
        loop_condition: Box::new(Expr::call(5, None, "!_", vec![Expr::ident(6, "found")])),
        loop_step: Box::new(Expr::ident(7, "found")),
        result: Box::new(Expr::ident(8, "found")),
    };
    // `x` is only ever bound as the iter-var inside the comprehension;
    // referencing it as a sibling of the comprehension, with no
    // declaration in `env`, must fail name resolution rather than read a
    // stale local left behind on the scope stack.
    let ast = Expr::call(9, None, "_&&_", vec![Expr::comprehension(1, comprehension), Expr::ident(10, "x")]);

    let checked = checker::check(&ast, &env);
    assert!(!checked.is_valid());
    assert!(checked.issues.iter().any(|issue| issue.message == "undeclared reference to 'x'"));
}

#[test]
fn comprehension_over_an_unknown_iter_range_aborts_with_that_unknown() {
    let (mut env, registry) = fresh();
    env.declare_variable(VariableDecl::new("items", Type::list(Type::Int))).unwrap();

    let comprehension = Comprehension {
        iter_var: "i".to_string(),
        iter_range: Box::new(Expr::ident(1, "items")),
        accu_var: "found".to_string(),
        accu_init: Box::new(Expr::constant(2, Literal::Bool(false))),
        loop_condition: Box::new(Expr::call(3, None, "!_", vec![Expr::ident(4, "found")])),
        loop_step: Box::new(Expr::ident(5, "found")),
        result: Box::new(Expr::ident(6, "found")),
    };
    let ast = Expr::comprehension(7, comprehension);

    let checked = checker::check(&ast, &env);
    assert!(checked.is_valid(), "expected a valid check, got issues: {:?}", checked.issues);
    let program = planner::plan(&ast, &checked);
    let activation = MapActivation::new().with("items", Value::unknown("items"));
    let result = eval::eval(&program, &env, &registry, &activation).expect("evaluation should not hit a fatal error");
    assert!(result.is_unknown());
}
