//! Demonstration CLI: load a JSON-encoded AST plus a flat variable
//! activation, check it, plan it, and run it.
//!
//! This crate's own scope excludes parsing source text into an AST; a
//! real host drives `policy_expr` as a library from its own parser. This
//! binary exists so the library can be exercised end to end without
//! writing Rust, the same way `why` drives the teacher's compiler.
use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser as ClapParser;
use log::error;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use policy_expr::ast::Expr;
use policy_expr::checker;
use policy_expr::env::{Environment, VariableDecl};
use policy_expr::eval::{self, MapActivation};
use policy_expr::planner;
use policy_expr::registry::{builtins, Registry};
use policy_expr::value::{CelMap, MapKey, Type, Value};

#[derive(ClapParser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to a JSON document shaped `{"ast": ..., "variables": {...}}`.
    #[arg(short, long)]
    file: PathBuf,

    /// Dotted container namespace for qualified-name resolution.
    #[arg(short, long)]
    container: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Input {
    ast: Expr,
    #[serde(default)]
    variables: HashMap<String, JsonValue>,
}

fn json_to_type(v: &JsonValue) -> Type {
    match v {
        JsonValue::Null => Type::NullType,
        JsonValue::Bool(_) => Type::Bool,
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => Type::Int,
        JsonValue::Number(_) => Type::Double,
        JsonValue::String(_) => Type::String,
        JsonValue::Array(_) => Type::list(Type::Dyn),
        JsonValue::Object(_) => Type::map(Type::String, Type::Dyn),
    }
}

fn json_to_value(v: &JsonValue) -> Value {
    match v {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::Uint(u)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => Value::string(s.clone()),
        JsonValue::Array(items) => Value::list(items.iter().map(json_to_value).collect()),
        JsonValue::Object(fields) => {
            let mut map = CelMap::new();
            for (k, v) in fields {
                map.insert(MapKey::String(k.as_str().into()), json_to_value(v));
            }
            Value::map(map)
        }
    }
}

fn main() {
    simple_logger::init_with_level(log::Level::Warn).unwrap();
    let args = Cli::parse();

    let file_content = std::fs::read_to_string(&args.file)
        .unwrap_or_else(|e| panic!("could not read file '{}': {e}", args.file.to_string_lossy()));
    let input: Input = serde_json::from_str(&file_content).expect("input is not a valid AST document");

    let mut env = Environment::new().with_container(args.container.unwrap_or_default());
    let mut registry = Registry::new();
    builtins::install(&mut env, &mut registry).expect("built-in overload set registers cleanly");

    let mut activation = MapActivation::new();
    for (name, value) in &input.variables {
        env.declare_variable(VariableDecl::new(name.clone(), json_to_type(value)))
            .unwrap_or_else(|e| panic!("declaring variable '{name}': {e}"));
        activation.insert(name.clone(), json_to_value(value));
    }

    let checked = checker::check(&input.ast, &env);
    if !checked.is_valid() {
        for issue in &checked.issues {
            error!("{:?} at node {}: {}", issue.severity, issue.id, issue.message);
        }
        std::process::exit(1);
    }

    let program = planner::plan(&input.ast, &checked);
    match eval::eval(&program, &env, &registry, &activation) {
        Ok(value) => println!("{value}"),
        Err(fatal) => {
            error!("{fatal}");
            std::process::exit(2);
        }
    }
}
