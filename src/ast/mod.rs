//! AST node shapes consumed from an external parser.
//!
//! This crate never produces these nodes; it only checks, plans, and
//! evaluates them. The `serde` derives exist for the `cli` demonstration
//! binary, which deserializes a JSON-encoded AST (§6) rather than linking
//! against a parser.
use serde::{Deserialize, Serialize};

use crate::value::{AstId, Duration, Timestamp};

/// A literal constant embedded directly in the AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Duration(Duration),
    Timestamp(Timestamp),
}

/// One entry of a map or struct literal. A struct literal's entries are
/// all `Field`-keyed; a map literal's entries are all `Expr`-keyed. The
/// planner and checker tell the two apart via [`ExprKind::Map::type_name`]
/// rather than by inspecting individual entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryKey {
    Field(String),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: EntryKey,
    pub value: Expr,
    pub optional: bool,
}

impl Entry {
    pub fn field(name: impl Into<String>, value: Expr) -> Entry {
        Entry {
            key: EntryKey::Field(name.into()),
            value,
            optional: false,
        }
    }

    pub fn keyed(key: Expr, value: Expr) -> Entry {
        Entry {
            key: EntryKey::Expr(Box::new(key)),
            value,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Entry {
        self.optional = true;
        self
    }
}

/// The seven subfields of a comprehension (spec §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comprehension {
    pub iter_var: String,
    pub iter_range: Box<Expr>,
    pub accu_var: String,
    pub accu_init: Box<Expr>,
    pub loop_condition: Box<Expr>,
    pub loop_step: Box<Expr>,
    pub result: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    Const(Literal),
    /// A single, unqualified name segment. Dotted qualified names arise
    /// from a chain of `Select` nodes rooted at an `Ident`; see
    /// [`Expr::qualified_name_chain`].
    Ident(String),
    Select {
        operand: Box<Expr>,
        field: String,
        test_only: bool,
    },
    Call {
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },
    List {
        elements: Vec<Expr>,
        /// Indices into `elements` which are optional-element entries
        /// (`?expr` syntax); absent ones are spliced out by the planner.
        optional_indices: Vec<usize>,
    },
    /// A struct literal when `type_name` is `Some`, a map literal when
    /// `None`.
    Map {
        type_name: Option<String>,
        entries: Vec<Entry>,
    },
    Comprehension(Box<Comprehension>),
    /// A lazy binding introduced by a `cel.bind(name, init, body)` macro
    /// expansion: `init` is evaluated at most once, the first time `name`
    /// is referenced inside `body`.
    Bind {
        name: String,
        init: Box<Expr>,
        body: Box<Expr>,
    },
}

/// One expression node: a stable id plus its shape. The checker attaches
/// resolved types and references out-of-band, keyed by `id` (§3.4); this
/// struct itself never carries that annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: AstId,
    #[serde(flatten)]
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(id: AstId, kind: ExprKind) -> Expr {
        Expr { id, kind }
    }

    pub fn constant(id: AstId, literal: Literal) -> Expr {
        Expr::new(id, ExprKind::Const(literal))
    }

    pub fn ident(id: AstId, name: impl Into<String>) -> Expr {
        Expr::new(id, ExprKind::Ident(name.into()))
    }

    pub fn select(id: AstId, operand: Expr, field: impl Into<String>, test_only: bool) -> Expr {
        Expr::new(
            id,
            ExprKind::Select {
                operand: Box::new(operand),
                field: field.into(),
                test_only,
            },
        )
    }

    pub fn call(id: AstId, target: Option<Expr>, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::new(
            id,
            ExprKind::Call {
                target: target.map(Box::new),
                function: function.into(),
                args,
            },
        )
    }

    pub fn list(id: AstId, elements: Vec<Expr>, optional_indices: Vec<usize>) -> Expr {
        Expr::new(id, ExprKind::List { elements, optional_indices })
    }

    pub fn map(id: AstId, entries: Vec<Entry>) -> Expr {
        Expr::new(
            id,
            ExprKind::Map {
                type_name: None,
                entries,
            },
        )
    }

    pub fn strukt(id: AstId, type_name: impl Into<String>, entries: Vec<Entry>) -> Expr {
        Expr::new(
            id,
            ExprKind::Map {
                type_name: Some(type_name.into()),
                entries,
            },
        )
    }

    pub fn comprehension(id: AstId, comprehension: Comprehension) -> Expr {
        Expr::new(id, ExprKind::Comprehension(Box::new(comprehension)))
    }

    pub fn bind(id: AstId, name: impl Into<String>, init: Expr, body: Expr) -> Expr {
        Expr::new(
            id,
            ExprKind::Bind {
                name: name.into(),
                init: Box::new(init),
                body: Box::new(body),
            },
        )
    }

    /// Walks a chain of `Select { test_only: false }` nodes down to its
    /// root `Ident`, returning the dotted segments root-first. Returns
    /// `None` for anything else (a presence test, a call, a literal),
    /// since those can never denote a qualified name candidate (spec
    /// §4.1's name-resolution rule).
    pub fn qualified_name_chain(&self) -> Option<Vec<String>> {
        match &self.kind {
            ExprKind::Ident(name) => Some(vec![name.clone()]),
            ExprKind::Select {
                operand,
                field,
                test_only: false,
            } => {
                let mut chain = operand.qualified_name_chain()?;
                chain.push(field.clone());
                Some(chain)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_chain_walks_select_operands() {
        let expr = Expr::select(3, Expr::select(2, Expr::ident(1, "request"), "auth", false), "claims", false);
        assert_eq!(
            expr.qualified_name_chain(),
            Some(vec!["request".to_string(), "auth".to_string(), "claims".to_string()])
        );
    }

    #[test]
    fn test_only_select_breaks_the_chain() {
        let expr = Expr::select(2, Expr::ident(1, "request"), "auth", true);
        assert_eq!(expr.qualified_name_chain(), None);
    }

    #[test]
    fn call_has_no_qualified_name() {
        let expr = Expr::call(1, None, "size", vec![]);
        assert_eq!(expr.qualified_name_chain(), None);
    }

    #[test]
    fn struct_literal_carries_a_type_name_map_literal_does_not() {
        let s = Expr::strukt(1, "my.Type", vec![Entry::field("x", Expr::constant(2, Literal::Int(1)))]);
        let m = Expr::map(3, vec![Entry::keyed(Expr::constant(4, Literal::String("k".into())), Expr::constant(5, Literal::Int(1)))]);
        match s.kind {
            ExprKind::Map { type_name, .. } => assert_eq!(type_name.as_deref(), Some("my.Type")),
            _ => panic!("expected Map"),
        }
        match m.kind {
            ExprKind::Map { type_name, .. } => assert!(type_name.is_none()),
            _ => panic!("expected Map"),
        }
    }
}
