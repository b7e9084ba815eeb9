//! Core of an evaluator for a small, side-effect-free policy/expression
//! language embedded in host applications.
//!
//! This crate implements the three tightly coupled subsystems that make up
//! the hard engineering of such a language: the [`checker`] (name
//! resolution, type inference, overload disambiguation), the [`value`]
//! model (the tagged value/type sum and its assignability relation), and
//! the [`planner`]/[`eval`] pair (lowering a checked AST to a flat step
//! list and executing it against a value stack).
//!
//! Parsing source text into an [`ast`] is explicitly out of scope; this
//! crate consumes already-parsed AST nodes from an external collaborator.
pub mod ast;
pub mod checker;
pub mod env;
pub mod eval;
pub mod limits;
pub mod planner;
pub mod registry;
pub mod value;
