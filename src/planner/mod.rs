//! Lowers a checked AST into a flat [`Program`] of [`Step`]s.
mod program;
mod step;

use std::collections::HashMap;

use log::debug;

pub use self::program::Program;
pub use self::step::{CondJumpKind, Opcode, Step};

use crate::ast::{Comprehension, Entry, EntryKey, Expr, ExprKind, Literal};
use crate::checker::{CheckResult, Reference};
use crate::value::{AstId, Value};

/// Lower `ast` using the references recorded in `check_result`.
///
/// The checked AST must be one `check_result` actually annotated: a
/// reference missing for a node that needs one is a planner precondition
/// violation and panics, the same way the evaluator treats a read from an
/// unassigned slot as a fatal internal error rather than an in-band one.
pub fn plan(ast: &Expr, check_result: &CheckResult) -> Program {
    debug!("entering plan");
    let mut planner = Planner {
        references: &check_result.references,
        current: vec![],
        subexpressions: vec![],
        next_slot: 0,
        locals: vec![],
    };
    planner.plan_expr(ast);
    debug!("leaving plan: {} step(s), {} slot(s)", planner.current.len(), planner.next_slot);
    Program {
        steps: planner.current,
        subexpressions: planner.subexpressions,
        slot_count: planner.next_slot,
    }
}

#[derive(Debug, Clone, Copy)]
struct LocalSlot {
    slot: usize,
    /// `Some` for a `cel.bind` name: the subexpression index to run on
    /// first reference.
    init: Option<usize>,
}

struct Planner<'a> {
    references: &'a HashMap<AstId, Reference>,
    current: Vec<Step>,
    subexpressions: Vec<Vec<Step>>,
    next_slot: usize,
    locals: Vec<HashMap<String, LocalSlot>>,
}

fn literal_to_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Uint(u) => Value::Uint(*u),
        Literal::Double(d) => Value::Double(*d),
        Literal::String(s) => Value::string(s.clone()),
        Literal::Bytes(b) => Value::bytes(b.clone()),
        Literal::Duration(d) => Value::Duration(*d),
        Literal::Timestamp(t) => Value::Timestamp(*t),
    }
}

impl<'a> Planner<'a> {
    fn push(&mut self, id: AstId, op: Opcode, stack_delta: i32) -> usize {
        self.current.push(Step { id, op, stack_delta });
        self.current.len() - 1
    }

    fn mark(&self) -> usize {
        self.current.len()
    }

    fn alloc_slot(&mut self) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn slot_for(&self, name: &str) -> usize {
        self.locals
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .unwrap_or_else(|| panic!("planner precondition violated: unresolved local '{name}'"))
            .slot
    }

    fn init_for(&self, name: &str) -> usize {
        self.locals
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .and_then(|l| l.init)
            .unwrap_or_else(|| panic!("planner precondition violated: local '{name}' has no lazy initializer"))
    }

    fn patch_jump_target(&mut self, idx: usize, target: usize) {
        match &mut self.current[idx].op {
            Opcode::CondJump(_, t) => *t = target,
            Opcode::Jump(t) => *t = target,
            Opcode::JumpIfNotTrue(t) => *t = target,
            other => panic!("planner bug: expected a jump opcode at {idx}, found {other:?}"),
        }
    }

    fn patch_comprehension_exit(&mut self, idx: usize, target: usize) {
        match &mut self.current[idx].op {
            Opcode::ComprehensionNext { exit_target, .. } => *exit_target = target,
            other => panic!("planner bug: expected ComprehensionNext at {idx}, found {other:?}"),
        }
    }

    fn compile_subexpression(&mut self, expr: &Expr) -> usize {
        let saved = std::mem::take(&mut self.current);
        self.plan_expr(expr);
        let compiled = std::mem::replace(&mut self.current, saved);
        let idx = self.subexpressions.len();
        self.subexpressions.push(compiled);
        idx
    }

    fn plan_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Const(literal) => {
                self.push(expr.id, Opcode::PushConst(literal_to_value(literal)), 1);
            }
            ExprKind::Ident(_) => self.plan_reference(expr),
            ExprKind::Select { operand, field, test_only } => {
                if !*test_only && expr.qualified_name_chain().is_some() {
                    self.plan_reference(expr);
                } else {
                    self.plan_expr(operand);
                    self.push(
                        expr.id,
                        Opcode::Select {
                            field: field.clone(),
                            test_only: *test_only,
                        },
                        0,
                    );
                }
            }
            ExprKind::Call { target, function, args } => self.plan_call(expr, target.as_deref(), function, args),
            ExprKind::List { elements, optional_indices } => self.plan_list(expr.id, elements, optional_indices),
            ExprKind::Map { entries, .. } => self.plan_map(expr.id, entries),
            ExprKind::Comprehension(c) => self.plan_comprehension(expr.id, c),
            ExprKind::Bind { name, init, body } => self.plan_bind(expr.id, name, init, body),
        }
    }

    fn plan_reference(&mut self, expr: &Expr) {
        match self.references.get(&expr.id) {
            Some(Reference::Variable(name)) => {
                self.push(expr.id, Opcode::Resolve(name.clone()), 1);
                // The checker records a qualified variable match against
                // only the longest matching prefix of the dotted chain
                // (spec §4.1's name-resolution priority); any trailing
                // segments left over (`x.y.z` resolving `x.y` leaves
                // `z`) are ordinary field/key selects on the resolved
                // value, not part of the variable name itself.
                let matched_segments = name.split('.').count();
                if let Some(chain) = expr.qualified_name_chain() {
                    for field in &chain[matched_segments..] {
                        self.push(expr.id, Opcode::Select { field: field.clone(), test_only: false }, 0);
                    }
                }
            }
            Some(Reference::Local(name)) => {
                let slot = self.slot_for(name);
                self.push(expr.id, Opcode::LoadSlot(slot), 1);
            }
            Some(Reference::Lazy(name)) => {
                let slot = self.slot_for(name);
                let init = self.init_for(name);
                self.push(expr.id, Opcode::CheckInit { slot, init }, 1);
            }
            Some(Reference::Overloads(_)) | None => {
                panic!("planner precondition violated: no variable reference recorded for node {}", expr.id)
            }
        }
    }

    fn plan_call(&mut self, expr: &Expr, target: Option<&Expr>, function: &str, args: &[Expr]) {
        if target.is_none() {
            match (function, args) {
                ("_&&_", [lhs, rhs]) => {
                    return self.plan_short_circuit(expr.id, lhs, rhs, CondJumpKind::ShortCircuitIfFalse);
                }
                ("_||_", [lhs, rhs]) => {
                    return self.plan_short_circuit(expr.id, lhs, rhs, CondJumpKind::ShortCircuitIfTrue);
                }
                ("_?:_", [cond, then_expr, else_expr]) => {
                    return self.plan_ternary(expr.id, cond, then_expr, else_expr);
                }
                _ => {}
            }
        }

        let mut arity = 0usize;
        if let Some(t) = target {
            self.plan_expr(t);
            arity += 1;
        }
        for arg in args {
            self.plan_expr(arg);
            arity += 1;
        }
        let ids = match self.references.get(&expr.id) {
            Some(Reference::Overloads(ids)) => ids.clone(),
            _ => vec![function.to_string()],
        };
        self.push(expr.id, Opcode::Call { overloads: ids, arity }, 1 - arity as i32);
    }

    /// `&&`/`||`: left operand, then a peeking conditional jump. When the
    /// left operand alone is absorbing (`false` for `&&`, `true` for
    /// `||`) the jump skips straight to the join with just the left value
    /// on the stack — the right operand is never evaluated. Otherwise the
    /// right operand is evaluated and a `LogicalAnd`/`LogicalOr` step
    /// combines both operands, which is what makes `x && true` come out
    /// `unknown` (not `true`) when `x` is unknown: the left operand is
    /// not itself `false`, so evaluation falls through, but the combine
    /// step still folds its error/unknown-ness into the result.
    fn plan_short_circuit(&mut self, id: AstId, lhs: &Expr, rhs: &Expr, kind: CondJumpKind) {
        self.plan_expr(lhs);
        let jump_idx = self.push(id, Opcode::CondJump(kind, 0), 0);
        self.plan_expr(rhs);
        let combine = match kind {
            CondJumpKind::ShortCircuitIfFalse => Opcode::LogicalAnd,
            CondJumpKind::ShortCircuitIfTrue => Opcode::LogicalOr,
        };
        self.push(id, combine, -1);
        let join = self.mark();
        self.patch_jump_target(jump_idx, join);
    }

    fn plan_ternary(&mut self, id: AstId, cond: &Expr, then_expr: &Expr, else_expr: &Expr) {
        self.plan_expr(cond);
        let branch_idx = self.push(id, Opcode::TernaryBranch { to_else: 0, to_join: 0 }, -1);
        self.plan_expr(then_expr);
        let to_join = self.push(id, Opcode::Jump(0), 0);
        let else_target = self.mark();
        self.plan_expr(else_expr);
        let join = self.mark();
        match &mut self.current[branch_idx].op {
            Opcode::TernaryBranch { to_else, to_join: join_target } => {
                *to_else = else_target;
                *join_target = join;
            }
            other => panic!("planner bug: expected TernaryBranch at {branch_idx}, found {other:?}"),
        }
        self.patch_jump_target(to_join, join);
    }

    fn plan_list(&mut self, id: AstId, elements: &[Expr], optional_indices: &[usize]) {
        for element in elements {
            self.plan_expr(element);
        }
        let optional_mask = (0..elements.len()).map(|i| optional_indices.contains(&i)).collect();
        self.push(
            id,
            Opcode::MakeList {
                arity: elements.len(),
                optional_mask,
            },
            1 - elements.len() as i32,
        );
    }

    fn plan_map(&mut self, id: AstId, entries: &[Entry]) {
        let mut optional_mask = Vec::with_capacity(entries.len());
        for entry in entries {
            match &entry.key {
                EntryKey::Field(name) => {
                    self.push(id, Opcode::PushConst(Value::string(name.clone())), 1);
                }
                EntryKey::Expr(key_expr) => self.plan_expr(key_expr),
            }
            self.plan_expr(&entry.value);
            optional_mask.push(entry.optional);
        }
        self.push(
            id,
            Opcode::MakeMap {
                arity: entries.len(),
                optional_mask,
            },
            1 - 2 * entries.len() as i32,
        );
    }

    fn plan_comprehension(&mut self, id: AstId, c: &Comprehension) {
        self.plan_expr(&c.iter_range);
        let iter_slot = self.alloc_slot();
        self.push(c.iter_range.id, Opcode::AssignSlotAndPop(iter_slot), -1);

        let index_slot = self.alloc_slot();
        self.push(id, Opcode::PushConst(Value::Int(0)), 1);
        self.push(id, Opcode::AssignSlotAndPop(index_slot), -1);

        self.plan_expr(&c.accu_init);
        let accu_slot = self.alloc_slot();
        self.push(c.accu_init.id, Opcode::AssignSlotAndPop(accu_slot), -1);

        let iter_var_slot = self.alloc_slot();

        self.locals.push(HashMap::new());
        {
            let frame = self.locals.last_mut().expect("just pushed");
            frame.insert(c.iter_var.clone(), LocalSlot { slot: iter_var_slot, init: None });
            frame.insert(c.accu_var.clone(), LocalSlot { slot: accu_slot, init: None });
        }

        let loop_header = self.mark();
        self.plan_expr(&c.loop_condition);
        let to_result = self.push(c.loop_condition.id, Opcode::JumpIfNotTrue(0), -1);

        let next_idx = self.push(
            id,
            Opcode::ComprehensionNext {
                iter_slot,
                index_slot,
                exit_target: 0,
            },
            1,
        );
        self.push(id, Opcode::AssignSlotAndPop(iter_var_slot), -1);

        self.plan_expr(&c.loop_step);
        self.push(c.loop_step.id, Opcode::AssignSlotAndPop(accu_slot), -1);
        self.push(id, Opcode::Jump(loop_header), 0);

        let result_target = self.mark();
        self.patch_jump_target(to_result, result_target);
        self.patch_comprehension_exit(next_idx, result_target);

        self.plan_expr(&c.result);
        self.locals.pop();

        self.push(id, Opcode::ClearSlot(iter_slot), 0);
        self.push(id, Opcode::ClearSlot(index_slot), 0);
        self.push(id, Opcode::ClearSlot(accu_slot), 0);
        self.push(id, Opcode::ClearSlot(iter_var_slot), 0);
    }

    fn plan_bind(&mut self, id: AstId, name: &str, init: &Expr, body: &Expr) {
        let slot = self.alloc_slot();
        let init_idx = self.compile_subexpression(init);
        self.push(id, Opcode::ClearSlot(slot), 0);

        self.locals.push(HashMap::new());
        self.locals
            .last_mut()
            .expect("just pushed")
            .insert(name.to_string(), LocalSlot { slot, init: Some(init_idx) });

        self.plan_expr(body);
        self.locals.pop();

        self.push(id, Opcode::ClearSlot(slot), 0);
    }
}
