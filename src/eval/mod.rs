//! The step machine: executes a [`crate::planner::Program`] against an
//! [`Activation`] and a function [`crate::registry::Registry`].
mod activation;
mod error;

use log::{debug, error, trace, warn};

pub use self::activation::{Activation, MapActivation};
pub use self::error::EvalFatal;

use crate::env::{Environment, Strictness};
use crate::limits::Limits;
use crate::planner::{CondJumpKind, Opcode, Program, Step};
use crate::registry::Registry;
use crate::value::{equality, AstId, CelMap, MapKey, Type, UnknownValue, Value};

/// The mutable runtime state one evaluation run carries: the value stack
/// and the frame-local slot array comprehensions and lazy bindings use.
/// Recursive step-list runs (a lazy binding's initializer, see
/// [`Opcode::CheckInit`]) share both with their caller rather than
/// allocating their own.
struct Frame {
    stack: Vec<Value>,
    slots: Vec<Option<Value>>,
}

/// Evaluate `program` against `activation` using the built-in [`Limits`]
/// and no cancellation hook.
pub fn eval(program: &Program, env: &Environment, registry: &Registry, activation: &dyn Activation) -> Result<Value, EvalFatal> {
    eval_with_limits(program, env, registry, activation, &Limits::default())
}

/// Evaluate `program` under a caller-supplied resource budget.
pub fn eval_with_limits(
    program: &Program,
    env: &Environment,
    registry: &Registry,
    activation: &dyn Activation,
    limits: &Limits,
) -> Result<Value, EvalFatal> {
    eval_cancellable(program, env, registry, activation, limits, &|| false)
}

/// Evaluate `program`, checking `cancelled` at comprehension loop heads so
/// a host can cooperatively abort a long-running evaluation.
pub fn eval_cancellable(
    program: &Program,
    env: &Environment,
    registry: &Registry,
    activation: &dyn Activation,
    limits: &Limits,
    cancelled: &dyn Fn() -> bool,
) -> Result<Value, EvalFatal> {
    debug!("entering eval: {} step(s), {} slot(s)", program.steps.len(), program.slot_count);
    let mut frame = Frame {
        stack: Vec::new(),
        slots: vec![None; program.slot_count],
    };
    let mut iterations = 0u64;
    let result = run_steps(&program.steps, program, env, registry, activation, limits, cancelled, &mut frame, &mut iterations)?;
    debug!("leaving eval: {result}");
    Ok(result)
}

/// How a single [`Opcode::ComprehensionNext`] resolved.
enum ComprehensionAdvance {
    /// The next element, with the index slot already advanced.
    Next(Value),
    /// The iterable is exhausted; proceed to the result expression.
    Exit,
    /// The whole comprehension resolves to this value without entering
    /// (or continuing) the loop: an error/unknown iter-range, or a blown
    /// iteration budget.
    Abort(Value),
}

/// Run one flat step list to completion, returning the single value it
/// leaves behind. `frame` is shared across recursive calls (a lazy
/// binding's initializer runs this same way); `base` records the stack
/// depth at entry so the invariant "exactly one net value pushed" can be
/// checked and restored regardless of nesting.
fn run_steps(
    steps: &[Step],
    program: &Program,
    env: &Environment,
    registry: &Registry,
    activation: &dyn Activation,
    limits: &Limits,
    cancelled: &dyn Fn() -> bool,
    frame: &mut Frame,
    iterations: &mut u64,
) -> Result<Value, EvalFatal> {
    let base = frame.stack.len();
    let mut pc = 0usize;

    while pc < steps.len() {
        let step = &steps[pc];
        trace!("pc={pc} id={} op={:?}", step.id, step.op);

        if frame.stack.len() > limits.stack_depth_limit {
            warn!("stack depth limit ({}) exceeded evaluating node {}", limits.stack_depth_limit, step.id);
            frame.stack.truncate(base);
            return Ok(Value::error_at("stack depth limit exceeded", step.id));
        }

        match &step.op {
            Opcode::PushConst(value) => frame.stack.push(value.clone()),

            Opcode::Resolve(name) => {
                let value = activation
                    .resolve(name)
                    .unwrap_or_else(|| Value::error_at(format!("no such attribute '{name}'"), step.id));
                frame.stack.push(value);
            }

            Opcode::LoadSlot(slot) => {
                let value = read_slot(frame, *slot)?;
                frame.stack.push(value);
            }

            Opcode::Select { field, test_only } => {
                let operand = pop1(frame)?;
                frame.stack.push(eval_select(&operand, field, *test_only, step.id));
            }

            Opcode::Call { overloads, arity } => {
                let args = pop_n(frame, *arity)?;
                let result = eval_call(env, registry, overloads, &args, step.id)?;
                frame.stack.push(result);
            }

            Opcode::CondJump(kind, target) => {
                let top = frame.stack.last().ok_or_else(|| EvalFatal::new("peeked an empty stack for a short-circuit test"))?;
                let takes = match kind {
                    CondJumpKind::ShortCircuitIfFalse => matches!(top, Value::Bool(false)),
                    CondJumpKind::ShortCircuitIfTrue => matches!(top, Value::Bool(true)),
                };
                if takes {
                    pc = *target;
                    continue;
                }
            }

            Opcode::Jump(target) => {
                pc = *target;
                continue;
            }

            Opcode::LogicalAnd => {
                let r = pop1(frame)?;
                let l = pop1(frame)?;
                frame.stack.push(combine_logical(&l, &r, true));
            }

            Opcode::LogicalOr => {
                let r = pop1(frame)?;
                let l = pop1(frame)?;
                frame.stack.push(combine_logical(&l, &r, false));
            }

            Opcode::JumpIfNotTrue(target) => {
                if cancelled() {
                    frame.stack.truncate(base);
                    return Ok(Value::error_at("evaluation cancelled", step.id));
                }
                let cond = pop1(frame)?;
                if !matches!(cond, Value::Bool(true)) {
                    pc = *target;
                    continue;
                }
            }

            Opcode::TernaryBranch { to_else, to_join } => match pop1(frame)? {
                Value::Bool(true) => {}
                Value::Bool(false) => {
                    pc = *to_else;
                    continue;
                }
                other => {
                    frame.stack.push(other);
                    pc = *to_join;
                    continue;
                }
            },

            Opcode::MakeList { arity, optional_mask: _ } => {
                let elements = pop_n(frame, *arity)?;
                frame.stack.push(Value::list(elements));
            }

            Opcode::MakeMap { arity, optional_mask: _ } => {
                let flat = pop_n(frame, 2 * arity)?;
                frame.stack.push(make_map(&flat, step.id));
            }

            Opcode::CheckInit { slot, init } => {
                if let Some(existing) = frame.slots.get(*slot).and_then(Option::clone) {
                    frame.stack.push(existing);
                } else {
                    let sub = program
                        .subexpressions
                        .get(*init)
                        .ok_or_else(|| EvalFatal::new(format!("subexpression {init} does not exist")))?;
                    let computed = run_steps(sub, program, env, registry, activation, limits, cancelled, frame, iterations)?;
                    write_slot(frame, *slot, computed.clone())?;
                    frame.stack.push(computed);
                }
            }

            Opcode::AssignSlot(slot) => {
                let value = frame.stack.last().cloned().ok_or_else(|| EvalFatal::new("peeked an empty stack for AssignSlot"))?;
                write_slot(frame, *slot, value)?;
            }

            Opcode::AssignSlotAndPop(slot) => {
                let value = pop1(frame)?;
                write_slot(frame, *slot, value)?;
            }

            Opcode::ClearSlot(slot) => {
                let cell = frame.slots.get_mut(*slot).ok_or_else(|| EvalFatal::new(format!("slot {slot} out of range")))?;
                *cell = None;
            }

            Opcode::ComprehensionNext { iter_slot, index_slot, exit_target } => {
                match advance_comprehension(frame, *iter_slot, *index_slot, limits, iterations, step.id)? {
                    ComprehensionAdvance::Next(value) => frame.stack.push(value),
                    ComprehensionAdvance::Exit => {
                        pc = *exit_target;
                        continue;
                    }
                    ComprehensionAdvance::Abort(value) => {
                        frame.stack.truncate(base);
                        return Ok(value);
                    }
                }
            }
        }

        pc += 1;
    }

    let produced = frame.stack.len() - base;
    if produced != 1 {
        error!("step list terminated with {produced} value(s) on the stack, expected exactly 1");
        return Err(EvalFatal::new(format!("step list left {produced} value(s) on the stack, expected exactly 1")));
    }
    Ok(frame.stack.pop().expect("checked len above"))
}

fn read_slot(frame: &Frame, slot: usize) -> Result<Value, EvalFatal> {
    frame
        .slots
        .get(slot)
        .and_then(Option::clone)
        .ok_or_else(|| EvalFatal::new(format!("read from unassigned slot {slot}")))
}

fn write_slot(frame: &mut Frame, slot: usize, value: Value) -> Result<(), EvalFatal> {
    let cell = frame.slots.get_mut(slot).ok_or_else(|| EvalFatal::new(format!("slot {slot} out of range")))?;
    *cell = Some(value);
    Ok(())
}

fn pop1(frame: &mut Frame) -> Result<Value, EvalFatal> {
    frame.stack.pop().ok_or_else(|| EvalFatal::new("popped an empty stack"))
}

fn pop_n(frame: &mut Frame, n: usize) -> Result<Vec<Value>, EvalFatal> {
    if frame.stack.len() < n {
        return Err(EvalFatal::new(format!("cannot pop {n} value(s), stack has {}", frame.stack.len())));
    }
    let at = frame.stack.len() - n;
    Ok(frame.stack.split_off(at))
}

/// Pop both fully-evaluated operands of `&&`/`&&`'s mirror and fold them
/// per the commutative absorbing rule: the absorbing literal (`false` for
/// `&&`, `true` for `||`) wins unconditionally, even against the other
/// operand's error/unknown-ness; otherwise the first error wins, else the
/// union of unknowns, else the plain boolean combination.
fn combine_logical(l: &Value, r: &Value, is_and: bool) -> Value {
    let absorbing = Value::Bool(!is_and);
    if *l == absorbing || *r == absorbing {
        return absorbing;
    }
    if l.is_error() {
        return l.clone();
    }
    if r.is_error() {
        return r.clone();
    }
    match (l, r) {
        (Value::Unknown(a), Value::Unknown(b)) => Value::Unknown(a.union(b)),
        (Value::Unknown(_), _) => l.clone(),
        (_, Value::Unknown(_)) => r.clone(),
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(if is_and { *a && *b } else { *a || *b }),
        _ => Value::error(format!("'{}' requires bool operands", if is_and { "&&" } else { "||" })),
    }
}

fn eval_select(operand: &Value, field: &str, test_only: bool, id: AstId) -> Value {
    if operand.is_error() || operand.is_unknown() {
        return operand.clone();
    }
    match operand {
        Value::Struct(s) => {
            if test_only {
                Value::Bool(s.fields.contains_key(field))
            } else if let Some(value) = s.fields.get(field) {
                value.clone()
            } else {
                Value::error_at(format!("no such field '{field}' on '{}'", s.type_name), id)
            }
        }
        Value::Map(entries) => {
            let key = MapKey::String(std::rc::Rc::from(field));
            if test_only {
                Value::Bool(entries.contains_key(&key))
            } else if let Some(value) = entries.get(&key) {
                value.clone()
            } else {
                Value::error_at(format!("no such key '{field}'"), id)
            }
        }
        other => Value::error_at(format!("'{field}' is not a field of a {}", other.dynamic_type()), id),
    }
}

fn value_to_map_key(key: &Value) -> Result<MapKey, Value> {
    match key {
        Value::Bool(b) => Ok(MapKey::Bool(*b)),
        Value::Int(i) => Ok(MapKey::Int(*i)),
        Value::Uint(u) => Ok(MapKey::Uint(*u)),
        Value::String(s) => Ok(MapKey::String(s.clone())),
        other => Err(Value::error(format!("'{other}' is not a valid map key"))),
    }
}

/// Build a map literal's value from its flattened, evaluated `key, value,
/// key, value, ...` operands, per spec: a duplicate key at evaluation time
/// yields an error value rather than silently overwriting.
///
/// The `Value` sum has no optional/absent value kind, so the planner's
/// `optional_mask` (carried on [`Opcode::MakeMap`] for forward
/// compatibility) currently has no runtime effect here; every evaluated
/// entry is always included.
fn make_map(flat: &[Value], id: AstId) -> Value {
    let mut map = CelMap::new();
    for pair in flat.chunks_exact(2) {
        let key = &pair[0];
        let value = &pair[1];
        if key.is_error() || key.is_unknown() {
            return key.clone();
        }
        if value.is_error() || value.is_unknown() {
            return value.clone();
        }
        let map_key = match value_to_map_key(key) {
            Ok(k) => k,
            Err(e) => return e,
        };
        if map.insert(map_key, value.clone()).is_some() {
            return Value::error_at(format!("duplicate map key '{key}'"), id);
        }
    }
    Value::map(map)
}

/// Resolve a `Call` step's candidate overload ids against the concrete
/// runtime argument kinds, and invoke the first one that fits.
///
/// A candidate with no declaration, or whose declared arity/argument
/// types don't fit, is simply skipped — this is the ordinary "no matching
/// overload" case and falls out as an in-band error, not a fatal one. An
/// overload the checker resolved but the registry never received an
/// implementation for *is* fatal: that is an env/registry desync, not
/// anything a caller's input could have triggered.
fn eval_call(env: &Environment, registry: &Registry, overloads: &[String], args: &[Value], id: AstId) -> Result<Value, EvalFatal> {
    for candidate in overloads {
        let Some(decl) = env.overload_by_id(candidate) else {
            continue;
        };
        if decl.args.len() != args.len() || !args_fit(args, &decl.args) {
            continue;
        }
        let Some(registered) = registry.get(candidate) else {
            error!("overload '{candidate}' is declared but was never registered with the function registry");
            return Err(EvalFatal::new(format!("overload '{candidate}' is declared but has no registered implementation")));
        };
        let result = match registered.strictness {
            Strictness::Strict => propagate(args).unwrap_or_else(|| (registered.func)(args)),
            Strictness::Lazy => (registered.func)(args),
        };
        return Ok(result);
    }
    Ok(Value::error_at(format!("no matching overload for call, candidates: [{}]", overloads.join(", ")), id))
}

fn args_fit(args: &[Value], declared: &[Type]) -> bool {
    args.iter().zip(declared).all(|(v, ty)| v.dynamic_type().is_assignable_to(ty))
}

/// Strict-overload propagation: the first error wins, else the
/// (commutative) union of unknowns, else `None` — meaning the native
/// closure should actually run.
fn propagate(args: &[Value]) -> Option<Value> {
    if let Some(err) = args.iter().find(|v| v.is_error()) {
        return Some(err.clone());
    }
    let mut union: Option<UnknownValue> = None;
    for v in args {
        if let Value::Unknown(u) = v {
            union = Some(match union {
                Some(prev) => prev.union(u),
                None => u.clone(),
            });
        }
    }
    union.map(Value::Unknown)
}

/// Advance one comprehension loop iteration.
///
/// Resolves the open question of what an error/unknown/empty iter-range
/// does: an error or unknown iterable aborts the whole comprehension with
/// that value (checked once, at index 0); an empty iterable never gets
/// here at all, since the loop condition the comprehension's macro
/// expansion builds is already false on the first pass. Exceeding the
/// iteration budget also aborts with an error value attributed to the
/// comprehension's own AST id, per the usual "resource limits are in-band
/// errors, not fatal" policy.
fn advance_comprehension(
    frame: &mut Frame,
    iter_slot: usize,
    index_slot: usize,
    limits: &Limits,
    iterations: &mut u64,
    id: AstId,
) -> Result<ComprehensionAdvance, EvalFatal> {
    let index = match read_slot(frame, index_slot)? {
        Value::Int(i) => i,
        other => return Err(EvalFatal::new(format!("comprehension index slot holds a non-int value: {other:?}"))),
    };
    let iterable = read_slot(frame, iter_slot)?;

    if index == 0 && (iterable.is_error() || iterable.is_unknown()) {
        return Ok(ComprehensionAdvance::Abort(iterable));
    }

    let elements: Vec<Value> = match &iterable {
        Value::List(items) => items.as_ref().clone(),
        Value::Map(entries) => entries.keys().map(equality::map_key_to_value).collect(),
        other => return Err(EvalFatal::new(format!("comprehension iterable is not a list or map: {other:?}"))),
    };

    if index as usize >= elements.len() {
        return Ok(ComprehensionAdvance::Exit);
    }

    *iterations += 1;
    if *iterations > limits.comprehension_iteration_budget {
        error!("comprehension at node {id} exceeded its iteration budget of {}", limits.comprehension_iteration_budget);
        return Ok(ComprehensionAdvance::Abort(Value::error_at("comprehension iteration budget exceeded", id)));
    }
    if limits.comprehension_iteration_budget > 0 && *iterations * 10 >= limits.comprehension_iteration_budget.saturating_mul(9) {
        warn!("comprehension at node {id} has used over 90% of its iteration budget");
    }

    let next = elements[index as usize].clone();
    write_slot(frame, index_slot, Value::Int(index + 1))?;
    Ok(ComprehensionAdvance::Next(next))
}
