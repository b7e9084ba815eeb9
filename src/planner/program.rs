use super::step::Step;

/// A flat, immutable step sequence plus the subexpression catalog lazy
/// bindings need, and the number of frame slots the evaluator must
/// allocate. No back-references to the checker; everything the evaluator
/// needs travels with the program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub steps: Vec<Step>,
    pub subexpressions: Vec<Vec<Step>>,
    pub slot_count: usize,
}
