//! Configurable resource limits shared by the checker and the evaluator.
//!
//! Mirrors the small builder-struct idiom used for CLI argument structs
//! elsewhere in this codebase, just without `clap` since these are
//! library-internal rather than CLI-facing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Total comprehension loop iterations allowed across one evaluation.
    pub comprehension_iteration_budget: u64,
    /// Maximum value-stack depth a program may reach.
    pub stack_depth_limit: usize,
    /// Maximum AST node count the checker will traverse before giving up.
    pub complexity_limit: usize,
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            comprehension_iteration_budget: 100_000,
            stack_depth_limit: 256,
            complexity_limit: 10_000,
        }
    }
}

impl Limits {
    pub fn new() -> Limits {
        Limits::default()
    }

    pub fn with_comprehension_iteration_budget(mut self, budget: u64) -> Limits {
        self.comprehension_iteration_budget = budget;
        self
    }

    pub fn with_stack_depth_limit(mut self, limit: usize) -> Limits {
        self.stack_depth_limit = limit;
        self
    }

    pub fn with_complexity_limit(mut self, limit: usize) -> Limits {
        self.complexity_limit = limit;
        self
    }
}
