//! Per-evaluation state: variable bindings, memory cells and the step budget.

use crate::error::{EvalFault, EvalResult};
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default step budget for one evaluation.
pub const DEFAULT_STEP_BUDGET: u64 = 100_000;

/// Maximum nesting of interpreter calls (tree levels plus ADF frames).
pub(crate) const MAX_CALL_DEPTH: usize = 512;

/// Named variable bindings owned by a run.
///
/// The fitness function sets bindings before executing a program; variable
/// nodes read them. Every evaluation gets its own copy, so concurrent or
/// repeated runs never observe each other's writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    bindings: HashMap<String, Value>,
}

impl Environment {
    /// Empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style binding.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind(name, value);
        self
    }

    /// Set (or create) a binding.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Remove a binding, returning its value.
    pub fn unbind(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    /// Current value of a binding.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether there are no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Named memory cells written by store nodes and read by read nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Memory {
    cells: HashMap<String, Value>,
}

impl Memory {
    /// Value of a cell, if it has been written.
    #[must_use]
    pub fn get(&self, cell: &str) -> Option<&Value> {
        self.cells.get(cell)
    }

    /// Write a cell.
    pub fn set(&mut self, cell: &str, value: Value) {
        if let Some(slot) = self.cells.get_mut(cell) {
            *slot = value;
        } else {
            self.cells.insert(cell.to_string(), value);
        }
    }

    /// Forget every cell.
    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

/// Context threaded through one evaluation call.
///
/// Built fresh for each evaluation and never stored on an individual.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Variable bindings.
    pub env: Environment,
    /// Memory cells.
    pub memory: Memory,
    budget: u64,
    steps: u64,
    frames: Vec<Vec<Value>>,
    depth: usize,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(Environment::new(), DEFAULT_STEP_BUDGET)
    }
}

impl RunContext {
    /// Context over `env` allowing `budget` node evaluations.
    #[must_use]
    pub fn new(env: Environment, budget: u64) -> Self {
        Self {
            env,
            memory: Memory::default(),
            budget,
            steps: 0,
            frames: Vec::new(),
            depth: 0,
        }
    }

    /// Prepare for executing another program (or the same one on new inputs):
    /// clears memory cells and refills the step budget. Bindings are kept.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.steps = 0;
        self.frames.clear();
        self.depth = 0;
    }

    /// Steps consumed so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Configured step budget.
    #[must_use]
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Charge `n` steps.
    ///
    /// # Errors
    ///
    /// Returns [`EvalFault::BudgetExhausted`] once the budget is used up.
    /// Simulated domains can call this to meter their own moves.
    pub fn consume(&mut self, n: u64) -> EvalResult<()> {
        self.steps = self.steps.saturating_add(n);
        if self.steps > self.budget {
            Err(EvalFault::BudgetExhausted { steps: self.budget })
        } else {
            Ok(())
        }
    }

    pub(crate) fn enter(&mut self) -> EvalResult<()> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalFault::RecursionLimit);
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn push_frame(&mut self, args: Vec<Value>) {
        self.frames.push(args);
    }

    pub(crate) fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub(crate) fn arg(&self, index: usize) -> EvalResult<Value> {
        self.frames
            .last()
            .and_then(|frame| frame.get(index))
            .cloned()
            .ok_or(EvalFault::MissingArgument(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget() {
        let mut ctx = RunContext::new(Environment::new(), 3);
        assert!(ctx.consume(2).is_ok());
        assert!(ctx.consume(1).is_ok());
        assert_eq!(
            ctx.consume(1),
            Err(EvalFault::BudgetExhausted { steps: 3 })
        );
        ctx.reset();
        assert_eq!(ctx.steps(), 0);
    }

    #[test]
    fn test_reset_clears_memory_keeps_bindings() {
        let env = Environment::new().with("x", Value::Double(2.0));
        let mut ctx = RunContext::new(env, 10);
        ctx.memory.set("m", Value::Integer(5));
        ctx.reset();
        assert!(ctx.memory.get("m").is_none());
        assert_eq!(ctx.env.get("x"), Some(&Value::Double(2.0)));
    }

    #[test]
    fn test_frames() {
        let mut ctx = RunContext::default();
        assert_eq!(ctx.arg(0), Err(EvalFault::MissingArgument(0)));
        ctx.push_frame(vec![Value::Integer(9)]);
        assert_eq!(ctx.arg(0), Ok(Value::Integer(9)));
        ctx.pop_frame();
        assert!(ctx.arg(0).is_err());
    }
}
