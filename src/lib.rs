// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! Sylva: a typed genetic programming engine.
//!
//! This crate evolves programs and permutations:
//! - Strongly typed program trees stored as flat prefix-order node arrays
//! - A sandboxed interpreter with a step budget and explicit run context
//! - Grow, full and ramped random construction that respects node types
//! - Cached, parallel fitness evaluation and the classic evolution loop
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Evolution Loop (gp)               │
//! ├─────────────────────────────────────┤
//! │   Builder │ Operators │ Fitness     │
//! ├─────────────────────────────────────┤
//! │   Program + Interpreter             │
//! ├─────────────────────────────────────┤
//! │   Types │ Nodes │ Registry          │
//! └─────────────────────────────────────┘
//! ```

pub mod builder;
pub mod config;
pub mod distributed;
pub mod error;
pub mod gp;
pub mod node;
pub mod program;
pub mod types;
pub mod view;

pub use error::{EvalFault, EvalResult, GpError};

// Re-export key types at crate root for convenience
pub use builder::{GenerationMode, NodeValidator, ProgramBuilder, ProgramSpace, ValidationRequest};
pub use node::{Node, NodeKind, NodeRegistry, NodeSpec, Op, Primitive};
pub use program::{Environment, Program, RunContext};
pub use types::{Signature, TypeSpec, Value, ValueType};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_exports_build_and_run() {
        let double = ValueType::Double;
        let program = Program::from_nodes(vec![
            Node::op(Op::Mul, double),
            Node::variable("x", double),
            Node::constant(Value::Double(3.0)),
        ]);
        let mut ctx = RunContext::new(Environment::new().with("x", Value::Double(2.0)), 100);
        let out = program.execute_double(&mut ctx).unwrap();
        assert!((out - 6.0).abs() < 1e-12);
    }
}
