#![no_main]

//! Build-and-run fuzzer.
//!
//! Builds random integer programs (loops, memory cells, protected
//! arithmetic) from fuzzer-chosen seeds and bindings, then executes them.
//! Execution must end in a value or a fault, never a panic.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use sylva::builder::BuilderConfig;
use sylva::{
    Environment, GenerationMode, Node, Op, ProgramBuilder, ProgramSpace, RunContext, Signature,
    Value, ValueType,
};

/// Structured input for program execution fuzzing.
#[derive(Arbitrary, Debug)]
struct ExecuteInput {
    /// Builder seed.
    seed: u64,
    /// Minimum depth (capped).
    min_depth: u8,
    /// Depth range above the minimum (capped).
    extra: u8,
    /// Full instead of grow.
    full: bool,
    /// Binding for `x`.
    x: i32,
    /// Loop count binding.
    n: i32,
    /// Step budget.
    budget: u16,
}

fuzz_target!(|input: ExecuteInput| {
    let int = ValueType::Integer;
    let nodes = vec![
        Node::op(Op::Add, int),
        Node::op(Op::Sub, int),
        Node::op(Op::Mul, int),
        Node::op(Op::Div, int),
        Node::op(Op::Mod, int),
        Node::op(Op::Neg, int),
        Node::op(Op::Lt, int),
        Node::if_else(int),
        Node::repeat("n", Some("i".to_string()), 8, int),
        Node::store("acc", int),
        Node::read("acc", int),
        Node::variable("x", int),
        Node::variable("i", int),
        Node::ephemeral(int, -1000.0, 1000.0),
    ];
    let min_depth = usize::from(input.min_depth % 5) + 1;
    let max_depth = min_depth + usize::from(input.extra % 5);
    let Ok(space) = ProgramSpace::new(vec![Signature::new(int, min_depth, max_depth)], vec![nodes]) else {
        return;
    };

    let builder = ProgramBuilder::new(&space, BuilderConfig::default());
    let mut rng = SmallRng::seed_from_u64(input.seed);
    let mode = if input.full { GenerationMode::Full } else { GenerationMode::Grow };
    let Ok(ind) = builder.build_individual(mode, &mut rng) else {
        return;
    };
    assert!(space.is_valid_individual(&ind));

    let env = Environment::new()
        .with("x", Value::Integer(input.x))
        .with("n", Value::Integer(input.n))
        .with("i", Value::Integer(0));
    let mut ctx = RunContext::new(env, u64::from(input.budget));
    if ind.execute_int(&mut ctx).is_ok() {
        assert!(ctx.steps() <= u64::from(input.budget));
    }
});
