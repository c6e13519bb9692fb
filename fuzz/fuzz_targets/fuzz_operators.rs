#![no_main]

//! Tree operator fuzzer.
//!
//! Crossover and mutation over fuzzer-seeded parents must always return
//! valid trees (or the parents unchanged) and never modify their inputs.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use sylva::builder::BuilderConfig;
use sylva::gp::{CrossoverConfig, MutationConfig, crossover, mutate};
use sylva::{GenerationMode, Node, Op, ProgramBuilder, ProgramSpace, Signature, TypeSpec, Value, ValueType};

/// Structured input for operator fuzzing.
#[derive(Arbitrary, Debug)]
struct OperatorInput {
    /// Seed for the parents.
    build_seed: u64,
    /// Seed for the operators.
    op_seed: u64,
    /// Mutation percentage in hundredths.
    percentage: u8,
    /// Maximum depth (capped).
    max_depth: u8,
}

fuzz_target!(|input: OperatorInput| {
    let double = TypeSpec::of(ValueType::Double);
    let nodes = vec![
        Node::op(Op::Add, double),
        Node::op(Op::Max, double),
        Node::if_else(double),
        Node::op(Op::Gt, double),
        Node::op(Op::Or, ValueType::Boolean),
        Node::variable("x", double),
        Node::ephemeral(ValueType::Double, 0.0, 10.0),
        Node::constant(Value::Boolean(true)),
    ];
    let max_depth = usize::from(input.max_depth % 8) + 1;
    let Ok(space) = ProgramSpace::new(vec![Signature::new(double, 1, max_depth)], vec![nodes]) else {
        return;
    };
    let builder = ProgramBuilder::new(&space, BuilderConfig::default());
    let mut rng = SmallRng::seed_from_u64(input.build_seed);
    let (Ok(a), Ok(b)) = (
        builder.build_individual(GenerationMode::Grow, &mut rng),
        builder.build_individual(GenerationMode::Full, &mut rng),
    ) else {
        return;
    };
    let (a0, b0) = (a.clone(), b.clone());

    let mut rng = SmallRng::seed_from_u64(input.op_seed);
    let (c1, c2) = crossover(&a, &b, &space, &CrossoverConfig::default(), &mut rng);
    assert!(space.is_valid_individual(&c1));
    assert!(space.is_valid_individual(&c2));

    let config = MutationConfig {
        mutation_percentage: f64::from(input.percentage) / 100.0,
        ..MutationConfig::default()
    };
    let m = mutate(&c1, &space, &config, &mut rng);
    assert!(space.is_valid_individual(&m));
    assert_eq!(a, a0);
    assert_eq!(b, b0);
});
