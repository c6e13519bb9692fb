//! Property-based tests for program construction and tree operators.
//!
//! These tests verify type-safety and depth bounds of built programs and
//! that crossover and mutation never produce invalid trees.
//! Run with: cargo test --release prop_programs

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use sylva::gp::{CrossoverConfig, MutationConfig, crossover, mutate};
use sylva::{
    Environment, GenerationMode, Node, Op, ProgramBuilder, ProgramSpace, RunContext, Signature,
    TypeSpec, Value, ValueType,
};
use sylva::builder::BuilderConfig;

/// Mixed double/boolean vocabulary with an integer-counted loop.
fn space(min_depth: usize, max_depth: usize) -> ProgramSpace {
    let double = TypeSpec::of(ValueType::Double);
    let nodes = vec![
        Node::op(Op::Add, double),
        Node::op(Op::Sub, double),
        Node::op(Op::Mul, double),
        Node::op(Op::Div, double),
        Node::if_else(double),
        Node::op(Op::Gt, double),
        Node::op(Op::And, ValueType::Boolean),
        Node::op(Op::Not, ValueType::Boolean),
        Node::repeat("n", None, 4, double),
        Node::variable("x", double),
        Node::ephemeral(ValueType::Double, -5.0, 5.0),
        Node::constant(Value::Boolean(false)),
    ];
    ProgramSpace::new(vec![Signature::new(double, min_depth, max_depth)], vec![nodes]).unwrap()
}

fn context() -> RunContext {
    let env = Environment::new()
        .with("x", Value::Double(1.5))
        .with("n", Value::Integer(3));
    RunContext::new(env, 100_000)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Every built tree is complete, type-correct and within its depth bounds.
    #[test]
    fn prop_built_programs_are_valid(
        seed in any::<u64>(),
        min_depth in 1usize..4,
        extra in 0usize..4,
        full in any::<bool>()
    ) {
        let max_depth = min_depth + extra;
        let space = space(min_depth, max_depth);
        let builder = ProgramBuilder::new(&space, BuilderConfig::default());
        let mut rng = SmallRng::seed_from_u64(seed);
        let mode = if full { GenerationMode::Full } else { GenerationMode::Grow };

        let program = builder.build_program(0, mode, &mut rng).unwrap();
        prop_assert!(program.is_complete());
        prop_assert!(program.is_type_valid(TypeSpec::of(ValueType::Double)));
        prop_assert!(program.depth() >= min_depth);
        prop_assert!(program.depth() <= max_depth);
        prop_assert!(space.is_valid(0, &program));

        // Evaluation is total on well-typed trees.
        let value = program.execute(&mut context()).unwrap();
        prop_assert_eq!(value.value_type(), ValueType::Double);
    }

    /// Ramped populations stay within bounds at every size.
    #[test]
    fn prop_ramped_population_is_valid(seed in any::<u64>(), size in 1usize..40) {
        let space = space(2, 5);
        let builder = ProgramBuilder::new(&space, BuilderConfig::default());
        let mut rng = SmallRng::seed_from_u64(seed);
        let population = builder.build_population(size, &mut rng).unwrap();
        prop_assert_eq!(population.len(), size);
        for ind in &population {
            prop_assert!(space.is_valid_individual(ind));
        }
    }

    /// Crossover yields two valid children or the parents unchanged.
    #[test]
    fn prop_crossover_is_valid_or_identity(seed in any::<u64>(), max_attempts in 1usize..12) {
        let space = space(1, 6);
        let builder = ProgramBuilder::new(&space, BuilderConfig::default());
        let mut rng = SmallRng::seed_from_u64(seed);
        let a = builder.build_individual(GenerationMode::Grow, &mut rng).unwrap();
        let b = builder.build_individual(GenerationMode::Full, &mut rng).unwrap();
        let config = CrossoverConfig { max_attempts, ..CrossoverConfig::default() };

        let (c1, c2) = crossover(&a, &b, &space, &config, &mut rng);
        let unchanged = c1 == a && c2 == b;
        prop_assert!(unchanged || (space.is_valid_individual(&c1) && space.is_valid_individual(&c2)));
        prop_assert_eq!(c1.node_count() + c2.node_count(), a.node_count() + b.node_count());
    }

    /// Mutation keeps the tree valid and never touches its input.
    #[test]
    fn prop_mutation_is_valid(seed in any::<u64>(), pct in 0.0f64..1.0) {
        let space = space(1, 5);
        let builder = ProgramBuilder::new(&space, BuilderConfig::default());
        let mut rng = SmallRng::seed_from_u64(seed);
        let ind = builder.build_individual(GenerationMode::Grow, &mut rng).unwrap();
        let before = ind.clone();
        let config = MutationConfig { mutation_percentage: pct, ..MutationConfig::default() };

        let mutated = mutate(&ind, &space, &config, &mut rng);
        prop_assert!(space.is_valid_individual(&mutated));
        prop_assert_eq!(mutated.node_count(), ind.node_count());
        prop_assert_eq!(ind, before);
    }
}
