//! Subtree-exchange crossover for program trees.
//!
//! One chromosome index is chosen, one point in each parent's tree at that
//! index, and the two subtree spans swap. A swap is only attempted when each
//! subtree's return type fits the other's position; the children must then
//! pass the program space's validity check (depth bounds, loop rule). On
//! exhaustion both parents come back unchanged.

use crate::builder::ProgramSpace;
use crate::gp::genome::Individual;
use crate::node::Node;
use crate::program::Program;
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configuration for crossover operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrossoverConfig {
    /// Probability that a crossover point lands on a function node when the
    /// tree has one.
    pub function_point_rate: f64,
    /// Point pairs tried before giving up.
    pub max_attempts: usize,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            function_point_rate: 0.9,
            max_attempts: 10,
        }
    }
}

/// Perform crossover between two parents.
///
/// Returns two valid children, or clones of the parents if no valid exchange
/// was found within `config.max_attempts`.
#[must_use]
pub fn crossover<R: Rng>(
    parent1: &Individual,
    parent2: &Individual,
    space: &ProgramSpace,
    config: &CrossoverConfig,
    rng: &mut R,
) -> (Individual, Individual) {
    let chromosomes = parent1
        .chromosomes()
        .len()
        .min(parent2.chromosomes().len())
        .min(space.chromosome_count());
    if chromosomes == 0 {
        return (parent1.clone(), parent2.clone());
    }

    for _ in 0..config.max_attempts {
        let c = rng.gen_range(0..chromosomes);
        let (Some(a), Some(b), Some(sig)) = (
            parent1.chromosome(c),
            parent2.chromosome(c),
            space.signature(c),
        ) else {
            continue;
        };
        if a.is_empty() || b.is_empty() {
            continue;
        }

        let root = sig.return_type;
        let p1 = pick_point(a, &(0..a.len()).collect::<Vec<_>>(), config, rng);
        let required_at_p1 = a.required_type_at(p1, root);
        let Some(provided_at_p1) = a.node(p1).map(Node::return_type) else {
            continue;
        };

        let parents_b = b.parents();
        let compatible: Vec<usize> = (0..b.len())
            .filter(|&q| {
                let required_at_q = parents_b[q]
                    .and_then(|(p, k)| b.node(p).and_then(|n| n.required_child_type(k)))
                    .unwrap_or(root);
                b.node(q).is_some_and(|n| required_at_p1.accepts(&n.return_type()))
                    && required_at_q.accepts(&provided_at_p1)
            })
            .collect();
        if compatible.is_empty() {
            continue;
        }
        let p2 = pick_point(b, &compatible, config, rng);

        let child_a = a.splice(p1, b.subtree(p2));
        let child_b = b.splice(p2, a.subtree(p1));
        if space.is_valid(c, &child_a) && space.is_valid(c, &child_b) {
            let mut offspring1 = parent1.clone();
            let mut offspring2 = parent2.clone();
            offspring1.replace_chromosome(c, child_a);
            offspring2.replace_chromosome(c, child_b);
            return (offspring1, offspring2);
        }
    }

    debug!("crossover attempts exhausted, returning parents");
    (parent1.clone(), parent2.clone())
}

/// Choose among `positions`, landing on a function node with probability
/// `function_point_rate` when any of them is one.
fn pick_point<R: Rng>(program: &Program, positions: &[usize], config: &CrossoverConfig, rng: &mut R) -> usize {
    let functions: Vec<usize> = positions
        .iter()
        .copied()
        .filter(|&p| program.node(p).is_some_and(|n| !n.is_terminal()))
        .collect();
    let terminals: Vec<usize> = positions
        .iter()
        .copied()
        .filter(|&p| program.node(p).is_some_and(Node::is_terminal))
        .collect();

    let use_functions = !functions.is_empty()
        && (terminals.is_empty() || rng.gen_bool(config.function_point_rate.clamp(0.0, 1.0)));
    let pool = if use_functions { &functions } else { &terminals };
    if pool.is_empty() {
        return positions.first().copied().unwrap_or(0);
    }
    pool[rng.gen_range(0..pool.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderConfig, GenerationMode, ProgramBuilder};
    use crate::gp::genome::Genotype;
    use crate::node::Op;
    use crate::types::{Signature, TypeSpec, Value, ValueType};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn mixed_space(max_depth: usize) -> ProgramSpace {
        let double = TypeSpec::of(ValueType::Double);
        let nodes = vec![
            Node::op(Op::Add, double),
            Node::op(Op::Mul, double),
            Node::if_else(double),
            Node::op(Op::Gt, double),
            Node::op(Op::And, ValueType::Boolean),
            Node::variable("x", double),
            Node::ephemeral(ValueType::Double, -2.0, 2.0),
            Node::constant(Value::Boolean(true)),
        ];
        ProgramSpace::new(vec![Signature::new(double, 1, max_depth)], vec![nodes]).unwrap()
    }

    #[test]
    fn test_children_are_valid_or_parents() {
        let space = mixed_space(5);
        let builder = ProgramBuilder::new(&space, BuilderConfig::default());
        let mut rng = SmallRng::seed_from_u64(42);
        let config = CrossoverConfig::default();

        for _ in 0..200 {
            let a = builder.build_individual(GenerationMode::Grow, &mut rng).unwrap();
            let b = builder.build_individual(GenerationMode::Full, &mut rng).unwrap();
            let (c1, c2) = crossover(&a, &b, &space, &config, &mut rng);
            let valid = space.is_valid_individual(&c1) && space.is_valid_individual(&c2);
            let unchanged = c1 == a && c2 == b;
            assert!(valid || unchanged);
            assert!(space.is_valid_individual(&c1));
            assert!(space.is_valid_individual(&c2));
        }
    }

    #[test]
    fn test_node_count_is_conserved() {
        let space = mixed_space(6);
        let builder = ProgramBuilder::new(&space, BuilderConfig::default());
        let mut rng = SmallRng::seed_from_u64(5);
        let config = CrossoverConfig::default();

        for _ in 0..100 {
            let a = builder.build_individual(GenerationMode::Grow, &mut rng).unwrap();
            let b = builder.build_individual(GenerationMode::Grow, &mut rng).unwrap();
            let (c1, c2) = crossover(&a, &b, &space, &config, &mut rng);
            assert_eq!(c1.node_count() + c2.node_count(), a.node_count() + b.node_count());
        }
    }

    #[test]
    fn test_fitness_survives_only_on_unchanged_children() {
        let space = mixed_space(2);
        let double = TypeSpec::of(ValueType::Double);
        let a = Individual::new(vec![Program::from_nodes(vec![
            Node::op(Op::Add, double),
            Node::variable("x", double),
            Node::variable("x", double),
        ])]);
        let mut b = a.clone();
        b.set_fitness(Some(3.0));
        let config = CrossoverConfig {
            function_point_rate: 1.0,
            max_attempts: 1,
        };
        let mut rng = SmallRng::seed_from_u64(1);
        let (c1, c2) = crossover(&a, &b, &space, &config, &mut rng);
        assert!(space.is_valid_individual(&c1));
        assert!(space.is_valid_individual(&c2));
        assert_eq!(c2.fitness().is_some(), c2 == b);
    }

    #[test]
    fn test_parents_are_not_modified() {
        let space = mixed_space(5);
        let builder = ProgramBuilder::new(&space, BuilderConfig::default());
        let mut rng = SmallRng::seed_from_u64(77);
        let a = builder.build_individual(GenerationMode::Full, &mut rng).unwrap();
        let b = builder.build_individual(GenerationMode::Full, &mut rng).unwrap();
        let (a0, b0) = (a.clone(), b.clone());
        let _ = crossover(&a, &b, &space, &CrossoverConfig::default(), &mut rng);
        assert_eq!(a, a0);
        assert_eq!(b, b0);
    }
}
