//! Point mutation for program trees.
//!
//! One node is picked and replaced by a variant with the same shape (return
//! type and child types), so the tree stays type-correct:
//!
//! - ranged numeric constants are nudged by up to `mutation_percentage` of
//!   their range; a nudge that leaves the range, or a percentage at or above
//!   `replace_threshold`, draws a fresh random value instead
//! - boolean constants are negated
//! - operators with a partner swap to it (`+` ↔ `-`, `>` ↔ `<`, ...)
//! - anything else is replaced by another vocabulary node of the same shape

// Integer constants are nudged through f64
#![allow(clippy::cast_possible_truncation)]

use crate::builder::{ProgramSpace, instantiate, random_in_range};
use crate::gp::genome::Individual;
use crate::node::{Node, NodeKind};
use crate::types::{Value, ValueType};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configuration for mutation operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Size of a constant nudge as a share of the constant's range.
    pub mutation_percentage: f64,
    /// Percentages at or above this replace constants outright.
    pub replace_threshold: f64,
    /// Nodes tried before giving up.
    pub max_attempts: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            mutation_percentage: 0.1,
            replace_threshold: 0.5,
            max_attempts: 10,
        }
    }
}

/// Mutate a copy of `individual`.
///
/// The input is never touched. Returns a plain clone if no node could be
/// changed within `config.max_attempts`.
#[must_use]
pub fn mutate<R: Rng>(
    individual: &Individual,
    space: &ProgramSpace,
    config: &MutationConfig,
    rng: &mut R,
) -> Individual {
    let chromosomes = individual.chromosomes().len().min(space.chromosome_count());
    if chromosomes == 0 {
        return individual.clone();
    }

    for _ in 0..config.max_attempts {
        let c = rng.gen_range(0..chromosomes);
        let Some(program) = individual.chromosome(c) else {
            continue;
        };
        if program.is_empty() {
            continue;
        }
        let pos = rng.gen_range(0..program.len());
        let Some(node) = program.node(pos) else {
            continue;
        };
        let Some(replacement) = mutate_node(node, c, space, config, rng) else {
            continue;
        };

        let mut mutated = program.clone();
        if let Some(slot) = mutated.node_mut(pos) {
            *slot = replacement;
        }
        if space.is_valid(c, &mutated) {
            let mut child = individual.clone();
            child.replace_chromosome(c, mutated);
            return child;
        }
    }

    debug!("mutation attempts exhausted, returning a clone");
    individual.clone()
}

/// Same-shape variant of `node`, if one exists.
fn mutate_node<R: Rng>(
    node: &Node,
    chromosome: usize,
    space: &ProgramSpace,
    config: &MutationConfig,
    rng: &mut R,
) -> Option<Node> {
    match node.kind() {
        NodeKind::Constant {
            value,
            range: Some(range),
        } => {
            let ty = node.return_type().value;
            let pct = config.mutation_percentage;
            let fresh = if pct >= config.replace_threshold {
                random_in_range(ty, range.min, range.max, rng)
            } else {
                let delta = range.width() * pct * rng.gen_range(-1.0..=1.0);
                let nudged = match ty {
                    ValueType::Integer | ValueType::Long => (value.to_f64() + delta).round(),
                    _ => value.to_f64() + delta,
                };
                if range.contains(nudged) {
                    Value::from_f64(ty, nudged)
                } else {
                    random_in_range(ty, range.min, range.max, rng)
                }
            };
            let mut mutated = node.clone();
            mutated.set_value(fresh);
            Some(mutated)
        }
        NodeKind::Constant {
            value: Value::Boolean(b),
            range: None,
        } => {
            let mut mutated = node.clone();
            mutated.set_value(Value::Boolean(!b));
            Some(mutated)
        }
        NodeKind::Op(op) if op.partner().is_some() => {
            op.partner().map(|partner| node.with_kind(NodeKind::Op(partner)))
        }
        _ => {
            let label = node.label();
            let substitutes: Vec<&Node> = space
                .nodes(chromosome)
                .iter()
                .filter(|n| n.same_shape(node) && n.label() != label)
                .collect();
            if substitutes.is_empty() {
                return None;
            }
            Some(instantiate(substitutes[rng.gen_range(0..substitutes.len())], rng))
        }
    }
}
