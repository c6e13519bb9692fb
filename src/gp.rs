//! Evolutionary machinery over typed program trees and permutations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │         Evolution Loop              │
//! ├─────────────────────────────────────┤
//! │  Selection │ Crossover │ Mutation   │
//! ├─────────────────────────────────────┤
//! │   Fitness Evaluation + Cache        │
//! ├─────────────────────────────────────┤
//! │  Program Builder → Interpreter      │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sylva::gp::{Evolution, EvolutionConfig, FitnessEvaluator, TreeBreeder};
//!
//! let breeder = TreeBreeder::new(space, &config);
//! let evaluator = FitnessEvaluator::new(score, config.fitness);
//! let (best, stats) = Evolution::new(config, breeder, evaluator)?.run()?;
//! ```

mod crossover;
mod evolution;
mod fitness;
mod genome;
mod mutation;
mod permutation;
mod selection;

pub use crossover::{CrossoverConfig, crossover};
pub use evolution::{
    Breeder, Evolution, EvolutionConfig, EvolutionStats, GenerationStats, PermutationBreeder,
    StopReason, TreeBreeder,
};
pub use fitness::{CacheStats, FitnessConfig, FitnessEvaluator, FitnessFunction, Objective};
pub use genome::{Genotype, Individual, IndividualRecord};
pub use mutation::{MutationConfig, mutate};
pub use permutation::{Permutation, PermutationConfig, greedy_crossover, swap_mutate};
pub use selection::{
    SelectionConfig, SelectionMethod, SelectionResult, SelectionStats, roulette_select,
    select_elite, select_parents, tournament_select,
};
