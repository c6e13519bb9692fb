//! Main evolution loop for genetic programming.
//!
//! This module orchestrates the evolutionary process: initialization,
//! fitness evaluation, selection, crossover, mutation and replacement.
//! Generations are strictly sequential; only fitness evaluation inside one
//! generation runs in parallel.

// Immigrant counts and statistics use intentional casts
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use crate::builder::{BuilderConfig, GenerationMode, ProgramBuilder, ProgramSpace};
use crate::error::GpError;
use crate::gp::crossover::{CrossoverConfig, crossover};
use crate::gp::fitness::{FitnessConfig, FitnessEvaluator};
use crate::gp::genome::{Genotype, Individual};
use crate::gp::mutation::{MutationConfig, mutate};
use crate::gp::permutation::{Permutation, PermutationConfig, greedy_crossover, swap_mutate};
use crate::gp::selection::{SelectionConfig, SelectionStats, select_parents};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Configuration for the evolution process.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Target population size.
    pub population_size: usize,
    /// Maximum number of generations to evaluate.
    pub generations: usize,
    /// RNG seed for reproducibility.
    pub seed: u64,
    /// Truncate back to `population_size` after elites are added.
    pub keep_population_size_constant: bool,
    /// Probability that a selected pair is recombined.
    pub crossover_rate: f64,
    /// Probability that an offspring is mutated.
    pub mutation_rate: f64,
    /// Share of each generation made of freshly built individuals.
    pub new_individuals_rate: f64,
    /// Stop once the best score reaches this value.
    pub fitness_threshold: Option<f64>,
    /// Evaluate fitness on the rayon thread pool.
    pub parallel_evaluation: bool,
    /// Draw a progress bar on stderr.
    pub progress: bool,
    /// Selection configuration.
    pub selection: SelectionConfig,
    /// Crossover configuration.
    pub crossover: CrossoverConfig,
    /// Mutation configuration.
    pub mutation: MutationConfig,
    /// Random construction configuration.
    pub builder: BuilderConfig,
    /// Fitness evaluation configuration.
    pub fitness: FitnessConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            generations: 50,
            seed: 42,
            keep_population_size_constant: true,
            crossover_rate: 0.9,
            mutation_rate: 0.1,
            new_individuals_rate: 0.0,
            fitness_threshold: None,
            parallel_evaluation: true,
            progress: false,
            selection: SelectionConfig::default(),
            crossover: CrossoverConfig::default(),
            mutation: MutationConfig::default(),
            builder: BuilderConfig::default(),
            fitness: FitnessConfig::default(),
        }
    }
}

impl EvolutionConfig {
    /// Reject values the loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), GpError> {
        let invalid = |msg: String| Err(GpError::InvalidConfig(msg));
        if self.population_size < 2 {
            return invalid(format!("population_size must be at least 2, got {}", self.population_size));
        }
        if self.generations == 0 {
            return invalid("generations must be at least 1".to_string());
        }
        for (name, rate) in [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
            ("new_individuals_rate", self.new_individuals_rate),
            ("crossover.function_point_rate", self.crossover.function_point_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return invalid(format!("{name} must lie in [0, 1], got {rate}"));
            }
        }
        if self.selection.tournament_size == 0 {
            return invalid("selection.tournament_size must be at least 1".to_string());
        }
        if self.selection.elite_count > self.population_size {
            return invalid(format!(
                "selection.elite_count ({}) exceeds population_size ({})",
                self.selection.elite_count, self.population_size
            ));
        }
        if !(self.mutation.mutation_percentage >= 0.0 && self.mutation.mutation_percentage.is_finite()) {
            return invalid(format!(
                "mutation.mutation_percentage must be a non-negative number, got {}",
                self.mutation.mutation_percentage
            ));
        }
        Ok(())
    }
}

/// Produces and varies genomes of one encoding.
///
/// The loop owns the random generator and hands it to every call, so a
/// fixed seed reproduces a run.
pub trait Breeder<G> {
    /// Initial population of `size` genomes.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the encoding cannot produce genomes.
    fn initial_population(&self, size: usize, rng: &mut SmallRng) -> Result<Vec<G>, GpError>;

    /// One fresh random genome (an immigrant).
    ///
    /// # Errors
    ///
    /// See [`Breeder::initial_population`].
    fn random_individual(&self, rng: &mut SmallRng) -> Result<G, GpError>;

    /// Two offspring of `first` and `second`. Parents are never modified.
    fn crossover(&self, first: &G, second: &G, rng: &mut SmallRng) -> (G, G);

    /// A mutated copy of `genome`.
    fn mutate(&self, genome: &G, rng: &mut SmallRng) -> G;
}

/// Breeds program-tree individuals over a [`ProgramSpace`].
#[derive(Debug, Clone)]
pub struct TreeBreeder {
    space: Arc<ProgramSpace>,
    builder: BuilderConfig,
    crossover: CrossoverConfig,
    mutation: MutationConfig,
}

impl TreeBreeder {
    /// Breeder taking its operator settings from `config`.
    #[must_use]
    pub fn new(space: Arc<ProgramSpace>, config: &EvolutionConfig) -> Self {
        Self {
            space,
            builder: config.builder,
            crossover: config.crossover,
            mutation: config.mutation,
        }
    }

    /// Program space in use.
    #[must_use]
    pub fn space(&self) -> &ProgramSpace {
        &self.space
    }
}

impl Breeder<Individual> for TreeBreeder {
    fn initial_population(&self, size: usize, rng: &mut SmallRng) -> Result<Vec<Individual>, GpError> {
        ProgramBuilder::new(&self.space, self.builder).build_population(size, rng)
    }

    fn random_individual(&self, rng: &mut SmallRng) -> Result<Individual, GpError> {
        let mode = if rng.gen_bool(0.5) {
            GenerationMode::Grow
        } else {
            GenerationMode::Full
        };
        ProgramBuilder::new(&self.space, self.builder).build_individual(mode, rng)
    }

    fn crossover(&self, first: &Individual, second: &Individual, rng: &mut SmallRng) -> (Individual, Individual) {
        crossover(first, second, &self.space, &self.crossover, rng)
    }

    fn mutate(&self, genome: &Individual, rng: &mut SmallRng) -> Individual {
        mutate(genome, &self.space, &self.mutation, rng)
    }
}

/// Breeds permutations of a fixed gene multiset.
pub struct PermutationBreeder<T, D> {
    genes: Vec<T>,
    config: PermutationConfig,
    distance: D,
}

impl<T: fmt::Debug, D> fmt::Debug for PermutationBreeder<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermutationBreeder")
            .field("genes", &self.genes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T, D> PermutationBreeder<T, D> {
    /// Breeder over `genes`, whose first `config.start_offset` entries are
    /// pinned in every genome.
    #[must_use]
    pub fn new(genes: Vec<T>, config: PermutationConfig, distance: D) -> Self {
        Self {
            genes,
            config,
            distance,
        }
    }
}

impl<T, D> Breeder<Permutation<T>> for PermutationBreeder<T, D>
where
    T: Clone + Ord,
    D: Fn(&T, &T) -> f64,
{
    fn initial_population(&self, size: usize, rng: &mut SmallRng) -> Result<Vec<Permutation<T>>, GpError> {
        (0..size).map(|_| self.random_individual(rng)).collect()
    }

    fn random_individual(&self, rng: &mut SmallRng) -> Result<Permutation<T>, GpError> {
        let mut genes = self.genes.clone();
        let offset = self.config.start_offset.min(genes.len());
        genes[offset..].shuffle(rng);
        Ok(Permutation::new(genes))
    }

    fn crossover(
        &self,
        first: &Permutation<T>,
        second: &Permutation<T>,
        _rng: &mut SmallRng,
    ) -> (Permutation<T>, Permutation<T>) {
        let offset = self.config.start_offset;
        (
            Permutation::new(greedy_crossover(first.genes(), second.genes(), offset, &self.distance)),
            Permutation::new(greedy_crossover(second.genes(), first.genes(), offset, &self.distance)),
        )
    }

    fn mutate(&self, genome: &Permutation<T>, rng: &mut SmallRng) -> Permutation<T> {
        Permutation::new(swap_mutate(
            genome.genes(),
            self.config.start_offset,
            self.config.mutation_rate,
            rng,
        ))
    }
}

/// Statistics for a single generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Generation number.
    pub generation: usize,
    /// Best fitness in this generation.
    pub best_fitness: f64,
    /// Mean fitness.
    pub mean_fitness: f64,
    /// Worst fitness.
    pub worst_fitness: f64,
    /// Fitness standard deviation.
    pub fitness_std: f64,
    /// Cache hits so far.
    pub cache_hits: u64,
    /// Fitness function calls so far.
    pub cache_misses: u64,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured number of generations was evaluated.
    GenerationLimit,
    /// The best score reached the configured threshold.
    FitnessThreshold,
}

/// Overall statistics from an evolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStats {
    /// Statistics per generation.
    pub generations: Vec<GenerationStats>,
    /// Best fitness achieved.
    pub best_fitness: f64,
    /// Generation where best fitness was achieved.
    pub best_generation: usize,
    /// Why the run ended.
    pub stop_reason: StopReason,
    /// Total time in seconds.
    pub elapsed_seconds: f64,
}

/// A running evolution: population, evaluator, breeder and the single
/// random generator driving every stochastic decision.
pub struct Evolution<G, B> {
    config: EvolutionConfig,
    breeder: B,
    evaluator: FitnessEvaluator<G>,
    population: Vec<G>,
    rng: SmallRng,
    generation: usize,
    best: Option<(G, f64)>,
    best_generation: usize,
    history: Vec<GenerationStats>,
}

impl<G, B: fmt::Debug> fmt::Debug for Evolution<G, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evolution")
            .field("config", &self.config)
            .field("breeder", &self.breeder)
            .field("generation", &self.generation)
            .field("population", &self.population.len())
            .finish_non_exhaustive()
    }
}

impl<G: Genotype, B: Breeder<G>> Evolution<G, B> {
    /// Set up a run. The population is built on first use unless one is
    /// supplied with [`Evolution::with_population`].
    ///
    /// # Errors
    ///
    /// Returns [`GpError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: EvolutionConfig, breeder: B, evaluator: FitnessEvaluator<G>) -> Result<Self, GpError> {
        config.validate()?;
        let rng = SmallRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            breeder,
            evaluator,
            population: Vec::new(),
            rng,
            generation: 0,
            best: None,
            best_generation: 0,
            history: Vec::new(),
        })
    }

    /// Start from an existing population instead of a random one.
    #[must_use]
    pub fn with_population(mut self, population: Vec<G>) -> Self {
        self.population = population;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Current population.
    #[must_use]
    pub fn population(&self) -> &[G] {
        &self.population
    }

    /// Consume the run, keeping only its population.
    #[must_use]
    pub fn into_population(self) -> Vec<G> {
        self.population
    }

    /// Index of the current generation.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Best genome seen so far and its score.
    #[must_use]
    pub fn best(&self) -> Option<(&G, f64)> {
        self.best.as_ref().map(|(g, s)| (g, *s))
    }

    /// Statistics of every evaluated generation.
    #[must_use]
    pub fn history(&self) -> &[GenerationStats] {
        &self.history
    }

    /// Fitness evaluator (and its cache).
    #[must_use]
    pub fn evaluator(&self) -> &FitnessEvaluator<G> {
        &self.evaluator
    }

    /// Build the initial population if none is present.
    ///
    /// # Errors
    ///
    /// Propagates the breeder's setup error.
    pub fn initialize(&mut self) -> Result<(), GpError> {
        if self.population.is_empty() {
            self.population = self
                .breeder
                .initial_population(self.config.population_size, &mut self.rng)?;
            info!("initialized population of {}", self.population.len());
        }
        Ok(())
    }

    /// Evaluate the current generation, record its statistics and track the
    /// best genome.
    pub fn evaluate(&mut self) -> GenerationStats {
        self.evaluator
            .evaluate_population(&mut self.population, self.config.parallel_evaluation);
        let fitness = self.fitness_values();
        let objective = self.evaluator.objective();
        let summary = SelectionStats::from_fitness(&fitness, objective);

        if let Some(idx) = objective.best_index(&fitness) {
            let score = fitness[idx];
            if self.best.as_ref().is_none_or(|(_, best)| objective.is_better(score, *best)) {
                self.best = Some((self.population[idx].clone(), score));
                self.best_generation = self.generation;
            }
        }

        let cache = self.evaluator.cache_stats();
        let stats = GenerationStats {
            generation: self.generation,
            best_fitness: summary.best_fitness,
            mean_fitness: summary.mean_fitness,
            worst_fitness: summary.worst_fitness,
            fitness_std: summary.fitness_std,
            cache_hits: cache.hits,
            cache_misses: cache.misses,
        };
        info!(
            "gen {:>5}: best={:.4} mean={:.4} std={:.4}",
            stats.generation, stats.best_fitness, stats.mean_fitness, stats.fitness_std
        );
        debug!(
            "cache: {} hits, {} misses, {} entries ({:.1}% hit rate)",
            cache.hits,
            cache.misses,
            cache.entries,
            cache.hit_rate() * 100.0
        );
        self.history.push(stats);
        stats
    }

    /// Breed the next generation from the evaluated current one.
    ///
    /// Elites come first, then immigrants, then offspring. When the size is
    /// kept constant the surplus left by the elites is cut from the tail.
    ///
    /// # Errors
    ///
    /// Propagates the breeder's error when building immigrants.
    pub fn step(&mut self) -> Result<(), GpError> {
        let target = self.config.population_size;
        let fitness = self.fitness_values();
        let objective = self.evaluator.objective();

        let immigrants = ((target as f64 * self.config.new_individuals_rate).round() as usize).min(target);
        let offspring = target - immigrants;
        let selection = select_parents(&fitness, objective, &self.config.selection, offspring, &mut self.rng);

        let mut next = Vec::with_capacity(target + selection.elite_indices.len());
        next.extend(selection.elite_indices.iter().map(|&i| self.population[i].clone()));
        for _ in 0..immigrants {
            next.push(self.breeder.random_individual(&mut self.rng)?);
        }

        let mut bred = 0;
        for &(a, b) in &selection.parent_pairs {
            let (first, second) = (&self.population[a], &self.population[b]);
            let (c1, c2) = if self.rng.gen_bool(self.config.crossover_rate) {
                self.breeder.crossover(first, second, &mut self.rng)
            } else {
                (first.clone(), second.clone())
            };
            for child in [c1, c2] {
                if bred == offspring {
                    break;
                }
                let child = if self.rng.gen_bool(self.config.mutation_rate) {
                    self.breeder.mutate(&child, &mut self.rng)
                } else {
                    child
                };
                next.push(child);
                bred += 1;
            }
        }

        if self.config.keep_population_size_constant && next.len() > target {
            debug!("truncating generation of {} to {target}", next.len());
            next.truncate(target);
        }

        self.population = next;
        self.generation += 1;
        Ok(())
    }

    /// Run until the generation limit or fitness threshold.
    ///
    /// # Errors
    ///
    /// Propagates setup errors from building the population.
    pub fn run(&mut self) -> Result<(G, EvolutionStats), GpError> {
        self.run_with_callback(|_| {})
    }

    /// Like [`Evolution::run`], calling `callback` after every evaluated
    /// generation.
    ///
    /// # Errors
    ///
    /// See [`Evolution::run`].
    pub fn run_with_callback<F>(&mut self, mut callback: F) -> Result<(G, EvolutionStats), GpError>
    where
        F: FnMut(&GenerationStats),
    {
        let start_time = Instant::now();
        self.initialize()?;
        let objective = self.evaluator.objective();
        let first = self.history.len();
        let pb = self.progress_bar();

        let stop_reason = loop {
            let stats = self.evaluate();
            callback(&stats);
            if let Some(pb) = &pb {
                pb.inc(1);
                pb.set_message(format!("best {:.4}", stats.best_fitness));
            }

            if self
                .config
                .fitness_threshold
                .is_some_and(|threshold| objective.reaches(stats.best_fitness, threshold))
            {
                break StopReason::FitnessThreshold;
            }
            if self.history.len() - first >= self.config.generations {
                break StopReason::GenerationLimit;
            }
            self.step()?;
        };

        if let Some(pb) = pb {
            pb.finish_with_message("done");
        }

        let (best, best_fitness) = self
            .best
            .clone()
            .ok_or_else(|| GpError::InvalidConfig("population is empty".to_string()))?;
        info!(
            "stopped ({stop_reason:?}) after {} generations, best={best_fitness:.4} from gen {}",
            self.history.len() - first,
            self.best_generation
        );

        Ok((
            best,
            EvolutionStats {
                generations: self.history[first..].to_vec(),
                best_fitness,
                best_generation: self.best_generation,
                stop_reason,
                elapsed_seconds: start_time.elapsed().as_secs_f64(),
            },
        ))
    }

    /// Scores of the current population; unevaluated genomes count as worst.
    fn fitness_values(&self) -> Vec<f64> {
        let worst = self.evaluator.worst();
        self.population
            .iter()
            .map(|g| g.fitness().unwrap_or(worst))
            .collect()
    }

    fn progress_bar(&self) -> Option<ProgressBar> {
        if !self.config.progress {
            return None;
        }
        let pb = ProgressBar::new(self.config.generations as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} generations {msg}")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        Some(pb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EvalFault, EvalResult};
    use crate::gp::fitness::Objective;
    use crate::node::{Node, Op};
    use crate::program::{Environment, RunContext};
    use crate::types::{Signature, Value, ValueType};

    fn regression_space() -> Arc<ProgramSpace> {
        let double = ValueType::Double;
        let nodes = vec![
            Node::op(Op::Add, double),
            Node::op(Op::Sub, double),
            Node::op(Op::Mul, double),
            Node::variable("x", double),
            Node::ephemeral(double, -2.0, 2.0),
        ];
        Arc::new(ProgramSpace::new(vec![Signature::new(double, 1, 5)], vec![nodes]).unwrap())
    }

    /// Sum of absolute errors against x^2 + x.
    fn regression_error(ind: &Individual, ctx: &mut RunContext) -> EvalResult<f64> {
        let mut error = 0.0;
        for i in -4..=4 {
            let x = f64::from(i) / 2.0;
            ctx.reset();
            ctx.env.bind("x", Value::Double(x));
            error += (ind.execute_double(ctx)? - (x * x + x)).abs();
        }
        Ok(error)
    }

    fn regression_config() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 40,
            generations: 8,
            seed: 7,
            fitness: FitnessConfig {
                objective: Objective::Minimize,
                ..FitnessConfig::default()
            },
            ..EvolutionConfig::default()
        }
    }

    fn line_distance(a: &u32, b: &u32) -> f64 {
        f64::from(a.abs_diff(*b))
    }

    fn path_length(p: &Permutation<u32>, _: &mut RunContext) -> EvalResult<f64> {
        Ok(p.genes().windows(2).map(|w| line_distance(&w[0], &w[1])).sum())
    }

    #[test]
    fn test_default_config_validates() {
        assert!(EvolutionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            EvolutionConfig {
                population_size: 1,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                generations: 0,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                crossover_rate: 1.5,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                mutation_rate: f64::NAN,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                selection: SelectionConfig {
                    tournament_size: 0,
                    ..SelectionConfig::default()
                },
                ..EvolutionConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(GpError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: EvolutionConfig = serde_json::from_str(r#"{"population_size": 12, "seed": 3}"#).unwrap();
        assert_eq!(config.population_size, 12);
        assert_eq!(config.seed, 3);
        assert_eq!(config.generations, EvolutionConfig::default().generations);
    }

    #[test]
    fn test_elitism_never_loses_the_best() {
        let config = regression_config();
        let breeder = TreeBreeder::new(regression_space(), &config);
        let evaluator = FitnessEvaluator::new(regression_error, config.fitness);
        let mut evolution = Evolution::new(config, breeder, evaluator).unwrap();

        let (best, stats) = evolution.run().unwrap();
        assert_eq!(stats.stop_reason, StopReason::GenerationLimit);
        assert_eq!(stats.generations.len(), 8);
        for pair in stats.generations.windows(2) {
            assert!(pair[1].best_fitness <= pair[0].best_fitness);
        }
        assert_eq!(best.fitness(), Some(stats.best_fitness));
        assert_eq!(evolution.population().len(), 40);
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = || {
            let config = regression_config();
            let breeder = TreeBreeder::new(regression_space(), &config);
            let evaluator = FitnessEvaluator::new(regression_error, config.fitness);
            let mut evolution = Evolution::new(config, breeder, evaluator).unwrap();
            let (best, stats) = evolution.run().unwrap();
            (best.to_string(), stats.best_fitness)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_threshold_stops_after_full_generation() {
        let config = EvolutionConfig {
            population_size: 10,
            generations: 100,
            fitness_threshold: Some(0.5),
            ..EvolutionConfig::default()
        };
        let breeder = TreeBreeder::new(regression_space(), &config);
        let evaluator = FitnessEvaluator::new(|_: &Individual, _: &mut RunContext| Ok::<_, EvalFault>(1.0), config.fitness);
        let mut evolution = Evolution::new(config, breeder, evaluator).unwrap();

        let mut seen = Vec::new();
        let (_, stats) = evolution.run_with_callback(|s| seen.push(s.generation)).unwrap();
        assert_eq!(stats.stop_reason, StopReason::FitnessThreshold);
        assert_eq!(seen, vec![0]);
        assert!(evolution.population().iter().all(|g| g.fitness().is_some()));
    }

    #[test]
    fn test_population_grows_by_elites_when_not_constant() {
        let config = EvolutionConfig {
            population_size: 10,
            keep_population_size_constant: false,
            selection: SelectionConfig {
                elite_count: 3,
                ..SelectionConfig::default()
            },
            ..regression_config()
        };
        let breeder = TreeBreeder::new(regression_space(), &config);
        let evaluator = FitnessEvaluator::new(regression_error, config.fitness);
        let mut evolution = Evolution::new(config, breeder, evaluator).unwrap();

        evolution.initialize().unwrap();
        assert_eq!(evolution.population().len(), 10);
        evolution.evaluate();
        evolution.step().unwrap();
        assert_eq!(evolution.population().len(), 13);
        assert_eq!(evolution.generation(), 1);
    }

    #[test]
    fn test_immigrants_arrive_unevaluated() {
        let config = EvolutionConfig {
            population_size: 10,
            new_individuals_rate: 0.3,
            crossover_rate: 0.0,
            mutation_rate: 0.0,
            selection: SelectionConfig {
                elite_count: 0,
                ..SelectionConfig::default()
            },
            ..regression_config()
        };
        let breeder = TreeBreeder::new(regression_space(), &config);
        let evaluator = FitnessEvaluator::new(regression_error, config.fitness);
        let mut evolution = Evolution::new(config, breeder, evaluator).unwrap();

        evolution.initialize().unwrap();
        evolution.evaluate();
        evolution.step().unwrap();
        let unevaluated = evolution.population().iter().filter(|g| g.fitness().is_none()).count();
        assert_eq!(unevaluated, 3);
        assert_eq!(evolution.population().len(), 10);
    }

    #[test]
    fn test_permutation_run_keeps_tours_valid() {
        let genes: Vec<u32> = (0..9).collect();
        let perm = PermutationConfig {
            start_offset: 1,
            mutation_rate: 4,
        };
        let config = EvolutionConfig {
            population_size: 30,
            generations: 15,
            mutation_rate: 0.5,
            fitness: FitnessConfig {
                objective: Objective::Minimize,
                ..FitnessConfig::default()
            },
            ..EvolutionConfig::default()
        };
        let breeder = PermutationBreeder::new(genes.clone(), perm, line_distance);
        let evaluator = FitnessEvaluator::new(path_length, config.fitness);
        let mut evolution = Evolution::new(config, breeder, evaluator).unwrap();

        let (best, stats) = evolution.run().unwrap();
        assert!(stats.best_fitness <= stats.generations[0].best_fitness);
        assert!(stats.best_fitness >= 8.0);
        for tour in evolution.population() {
            assert_eq!(tour.genes()[0], 0);
            let mut sorted = tour.genes().to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, genes);
        }
        assert_eq!(best.len(), 9);
    }

    #[test]
    fn test_supplied_population_is_used() {
        let config = EvolutionConfig {
            population_size: 4,
            generations: 1,
            ..EvolutionConfig::default()
        };
        let seed: Vec<Permutation<u32>> = (0..4).map(|_| Permutation::new(vec![0, 1, 2])).collect();
        let breeder = PermutationBreeder::new(vec![0, 1, 2], PermutationConfig::default(), line_distance);
        let evaluator = FitnessEvaluator::new(path_length, config.fitness)
            .with_environment(Environment::new());
        let mut evolution = Evolution::new(config, breeder, evaluator)
            .unwrap()
            .with_population(seed);
        let (best, _) = evolution.run().unwrap();
        assert_eq!(best.genes(), &[0, 1, 2]);
        assert_eq!(evolution.evaluator().cache_stats().misses, 1);
    }
}
