//! Fitness evaluation for genetic programming.
//!
//! The user scoring function runs behind [`FitnessEvaluator`], which builds
//! a fresh [`RunContext`] per call, turns faults and non-finite scores into
//! the worst-score sentinel, and memoizes results by structural key.

// Cache statistics use intentional casts
#![allow(clippy::cast_precision_loss)]

use crate::error::EvalResult;
use crate::gp::genome::Genotype;
use crate::program::{DEFAULT_STEP_BUDGET, Environment, RunContext};
use dashmap::DashMap;
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Direction of optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    /// Higher scores are better.
    #[default]
    Maximize,
    /// Lower scores are better (error, defect rate).
    Minimize,
}

impl Objective {
    /// Order two scores so that `Greater` means `a` is better.
    #[must_use]
    pub fn compare(self, a: f64, b: f64) -> Ordering {
        let raw = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        match self {
            Self::Maximize => raw,
            Self::Minimize => raw.reverse(),
        }
    }

    /// Whether `a` is strictly better than `b`.
    #[must_use]
    pub fn is_better(self, a: f64, b: f64) -> bool {
        self.compare(a, b) == Ordering::Greater
    }

    /// Default sentinel for faulted or non-finite evaluations.
    #[must_use]
    pub fn default_worst(self) -> f64 {
        match self {
            Self::Maximize => 0.0,
            Self::Minimize => f64::MAX,
        }
    }

    /// Whether `score` meets or beats `threshold`.
    #[must_use]
    pub fn reaches(self, score: f64, threshold: f64) -> bool {
        self.compare(score, threshold) != Ordering::Less
    }

    /// Index of the best score (first one on ties).
    #[must_use]
    pub fn best_index(self, scores: &[f64]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, &s) in scores.iter().enumerate() {
            if best.is_none_or(|b| self.is_better(s, scores[b])) {
                best = Some(i);
            }
        }
        best
    }
}

/// Configuration for fitness evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FitnessConfig {
    /// Whether higher or lower scores are better.
    pub objective: Objective,
    /// Score given to faulted or non-finite evaluations; the objective's
    /// default when absent.
    pub worst_score: Option<f64>,
    /// Node evaluations allowed per fitness call.
    pub step_budget: u64,
    /// Whether to memoize scores by structural key.
    pub cache: bool,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            objective: Objective::Maximize,
            worst_score: None,
            step_budget: DEFAULT_STEP_BUDGET,
            cache: true,
        }
    }
}

impl FitnessConfig {
    /// Effective worst-score sentinel.
    #[must_use]
    pub fn worst(&self) -> f64 {
        self.worst_score.unwrap_or_else(|| self.objective.default_worst())
    }
}

/// User scoring function.
///
/// Must be a pure function of the genome and run-invariant problem data.
/// The context is fresh for every call; its bindings start as the
/// evaluator's template environment.
pub trait FitnessFunction<G>: Send + Sync {
    /// Score one genome.
    ///
    /// # Errors
    ///
    /// Any fault; the evaluator converts it into the worst score.
    fn evaluate(&self, genome: &G, ctx: &mut RunContext) -> EvalResult<f64>;
}

impl<G, F> FitnessFunction<G> for F
where
    F: Fn(&G, &mut RunContext) -> EvalResult<f64> + Send + Sync,
{
    fn evaluate(&self, genome: &G, ctx: &mut RunContext) -> EvalResult<f64> {
        self(genome, ctx)
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Calls into the user scoring function.
    pub misses: u64,
    /// Evaluations that faulted or produced a non-finite score.
    pub faults: u64,
    /// Distinct keys stored.
    pub entries: usize,
}

impl CacheStats {
    /// Share of lookups answered from the cache.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Wraps the user scoring function with sandboxing and a shared cache.
pub struct FitnessEvaluator<G> {
    function: Arc<dyn FitnessFunction<G>>,
    config: FitnessConfig,
    env: Environment,
    cache: DashMap<String, f64>,
    hits: AtomicU64,
    misses: AtomicU64,
    faults: AtomicU64,
}

impl<G> fmt::Debug for FitnessEvaluator<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitnessEvaluator")
            .field("config", &self.config)
            .field("env", &self.env)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl<G: Genotype> FitnessEvaluator<G> {
    /// Evaluator over `function`.
    pub fn new(function: impl FitnessFunction<G> + 'static, config: FitnessConfig) -> Self {
        Self {
            function: Arc::new(function),
            config,
            env: Environment::new(),
            cache: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    /// Bindings every evaluation starts from.
    #[must_use]
    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &FitnessConfig {
        &self.config
    }

    /// Direction of optimization.
    #[must_use]
    pub fn objective(&self) -> Objective {
        self.config.objective
    }

    /// Worst-score sentinel.
    #[must_use]
    pub fn worst(&self) -> f64 {
        self.config.worst()
    }

    /// Score one genome, consulting the cache.
    pub fn evaluate(&self, genome: &G) -> f64 {
        if !self.config.cache {
            return self.score(genome);
        }
        let key = genome.structural_key();
        if let Some(score) = self.cache.get(&key) {
            self.hits.fetch_add(1, AtomicOrdering::Relaxed);
            return *score;
        }
        let score = self.score(genome);
        self.cache.insert(key, score);
        score
    }

    /// Score every genome that has no fitness yet and store the result on it.
    ///
    /// Genomes sharing a structural key are scored once; distinct keys are
    /// scored in parallel when `parallel` is set.
    pub fn evaluate_population(&self, population: &mut [G], parallel: bool) {
        let pending: Vec<usize> = (0..population.len())
            .filter(|&i| population[i].fitness().is_none())
            .collect();
        if pending.is_empty() {
            return;
        }

        if !self.config.cache {
            let scores: Vec<f64> = if parallel {
                pending.par_iter().map(|&i| self.score(&population[i])).collect()
            } else {
                pending.iter().map(|&i| self.score(&population[i])).collect()
            };
            for (&i, score) in pending.iter().zip(scores) {
                population[i].set_fitness(Some(score));
            }
            return;
        }

        let mut keys: Vec<String> = Vec::with_capacity(pending.len());
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        let mut resolved: HashMap<String, f64> = HashMap::new();
        let mut work: Vec<(String, usize)> = Vec::new();
        for &i in &pending {
            let key = population[i].structural_key();
            if let Some(score) = self.cache.get(&key) {
                resolved.insert(key.clone(), *score);
                self.hits.fetch_add(1, AtomicOrdering::Relaxed);
            } else if first_seen.contains_key(&key) {
                self.hits.fetch_add(1, AtomicOrdering::Relaxed);
            } else {
                first_seen.insert(key.clone(), i);
                work.push((key.clone(), i));
            }
            keys.push(key);
        }

        let population_ref: &[G] = &*population;
        let scored: Vec<(String, f64)> = if parallel {
            work.into_par_iter()
                .map(|(key, i)| {
                    let score = self.score(&population_ref[i]);
                    (key, score)
                })
                .collect()
        } else {
            work.into_iter()
                .map(|(key, i)| {
                    let score = self.score(&population_ref[i]);
                    (key, score)
                })
                .collect()
        };
        for (key, score) in scored {
            self.cache.insert(key.clone(), score);
            resolved.insert(key, score);
        }

        let worst = self.worst();
        for (&i, key) in pending.iter().zip(&keys) {
            let score = resolved.get(key).copied().unwrap_or(worst);
            population[i].set_fitness(Some(score));
        }

        debug!(
            "evaluated {} genomes: {} distinct, cache holds {}",
            pending.len(),
            first_seen.len(),
            self.cache.len()
        );
    }

    /// Counters since construction (or the last [`FitnessEvaluator::clear_cache`]).
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(AtomicOrdering::Relaxed),
            misses: self.misses.load(AtomicOrdering::Relaxed),
            faults: self.faults.load(AtomicOrdering::Relaxed),
            entries: self.cache.len(),
        }
    }

    /// Forget cached scores and reset counters.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.hits.store(0, AtomicOrdering::Relaxed);
        self.misses.store(0, AtomicOrdering::Relaxed);
        self.faults.store(0, AtomicOrdering::Relaxed);
    }

    /// One sandboxed call into the user function.
    fn score(&self, genome: &G) -> f64 {
        self.misses.fetch_add(1, AtomicOrdering::Relaxed);
        let mut ctx = RunContext::new(self.env.clone(), self.config.step_budget);
        match self.function.evaluate(genome, &mut ctx) {
            Ok(score) if score.is_finite() => score,
            Ok(score) => {
                self.faults.fetch_add(1, AtomicOrdering::Relaxed);
                debug!("non-finite score {score} replaced by the worst score");
                self.worst()
            }
            Err(fault) => {
                self.faults.fetch_add(1, AtomicOrdering::Relaxed);
                warn!("evaluation fault after {} steps: {fault}", ctx.steps());
                self.worst()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalFault;
    use crate::gp::genome::Individual;
    use crate::node::{Node, Op};
    use crate::program::Program;
    use crate::types::{Value, ValueType};
    use std::sync::atomic::AtomicUsize;

    fn constant(v: i32) -> Individual {
        Individual::new(vec![Program::from_nodes(vec![Node::constant(Value::Integer(v))])])
    }

    fn run_int(ind: &Individual, ctx: &mut RunContext) -> EvalResult<f64> {
        ind.execute_int(ctx).map(f64::from)
    }

    #[test]
    fn test_objective_comparator() {
        assert!(Objective::Maximize.is_better(2.0, 1.0));
        assert!(Objective::Minimize.is_better(1.0, 2.0));
        assert_eq!(Objective::Minimize.best_index(&[3.0, 1.0, 2.0]), Some(1));
        assert_eq!(Objective::Maximize.best_index(&[3.0, 5.0, 5.0]), Some(1));
        assert!(Objective::Minimize.reaches(0.001, 0.01));
        assert!(!Objective::Maximize.reaches(0.5, 0.9));
    }

    #[test]
    fn test_faults_and_nan_become_worst() {
        let evaluator = FitnessEvaluator::new(
            |ind: &Individual, _: &mut RunContext| {
                let v = ind.chromosomes()[0].nodes()[0].value().map_or(0, Value::to_i32);
                match v {
                    1 => Err(EvalFault::Domain("crashed".into())),
                    2 => Ok(f64::NAN),
                    _ => Ok(f64::from(v)),
                }
            },
            FitnessConfig {
                worst_score: Some(-1.0),
                ..FitnessConfig::default()
            },
        );
        assert!((evaluator.evaluate(&constant(1)) + 1.0).abs() < 1e-12);
        assert!((evaluator.evaluate(&constant(2)) + 1.0).abs() < 1e-12);
        assert!((evaluator.evaluate(&constant(5)) - 5.0).abs() < 1e-12);
        assert_eq!(evaluator.cache_stats().faults, 2);
    }

    #[test]
    fn test_budget_fault_yields_worst() {
        let looping = Individual::new(vec![Program::from_nodes(vec![
            Node::repeat("n", None, 1_000, ValueType::Integer),
            Node::op(Op::Add, ValueType::Integer),
            Node::constant(Value::Integer(1)),
            Node::constant(Value::Integer(1)),
        ])]);
        let evaluator = FitnessEvaluator::new(
            run_int,
            FitnessConfig {
                objective: Objective::Minimize,
                step_budget: 100,
                ..FitnessConfig::default()
            },
        )
        .with_environment(Environment::new().with("n", Value::Integer(1_000)));
        let score = evaluator.evaluate(&looping);
        assert!((score - f64::MAX).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_calls_function_once_per_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let evaluator = FitnessEvaluator::new(
            move |ind: &Individual, ctx: &mut RunContext| {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                run_int(ind, ctx)
            },
            FitnessConfig::default(),
        );
        let mut population: Vec<Individual> = (0..30).map(|i| constant(i % 3)).collect();
        evaluator.evaluate_population(&mut population, true);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 3);
        assert!(population.iter().all(|ind| ind.fitness().is_some()));

        let mut again: Vec<Individual> = (0..5).map(constant).collect();
        evaluator.evaluate_population(&mut again, true);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 5);
        assert_eq!(evaluator.cache_stats().misses, 5);
        assert_eq!(evaluator.cache_stats().entries, 5);
    }

    fn run_double(ind: &Individual, ctx: &mut RunContext) -> EvalResult<f64> {
        ind.execute_double(ctx)
    }

    fn single(nodes: Vec<Node>) -> Individual {
        Individual::new(vec![Program::from_nodes(nodes)])
    }

    #[test]
    fn test_cache_separates_loop_index_bindings() {
        let int = ValueType::Integer;
        let indexed = single(vec![
            Node::repeat("n", Some("i".to_string()), 4, int),
            Node::variable("i", int),
        ]);
        let plain = single(vec![Node::repeat("n", None, 4, int), Node::variable("i", int)]);
        assert_ne!(indexed.structural_key(), plain.structural_key());

        let env = Environment::new()
            .with("n", Value::Integer(3))
            .with("i", Value::Integer(100));
        let evaluator = FitnessEvaluator::new(run_double, FitnessConfig::default()).with_environment(env);
        assert!((evaluator.evaluate(&indexed) - 2.0).abs() < 1e-12);
        assert!((evaluator.evaluate(&plain) - 100.0).abs() < 1e-12);
        assert_eq!(evaluator.cache_stats().entries, 2);
    }

    #[test]
    fn test_cache_separates_operand_types() {
        let sum = |ty: ValueType| single(vec![Node::op(Op::Add, ty), Node::variable("x", ty), Node::variable("x", ty)]);
        let (as_int, as_double) = (sum(ValueType::Integer), sum(ValueType::Double));
        assert_eq!(as_int.to_string(), as_double.to_string());
        assert_ne!(as_int.structural_key(), as_double.structural_key());

        let evaluator = FitnessEvaluator::new(run_double, FitnessConfig::default())
            .with_environment(Environment::new().with("x", Value::Double(1.5)));
        let mut population = vec![as_int, as_double];
        evaluator.evaluate_population(&mut population, false);
        assert_eq!(population[0].fitness(), Some(2.0));
        assert_eq!(population[1].fitness(), Some(3.0));
        assert_eq!(evaluator.cache_stats().misses, 2);
    }

    #[test]
    fn test_evaluated_genomes_are_skipped() {
        let evaluator = FitnessEvaluator::new(run_int, FitnessConfig::default());
        let mut population = vec![constant(3), constant(4)];
        population[0].set_fitness(Some(100.0));
        evaluator.evaluate_population(&mut population, false);
        assert_eq!(population[0].fitness(), Some(100.0));
        assert_eq!(population[1].fitness(), Some(4.0));
    }

    #[test]
    fn test_uncached_mode() {
        let evaluator = FitnessEvaluator::new(
            run_int,
            FitnessConfig {
                cache: false,
                ..FitnessConfig::default()
            },
        );
        let mut population = vec![constant(7), constant(7)];
        evaluator.evaluate_population(&mut population, false);
        assert_eq!(evaluator.cache_stats().misses, 2);
        assert_eq!(evaluator.cache_stats().entries, 0);
    }
}
