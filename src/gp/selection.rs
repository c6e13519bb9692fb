//! Selection operators for genetic programming.
//!
//! Selection determines which individuals survive and reproduce based on
//! fitness. Every operator takes the [`Objective`] so no direction of
//! optimization is hard-coded.

// Selection uses intentional casts for statistics
#![allow(clippy::cast_precision_loss)]

use crate::gp::fitness::Objective;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How parents are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Best of `tournament_size` uniform draws.
    #[default]
    Tournament,
    /// Fitness-proportionate draw.
    Roulette,
}

/// Configuration for selection operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Parent selection operator.
    pub method: SelectionMethod,
    /// Number of individuals competing in each tournament.
    pub tournament_size: usize,
    /// Number of elite individuals copied unchanged into the next generation.
    pub elite_count: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            method: SelectionMethod::Tournament,
            tournament_size: 5,
            elite_count: 2,
        }
    }
}

/// Result of selection: indices into the current population.
#[derive(Debug)]
pub struct SelectionResult {
    /// Indices of elite individuals (preserved unchanged).
    pub elite_indices: Vec<usize>,
    /// Pairs of parent indices for crossover.
    pub parent_pairs: Vec<(usize, usize)>,
}

/// Select elites plus enough parent pairs to breed `offspring` children.
#[must_use]
pub fn select_parents<R: Rng>(
    fitness: &[f64],
    objective: Objective,
    config: &SelectionConfig,
    offspring: usize,
    rng: &mut R,
) -> SelectionResult {
    let elite_indices = select_elite(fitness, objective, config.elite_count);

    let pairs_needed = offspring.div_ceil(2);
    let mut parent_pairs = Vec::with_capacity(pairs_needed);
    if !fitness.is_empty() {
        for _ in 0..pairs_needed {
            let p1 = pick(fitness, objective, config, rng);
            let p2 = pick(fitness, objective, config, rng);
            parent_pairs.push((p1, p2));
        }
    }

    SelectionResult {
        elite_indices,
        parent_pairs,
    }
}

fn pick<R: Rng>(fitness: &[f64], objective: Objective, config: &SelectionConfig, rng: &mut R) -> usize {
    match config.method {
        SelectionMethod::Tournament => tournament_select(fitness, objective, config.tournament_size, rng),
        SelectionMethod::Roulette => roulette_select(fitness, objective, rng),
    }
}

/// Select the top `count` individuals, best first. Ties keep population order.
#[must_use]
pub fn select_elite(fitness: &[f64], objective: Objective, count: usize) -> Vec<usize> {
    let mut indexed: Vec<usize> = (0..fitness.len()).collect();
    indexed.sort_by(|&a, &b| objective.compare(fitness[b], fitness[a]));
    indexed.truncate(count);
    indexed
}

/// Tournament selection: draw `k` individuals uniformly with replacement and
/// return the best.
///
/// When `k` covers the whole population every individual competes, so the
/// best one always wins.
#[must_use]
pub fn tournament_select<R: Rng>(fitness: &[f64], objective: Objective, k: usize, rng: &mut R) -> usize {
    let pop_size = fitness.len();
    if pop_size == 0 {
        return 0;
    }
    if k >= pop_size {
        return objective.best_index(fitness).unwrap_or(0);
    }

    let k = k.max(1);
    let mut best_idx = rng.gen_range(0..pop_size);
    for _ in 1..k {
        let idx = rng.gen_range(0..pop_size);
        if objective.is_better(fitness[idx], fitness[best_idx]) {
            best_idx = idx;
        }
    }

    best_idx
}

/// Roulette selection: draw proportional to non-negative, finite fitness
/// mass. Under [`Objective::Minimize`] the mass is `1 / (1 + score - best)`,
/// where `best` is the lowest finite score, so the best individual weighs 1
/// whatever the sign of the scores.
///
/// If no individual carries mass the draw is uniform.
#[must_use]
pub fn roulette_select<R: Rng>(fitness: &[f64], objective: Objective, rng: &mut R) -> usize {
    if fitness.is_empty() {
        return 0;
    }
    let best = fitness
        .iter()
        .copied()
        .filter(|f| f.is_finite())
        .fold(f64::INFINITY, f64::min);
    let mass: Vec<f64> = fitness
        .iter()
        .map(|&f| {
            let m = match objective {
                Objective::Maximize => f,
                Objective::Minimize => 1.0 / (1.0 + (f - best)),
            };
            if m.is_finite() && m > 0.0 { m } else { 0.0 }
        })
        .collect();
    let total: f64 = mass.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return rng.gen_range(0..fitness.len());
    }

    let mut target = rng.gen_range(0.0..total);
    for (i, m) in mass.iter().enumerate() {
        if target < *m {
            return i;
        }
        target -= m;
    }
    mass.iter().rposition(|m| *m > 0.0).unwrap_or(0)
}

/// Fitness statistics of one population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionStats {
    /// Mean fitness of the population.
    pub mean_fitness: f64,
    /// Best fitness in the population.
    pub best_fitness: f64,
    /// Worst fitness in the population.
    pub worst_fitness: f64,
    /// Standard deviation of fitness.
    pub fitness_std: f64,
}

impl SelectionStats {
    /// Calculate statistics from fitness values.
    #[must_use]
    pub fn from_fitness(fitness: &[f64], objective: Objective) -> Self {
        if fitness.is_empty() {
            return Self {
                mean_fitness: 0.0,
                best_fitness: 0.0,
                worst_fitness: 0.0,
                fitness_std: 0.0,
            };
        }

        let sum: f64 = fitness.iter().sum();
        let mean = sum / fitness.len() as f64;

        let mut best = fitness[0];
        let mut worst = fitness[0];
        for &f in &fitness[1..] {
            if objective.is_better(f, best) {
                best = f;
            }
            if objective.is_better(worst, f) {
                worst = f;
            }
        }

        let variance: f64 = fitness
            .iter()
            .map(|f| (f - mean).powi(2))
            .sum::<f64>()
            / fitness.len() as f64;

        Self {
            mean_fitness: mean,
            best_fitness: best,
            worst_fitness: worst,
            fitness_std: variance.sqrt(),
        }
    }
}
