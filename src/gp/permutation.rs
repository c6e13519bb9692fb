//! Permutation-encoded individuals for combinatorial problems.
//!
//! Genes are an ordering of a fixed multiset (e.g. cities of a tour). The
//! first `start_offset` genes are pinned and never move. Both operators
//! preserve the gene multiset exactly.

use crate::gp::genome::Genotype;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for permutation operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PermutationConfig {
    /// Number of leading genes that never move.
    pub start_offset: usize,
    /// Each movable gene swaps with probability `1 / mutation_rate`;
    /// zero disables swapping.
    pub mutation_rate: u32,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            start_offset: 0,
            mutation_rate: 10,
        }
    }
}

/// An ordering of genes plus cached fitness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permutation<T> {
    genes: Vec<T>,
    fitness: Option<f64>,
}

impl<T> Permutation<T> {
    /// Unevaluated permutation.
    #[must_use]
    pub fn new(genes: Vec<T>) -> Self {
        Self {
            genes,
            fitness: None,
        }
    }

    /// Genes in order.
    #[must_use]
    pub fn genes(&self) -> &[T] {
        &self.genes
    }

    /// Number of genes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    /// Whether there are no genes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

impl<T> Genotype for Permutation<T>
where
    T: Clone + fmt::Debug + Send + Sync,
{
    fn structural_key(&self) -> String {
        format!("{:?}", self.genes)
    }

    fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    fn set_fitness(&mut self, fitness: Option<f64>) {
        self.fitness = fitness;
    }
}

/// Greedy edge-recombination crossover producing one child.
///
/// The child starts with `first`'s pinned prefix. It is then extended one
/// gene at a time: the successors of the last placed gene in `first` and in
/// `second` are compared by `distance`, and the closer one is placed. When a
/// successor is missing or already used the other one is taken; when both
/// are unavailable, or their distances tie, the smallest remaining gene is
/// taken. The child holds exactly the genes of `first`.
#[must_use]
pub fn greedy_crossover<T, D>(first: &[T], second: &[T], start_offset: usize, distance: D) -> Vec<T>
where
    T: Clone + Ord,
    D: Fn(&T, &T) -> f64,
{
    let offset = start_offset.min(first.len());
    let mut child: Vec<T> = first[..offset].to_vec();
    let mut remaining: Vec<T> = first[offset..].to_vec();
    remaining.sort();

    if child.is_empty() && !remaining.is_empty() {
        let seed = first[0].clone();
        take(&mut remaining, &seed);
        child.push(seed);
    }

    while !remaining.is_empty() {
        let Some(last) = child.last().cloned() else {
            break;
        };
        let available = |parent: &[T]| {
            successor(parent, &last).filter(|g| remaining.binary_search(g).is_ok())
        };
        let picked = match (available(first), available(second)) {
            (Some(a), Some(b)) if a == b => a,
            (Some(a), Some(b)) => {
                let (da, db) = (distance(&last, &a), distance(&last, &b));
                if da < db {
                    a
                } else if db < da {
                    b
                } else {
                    remaining[0].clone()
                }
            }
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => remaining[0].clone(),
        };
        take(&mut remaining, &picked);
        child.push(picked);
    }

    child
}

/// Gene following the first occurrence of `gene` in `parent`.
fn successor<T: Clone + PartialEq>(parent: &[T], gene: &T) -> Option<T> {
    let pos = parent.iter().position(|g| g == gene)?;
    parent.get(pos + 1).cloned()
}

/// Remove one occurrence of `gene` from the sorted `remaining`.
fn take<T: Ord>(remaining: &mut Vec<T>, gene: &T) {
    if let Ok(pos) = remaining.binary_search(gene) {
        remaining.remove(pos);
    }
}

/// Swap mutation on a copy of `genes`.
///
/// Every gene at or after `start_offset` swaps, with probability
/// `1 / rate`, with another random gene at or after `start_offset`.
#[must_use]
pub fn swap_mutate<T: Clone, R: Rng>(genes: &[T], start_offset: usize, rate: u32, rng: &mut R) -> Vec<T> {
    let mut out = genes.to_vec();
    let n = out.len();
    if rate == 0 || start_offset + 1 >= n {
        return out;
    }
    for i in start_offset..n {
        if rng.gen_range(0..rate) == 0 {
            let j = rng.gen_range(start_offset..n);
            out.swap(i, j);
        }
    }
    out
}
