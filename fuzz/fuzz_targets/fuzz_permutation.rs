#![no_main]

//! Permutation operator fuzzer: gene multisets and pinned prefixes survive
//! greedy crossover and swap mutation.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use sylva::gp::{greedy_crossover, swap_mutate};

/// Structured input for permutation fuzzing.
#[derive(Arbitrary, Debug)]
struct PermutationInput {
    /// First parent.
    first: Vec<u8>,
    /// Order of the second parent, as sort keys.
    keys: Vec<u16>,
    /// Pinned prefix length.
    offset: u8,
    /// Swap rate.
    rate: u8,
    /// Mutation seed.
    seed: u64,
}

fn sorted(genes: &[u8]) -> Vec<u8> {
    let mut genes = genes.to_vec();
    genes.sort_unstable();
    genes
}

fuzz_target!(|input: PermutationInput| {
    let first = input.first;
    let offset = usize::from(input.offset).min(first.len());
    let mut tail: Vec<(u16, u8)> = first[offset..]
        .iter()
        .enumerate()
        .map(|(i, &g)| (input.keys.get(i).copied().unwrap_or(0), g))
        .collect();
    tail.sort_unstable();
    let second: Vec<u8> = first[..offset].iter().copied().chain(tail.into_iter().map(|(_, g)| g)).collect();

    let distance = |a: &u8, b: &u8| f64::from(a.abs_diff(*b));
    let child = greedy_crossover(&first, &second, offset, distance);
    assert_eq!(sorted(&child), sorted(&first));
    assert_eq!(&child[..offset], &first[..offset]);

    let mut rng = SmallRng::seed_from_u64(input.seed);
    let mutated = swap_mutate(&child, offset, u32::from(input.rate), &mut rng);
    assert_eq!(sorted(&mutated), sorted(&first));
    assert_eq!(&mutated[..offset], &first[..offset]);
});
