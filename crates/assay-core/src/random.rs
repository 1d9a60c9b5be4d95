//! The random source shared by template generation, choice shuffling and
//! test assembly.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Per-attempt random source.
pub type RandomSource = StdRng;

/// A reproducible source for a fixed seed.
pub fn seeded(seed: u64) -> RandomSource {
    StdRng::seed_from_u64(seed)
}

pub fn from_entropy() -> RandomSource {
    StdRng::from_entropy()
}

/// Permute the entries for which `is_fixed` is false, leaving fixed entries
/// at their original indices.
pub fn shuffle_unfixed<T>(
    items: Vec<T>,
    is_fixed: impl Fn(&T) -> bool,
    rng: &mut RandomSource,
) -> Vec<T> {
    let fixed: Vec<bool> = items.iter().map(&is_fixed).collect();
    let mut slots: Vec<Option<T>> = Vec::with_capacity(items.len());
    let mut movable = Vec::new();
    for (item, fixed) in items.into_iter().zip(&fixed) {
        if *fixed {
            slots.push(Some(item));
        } else {
            slots.push(None);
            movable.push(item);
        }
    }
    movable.shuffle(rng);
    let mut movable = movable.into_iter();
    slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| movable.next()))
        .collect()
}
