// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles items with a seeded RNG and splits them into two
// disjoint sets:
//   - Training set:   fed to the optimizer every epoch
//   - Validation set: held out; the evaluation figure is drawn
//                     from it
//
// The shuffle is seeded: a resumed run must see exactly the
// same partition as the run that wrote the checkpoint.
//
// Uses Fisher-Yates via rand::seq::SliceRandom.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Which side of the partition a dataset represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Training,
    Validation,
}

/// Shuffle `items` deterministically and split into (train, validation).
///
/// # Arguments
/// * `items`   - All available items (consumed by this function)
/// * `holdout` - Fraction reserved for validation, e.g. 0.2
/// * `seed`    - Shuffle seed
pub fn partition<T>(mut items: Vec<T>, holdout: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let total    = items.len();
    let val_len  = ((total as f64) * holdout.clamp(0.0, 1.0)).round() as usize;
    let split_at = total - val_len.min(total);

    // split_off(n) removes elements [n..] and returns them
    let val = items.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation (seed {})",
        items.len(),
        val.len(),
        seed,
    );

    (items, val)
}

/// Keep only the requested side of the partition.
pub fn select<T>(items: Vec<T>, split: Split, holdout: f64, seed: u64) -> Vec<T> {
    let (train, val) = partition(items, holdout, seed);
    match split {
        Split::Training   => train,
        Split::Validation => val,
    }
}
