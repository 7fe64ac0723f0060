//! Dataset-wide transforms built on [`Dataset::transform`]

use crate::dataset::Dataset;
use crate::error::{DatasetError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};

/// Reassign every item to one of `splits` at random
///
/// `splits` pairs a subset name with its share of the items; shares must
/// sum to 1. The assignment depends only on `seed` and the dataset's
/// iteration order. Split sizes are rounded, the last split takes the
/// remainder.
pub fn random_split(dataset: &mut Dataset, splits: &[(&str, f64)], seed: u64) -> Result<()> {
    if splits.is_empty() {
        return Err(DatasetError::config("random_split needs at least one split"));
    }
    if splits.iter().any(|(_, ratio)| !(*ratio > 0.0 && *ratio <= 1.0)) {
        return Err(DatasetError::config("split ratios must be in (0, 1]"));
    }
    let total: f64 = splits.iter().map(|(_, ratio)| ratio).sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(DatasetError::config(format!(
            "split ratios must sum to 1, got {}",
            total
        )));
    }

    let keys: Vec<(String, String)> = dataset.iter().map(|item| item.key()).collect();
    let mut order: Vec<usize> = (0..keys.len()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut targets: HashMap<(String, String), String> = HashMap::with_capacity(keys.len());
    let mut start = 0;
    for (i, (name, ratio)) in splits.iter().enumerate() {
        let end = if i + 1 == splits.len() {
            keys.len()
        } else {
            (start + (keys.len() as f64 * ratio).round() as usize).min(keys.len())
        };
        for &k in &order[start..end] {
            targets.insert(keys[k].clone(), name.to_string());
        }
        start = end;
    }

    let mut seen = HashSet::with_capacity(keys.len());
    for ((id, _), target) in &targets {
        if !seen.insert((id, target)) {
            return Err(DatasetError::config(format!(
                "random_split would merge two items with id '{}' in subset '{}'",
                id, target
            )));
        }
    }

    dataset.transform(|item| {
        let target = targets.get(&item.key()).cloned();
        match target {
            Some(subset) => Some(item.with_subset(subset)),
            None => Some(item),
        }
    });
    Ok(())
}
