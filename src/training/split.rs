//! Stratified train/test splitting

use crate::error::{ExoError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Row indices of the two partitions, each sorted ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Partition row indices so each class keeps its proportion in both halves.
///
/// The test partition has `ceil(n * test_size)` rows (at least 1, at most
/// `n - 1`), spread across classes by largest remainder. Every class keeps
/// at least one row in the training partition. The same labels, fraction
/// and seed always give the same partitions.
pub fn stratified_split(labels: &[f64], test_size: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ExoError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must be strictly between 0 and 1".to_string(),
        });
    }
    let n = labels.len();
    if n < 2 {
        return Err(ExoError::InsufficientData(format!(
            "need at least 2 rows to split, got {}",
            n
        )));
    }

    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label.round() as i64).or_default().push(i);
    }

    let n_test = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);

    // Largest-remainder allocation of test rows per class
    let quotas: Vec<f64> = by_class
        .values()
        .map(|members| n_test as f64 * members.len() as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();
    let mut leftover = n_test - alloc.iter().sum::<usize>();

    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = quotas[a] - quotas[a].floor();
        let rb = quotas[b] - quotas[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    for &c in order.iter().cycle().take(order.len() * 2) {
        if leftover == 0 {
            break;
        }
        let size = by_class.values().nth(c).map_or(0, Vec::len);
        if alloc[c] + 1 < size {
            alloc[c] += 1;
            leftover -= 1;
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);

    for (members, &take) in by_class.values().zip(&alloc) {
        let mut shuffled = members.clone();
        shuffled.shuffle(&mut rng);
        let take = take.min(shuffled.len().saturating_sub(1));
        test.extend_from_slice(&shuffled[..take]);
        train.extend_from_slice(&shuffled[take..]);
    }

    train.sort_unstable();
    test.sort_unstable();

    Ok(SplitIndices { train, test })
}
