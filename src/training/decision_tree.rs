//! Decision tree classifier

use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with the predicted class value
    Leaf {
        value: f64,
        n_samples: usize,
        /// Class fractions at this node, aligned with the tree's classes
        #[serde(default)]
        distribution: Vec<f64>,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
        #[serde(default)]
        distribution: Vec<f64>,
    },
}

impl TreeNode {
    /// Class fractions of the training rows that reached this node
    pub fn distribution(&self) -> &[f64] {
        match self {
            TreeNode::Leaf { distribution, .. } | TreeNode::Split { distribution, .. } => distribution,
        }
    }
}

/// Gini-impurity decision tree for classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features sampled per split (all when `None`)
    pub max_features: Option<usize>,
    /// Seed for feature sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Sorted distinct class values seen during fit
    classes: Vec<f64>,
}

/// Best split found for one node
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
            n_features: 0,
            feature_importances: None,
            classes: Vec::new(),
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Number of candidate features drawn at every split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(ExoError::InvalidParameter {
                name: "y".to_string(),
                value: y.len().to_string(),
                reason: format!("expected {} labels to match the rows of x", n_samples),
            });
        }

        if n_samples < self.min_samples_split {
            return Err(ExoError::InsufficientData(format!(
                "need at least {} samples to fit a tree, got {}",
                self.min_samples_split, n_samples
            )));
        }

        self.n_features = n_features;
        self.classes = distinct_classes(y);

        let encoded: Vec<usize> = y
            .iter()
            .map(|v| class_position(&self.classes, *v).unwrap_or(0))
            .collect();

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];
        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, &encoded, &indices, 0, &mut rng, &mut importances);
        self.root = Some(root);

        // Normalize feature importances
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> TreeNode {
        let n_samples = indices.len();
        let counts = self.class_counts(y, indices);
        let parent_impurity = gini(&counts, n_samples);
        let distribution: Vec<f64> = counts
            .iter()
            .map(|&c| c as f64 / n_samples.max(1) as f64)
            .collect();

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || parent_impurity <= 0.0;

        let leaf = || TreeNode::Leaf {
            value: self.classes[majority(&counts)],
            n_samples,
            distribution: distribution.clone(),
        };

        if should_stop {
            return leaf();
        }

        let Some(best) = self.find_best_split(x, y, indices, parent_impurity, rng) else {
            return leaf();
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

        if left_indices.len() < self.min_samples_leaf || right_indices.len() < self.min_samples_leaf {
            return leaf();
        }

        importances[best.feature_idx] += n_samples as f64 * best.gain;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, rng, importances));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, rng, importances));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            impurity: parent_impurity,
            distribution,
        }
    }

    /// Scan candidate features with a sorted sweep, updating class counts
    /// incrementally. Ties keep the earliest feature and threshold.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let n_classes = self.classes.len();
        let total_counts = self.class_counts(y, indices);

        let candidates: Vec<usize> = match self.max_features {
            Some(k) if k < self.n_features => {
                let mut picked = index::sample(rng, self.n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        };

        let mut best: Option<SplitCandidate> = None;
        let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(n);

        for feature_idx in candidates {
            sorted.clear();
            sorted.extend(indices.iter().map(|&i| (x[[i, feature_idx]], y[i])));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_counts = vec![0usize; n_classes];
            for pos in 0..n - 1 {
                left_counts[sorted[pos].1] += 1;
                if sorted[pos].0 == sorted[pos + 1].0 {
                    continue;
                }

                let left_n = pos + 1;
                let right_n = n - left_n;
                if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                    continue;
                }

                let right_counts: Vec<usize> = total_counts
                    .iter()
                    .zip(&left_counts)
                    .map(|(t, l)| t - l)
                    .collect();
                let weighted = (left_n as f64 * gini(&left_counts, left_n)
                    + right_n as f64 * gini(&right_counts, right_n))
                    / n as f64;
                let gain = parent_impurity - weighted;

                if gain > 0.0 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold: (sorted[pos].0 + sorted[pos + 1].0) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn class_counts(&self, y: &[usize], indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for &i in indices {
            counts[y[i]] += 1;
        }
        counts
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or_else(not_fitted)?;
        check_width(x, self.n_features)?;

        Ok(x.rows()
            .into_iter()
            .map(|row| Self::predict_sample(root, &row))
            .collect())
    }

    fn predict_sample(node: &TreeNode, sample: &ArrayView1<f64>) -> f64 {
        match node {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if sample[*feature_idx] <= *threshold {
                    Self::predict_sample(left, sample)
                } else {
                    Self::predict_sample(right, sample)
                }
            }
        }
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Class values seen during fit, ascending
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Check the decoded structure before the tree is used for prediction.
    ///
    /// Every split must index a fitted feature, every leaf must predict a
    /// known class and node distributions must match the class count.
    pub fn validate(&self) -> Result<()> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| malformed("decision tree has no nodes"))?;
        if self.n_features == 0 {
            return Err(malformed("decision tree has no input features"));
        }
        if self.classes.is_empty() {
            return Err(malformed("decision tree has no classes"));
        }
        if let Some(imp) = &self.feature_importances {
            if imp.len() != self.n_features {
                return Err(malformed(format!(
                    "{} feature importances for {} features",
                    imp.len(),
                    self.n_features
                )));
            }
        }

        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            let distribution = node.distribution();
            if !distribution.is_empty() && distribution.len() != self.classes.len() {
                return Err(malformed(format!(
                    "node distribution has {} entries for {} classes",
                    distribution.len(),
                    self.classes.len()
                )));
            }
            match node {
                TreeNode::Leaf { value, .. } => {
                    if class_position(&self.classes, *value).is_none() {
                        return Err(malformed(format!("leaf predicts unknown class {}", value)));
                    }
                }
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    if *feature_idx >= self.n_features {
                        return Err(malformed(format!(
                            "split on feature {} of a {}-feature tree",
                            feature_idx, self.n_features
                        )));
                    }
                    if threshold.is_nan() {
                        return Err(malformed("split threshold is NaN"));
                    }
                    pending.push(&**left);
                    pending.push(&**right);
                }
            }
        }
        Ok(())
    }

    /// Decision-path contributions toward `class` for one sample.
    ///
    /// Returns the root probability of `class` and one contribution per
    /// feature: every split adds the change in `class` probability between
    /// the node and the child the sample falls into. Bias plus contributions
    /// equals the leaf probability.
    pub fn path_contributions(&self, sample: &ArrayView1<f64>, class: f64) -> Result<(f64, Vec<f64>)> {
        let root = self.root.as_ref().ok_or_else(not_fitted)?;
        if sample.len() != self.n_features {
            return Err(ExoError::InternalComputation(format!(
                "model expects {} features, got {}",
                self.n_features,
                sample.len()
            )));
        }

        let position = class_position(&self.classes, class);
        let probability = |node: &TreeNode| -> Result<f64> {
            match position {
                None => Ok(0.0),
                Some(p) => node.distribution().get(p).copied().ok_or_else(|| {
                    ExoError::NotSupported("local explanation (tree stores no node distributions)".to_string())
                }),
            }
        };

        let bias = probability(root)?;
        let mut contributions = vec![0.0; self.n_features];
        let mut current = bias;
        let mut node = root;
        while let TreeNode::Split { feature_idx, threshold, left, right, .. } = node {
            let next: &TreeNode = if sample[*feature_idx] <= *threshold { &**left } else { &**right };
            let p = probability(next)?;
            contributions[*feature_idx] += p - current;
            current = p;
            node = next;
        }
        Ok((bias, contributions))
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Index of the largest count; ties resolve to the lowest class
fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

/// Sorted distinct values of a label vector
pub(crate) fn distinct_classes(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.iter().copied().collect();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();
    classes
}

pub(crate) fn class_position(classes: &[f64], value: f64) -> Option<usize> {
    classes.iter().position(|c| (c - value).abs() < 1e-9)
}

pub(crate) fn check_width(x: &Array2<f64>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(ExoError::InternalComputation(format!(
            "model expects {} features, got {}",
            expected,
            x.ncols()
        )));
    }
    Ok(())
}

pub(crate) fn not_fitted() -> ExoError {
    ExoError::InternalComputation("model is not fitted".to_string())
}

pub(crate) fn malformed(reason: impl Into<String>) -> ExoError {
    ExoError::InvalidArtifact(reason.into())
}
