//! Random Forest implementation

use super::decision_tree::{check_width, class_position, distinct_classes, malformed, not_fitted, DecisionTree};
use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random Forest classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Random state
    pub random_state: Option<u64>,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
    /// Classes seen during fit, ascending
    classes: Vec<f64>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            random_state: None,
            feature_importances: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Features considered at each split: the square root of the width
    fn split_features(n_features: usize) -> usize {
        ((n_features as f64).sqrt().ceil() as usize).max(1)
    }

    /// Fit the forest to training data.
    ///
    /// Trees are built in parallel. Tree `i` draws its bootstrap sample and
    /// its split seed from `ChaCha8Rng(random_state + i)`, so the fitted
    /// forest does not depend on thread scheduling.
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
        if n_samples < 2 {
            return Err(ExoError::InsufficientData(format!(
                "need at least 2 samples to fit a forest, got {}",
                n_samples
            )));
        }
        if self.n_estimators == 0 {
            return Err(ExoError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "a forest needs at least one tree".to_string(),
            });
        }

        self.n_features = n_features;
        self.classes = distinct_classes(y);
        let max_features = Self::split_features(n_features);

        // Build trees in parallel
        let base_seed = self.random_state.unwrap_or(42);

        let trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<DecisionTree> {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                // Bootstrap sample
                let sample_indices: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();

                let x_boot = x.select(ndarray::Axis(0), &sample_indices);
                let y_boot: Array1<f64> = sample_indices.iter().map(|&i| y[i]).collect();

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(max_features)
                    .with_random_state(rng.next_u64());
                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }

                tree.fit(&x_boot, &y_boot)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;

        // Compute feature importances
        self.compute_feature_importances();

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        let mut total_importances = vec![0.0; self.n_features];

        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (total, &val) in total_importances.iter_mut().zip(imp.iter()) {
                    *total += val;
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        for imp in &mut total_importances {
            *imp /= n_trees;
        }

        // Normalize
        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// Predict class labels by majority vote. Ties resolve to the lowest class.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (i, &p) in row.iter().enumerate() {
                    if p > row[best] {
                        best = i;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    /// Predict class probabilities as tree-vote fractions.
    ///
    /// Columns follow [`RandomForest::classes`].
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(not_fitted());
        }
        check_width(x, self.n_features)?;

        let all_predictions = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let n_samples = x.nrows();
        let n_classes = self.classes.len();
        let mut proba = Array2::zeros((n_samples, n_classes));

        for preds in &all_predictions {
            for (i, &pred) in preds.iter().enumerate() {
                if let Some(c) = class_position(&self.classes, pred) {
                    proba[[i, c]] += 1.0;
                }
            }
        }

        proba /= all_predictions.len() as f64;
        Ok(proba)
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Check a deserialized forest before it serves predictions.
    ///
    /// Every tree must be well formed, share the forest's width and only
    /// predict classes the forest knows about.
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(malformed("random forest has no trees"));
        }
        if self.n_features == 0 || self.classes.is_empty() {
            return Err(malformed("random forest has no features or classes"));
        }
        if let Some(imp) = &self.feature_importances {
            if imp.len() != self.n_features {
                return Err(malformed(format!(
                    "random forest has {} importances for {} features",
                    imp.len(),
                    self.n_features
                )));
            }
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| malformed(format!("tree {}: {}", i, e)))?;
            if tree.n_features() != self.n_features {
                return Err(malformed(format!(
                    "tree {} expects {} features, forest expects {}",
                    i,
                    tree.n_features(),
                    self.n_features
                )));
            }
            if let Some(c) = tree.classes().iter().find(|c| class_position(&self.classes, **c).is_none()) {
                return Err(malformed(format!("tree {} predicts unknown class {}", i, c)));
            }
        }
        Ok(())
    }

    /// Tree-path contributions toward `class`, averaged over the trees.
    ///
    /// Returns the mean root probability and one contribution per feature.
    pub fn path_contributions(&self, sample: &ArrayView1<f64>, class: f64) -> Result<(f64, Vec<f64>)> {
        if self.trees.is_empty() {
            return Err(not_fitted());
        }

        let mut bias = 0.0;
        let mut contributions = vec![0.0; self.n_features];
        for tree in &self.trees {
            let (tree_bias, tree_contrib) = tree.path_contributions(sample, class)?;
            bias += tree_bias;
            for (total, c) in contributions.iter_mut().zip(tree_contrib) {
                *total += c;
            }
        }

        let n = self.trees.len() as f64;
        contributions.iter_mut().for_each(|c| *c /= n);
        Ok((bias / n, contributions))
    }
}
