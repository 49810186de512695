//! Training configuration

use serde::{Deserialize, Serialize};

/// Type of classifier to fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Bagged decision-tree ensemble
    RandomForest,
    /// Single decision tree
    DecisionTree,
    /// Logistic Regression
    LogisticRegression,
    /// Always predicts the most frequent training class
    MajorityClass,
}

impl ModelType {
    /// Parse the names accepted on the command line
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "random_forest" | "forest" | "rf" => Some(ModelType::RandomForest),
            "decision_tree" | "tree" => Some(ModelType::DecisionTree),
            "logistic" | "logistic_regression" => Some(ModelType::LogisticRegression),
            "majority" | "majority_class" | "baseline" => Some(ModelType::MajorityClass),
            _ => None,
        }
    }
}

/// Configuration for the training pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Model type to train
    pub model_type: ModelType,

    /// Target column name
    pub target_column: String,

    /// Default held-out fraction when a request does not supply one
    pub test_size: f64,

    /// Default random seed when a request does not supply one
    pub random_state: u64,

    /// Number of trees (for the forest)
    pub n_estimators: usize,

    /// Maximum depth of trees
    pub max_depth: Option<usize>,

    /// Minimum samples per leaf
    pub min_samples_leaf: usize,

    /// Minimum usable rows after cleaning and label filtering
    pub min_rows: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_type: ModelType::RandomForest,
            target_column: "label".to_string(),
            test_size: 0.2,
            random_state: 42,
            n_estimators: 100,
            max_depth: Some(10),
            min_samples_leaf: 1,
            min_rows: 10,
        }
    }
}

impl TrainingConfig {
    pub fn new(target_column: impl Into<String>) -> Self {
        Self {
            target_column: target_column.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model_type: ModelType) -> Self {
        self.model_type = model_type;
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }
}
