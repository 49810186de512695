//! Model training module
//!
//! Provides the classifiers that can back the active model:
//! - Random Forest (the default retraining model)
//! - Decision tree
//! - Logistic regression
//! - Majority-class baseline
//!
//! plus the stratified split, evaluation metrics and the retraining pipeline.

mod config;
pub mod baseline;
pub mod classifier;
pub mod decision_tree;
pub mod linear_models;
pub mod metrics;
pub mod pipeline;
pub mod random_forest;
pub mod split;

pub use baseline::MajorityClass;
pub use classifier::{Capabilities, Classifier, ImportanceKind};
pub use config::{ModelType, TrainingConfig};
pub use decision_tree::{DecisionTree, TreeNode};
pub use linear_models::LogisticRegression;
pub use metrics::{
    rank_importances, ClassificationMetrics, ConfusionMatrix, Evaluation, FeatureWeight, TrainingMetrics,
};
pub use pipeline::{
    fit_model, prepare_dataset, Disposition, FittedModel, LabeledDataset, StagedModel, TrainingPipeline,
    TrainingResult,
};
pub use random_forest::RandomForest;
pub use split::{stratified_split, SplitIndices};
