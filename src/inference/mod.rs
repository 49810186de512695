//! Inference module
//!
//! Answers single, batch and tabular prediction requests against the
//! active model:
//! - Label mapping from raw class codes
//! - Probability estimates when the model provides them
//! - A documented fallback confidence when it does not
//! - Running prediction counters

mod engine;

pub use engine::{InferenceService, LedgerSnapshot, PredictionLedger};

use serde::{Deserialize, Serialize};

/// Confidence reported for models without probability estimates.
///
/// This is a fixed policy value, not an estimate: the predicted class is
/// given this probability and the other class the remainder.
pub const FALLBACK_CONFIDENCE: f64 = 0.85;

/// Predicted disposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Label {
    Confirmed,
    FalsePositive,
}

impl Label {
    /// Map a raw class code. Only 0 and 1 are defined.
    pub fn from_class(class: f64) -> Option<Self> {
        if class == 1.0 {
            Some(Label::Confirmed)
        } else if class == 0.0 {
            Some(Label::FalsePositive)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Confirmed => "confirmed",
            Label::FalsePositive => "false-positive",
        }
    }
}

/// Probability of each label
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub false_positive: f64,
    pub confirmed: f64,
}

impl ClassProbabilities {
    /// Synthesized mapping for models without probability estimates
    pub fn fallback(label: Label) -> Self {
        match label {
            Label::Confirmed => Self {
                false_positive: 1.0 - FALLBACK_CONFIDENCE,
                confirmed: FALLBACK_CONFIDENCE,
            },
            Label::FalsePositive => Self {
                false_positive: FALLBACK_CONFIDENCE,
                confirmed: 1.0 - FALLBACK_CONFIDENCE,
            },
        }
    }
}

/// Whether probabilities came from the model or from the fallback policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbabilitySource {
    Model,
    Fallback,
}

/// Result of classifying one feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: Label,
    pub confidence: f64,
    pub probabilities: ClassProbabilities,
    pub probability_source: ProbabilitySource,
}

/// Result for one CSV row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPrediction {
    /// 1-based data row number
    pub row: usize,
    pub prediction: Label,
    pub confidence: f64,
    /// Only present when the model provides probability estimates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<ClassProbabilities>,
}

/// Aggregate over every row of a tabular request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TabularSummary {
    pub total: usize,
    pub confirmed: usize,
    pub false_positive: usize,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularPredictions {
    pub predictions: Vec<RowPrediction>,
    pub summary: TabularSummary,
}
