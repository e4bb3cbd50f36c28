//! Matcher configuration
//!
//! Scoring weights and the constants of the partial score functions. Passed explicitly into
//! the scoring engine, the matcher and the discoverer so each subject or test can retune them.

use crate::error::MatchError;
use serde::{Deserialize, Serialize};

/// Largest model library accepted by default. The full subset enumeration is precomputed,
/// so the library holds `2^n - 1` combinations.
pub const DEFAULT_MAX_MODELS: usize = 20;

/// Weights of the four partial scores in the total
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub action: f64,
    pub duration: f64,
    pub start_time: f64,
    pub location: f64,
}

impl Default for ScoringWeights {
    /// Weights tuned on the Kasteren dataset (macro F1 = 0.77)
    fn default() -> Self {
        Self {
            action: 1.3,
            duration: 0.1,
            start_time: 1.5,
            location: 1.0,
        }
    }
}

/// Configuration for the pattern-to-model matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Weights of the total score
    pub weights: ScoringWeights,
    /// Duration score lost per second of discrepancy (`1 - k * delta`, floored at -1)
    pub duration_penalty_per_sec: f64,
    /// Numerator of the start-time decay `numerator / diff - offset`
    pub start_time_numerator: f64,
    /// Offset of the start-time decay
    pub start_time_offset: f64,
    /// Maximum number of models in one library
    pub max_models: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            duration_penalty_per_sec: 0.001,
            start_time_numerator: 1.0,
            start_time_offset: 0.1,
            max_models: DEFAULT_MAX_MODELS,
        }
    }
}

impl MatcherConfig {
    /// Load a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, MatchError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, MatchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Replace the weights, keeping everything else
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }
}
