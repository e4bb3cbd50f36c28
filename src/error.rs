//! Error types for HARS

use chrono::NaiveDateTime;
use thiserror::Error;

/// Problems with a model library entry. Fatal to the run of that subject.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Model '{model}' is missing required field '{field}'")]
    MissingField { model: String, field: &'static str },

    #[error("Model '{model}' has an invalid start time '{value}' (expected HH:MM)")]
    InvalidTime { model: String, value: String },

    #[error("Model '{model}' has a negative duration ({duration}s)")]
    NegativeDuration { model: String, duration: i64 },

    #[error("Model '{model}' is defined more than once")]
    DuplicateModel { model: String },

    #[error("Model library has {count} models, the limit is {max}")]
    TooManyModels { count: usize, max: usize },

    #[error("Invalid model library: {0}")]
    Malformed(String),
}

/// Errors that can occur during a matching run
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Event source failed for subject {subject_id}: {message}")]
    EventSource { subject_id: String, message: String },

    #[error("Model source failed for subject {subject_id}: {message}")]
    ModelSource { subject_id: String, message: String },

    #[error("Invalid model library for subject {subject_id}: {source}")]
    InvalidLibrary {
        subject_id: String,
        #[source]
        source: ConfigurationError,
    },

    #[error("Pattern discovery failed for subject {subject_id}: {message}")]
    PatternSource { subject_id: String, message: String },

    #[error("Failed to store interval {start} - {end} for subject {subject_id}: {message}")]
    Persistence {
        subject_id: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
        message: String,
    },
}

impl MatchError {
    /// Subject the failure belongs to, when the error comes from a matching run
    pub fn subject_id(&self) -> Option<&str> {
        match self {
            MatchError::EventSource { subject_id, .. }
            | MatchError::ModelSource { subject_id, .. }
            | MatchError::InvalidLibrary { subject_id, .. }
            | MatchError::PatternSource { subject_id, .. }
            | MatchError::Persistence { subject_id, .. } => Some(subject_id),
            _ => None,
        }
    }
}
