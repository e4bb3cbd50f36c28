//! HARS - Human activity recognition by pattern-to-model matching
//!
//! HARS labels the behavioural patterns found in a person's action log with the activities a
//! caregiver described for them. The pipeline is deterministic:
//! event source → prefilter → pattern matcher (model library + scoring engine per window)
//! → result segmenter → interval sink.
//!
//! ## Modules
//!
//! - **Matching core**: [`model`], [`scoring`], [`matcher`], [`segmenter`]
//! - **Collaborators**: [`storage`] and [`prefilter::PatternSource`] for the stores and the
//!   external discovery tool
//! - **Formats**: [`casas`] for the discovery tool's text files, [`export`] for NDJSON

pub mod casas;
pub mod config;
pub mod error;
pub mod export;
pub mod matcher;
pub mod model;
pub mod pipeline;
pub mod prefilter;
pub mod scoring;
pub mod segmenter;
pub mod storage;
pub mod types;

pub use config::{MatcherConfig, ScoringWeights};
pub use error::{ConfigurationError, MatchError};
pub use matcher::{MatchRun, PatternMatcher, WindowMatch};
pub use model::{ActivityModel, ModelLibrary, ModelSpec, ModelSpecs};
pub use pipeline::{ActivityDiscoverer, RunReport};
pub use prefilter::{prefilter, PatternDiscovery, PatternSource, PreAnnotated};
pub use scoring::ScoringEngine;
pub use segmenter::ResultSegmenter;
pub use storage::{EventSource, InMemoryStore, IntervalSink, ModelSource};
pub use types::{
    ActivityInterval, ActivityLabel, Event, LabeledEvent, MatchResult, MatchWindow, PartialScores,
    PatternTag,
};

/// HARS version
pub const HARS_VERSION: &str = env!("CARGO_PKG_VERSION");
