//! Multi-criteria scoring of a window against a subset of activity models
//!
//! Four partial scores are combined with configurable weights:
//!
//! ```text
//! total = wa * action + wd * duration + ws * start_time + wl * location
//! ```
//!
//! Partial scores are nominally in [-1, 1]. Only the duration and start-time decays are floored
//! at -1; nothing is clamped from above.

use crate::config::MatcherConfig;
use crate::model::{ActivityModel, ModelLibrary};
use crate::types::{MatchWindow, PartialScores};
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use std::collections::BTreeSet;

/// Set views of a window, built once and reused for every subset
#[derive(Debug, Clone)]
pub struct WindowProfile<'a> {
    pub actions: BTreeSet<&'a str>,
    pub locations: BTreeSet<&'a str>,
    /// Start time of day, truncated to whole seconds
    pub start_of_day: NaiveTime,
    pub duration_secs: f64,
}

impl<'a> WindowProfile<'a> {
    pub fn new(
        locations: &'a [String],
        actions: &'a [String],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        let start_of_day = start.time().with_nanosecond(0).unwrap_or_else(|| start.time());
        Self {
            actions: actions.iter().map(String::as_str).collect(),
            locations: locations.iter().map(String::as_str).collect(),
            start_of_day,
            duration_secs: (end - start).num_milliseconds() as f64 / 1000.0,
        }
    }

    pub fn from_window(window: &'a MatchWindow) -> Self {
        Self::new(
            &window.locations,
            &window.actions,
            window.start_time,
            window.end_time,
        )
    }

    /// Whether any action of the window appears in the union of the subset's actions
    pub fn shares_actions(&self, library: &ModelLibrary, subset: &[usize]) -> bool {
        subset.iter().any(|&i| {
            library
                .model(i)
                .actions
                .iter()
                .any(|action| self.actions.contains(action.as_str()))
        })
    }
}

/// Total and partial scores of one subset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubsetScore {
    pub total: f64,
    pub partial: PartialScores,
}

/// Scoring engine for windows against model subsets
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: MatcherConfig,
}

impl ScoringEngine {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Score a window, given as raw lists and bounds, against a subset of the library
    pub fn score(
        &self,
        library: &ModelLibrary,
        locations: &[String],
        actions: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
        subset: &[usize],
    ) -> SubsetScore {
        let profile = WindowProfile::new(locations, actions, start, end);
        self.score_profile(&profile, library, subset)
    }

    /// Score a prepared window profile against a subset of the library
    pub fn score_profile(
        &self,
        profile: &WindowProfile<'_>,
        library: &ModelLibrary,
        subset: &[usize],
    ) -> SubsetScore {
        let models: Vec<&ActivityModel> = subset.iter().map(|&i| library.model(i)).collect();

        let model_actions: BTreeSet<&str> = models
            .iter()
            .flat_map(|m| m.actions.iter().map(String::as_str))
            .collect();
        let model_locations: BTreeSet<&str> = models
            .iter()
            .flat_map(|m| m.locations.iter().map(String::as_str))
            .collect();
        let model_duration = models
            .iter()
            .fold(0u64, |total, m| total.saturating_add(m.duration_secs));

        let partial = PartialScores {
            action: overlap_score(&profile.actions, &model_actions),
            duration: self.duration_score(model_duration, profile.duration_secs),
            start_time: self.start_time_score(profile.start_of_day, &models),
            location: overlap_score(&profile.locations, &model_locations),
        };

        SubsetScore {
            total: self.combine(&partial),
            partial,
        }
    }

    /// Weighted sum of the partial scores
    pub fn combine(&self, partial: &PartialScores) -> f64 {
        let w = &self.config.weights;
        w.action * partial.action
            + w.duration * partial.duration
            + w.start_time * partial.start_time
            + w.location * partial.location
    }

    /// Duration proximity
    ///
    /// Formula: `max(-1, 1 - k * |model_duration - window_duration|)`
    pub fn duration_score(&self, model_duration_secs: u64, window_duration_secs: f64) -> f64 {
        let delta = (model_duration_secs as f64 - window_duration_secs).abs();
        (1.0 - self.config.duration_penalty_per_sec * delta).max(-1.0)
    }

    /// Time-of-day proximity of the window start to the models' start windows
    ///
    /// Each model keeps its best window (1 inside, `max(-1, k / gap - b)` outside), and the
    /// model scores are averaged. Models without start windows are left out of the average;
    /// a subset where no model has a window scores 0.
    pub fn start_time_score(&self, start_of_day: NaiveTime, models: &[&ActivityModel]) -> f64 {
        let model_scores: Vec<f64> = models
            .iter()
            .filter_map(|model| {
                model
                    .start_windows
                    .iter()
                    .map(|window| {
                        if window.contains(start_of_day) {
                            return 1.0;
                        }
                        let gap = if start_of_day < window.start {
                            window.start - start_of_day
                        } else {
                            start_of_day - window.end
                        };
                        let gap_secs = gap.num_seconds() as f64;
                        (self.config.start_time_numerator / gap_secs
                            - self.config.start_time_offset)
                            .max(-1.0)
                    })
                    .reduce(f64::max)
            })
            .collect();

        if model_scores.is_empty() {
            return 0.0;
        }
        model_scores.iter().sum::<f64>() / model_scores.len() as f64
    }
}

/// Set overlap between a window and the union of a subset's models
///
/// Formula: `|W ∩ M| / |W| - (|M| - |W ∩ M|) / |M|`. Rewards covering the window and penalizes
/// models that bring in unrelated items. Either side empty scores -1.
pub fn overlap_score(window: &BTreeSet<&str>, models: &BTreeSet<&str>) -> f64 {
    if window.is_empty() || models.is_empty() {
        return -1.0;
    }
    let shared = window.intersection(models).count() as f64;
    let window_len = window.len() as f64;
    let models_len = models.len() as f64;
    shared / window_len - (models_len - shared) / models_len
}
