//! Pattern-to-model matching
//!
//! Walks a pattern-tagged event stream once, cuts it into windows of consecutive events that
//! share a pattern tag, and labels each window with the best scoring subset of the model
//! library. The search is exhaustive over every admissible subset.

use crate::config::MatcherConfig;
use crate::model::ModelLibrary;
use crate::scoring::{ScoringEngine, SubsetScore, WindowProfile};
use crate::types::{ActivityLabel, Event, LabeledEvent, MatchResult, MatchWindow, PatternTag};
use serde::Serialize;
use tracing::debug;

/// A window together with its search result and final label
#[derive(Debug, Clone, Serialize)]
pub struct WindowMatch {
    pub window: MatchWindow,
    pub result: MatchResult,
    pub label: ActivityLabel,
}

/// Output of matching one event stream
#[derive(Debug, Clone, Default)]
pub struct MatchRun {
    /// Every input event, in order, with its label
    pub labeled_events: Vec<LabeledEvent>,
    pub windows: Vec<WindowMatch>,
}

impl MatchRun {
    /// Windows that ended up with at least one activity
    pub fn recognized_windows(&self) -> usize {
        self.windows
            .iter()
            .filter(|w| !w.label.is_no_activity())
            .count()
    }
}

/// Labels pattern windows with activity models
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    engine: ScoringEngine,
}

impl PatternMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            engine: ScoringEngine::new(config),
        }
    }

    /// Label every event of the stream
    ///
    /// Sentinel-tagged events are labeled `["None"]` without scoring. The input is not
    /// modified; a new labeled sequence is returned.
    pub fn match_events(&self, events: &[Event], library: &ModelLibrary) -> MatchRun {
        let mut labels = vec![ActivityLabel::NoActivity; events.len()];
        let mut windows = Vec::new();

        for window in split_windows(events) {
            let result = self.find_models_for_window(&window, library);
            let label = apply_invalidation(&result, window.actions.len());

            debug!(
                pattern = %window.pattern_tag,
                start = %window.start_time,
                end = %window.end_time,
                actions = window.actions.len(),
                best = ?result.best_model_names,
                score = result.best_score,
                action_score = result.partial_scores.action,
                duration_score = result.partial_scores.duration,
                start_time_score = result.partial_scores.start_time,
                location_score = result.partial_scores.location,
                label = %label,
                "window matched"
            );

            for slot in &mut labels[window.span.clone()] {
                *slot = label.clone();
            }
            windows.push(WindowMatch {
                window,
                result,
                label,
            });
        }

        let labeled_events = events
            .iter()
            .zip(labels)
            .map(|(event, label)| LabeledEvent {
                event: event.clone(),
                label,
            })
            .collect();

        MatchRun {
            labeled_events,
            windows,
        }
    }

    /// Best scoring model subset for one window
    ///
    /// Subsets are visited smallest first; only a strictly greater total replaces the current
    /// best, so ties keep the first enumerated subset.
    pub fn find_models_for_window(
        &self,
        window: &MatchWindow,
        library: &ModelLibrary,
    ) -> MatchResult {
        let profile = WindowProfile::from_window(window);
        let mut best: Option<(SubsetScore, &[usize])> = None;
        let mut scored = 0;

        for subset in enumerate_admissible_subsets(window, library) {
            let score = self.engine.score_profile(&profile, library, subset);
            scored += 1;
            if best.map_or(true, |(current, _)| score.total > current.total) {
                best = Some((score, subset));
            }
        }

        match best {
            Some((score, subset)) => MatchResult {
                best_score: score.total,
                best_model_names: library.names_of(subset),
                partial_scores: score.partial,
                subsets_scored: scored,
            },
            None => MatchResult::no_admissible_model(),
        }
    }
}

/// Subsets of the library whose combined actions share at least one action with the window,
/// in enumeration order
pub fn enumerate_admissible_subsets<'l>(
    window: &MatchWindow,
    library: &'l ModelLibrary,
) -> impl Iterator<Item = &'l [usize]> + 'l {
    let shares: Vec<bool> = library
        .models()
        .iter()
        .map(|model| window.actions.iter().any(|a| model.actions.contains(a)))
        .collect();

    library
        .combinations()
        .filter(move |subset| subset.iter().any(|&i| shares[i]))
}

/// Final label of a window from its search result
///
/// The winning subset is discarded when its action score is exactly -1, or when it names more
/// activities than the window has actions.
pub fn apply_invalidation(result: &MatchResult, window_action_count: usize) -> ActivityLabel {
    if result.is_no_admissible_model()
        || result.partial_scores.action == -1.0
        || result.best_model_names.len() > window_action_count
    {
        return ActivityLabel::NoActivity;
    }
    ActivityLabel::from(result.best_model_names.clone())
}

#[derive(Clone, Copy)]
enum WindowState<'e> {
    Idle,
    InWindow { tag: &'e str, first: usize },
}

/// Cut an event stream into windows of consecutive events with the same non-sentinel tag
///
/// A recurring tag separated by other events opens a new window.
pub fn split_windows(events: &[Event]) -> Vec<MatchWindow> {
    let mut windows = Vec::new();
    let mut state = WindowState::Idle;

    for (index, event) in events.iter().enumerate() {
        if let WindowState::InWindow { tag, first } = state {
            if event.pattern_tag.as_str() == tag && !event.pattern_tag.is_no_activity() {
                continue;
            }
            windows.push(build_window(tag, &events[first..index], first));
        }

        state = match &event.pattern_tag {
            PatternTag::Pattern(tag) => WindowState::InWindow {
                tag: tag.as_str(),
                first: index,
            },
            PatternTag::NoActivity => WindowState::Idle,
        };
    }

    if let WindowState::InWindow { tag, first } = state {
        windows.push(build_window(tag, &events[first..], first));
    }

    windows
}

fn build_window(tag: &str, events: &[Event], first: usize) -> MatchWindow {
    let start_time = events.first().map(|e| e.timestamp).unwrap_or_default();
    let end_time = events.last().map(|e| e.timestamp).unwrap_or(start_time);

    MatchWindow {
        pattern_tag: tag.to_string(),
        start_time,
        end_time,
        actions: events.iter().map(|e| e.action.clone()).collect(),
        locations: events.iter().map(|e| e.location.clone()).collect(),
        source_action_ids: events.iter().map(|e| e.source_action_id).collect(),
        span: first..first + events.len(),
    }
}
