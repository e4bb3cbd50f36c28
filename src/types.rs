//! Core data types for pattern-to-model matching
//!
//! This module defines the events that flow through the matcher, the transient window and
//! result types it derives, and the activity intervals it hands to storage.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Pattern tag the discovery tool assigns to events outside any accepted pattern
pub const NO_ACTIVITY_TAG: &str = "Other_Activity";

/// Label value meaning "no activity recognized"
pub const NO_ACTIVITY_LABEL: &str = "None";

/// Prefix of numbered pattern tags (`Pat_3`)
pub const PATTERN_TAG_PREFIX: &str = "Pat_";

/// Grouping key assigned by the pattern discovery tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PatternTag {
    /// Sentinel: the event belongs to no (accepted) pattern
    #[default]
    NoActivity,
    /// Opaque pattern key, usually `Pat_<n>`
    Pattern(String),
}

impl PatternTag {
    pub fn pattern(tag: impl Into<String>) -> Self {
        PatternTag::from(tag.into())
    }

    pub fn is_no_activity(&self) -> bool {
        matches!(self, PatternTag::NoActivity)
    }

    /// Number of a `Pat_<n>` tag
    pub fn pattern_number(&self) -> Option<u32> {
        match self {
            PatternTag::Pattern(tag) => tag.strip_prefix(PATTERN_TAG_PREFIX)?.parse().ok(),
            PatternTag::NoActivity => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PatternTag::NoActivity => NO_ACTIVITY_TAG,
            PatternTag::Pattern(tag) => tag.as_str(),
        }
    }
}

impl From<String> for PatternTag {
    fn from(tag: String) -> Self {
        if tag.eq_ignore_ascii_case(NO_ACTIVITY_TAG) {
            PatternTag::NoActivity
        } else {
            PatternTag::Pattern(tag)
        }
    }
}

impl From<&str> for PatternTag {
    fn from(tag: &str) -> Self {
        PatternTag::from(tag.to_string())
    }
}

impl From<PatternTag> for String {
    fn from(tag: PatternTag) -> Self {
        match tag {
            PatternTag::NoActivity => NO_ACTIVITY_TAG.to_string(),
            PatternTag::Pattern(tag) => tag,
        }
    }
}

impl fmt::Display for PatternTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logged executed action (LEA) with its pattern tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Local wall-clock time of the action
    pub timestamp: NaiveDateTime,
    /// Location where the action was executed
    pub location: String,
    /// Action name
    pub action: String,
    /// Pattern tag from the discovery tool
    #[serde(default)]
    pub pattern_tag: PatternTag,
    /// Identifier of the stored action this event came from
    pub source_action_id: i64,
}

impl Event {
    pub fn new(
        timestamp: NaiveDateTime,
        location: impl Into<String>,
        action: impl Into<String>,
        pattern_tag: impl Into<PatternTag>,
        source_action_id: i64,
    ) -> Self {
        Self {
            timestamp,
            location: location.into(),
            action: action.into(),
            pattern_tag: pattern_tag.into(),
            source_action_id,
        }
    }

    /// Copy of this event with another pattern tag
    pub fn with_tag(&self, pattern_tag: PatternTag) -> Self {
        Self {
            pattern_tag,
            ..self.clone()
        }
    }
}

/// Activities recognized for an event or window
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum ActivityLabel {
    /// `["None"]`
    NoActivity,
    /// One or more activity model names
    Activities(Vec<String>),
}

impl ActivityLabel {
    pub fn is_no_activity(&self) -> bool {
        matches!(self, ActivityLabel::NoActivity)
    }

    /// Activity names, `["None"]` for the sentinel
    pub fn names(&self) -> Vec<String> {
        self.clone().into()
    }
}

impl From<Vec<String>> for ActivityLabel {
    fn from(names: Vec<String>) -> Self {
        if names.is_empty() || (names.len() == 1 && names[0] == NO_ACTIVITY_LABEL) {
            ActivityLabel::NoActivity
        } else {
            ActivityLabel::Activities(names)
        }
    }
}

impl From<ActivityLabel> for Vec<String> {
    fn from(label: ActivityLabel) -> Self {
        match label {
            ActivityLabel::NoActivity => vec![NO_ACTIVITY_LABEL.to_string()],
            ActivityLabel::Activities(names) => names,
        }
    }
}

impl fmt::Display for ActivityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityLabel::NoActivity => f.write_str(NO_ACTIVITY_LABEL),
            ActivityLabel::Activities(names) => f.write_str(&names.join("+")),
        }
    }
}

/// An event annotated with the activities recognized for its window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledEvent {
    #[serde(flatten)]
    pub event: Event,
    #[serde(rename = "activity_names")]
    pub label: ActivityLabel,
}

/// A maximal run of consecutive events sharing one non-sentinel pattern tag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchWindow {
    pub pattern_tag: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Actions in event order, duplicates retained
    pub actions: Vec<String>,
    /// Locations aligned with `actions`
    pub locations: Vec<String>,
    pub source_action_ids: Vec<i64>,
    /// Positions of the window's events in the stream
    pub span: Range<usize>,
}

/// The four partial scores of a model subset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialScores {
    pub action: f64,
    pub duration: f64,
    pub start_time: f64,
    pub location: f64,
}

impl PartialScores {
    /// `(-1, -1, -1, -1)`, reported when no model shares any action with the window
    pub const SENTINEL: PartialScores = PartialScores {
        action: -1.0,
        duration: -1.0,
        start_time: -1.0,
        location: -1.0,
    };
}

/// Outcome of the combinatorial search over one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Best total score; negative infinity when nothing was admissible
    pub best_score: f64,
    /// Names of the best subset, `["None"]` when nothing was admissible
    pub best_model_names: Vec<String>,
    pub partial_scores: PartialScores,
    /// Number of admissible subsets that were scored
    pub subsets_scored: usize,
}

impl MatchResult {
    /// Result for a window no model subset shares an action with
    pub fn no_admissible_model() -> Self {
        Self {
            best_score: f64::NEG_INFINITY,
            best_model_names: vec![NO_ACTIVITY_LABEL.to_string()],
            partial_scores: PartialScores::SENTINEL,
            subsets_scored: 0,
        }
    }

    pub fn is_no_admissible_model(&self) -> bool {
        self.subsets_scored == 0
    }
}

/// A contiguous time interval labeled with one set of activities, ready for storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityInterval {
    pub subject_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub activity_names: Vec<String>,
    pub source_action_ids: Vec<i64>,
}
