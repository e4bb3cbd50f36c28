//! Pattern discovery capability and the spurious-pattern prefilter
//!
//! Pattern discovery runs in an external tool. It is reached through [`PatternSource`], which
//! returns the tagged stream plus the pattern numbers the tool flagged as low quality. The
//! prefilter relabels events of rejected patterns with the sentinel tag.

use crate::error::MatchError;
use crate::types::{Event, PatternTag};
use std::collections::BTreeSet;
use tracing::info;

/// Output of the external pattern discovery tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternDiscovery {
    /// Events in timestamp order, tagged with discovered patterns
    pub events: Vec<Event>,
    /// Pattern numbers flagged as spurious
    pub rejected_patterns: BTreeSet<u32>,
}

/// Something that can tag an event stream with behavioural patterns
pub trait PatternSource {
    fn discover(&self, subject_id: &str, events: &[Event]) -> Result<PatternDiscovery, MatchError>;
}

/// Pattern source for streams the discovery tool has already annotated
#[derive(Debug, Clone, Default)]
pub struct PreAnnotated {
    rejected_patterns: BTreeSet<u32>,
}

impl PreAnnotated {
    pub fn new(rejected_patterns: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rejected_patterns: rejected_patterns.into_iter().collect(),
        }
    }
}

impl PatternSource for PreAnnotated {
    fn discover(&self, _subject_id: &str, events: &[Event]) -> Result<PatternDiscovery, MatchError> {
        Ok(PatternDiscovery {
            events: events.to_vec(),
            rejected_patterns: self.rejected_patterns.clone(),
        })
    }
}

/// Replace the tag of every event in a rejected pattern with the sentinel tag
///
/// No event is dropped or reordered and timestamps are untouched.
pub fn prefilter(events: &[Event], rejected_patterns: &BTreeSet<u32>) -> Vec<Event> {
    let mut relabeled = 0usize;
    let filtered: Vec<Event> = events
        .iter()
        .map(|event| match event.pattern_tag.pattern_number() {
            Some(number) if rejected_patterns.contains(&number) => {
                relabeled += 1;
                event.with_tag(PatternTag::NoActivity)
            }
            _ => event.clone(),
        })
        .collect();

    info!(
        rejected_patterns = rejected_patterns.len(),
        relabeled_events = relabeled,
        "prefilter applied"
    );
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn events() -> Vec<Event> {
        let day = NaiveDate::from_ymd_opt(2017, 3, 1).unwrap();
        vec![
            Event::new(day.and_hms_opt(7, 0, 0).unwrap(), "Kitchen", "Kettle", "Pat_1", 1),
            Event::new(day.and_hms_opt(7, 1, 0).unwrap(), "Kitchen", "Fridge", "Pat_2", 2),
            Event::new(day.and_hms_opt(7, 2, 0).unwrap(), "Hall", "Door", "Other_Activity", 3),
            Event::new(day.and_hms_opt(7, 3, 0).unwrap(), "Hall", "Coat", "Cluster_2", 4),
            Event::new(day.and_hms_opt(7, 4, 0).unwrap(), "Kitchen", "Fridge", "Pat_2", 5),
        ]
    }

    #[test]
    fn test_rejected_patterns_become_sentinel() {
        let rejected: BTreeSet<u32> = [2].into_iter().collect();
        let filtered = prefilter(&events(), &rejected);

        let tags: Vec<&str> = filtered.iter().map(|e| e.pattern_tag.as_str()).collect();
        assert_eq!(
            tags,
            vec!["Pat_1", "Other_Activity", "Other_Activity", "Cluster_2", "Other_Activity"]
        );
    }

    #[test]
    fn test_prefilter_only_touches_tags() {
        let original = events();
        let rejected: BTreeSet<u32> = [1, 2].into_iter().collect();
        let filtered = prefilter(&original, &rejected);

        assert_eq!(filtered.len(), original.len());
        for (before, after) in original.iter().zip(&filtered) {
            assert_eq!(before.timestamp, after.timestamp);
            assert_eq!(before.action, after.action);
            assert_eq!(before.source_action_id, after.source_action_id);
        }
    }

    #[test]
    fn test_nothing_rejected() {
        let original = events();
        assert_eq!(prefilter(&original, &BTreeSet::new()), original);
    }

    #[test]
    fn test_pre_annotated_source() {
        let source = PreAnnotated::new([4, 9]);
        let discovery = source.discover("subject-1", &events()).unwrap();
        assert_eq!(discovery.events, events());
        assert_eq!(
            discovery.rejected_patterns.into_iter().collect::<Vec<_>>(),
            vec![4, 9]
        );
    }
}
