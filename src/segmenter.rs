//! Segmentation of the labeled stream into activity intervals
//!
//! Consecutive events with the same non-`None` label form one interval. `None` events close the
//! open interval and are never stored.

use crate::types::{ActivityInterval, ActivityLabel, LabeledEvent};

/// Converts per-event labels into storable activity intervals
pub struct ResultSegmenter;

impl ResultSegmenter {
    /// Build the intervals of one subject's labeled stream, in stream order
    pub fn segment(subject_id: &str, labeled_events: &[LabeledEvent]) -> Vec<ActivityInterval> {
        let mut intervals = Vec::new();
        let mut current: Option<(&ActivityLabel, ActivityInterval)> = None;

        for labeled in labeled_events {
            let event = &labeled.event;
            match &mut current {
                Some((label, interval)) if *label == &labeled.label => {
                    interval.end_time = event.timestamp;
                    interval.source_action_ids.push(event.source_action_id);
                }
                _ => {
                    if let Some((_, interval)) = current.take() {
                        intervals.push(interval);
                    }
                    if let ActivityLabel::Activities(names) = &labeled.label {
                        current = Some((
                            &labeled.label,
                            ActivityInterval {
                                subject_id: subject_id.to_string(),
                                start_time: event.timestamp,
                                end_time: event.timestamp,
                                activity_names: names.clone(),
                                source_action_ids: vec![event.source_action_id],
                            },
                        ));
                    }
                }
            }
        }

        if let Some((_, interval)) = current {
            intervals.push(interval);
        }

        intervals
    }
}
