//! Storage collaborators
//!
//! The matching core reads events and model definitions from, and writes activity intervals to,
//! an external store. These traits are the contracts it needs; [`InMemoryStore`] implements all
//! three for embedding, the CLI and tests.

use crate::error::MatchError;
use crate::model::{ModelSpec, ModelSpecs};
use crate::types::{ActivityInterval, Event};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Source of logged executed actions
pub trait EventSource {
    /// Events of a subject with `start <= timestamp <= end`, in timestamp order
    fn fetch_events(
        &self,
        subject_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Event>, MatchError>;
}

/// Source of a subject's expert activity models
pub trait ModelSource {
    fn fetch_model_library(&self, subject_id: &str) -> Result<ModelSpecs, MatchError>;
}

/// Destination of discovered activity intervals
pub trait IntervalSink {
    fn store_activity_interval(&mut self, interval: &ActivityInterval) -> Result<(), MatchError>;
}

/// In-memory store keyed by subject id
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    events: BTreeMap<String, Vec<Event>>,
    models: BTreeMap<String, ModelSpecs>,
    intervals: Vec<ActivityInterval>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add events for a subject, keeping them in timestamp order
    pub fn add_events(&mut self, subject_id: &str, events: impl IntoIterator<Item = Event>) {
        let stored = self.events.entry(subject_id.to_string()).or_default();
        stored.extend(events);
        stored.sort_by_key(|e| e.timestamp);
    }

    pub fn set_models(&mut self, subject_id: &str, models: ModelSpecs) {
        self.models.insert(subject_id.to_string(), models);
    }

    pub fn add_model(&mut self, subject_id: &str, name: &str, spec: ModelSpec) {
        self.models
            .entry(subject_id.to_string())
            .or_default()
            .insert(name.to_string(), spec);
    }

    /// Intervals stored so far, in storage order
    pub fn intervals(&self) -> &[ActivityInterval] {
        &self.intervals
    }
}

impl EventSource for InMemoryStore {
    fn fetch_events(
        &self,
        subject_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Event>, MatchError> {
        Ok(self
            .events
            .get(subject_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.timestamp >= start && e.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl ModelSource for InMemoryStore {
    fn fetch_model_library(&self, subject_id: &str) -> Result<ModelSpecs, MatchError> {
        Ok(self.models.get(subject_id).cloned().unwrap_or_default())
    }
}

impl IntervalSink for InMemoryStore {
    fn store_activity_interval(&mut self, interval: &ActivityInterval) -> Result<(), MatchError> {
        self.intervals.push(interval.clone());
        Ok(())
    }
}
