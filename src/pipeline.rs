//! Pipeline orchestration
//!
//! One matching run for one subject, from the event store to persisted activity intervals:
//!
//! 1. EventSource - Fetch the subject's events for the time range
//! 2. ModelSource - Build the subject's model library (fails fast)
//! 3. PatternSource - Tag the stream with discovered patterns
//! 4. prefilter - Drop rejected patterns back to the sentinel tag
//! 5. PatternMatcher - Label every event
//! 6. ResultSegmenter - Group labels into intervals
//! 7. IntervalSink - Persist the intervals
//!
//! Nothing is written until the whole stream has been matched and segmented.

use crate::config::MatcherConfig;
use crate::error::MatchError;
use crate::matcher::{MatchRun, PatternMatcher};
use crate::model::{ModelLibrary, ModelSpecs};
use crate::prefilter::{prefilter, PatternSource};
use crate::segmenter::ResultSegmenter;
use crate::storage::{EventSource, InMemoryStore, IntervalSink, ModelSource};
use crate::types::{ActivityInterval, Event};
use chrono::NaiveDateTime;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Outcome of one matching run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub subject_id: String,
    /// Effective time range, after swapping reversed bounds
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub match_run: MatchRun,
    /// Intervals the sink accepted, in storage order
    pub stored: Vec<ActivityInterval>,
    /// Intervals that were produced but never written because of an earlier failure
    pub unstored: Vec<ActivityInterval>,
    /// First persistence failure; storing stops there
    pub persistence_failure: Option<MatchError>,
}

impl RunReport {
    fn empty(run_id: Uuid, subject_id: &str, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            run_id,
            subject_id: subject_id.to_string(),
            start,
            end,
            match_run: MatchRun::default(),
            stored: Vec::new(),
            unstored: Vec::new(),
            persistence_failure: None,
        }
    }

    /// True when every produced interval was stored
    pub fn is_complete(&self) -> bool {
        self.persistence_failure.is_none()
    }

    /// Turn a partial run into its persistence error
    pub fn into_result(self) -> Result<Vec<ActivityInterval>, MatchError> {
        match self.persistence_failure {
            Some(err) => Err(err),
            None => Ok(self.stored),
        }
    }
}

/// Runs the matching pipeline for one subject at a time.
///
/// Holds no state between runs, so one discoverer can serve any number of subjects.
#[derive(Debug, Clone, Default)]
pub struct ActivityDiscoverer {
    config: MatcherConfig,
}

impl ActivityDiscoverer {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match and persist one subject's activity intervals for `[start, end]`
    ///
    /// Configuration, source and discovery errors abort the run before anything is stored. A
    /// storage failure stops persisting and is reported in [`RunReport::persistence_failure`].
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        subject_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        events: &dyn EventSource,
        models: &dyn ModelSource,
        patterns: &dyn PatternSource,
        sink: &mut dyn IntervalSink,
    ) -> Result<RunReport, MatchError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("matching_run", %run_id, subject_id);
        let _guard = span.enter();

        let (start, end) = if end < start {
            warn!(%start, %end, "time range is reversed, swapping bounds");
            (end, start)
        } else {
            (start, end)
        };

        let raw_events = events
            .fetch_events(subject_id, start, end)
            .map_err(|e| MatchError::EventSource {
                subject_id: subject_id.to_string(),
                message: e.to_string(),
            })?;
        if raw_events.is_empty() {
            warn!(%start, %end, "no events in range, nothing to match");
            return Ok(RunReport::empty(run_id, subject_id, start, end));
        }
        info!(events = raw_events.len(), "events fetched");

        let specs = models
            .fetch_model_library(subject_id)
            .map_err(|e| MatchError::ModelSource {
                subject_id: subject_id.to_string(),
                message: e.to_string(),
            })?;
        let library = ModelLibrary::from_specs(&specs, self.config.max_models).map_err(|source| {
            error!(error = %source, "model library rejected");
            MatchError::InvalidLibrary {
                subject_id: subject_id.to_string(),
                source,
            }
        })?;
        info!(
            models = library.len(),
            subsets = library.combination_count(),
            "model library built"
        );

        let discovery = patterns
            .discover(subject_id, &raw_events)
            .map_err(|e| MatchError::PatternSource {
                subject_id: subject_id.to_string(),
                message: e.to_string(),
            })?;
        let tagged = prefilter(&discovery.events, &discovery.rejected_patterns);

        let matcher = PatternMatcher::new(self.config.clone());
        let match_run = matcher.match_events(&tagged, &library);
        info!(
            windows = match_run.windows.len(),
            recognized = match_run.recognized_windows(),
            "pattern windows matched"
        );

        let intervals = ResultSegmenter::segment(subject_id, &match_run.labeled_events);
        info!(intervals = intervals.len(), "activity intervals segmented");

        let mut report = RunReport {
            match_run,
            ..RunReport::empty(run_id, subject_id, start, end)
        };
        persist(&mut report, intervals, sink);

        info!(
            stored = report.stored.len(),
            unstored = report.unstored.len(),
            "run finished"
        );
        Ok(report)
    }

    /// Match an already loaded stream, such as the discovery tool's annotated file
    ///
    /// The time range spans the whole stream. An empty stream gives an empty report.
    pub fn run_stream(
        &self,
        subject_id: &str,
        events: Vec<Event>,
        models: ModelSpecs,
        patterns: &dyn PatternSource,
        sink: &mut dyn IntervalSink,
    ) -> Result<RunReport, MatchError> {
        let start = events.iter().map(|e| e.timestamp).min().unwrap_or_default();
        let end = events.iter().map(|e| e.timestamp).max().unwrap_or(start);

        let mut store = InMemoryStore::new();
        store.add_events(subject_id, events);
        store.set_models(subject_id, models);

        self.run(subject_id, start, end, &store, &store, patterns, sink)
    }
}

fn persist(report: &mut RunReport, intervals: Vec<ActivityInterval>, sink: &mut dyn IntervalSink) {
    let mut pending = intervals.into_iter();

    for interval in pending.by_ref() {
        if let Err(err) = sink.store_activity_interval(&interval) {
            let failure = MatchError::Persistence {
                subject_id: interval.subject_id.clone(),
                start: interval.start_time,
                end: interval.end_time,
                message: err.to_string(),
            };
            error!(error = %failure, "storing activity interval failed");
            report.persistence_failure = Some(failure);
            report.unstored.push(interval);
            break;
        }
        report.stored.push(interval);
    }

    report.unstored.extend(pending);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;
    use crate::model::ModelSpec;
    use crate::prefilter::{PatternDiscovery, PreAnnotated};
    use crate::storage::InMemoryStore;
    use crate::types::{ActivityLabel, Event};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn coffee() -> ModelSpec {
        ModelSpec {
            locations: Some(vec!["Kitchen".to_string()]),
            actions: Some(vec!["OpenCupboard".to_string(), "Kettle".to_string()]),
            duration: Some(300),
            start: vec![("07:00".to_string(), "09:00".to_string())],
        }
    }

    fn store_with(events: Vec<Event>) -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.add_events("42", events);
        store.add_model("42", "MakeCoffee", coffee());
        store
    }

    /// Sink that accepts a fixed number of intervals, then fails
    struct FlakySink {
        accept: usize,
        stored: Vec<ActivityInterval>,
    }

    impl IntervalSink for FlakySink {
        fn store_activity_interval(
            &mut self,
            interval: &ActivityInterval,
        ) -> Result<(), MatchError> {
            if self.stored.len() == self.accept {
                return Err(MatchError::ParseError("database is gone".to_string()));
            }
            self.stored.push(interval.clone());
            Ok(())
        }
    }

    /// Collaborator whose every call fails
    struct Unavailable;

    impl EventSource for Unavailable {
        fn fetch_events(
            &self,
            _subject_id: &str,
            _start: NaiveDateTime,
            _end: NaiveDateTime,
        ) -> Result<Vec<Event>, MatchError> {
            Err(MatchError::ParseError("connection refused".to_string()))
        }
    }

    impl ModelSource for Unavailable {
        fn fetch_model_library(&self, _subject_id: &str) -> Result<ModelSpecs, MatchError> {
            Err(MatchError::ParseError("connection refused".to_string()))
        }
    }

    impl PatternSource for Unavailable {
        fn discover(
            &self,
            _subject_id: &str,
            _events: &[Event],
        ) -> Result<PatternDiscovery, MatchError> {
            Err(MatchError::ParseError("tool crashed".to_string()))
        }
    }

    /// Discovery tool that tags every event with one pattern
    struct SinglePattern;

    impl PatternSource for SinglePattern {
        fn discover(
            &self,
            _subject_id: &str,
            events: &[Event],
        ) -> Result<PatternDiscovery, MatchError> {
            Ok(PatternDiscovery {
                events: events.iter().map(|e| e.with_tag("Pat_1".into())).collect(),
                rejected_patterns: Default::default(),
            })
        }
    }

    #[test]
    fn test_make_coffee_end_to_end() {
        let events = vec![
            Event::new(at(7, 30, 0), "Kitchen", "OpenCupboard", "Pat_1", 10),
            Event::new(at(7, 35, 0), "Kitchen", "Kettle", "Pat_1", 11),
        ];
        let store = store_with(events);
        let mut sink = InMemoryStore::new();

        let report = ActivityDiscoverer::default()
            .run(
                "42",
                at(0, 0, 0),
                at(23, 59, 59),
                &store,
                &store,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap();

        let expected = ActivityInterval {
            subject_id: "42".to_string(),
            start_time: at(7, 30, 0),
            end_time: at(7, 35, 0),
            activity_names: vec!["MakeCoffee".to_string()],
            source_action_ids: vec![10, 11],
        };
        assert!(report.is_complete());
        assert_eq!(sink.intervals(), &[expected.clone()]);
        assert_eq!(report.stored, vec![expected]);
        assert!((report.match_run.windows[0].result.best_score - 3.9).abs() < 1e-9);
    }

    #[test]
    fn test_unmatched_window_stores_nothing() {
        let store = store_with(vec![Event::new(
            at(20, 0, 0),
            "Lounge",
            "Television",
            "Pat_2",
            1,
        )]);
        let mut sink = InMemoryStore::new();

        let report = ActivityDiscoverer::default()
            .run(
                "42",
                at(0, 0, 0),
                at(23, 59, 59),
                &store,
                &store,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap();

        assert_eq!(
            report.match_run.labeled_events[0].label,
            ActivityLabel::NoActivity
        );
        assert!(sink.intervals().is_empty());
    }

    #[test]
    fn test_recurring_pattern_gives_two_intervals() {
        let mut events = Vec::new();
        for i in 0..5 {
            events.push(Event::new(at(7, 30, i * 10), "Kitchen", "Kettle", "Pat_3", i as i64));
        }
        for i in 5..8 {
            events.push(Event::new(at(7, 33, i), "Hall", "Door", "Other_Activity", i as i64));
        }
        for i in 8..10 {
            events.push(Event::new(at(7, 40, i), "Kitchen", "OpenCupboard", "Pat_3", i as i64));
        }
        let store = store_with(events);
        let mut sink = InMemoryStore::new();

        let report = ActivityDiscoverer::default()
            .run(
                "42",
                at(7, 0, 0),
                at(8, 0, 0),
                &store,
                &store,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap();

        assert_eq!(report.match_run.windows.len(), 2);
        let ids: Vec<Vec<i64>> = sink
            .intervals()
            .iter()
            .map(|i| i.source_action_ids.clone())
            .collect();
        assert_eq!(ids, vec![vec![0, 1, 2, 3, 4], vec![8, 9]]);
    }

    #[test]
    fn test_rejected_pattern_is_not_matched() {
        let store = store_with(vec![
            Event::new(at(7, 30, 0), "Kitchen", "OpenCupboard", "Pat_1", 1),
            Event::new(at(7, 35, 0), "Kitchen", "Kettle", "Pat_1", 2),
        ]);
        let mut sink = InMemoryStore::new();

        let report = ActivityDiscoverer::default()
            .run(
                "42",
                at(0, 0, 0),
                at(23, 0, 0),
                &store,
                &store,
                &PreAnnotated::new([1]),
                &mut sink,
            )
            .unwrap();

        assert!(report.match_run.windows.is_empty());
        assert!(sink.intervals().is_empty());
    }

    #[test]
    fn test_pattern_source_tags_raw_events() {
        let store = store_with(vec![
            Event::new(at(7, 30, 0), "Kitchen", "OpenCupboard", "Other_Activity", 1),
            Event::new(at(7, 35, 0), "Kitchen", "Kettle", "Other_Activity", 2),
        ]);
        let mut sink = InMemoryStore::new();

        ActivityDiscoverer::default()
            .run(
                "42",
                at(0, 0, 0),
                at(23, 0, 0),
                &store,
                &store,
                &SinglePattern,
                &mut sink,
            )
            .unwrap();

        assert_eq!(sink.intervals().len(), 1);
        assert_eq!(sink.intervals()[0].activity_names, vec!["MakeCoffee".to_string()]);
    }

    #[test]
    fn test_reversed_bounds_are_swapped() {
        let store = store_with(vec![
            Event::new(at(7, 30, 0), "Kitchen", "OpenCupboard", "Pat_1", 1),
            Event::new(at(7, 35, 0), "Kitchen", "Kettle", "Pat_1", 2),
        ]);
        let mut sink = InMemoryStore::new();

        let report = ActivityDiscoverer::default()
            .run(
                "42",
                at(9, 0, 0),
                at(7, 0, 0),
                &store,
                &store,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap();

        assert_eq!((report.start, report.end), (at(7, 0, 0), at(9, 0, 0)));
        assert_eq!(sink.intervals().len(), 1);
    }

    #[test]
    fn test_empty_range_short_circuits() {
        let mut store = InMemoryStore::new();
        // An invalid library is never looked at when there are no events
        store.add_model(
            "42",
            "Broken",
            ModelSpec {
                duration: None,
                ..coffee()
            },
        );
        let mut sink = InMemoryStore::new();

        let report = ActivityDiscoverer::default()
            .run(
                "42",
                at(0, 0, 0),
                at(23, 0, 0),
                &store,
                &store,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap();

        assert!(report.match_run.labeled_events.is_empty());
        assert!(report.stored.is_empty());
        assert!(report.is_complete());
    }

    #[test]
    fn test_invalid_library_fails_before_storing() {
        let mut store = store_with(vec![Event::new(at(7, 30, 0), "Kitchen", "Kettle", "Pat_1", 1)]);
        store.add_model(
            "42",
            "Broken",
            ModelSpec {
                start: vec![("7am".to_string(), "9am".to_string())],
                ..coffee()
            },
        );
        let mut sink = InMemoryStore::new();

        let err = ActivityDiscoverer::default()
            .run(
                "42",
                at(0, 0, 0),
                at(23, 0, 0),
                &store,
                &store,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap_err();

        match &err {
            MatchError::InvalidLibrary { subject_id, source } => {
                assert_eq!(subject_id, "42");
                assert!(matches!(source, ConfigurationError::InvalidTime { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.subject_id(), Some("42"));
        assert!(err.to_string().contains("subject 42"));
        assert!(sink.intervals().is_empty());
    }

    #[test]
    fn test_source_failures_name_the_subject() {
        let store = store_with(vec![Event::new(at(7, 30, 0), "Kitchen", "Kettle", "Pat_1", 1)]);
        let mut sink = InMemoryStore::new();
        let discoverer = ActivityDiscoverer::default();

        let err = discoverer
            .run(
                "42",
                at(0, 0, 0),
                at(23, 0, 0),
                &Unavailable,
                &store,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, MatchError::EventSource { .. }));
        assert_eq!(err.subject_id(), Some("42"));

        let err = discoverer
            .run(
                "42",
                at(0, 0, 0),
                at(23, 0, 0),
                &store,
                &Unavailable,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, MatchError::ModelSource { .. }));
        assert_eq!(err.subject_id(), Some("42"));

        let err = discoverer
            .run(
                "42",
                at(0, 0, 0),
                at(23, 0, 0),
                &store,
                &store,
                &Unavailable,
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, MatchError::PatternSource { .. }));
        assert!(err.to_string().contains("tool crashed"), "{err}");
        assert!(sink.intervals().is_empty());
    }

    #[test]
    fn test_loaded_stream_is_matched_whole() {
        let events = vec![
            Event::new(at(7, 35, 0), "Kitchen", "Kettle", "Pat_1", 11),
            Event::new(at(7, 30, 0), "Kitchen", "OpenCupboard", "Pat_1", 10),
        ];
        let mut models = ModelSpecs::new();
        models.insert("MakeCoffee".to_string(), coffee());
        let mut sink = InMemoryStore::new();

        let report = ActivityDiscoverer::default()
            .run_stream("42", events, models, &PreAnnotated::default(), &mut sink)
            .unwrap();

        assert_eq!((report.start, report.end), (at(7, 30, 0), at(7, 35, 0)));
        assert_eq!(sink.intervals().len(), 1);
        assert_eq!(sink.intervals()[0].source_action_ids, vec![10, 11]);
    }

    #[test]
    fn test_empty_loaded_stream_completes_without_output() {
        let mut sink = InMemoryStore::new();

        let report = ActivityDiscoverer::default()
            .run_stream(
                "42",
                Vec::new(),
                ModelSpecs::new(),
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap();

        assert!(report.is_complete());
        assert!(report.match_run.labeled_events.is_empty());
        assert!(sink.intervals().is_empty());
        assert_eq!(report.into_result().unwrap(), Vec::<ActivityInterval>::new());
    }

    #[test]
    fn test_library_size_limit_follows_config() {
        let mut store = store_with(vec![Event::new(at(7, 30, 0), "Kitchen", "Kettle", "Pat_1", 1)]);
        store.add_model("42", "MakeTea", coffee());
        let config = MatcherConfig {
            max_models: 1,
            ..MatcherConfig::default()
        };
        let mut sink = InMemoryStore::new();

        let err = ActivityDiscoverer::new(config)
            .run(
                "42",
                at(0, 0, 0),
                at(23, 0, 0),
                &store,
                &store,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            MatchError::InvalidLibrary {
                source: ConfigurationError::TooManyModels { count: 2, max: 1 },
                ..
            }
        ));

        ActivityDiscoverer::default()
            .run(
                "42",
                at(0, 0, 0),
                at(23, 0, 0),
                &store,
                &store,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap();
        assert_eq!(sink.intervals().len(), 1);
    }

    #[test]
    fn test_persistence_failure_stops_and_reports() {
        let store = store_with(vec![
            Event::new(at(7, 30, 0), "Kitchen", "Kettle", "Pat_1", 1),
            Event::new(at(7, 40, 0), "Hall", "Door", "Other_Activity", 2),
            Event::new(at(8, 0, 0), "Kitchen", "Kettle", "Pat_2", 3),
            Event::new(at(8, 10, 0), "Hall", "Door", "Other_Activity", 4),
            Event::new(at(8, 30, 0), "Kitchen", "OpenCupboard", "Pat_3", 5),
        ]);
        let mut sink = FlakySink {
            accept: 1,
            stored: Vec::new(),
        };

        let report = ActivityDiscoverer::default()
            .run(
                "42",
                at(0, 0, 0),
                at(23, 0, 0),
                &store,
                &store,
                &PreAnnotated::default(),
                &mut sink,
            )
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.stored.len(), 1);
        assert_eq!(report.stored, sink.stored);
        assert_eq!(report.unstored.len(), 2);
        match report.persistence_failure.as_ref() {
            Some(MatchError::Persistence {
                subject_id, start, ..
            }) => {
                assert_eq!(subject_id, "42");
                assert_eq!(*start, at(8, 0, 0));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert!(report.into_result().is_err());
    }
}
