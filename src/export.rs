//! NDJSON audit export
//!
//! One JSON object per line, so long runs can be streamed and grepped.

use crate::error::MatchError;
use crate::types::{ActivityInterval, LabeledEvent};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::io::Write;

/// One line of the annotated stream
#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    timestamp: NaiveDateTime,
    location: &'a str,
    action: &'a str,
    pattern_tag: &'a str,
    activity_names: Vec<String>,
    source_action_id: i64,
}

impl<'a> From<&'a LabeledEvent> for AuditRecord<'a> {
    fn from(labeled: &'a LabeledEvent) -> Self {
        Self {
            timestamp: labeled.event.timestamp,
            location: &labeled.event.location,
            action: &labeled.event.action,
            pattern_tag: labeled.event.pattern_tag.as_str(),
            activity_names: labeled.label.names(),
            source_action_id: labeled.event.source_action_id,
        }
    }
}

/// Write any serializable records as NDJSON
pub fn write_ndjson<W, T>(
    writer: &mut W,
    records: impl IntoIterator<Item = T>,
) -> Result<usize, MatchError>
where
    W: Write,
    T: Serialize,
{
    let mut written = 0;
    for record in records {
        serde_json::to_writer(&mut *writer, &record)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Write the labeled event stream, one event per line
pub fn write_labeled_events<W: Write>(
    writer: &mut W,
    labeled_events: &[LabeledEvent],
) -> Result<usize, MatchError> {
    write_ndjson(writer, labeled_events.iter().map(AuditRecord::from))
}

pub fn write_intervals<W: Write>(
    writer: &mut W,
    intervals: &[ActivityInterval],
) -> Result<usize, MatchError> {
    write_ndjson(writer, intervals)
}

/// Parse NDJSON records, skipping blank lines
pub fn read_ndjson<T: serde::de::DeserializeOwned>(text: &str) -> Result<Vec<T>, MatchError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .map_err(|e| MatchError::ParseError(format!("line {}: {}", index + 1, e)))
        })
        .collect()
}
