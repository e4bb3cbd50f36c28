//! CASAS text formats
//!
//! The external discovery tool reads space-separated action lines plus a small config file, and
//! writes back a tab-separated annotated copy of the stream with one pattern tag per line.

use crate::error::MatchError;
use crate::types::Event;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const INPUT_DATE_FORMAT: &str = "%Y-%m-%d";
const INPUT_TIME_FORMAT: &str = "%H:%M:%S";

/// Columns of one annotated line
const ANNOTATED_COLUMNS: usize = 7;

/// Parse the tool's annotated output into events
///
/// Each line is `date  time  location  action  event  pattern  executed_action`, tab-separated.
/// The `event` column (sensor state) is not used. Blank lines are skipped.
pub fn parse_annotated(text: &str) -> Result<Vec<Event>, MatchError> {
    let mut events = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        events.push(parse_annotated_line(line).map_err(|message| {
            MatchError::ParseError(format!("annotated line {}: {}", index + 1, message))
        })?);
    }

    Ok(events)
}

fn parse_annotated_line(line: &str) -> Result<Event, String> {
    let columns: Vec<&str> = line.split('\t').map(str::trim).collect();
    let [date, time, location, action, _event, pattern, executed_action] = columns[..] else {
        return Err(format!(
            "expected {} tab-separated columns, found {}",
            ANNOTATED_COLUMNS,
            columns.len()
        ));
    };

    let timestamp = NaiveDateTime::parse_from_str(&format!("{date} {time}"), TIMESTAMP_FORMAT)
        .map_err(|e| format!("invalid timestamp '{date} {time}': {e}"))?;
    let source_action_id = executed_action
        .parse::<i64>()
        .map_err(|_| format!("invalid executed action id '{executed_action}'"))?;

    if location.is_empty() || action.is_empty() {
        return Err("empty location or action".to_string());
    }

    Ok(Event::new(
        timestamp,
        location,
        action,
        pattern,
        source_action_id,
    ))
}

/// Render events as the tool's input lines
///
/// One line per event: `YYYY-MM-DD HH:MM:SS ACTION ACTION ON OTHER_ACTIVITY`.
pub fn to_casas_input(events: &[Event]) -> String {
    events
        .iter()
        .map(|event| {
            let action = event.action.to_uppercase();
            format!(
                "{} {} {action} {action} ON OTHER_ACTIVITY\n",
                event.timestamp.format(INPUT_DATE_FORMAT),
                event.timestamp.format(INPUT_TIME_FORMAT),
            )
        })
        .collect()
}

/// Render the tool's config file for a data file holding `events`
///
/// Sensors are the distinct actions in order of first appearance.
pub fn casas_config(events: &[Event], data_file: &str) -> String {
    let mut seen = BTreeSet::new();
    let sensors: Vec<&str> = events
        .iter()
        .map(|e| e.action.as_str())
        .filter(|action| seen.insert(*action))
        .collect();

    format!(
        "sensor {}\nweight 1\ndata {data_file}\nmodel model\npredictactivity Sleep",
        sensors.join(" ")
    )
}
