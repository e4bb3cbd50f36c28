//! Expert activity models and the per-subject model library
//!
//! A model library is read from a JSON mapping
//! `{name: {locations, actions, duration, start: [["HH:MM", "HH:MM"], ...]}}`, validated into
//! typed [`ActivityModel`]s, and enumerates every non-empty subset of its models once at
//! construction.

use crate::error::{ConfigurationError, MatchError};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const TIME_OF_DAY_FORMAT: &str = "%H:%M";

/// A model entry as stored by caregivers, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub locations: Option<Vec<String>>,
    pub actions: Option<Vec<String>>,
    /// Expected duration in seconds
    pub duration: Option<i64>,
    /// Allowed start windows as `[HH:MM, HH:MM]` pairs
    #[serde(default)]
    pub start: Vec<(String, String)>,
}

/// Mapping from activity name to its stored definition
pub type ModelSpecs = BTreeMap<String, ModelSpec>;

/// Time-of-day range in which an activity may start (inclusive on both ends)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl StartWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time <= self.end
    }
}

/// An expert activity model (EAM)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityModel {
    pub name: String,
    pub locations: BTreeSet<String>,
    pub actions: BTreeSet<String>,
    /// Expected duration in seconds
    pub duration_secs: u64,
    pub start_windows: Vec<StartWindow>,
}

impl ActivityModel {
    /// Validate a stored model definition
    pub fn from_spec(name: &str, spec: &ModelSpec) -> Result<Self, ConfigurationError> {
        let missing = |field| ConfigurationError::MissingField {
            model: name.to_string(),
            field,
        };

        let locations = spec.locations.as_ref().ok_or_else(|| missing("locations"))?;
        let actions = spec.actions.as_ref().ok_or_else(|| missing("actions"))?;
        let duration = spec.duration.ok_or_else(|| missing("duration"))?;
        if duration < 0 {
            return Err(ConfigurationError::NegativeDuration {
                model: name.to_string(),
                duration,
            });
        }

        let start_windows = spec
            .start
            .iter()
            .map(|(start, end)| {
                Ok(StartWindow {
                    start: parse_time_of_day(name, start)?,
                    end: parse_time_of_day(name, end)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        Ok(Self {
            name: name.to_string(),
            locations: locations.iter().cloned().collect(),
            actions: actions.iter().cloned().collect(),
            duration_secs: duration as u64,
            start_windows,
        })
    }
}

fn parse_time_of_day(model: &str, value: &str) -> Result<NaiveTime, ConfigurationError> {
    NaiveTime::parse_from_str(value.trim(), TIME_OF_DAY_FORMAT).map_err(|_| {
        ConfigurationError::InvalidTime {
            model: model.to_string(),
            value: value.to_string(),
        }
    })
}

/// All activity models of one subject plus their precomputed subsets
#[derive(Debug, Clone)]
pub struct ModelLibrary {
    models: Vec<ActivityModel>,
    /// `combinations_by_size[k - 1]` holds every k-element index subset
    combinations_by_size: Vec<Vec<Vec<usize>>>,
}

impl ModelLibrary {
    /// Build a library from validated models. Model order defines the indices.
    pub fn new(models: Vec<ActivityModel>, max_models: usize) -> Result<Self, ConfigurationError> {
        if models.len() > max_models {
            return Err(ConfigurationError::TooManyModels {
                count: models.len(),
                max: max_models,
            });
        }

        let mut seen = BTreeSet::new();
        for model in &models {
            if !seen.insert(model.name.as_str()) {
                return Err(ConfigurationError::DuplicateModel {
                    model: model.name.clone(),
                });
            }
        }

        let combinations_by_size = (1..=models.len())
            .map(|k| combinations(models.len(), k))
            .collect();

        Ok(Self {
            models,
            combinations_by_size,
        })
    }

    /// Build a library from stored definitions, in name order
    pub fn from_specs(specs: &ModelSpecs, max_models: usize) -> Result<Self, ConfigurationError> {
        let models = specs
            .iter()
            .map(|(name, spec)| ActivityModel::from_spec(name, spec))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(models, max_models)
    }

    /// Parse a JSON model mapping and build the library
    pub fn from_json(json: &str, max_models: usize) -> Result<Self, MatchError> {
        let specs = parse_model_specs(json)?;
        Ok(Self::from_specs(&specs, max_models)?)
    }

    pub fn models(&self) -> &[ActivityModel] {
        &self.models
    }

    pub fn model(&self, index: usize) -> &ActivityModel {
        &self.models[index]
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Every subset, smallest first, then in generation order
    pub fn combinations(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.combinations_by_size
            .iter()
            .flat_map(|by_size| by_size.iter().map(Vec::as_slice))
    }

    /// Total number of subsets (`2^n - 1`)
    pub fn combination_count(&self) -> usize {
        self.combinations_by_size.iter().map(Vec::len).sum()
    }

    /// Names of the models in a subset
    pub fn names_of(&self, subset: &[usize]) -> Vec<String> {
        subset.iter().map(|&i| self.models[i].name.clone()).collect()
    }
}

/// Parse a JSON model mapping without validating the entries
pub fn parse_model_specs(json: &str) -> Result<ModelSpecs, ConfigurationError> {
    serde_json::from_str(json).map_err(|e| ConfigurationError::Malformed(e.to_string()))
}

/// k-element combinations of `0..n` in lexicographic order
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    if k == 0 || k > n {
        return result;
    }

    let mut indices: Vec<usize> = (0..k).collect();
    loop {
        result.push(indices.clone());

        // Rightmost position that can still advance
        let Some(i) = (0..k).rev().find(|&i| indices[i] != i + n - k) else {
            return result;
        };
        indices[i] += 1;
        for j in i + 1..k {
            indices[j] = indices[j - 1] + 1;
        }
    }
}
