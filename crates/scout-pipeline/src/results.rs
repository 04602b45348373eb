use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::TaskOutput;

/// What one task contributed to a run: a value or an error marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    Ok(TaskOutput),
    Error(String),
}

impl TaskResult {
    pub fn is_usable(&self) -> bool {
        matches!(self, TaskResult::Ok(output) if output.is_usable())
    }

    pub fn output(&self) -> Option<&TaskOutput> {
        match self {
            TaskResult::Ok(output) => Some(output),
            TaskResult::Error(_) => None,
        }
    }
}

/// Aggregated results of a pipeline run, keyed by task name.
///
/// A usable value, once recorded, is only replaced by another usable
/// value. Errors and empty outputs never overwrite it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultMap {
    entries: BTreeMap<String, TaskResult>,
}

impl ResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `result` under `name`. Returns `false` when the write was
    /// discarded because it would replace a usable value.
    pub fn record(&mut self, name: &str, result: TaskResult) -> bool {
        let keeps_prior = self.entries.get(name).is_some_and(TaskResult::is_usable);
        if keeps_prior && !result.is_usable() {
            return false;
        }
        self.entries.insert(name.to_string(), result);
        true
    }

    pub fn get(&self, name: &str) -> Option<&TaskResult> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TaskResult)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn usable_count(&self) -> usize {
        self.entries.values().filter(|r| r.is_usable()).count()
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .values()
            .filter(|r| matches!(r, TaskResult::Error(_)))
            .count()
    }

    /// Usable outputs, in task-name order.
    pub fn successes(&self) -> Vec<TaskOutput> {
        self.entries
            .values()
            .filter(|r| r.is_usable())
            .filter_map(|r| r.output().cloned())
            .collect()
    }

    /// `(task name, message)` for every error marker.
    pub fn errors(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(name, r)| match r {
                TaskResult::Error(message) => Some((name.as_str(), message.as_str())),
                TaskResult::Ok(_) => None,
            })
            .collect()
    }
}
