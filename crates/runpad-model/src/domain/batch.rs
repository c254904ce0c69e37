use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{JobExit, display_name};

/// Outcome of one job inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub label: String,
    pub exit: JobExit,
}

impl BatchResult {
    pub fn new(label: impl Into<String>, exit: JobExit) -> Self {
        Self {
            label: label.into(),
            exit,
        }
    }
}

/// Aggregated outcome of a finished batch.
///
/// Names are label basenames, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl BatchSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a BatchResult>) -> Self {
        let mut summary = BatchSummary::default();
        for r in results {
            let name = display_name(&r.label);
            if r.exit.success() {
                summary.succeeded.push(name);
            } else {
                summary.failed.push(name);
            }
        }
        summary
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    #[inline]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

fn names(list: &[String]) -> String {
    if list.is_empty() {
        "none".to_string()
    } else {
        list.join(", ")
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== Run summary ==")?;
        writeln!(f, "OK ({}): {}", self.succeeded.len(), names(&self.succeeded))?;
        write!(f, "FAILED ({}): {}", self.failed.len(), names(&self.failed))
    }
}
