//! Workflows: named, ordered lists of step descriptions.

pub mod store;

use serde::{Deserialize, Serialize};

pub use store::WorkflowStore;

/// A named, ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<String>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, steps: Vec<String>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}
