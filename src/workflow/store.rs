//! In-memory workflow store.

use tokio::sync::RwLock;

use crate::error::WorkflowError;
use crate::workflow::Workflow;

/// Keyed store of workflows, listed in insertion order.
pub struct WorkflowStore {
    workflows: RwLock<Vec<Workflow>>,
}

impl WorkflowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(Vec::new()),
        }
    }

    /// Create a store seeded with the built-in workflows.
    pub fn with_defaults() -> Self {
        Self {
            workflows: RwLock::new(builtin_workflows()),
        }
    }

    /// Look up a workflow by name.
    pub async fn get(&self, name: &str) -> Result<Workflow, WorkflowError> {
        self.workflows
            .read()
            .await
            .iter()
            .find(|w| w.name == name)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound {
                name: name.to_string(),
            })
    }

    /// Names of all workflows.
    pub async fn list(&self) -> Vec<String> {
        self.workflows
            .read()
            .await
            .iter()
            .map(|w| w.name.clone())
            .collect()
    }

    /// Register a workflow, replacing any existing one with the same name.
    ///
    /// Blank steps are dropped; a workflow must keep at least one step.
    pub async fn add(&self, name: &str, steps: Vec<String>) -> Result<(), WorkflowError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkflowError::EmptyName);
        }
        let steps: Vec<String> = steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if steps.is_empty() {
            return Err(WorkflowError::EmptySteps {
                name: name.to_string(),
            });
        }

        let mut workflows = self.workflows.write().await;
        let workflow = Workflow::new(name, steps);
        match workflows.iter_mut().find(|w| w.name == name) {
            Some(existing) => {
                tracing::info!(workflow = %name, "Replacing existing workflow");
                *existing = workflow;
            }
            None => {
                tracing::debug!(workflow = %name, "Registered workflow");
                workflows.push(workflow);
            }
        }
        Ok(())
    }
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_workflows() -> Vec<Workflow> {
    vec![
        Workflow::new(
            "demo_insurance",
            vec![
                "navigate to 'https://www.royalsundaram.in/MOPIS/Login.jsp'".to_string(),
                "Enter username 'invictus' and password 'Secret123', click sign in".to_string(),
                "Click 'Rating Calculator' -> 'New Business' -> 'Private Car'".to_string(),
                "Enter vehicle MH 02 FR 1294 and click get started".to_string(),
                "download the generated pdf".to_string(),
            ],
        ),
        Workflow::new(
            "google_check",
            vec![
                "navigate to google.com".to_string(),
                "search for 'Google ADK python'".to_string(),
                "summarize the first result".to_string(),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_are_listed_in_order() {
        let store = WorkflowStore::with_defaults();
        assert_eq!(store.list().await, vec!["demo_insurance", "google_check"]);
        assert_eq!(store.get("google_check").await.unwrap().steps.len(), 3);
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let store = WorkflowStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(WorkflowError::NotFound { ref name }) if name == "nope"
        ));
    }

    #[tokio::test]
    async fn add_replaces_same_name() {
        let store = WorkflowStore::new();
        store.add("w", vec!["a".into()]).await.unwrap();
        store.add("other", vec!["x".into()]).await.unwrap();
        store.add("w", vec!["b".into(), "c".into()]).await.unwrap();

        assert_eq!(store.list().await, vec!["w", "other"]);
        assert_eq!(store.get("w").await.unwrap().steps, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn add_rejects_empty_input() {
        let store = WorkflowStore::new();
        assert!(matches!(
            store.add("  ", vec!["a".into()]).await,
            Err(WorkflowError::EmptyName)
        ));
        assert!(matches!(
            store.add("w", vec!["   ".into(), String::new()]).await,
            Err(WorkflowError::EmptySteps { .. })
        ));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn add_drops_blank_steps() {
        let store = WorkflowStore::new();
        store
            .add("w", vec!["a".into(), " ".into(), " b ".into()])
            .await
            .unwrap();
        assert_eq!(store.get("w").await.unwrap().steps, vec!["a", "b"]);
    }
}
