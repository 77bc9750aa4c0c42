//! Language-model-driven step executor.
//!
//! Each job gets its own agent with a private conversation: the system
//! instruction followed by every step sent so far and the model's replies.
//! Nothing is shared between jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::executor::{ExecutorFactory, StepExecutor};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::worker::sink::LogSink;
use crate::worker::state::JobId;

/// Agent that sends each step to an LLM as a user turn.
pub struct LlmStepExecutor {
    name: String,
    llm: Arc<dyn LlmProvider>,
    config: ExecutorConfig,
    history: Vec<ChatMessage>,
}

impl LlmStepExecutor {
    pub fn new(name: impl Into<String>, llm: Arc<dyn LlmProvider>, config: ExecutorConfig) -> Self {
        Self {
            name: name.into(),
            llm,
            config,
            history: Vec::new(),
        }
    }

    fn step_timeout(&self) -> Duration {
        self.config.step_timeout
    }

    fn request(&self) -> CompletionRequest {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(ChatMessage::system(&self.config.instruction));
        messages.extend(self.history.iter().cloned());
        CompletionRequest::new(messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
    }
}

#[async_trait]
impl StepExecutor for LlmStepExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prepare(&mut self, sink: &LogSink) -> Result<(), ExecutorError> {
        sink.log(format!(
            "Initializing {} (model: {})...",
            self.name,
            self.llm.model_name()
        ))
        .await;
        self.history.clear();
        sink.log("Agent setup complete.").await;
        Ok(())
    }

    async fn execute(
        &mut self,
        step: &str,
        _sink: &LogSink,
        cancel: &CancellationToken,
    ) -> Result<String, ExecutorError> {
        self.history.push(ChatMessage::user(step));
        let request = self.request();
        let llm = Arc::clone(&self.llm);
        let timeout = self.step_timeout();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(timeout, llm.complete(request)) => Some(result),
        };

        let response = match result {
            Some(Ok(Ok(response))) => response,
            Some(Ok(Err(e))) => {
                self.history.pop();
                return Err(e.into());
            }
            Some(Err(_)) => {
                self.history.pop();
                return Err(ExecutorError::Timeout(timeout));
            }
            None => {
                self.history.pop();
                return Err(ExecutorError::Cancelled);
            }
        };

        tracing::debug!(
            agent = %self.name,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Step completed"
        );
        self.history.push(ChatMessage::assistant(&response.content));
        Ok(response.content)
    }
}

/// Builds one `LlmStepExecutor` per job over a shared provider.
pub struct LlmExecutorFactory {
    llm: Arc<dyn LlmProvider>,
    config: ExecutorConfig,
}

impl LlmExecutorFactory {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ExecutorConfig) -> Self {
        Self { llm, config }
    }
}

impl ExecutorFactory for LlmExecutorFactory {
    fn create(&self, job_id: &JobId, _workflow_name: &str) -> Box<dyn StepExecutor> {
        Box::new(LlmStepExecutor::new(
            format!("agent_{job_id}"),
            Arc::clone(&self.llm),
            self.config.clone(),
        ))
    }
}
