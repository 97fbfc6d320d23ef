//! The single call site into the model: prompt in, text out, bounded in time.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{LlmError, PipelineError};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// A system + user prompt pair.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Wraps an `LlmProvider` with a timeout and sampling defaults.
///
/// A timeout is reported exactly like a provider failure, as
/// `PipelineError::InvocationError`.
#[derive(Clone)]
pub struct Invoker {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl Invoker {
    pub fn new(llm: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self {
            llm,
            timeout,
            temperature: 0.2,
            max_tokens: 2048,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Invoke the model and return its text.
    pub async fn invoke(&self, prompt: &Prompt) -> Result<String, PipelineError> {
        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(ChatMessage::system(&prompt.system));
        }
        messages.push(ChatMessage::user(&prompt.user));

        let request = CompletionRequest::new(messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = match tokio::time::timeout(self.timeout, self.llm.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(model = self.llm.model_name(), error = %e, "Model invocation failed");
                return Err(PipelineError::InvocationError(e));
            }
            Err(_) => {
                warn!(model = self.llm.model_name(), timeout = ?self.timeout, "Model invocation timed out");
                return Err(PipelineError::InvocationError(LlmError::Timeout {
                    provider: self.llm.model_name().to_string(),
                    timeout: self.timeout,
                }));
            }
        };

        debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            chars = response.content.len(),
            "Model responded"
        );
        Ok(response.content)
    }
}
