//! LLM integration for AI Digest.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//! - **Ollama**: Local server over its HTTP API
//!
//! Every pipeline stage talks to the model through [`Invoker`], which turns
//! any provider into `prompt -> text` with a timeout.

pub mod invoker;
mod ollama;
pub mod provider;
mod rig_adapter;

pub use invoker::{Invoker, Prompt};
pub use ollama::OllamaProvider;
pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;
use std::time::Duration;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
    Ollama,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Only used by the Ollama backend.
    pub base_url: String,
    /// Per-call timeout applied by the `Invoker`.
    pub timeout: Duration,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
        LlmBackend::Ollama => {
            tracing::info!("Using Ollama (model: {}, url: {})", config.model, config.base_url);
            Ok(Arc::new(OllamaProvider::new(&config.base_url, &config.model)))
        }
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model, "anthropic")))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model, "openai")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: LlmBackend, model: &str) -> LlmConfig {
        LlmConfig {
            backend,
            api_key: secrecy::SecretString::from("test-key"),
            model: model.to_string(),
            base_url: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_create_anthropic_provider() {
        // rig-core clients accept any string as API key at construction time.
        let provider = create_provider(&config(LlmBackend::Anthropic, "claude-3-5-sonnet-latest"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_create_openai_provider() {
        let provider = create_provider(&config(LlmBackend::OpenAi, "gpt-4o"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4o");
    }

    #[test]
    fn test_create_ollama_provider() {
        let provider = create_provider(&config(LlmBackend::Ollama, "llama3")).unwrap();
        assert_eq!(provider.model_name(), "llama3");
    }
}
