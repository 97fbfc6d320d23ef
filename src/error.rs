//! Error types for AI Digest.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid cron schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the item fetchers (web search, feeds, arXiv).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source {source_name} request failed: {reason}")]
    RequestFailed { source_name: String, reason: String },

    #[error("Source {source_name} returned HTTP {status}")]
    BadStatus { source_name: String, status: u16 },

    #[error("Source {source_name} returned an unparsable document: {reason}")]
    Parse { source_name: String, reason: String },
}

/// Archival and mail transport errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("No recipients configured")]
    NoRecipients,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Mail transport failed: {0}")]
    Transport(String),

    #[error("Mail transport timed out after {0:?}")]
    Timeout(Duration),

    #[error("Archive IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The pipeline failure taxonomy.
///
/// Stages catch these at their boundary and turn them into a degraded but
/// well-formed state field plus an advisory note. None of them escapes
/// `PipelineEngine::run`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No structured payload found in model output")]
    NoStructureFound,

    #[error("Model output unrecoverable after {attempts} attempt(s): {reason}")]
    Unrecoverable { attempts: u32, reason: String },

    #[error("Field '{field}' replaced with default: {reason}")]
    ValidationDegraded { field: String, reason: String },

    #[error("Invocation failed: {0}")]
    InvocationError(#[from] LlmError),

    #[error("Delivery failed: {0}")]
    DeliveryError(#[from] DeliveryError),
}

impl PipelineError {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoStructureFound => "no_structure_found",
            Self::Unrecoverable { .. } => "unrecoverable",
            Self::ValidationDegraded { .. } => "validation_degraded",
            Self::InvocationError(_) => "invocation_error",
            Self::DeliveryError(_) => "delivery_error",
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_labels() {
        assert_eq!(PipelineError::NoStructureFound.label(), "no_structure_found");
        assert_eq!(
            PipelineError::Unrecoverable {
                attempts: 3,
                reason: "eof".into()
            }
            .label(),
            "unrecoverable"
        );
        assert_eq!(
            PipelineError::from(DeliveryError::NoRecipients).label(),
            "delivery_error"
        );
    }

    #[test]
    fn timeout_maps_to_invocation_error() {
        let err: PipelineError = LlmError::Timeout {
            provider: "ollama".into(),
            timeout: Duration::from_secs(5),
        }
        .into();
        assert_eq!(err.label(), "invocation_error");
        assert!(err.to_string().contains("timed out"));
    }
}
