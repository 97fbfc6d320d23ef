//! The six standard stages and the model-call plumbing they share.

mod curate;
mod deliver;
mod distill;
mod fetch;
mod produce;
mod review;

pub use curate::CurateStage;
pub use deliver::DeliverStage;
pub use distill::DistillStage;
pub use fetch::FetchStage;
pub use produce::ProduceStage;
pub use review::ReviewStage;

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::{Invoker, Prompt};
use crate::recovery::RecoveryParser;
use crate::schema::{Schema, SchemaValidator, ValidatedRecord};

const PREVIEW_CHARS: usize = 200;

/// At most `max` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Model invocation followed by recovery and validation.
#[derive(Clone)]
pub struct ModelCall {
    invoker: Invoker,
    parser: RecoveryParser,
    validator: SchemaValidator,
}

impl ModelCall {
    pub fn new(invoker: Invoker, parser: RecoveryParser, validator: SchemaValidator) -> Self {
        Self {
            invoker,
            parser,
            validator,
        }
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    /// Plain text from the model.
    pub async fn text(&self, prompt: &Prompt) -> Result<String, PipelineError> {
        self.invoker.invoke(prompt).await
    }

    /// A validated record, or the taxonomy error that prevented one.
    ///
    /// `NoStructureFound` and `Unrecoverable` are returned as errors so each
    /// stage can pick its own fallback.
    pub async fn structured(
        &self,
        prompt: &Prompt,
        schema: &Schema,
    ) -> Result<ValidatedRecord, PipelineError> {
        let text = self.invoker.invoke(prompt).await?;
        let recovery = self.parser.recover(&text);
        if let Some(diagnostics) = &recovery.diagnostics {
            warn!(
                schema = schema.name,
                outcome = ?recovery.outcome,
                raw = truncate_chars(&diagnostics.raw, PREVIEW_CHARS),
                "Model output not recovered"
            );
            debug!(schema = schema.name, cleaned = %diagnostics.cleaned, "Cleaned payload");
        }
        let document = recovery.into_result()?;
        Ok(self.validator.validate(&document, schema))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted model for stage tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::ModelCall;
    use crate::error::LlmError;
    use crate::llm::{
        CompletionRequest, CompletionResponse, FinishReason, Invoker, LlmProvider,
    };
    use crate::recovery::RecoveryParser;
    use crate::schema::SchemaValidator;

    /// Replies in order; `Err` entries fail the call. Runs dry with an error.
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub fn new<I, S>(replies: I) -> Arc<Self>
        where
            I: IntoIterator<Item = Result<S, S>>,
            S: Into<String>,
        {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(Into::into).map_err(Into::into))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.prompts.lock().unwrap().push(request.conversation_text());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".to_string()));
            match reply {
                Ok(content) => Ok(CompletionResponse {
                    content,
                    input_tokens: 0,
                    output_tokens: 0,
                    finish_reason: FinishReason::Stop,
                }),
                Err(reason) => Err(LlmError::RequestFailed {
                    provider: "scripted".into(),
                    reason,
                }),
            }
        }
    }

    pub fn model_call(llm: &Arc<ScriptedLlm>) -> ModelCall {
        ModelCall::new(
            Invoker::new(llm.clone(), Duration::from_secs(5)),
            RecoveryParser::default(),
            SchemaValidator::default(),
        )
    }
}
