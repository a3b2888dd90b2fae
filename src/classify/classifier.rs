//! The classifier seam and its LLM-backed implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::parser::parse_classification;
use super::prompts::{ClassificationRequest, build_system_prompt, build_user_prompt};
use super::types::ClassificationResult;
use crate::config::EngineConfig;
use crate::error::ClassifyError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Classifies a user message and extracts field values.
///
/// This is the only asynchronous step of a turn. Everything downstream of it
/// is synchronous.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResult, ClassifyError>;
}

/// [`Classifier`] that makes a single LLM call per turn.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, settings: &EngineConfig) -> Self {
        Self {
            llm,
            max_tokens: settings.classifier_max_tokens,
            temperature: settings.classifier_temperature,
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResult, ClassifyError> {
        let completion = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt()),
            ChatMessage::user(build_user_prompt(request)),
        ])
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature);

        debug!(
            model = self.llm.model_name(),
            state = %request.state_id,
            "Sending classification request"
        );
        let response = self.llm.complete(completion).await?;

        let result = parse_classification(&response.content);
        info!(
            state = %request.state_id,
            intent = %result.intent.primary,
            confidence = result.intent.confidence,
            extracted = result.extracted.len(),
            "Classified user message"
        );
        Ok(result)
    }
}
