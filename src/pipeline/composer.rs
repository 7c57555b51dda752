//! Reply composer — merges the price-list template, the original message,
//! and the computed distance into one prompt and asks the LLM for a reply.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{GenerationError, TemplateError};
use crate::llm::costs;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::DistanceKm;

/// Default max tokens for a generated quote.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default sampling temperature for a generated quote.
pub const DEFAULT_TEMPERATURE: f32 = 0.4;

/// Read the template resource. Missing, unreadable, or blank files are errors.
pub async fn load_template(path: &Path) -> Result<String, TemplateError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TemplateError::Read {
            path: path.display().to_string(),
            source,
        })?;

    if text.trim().is_empty() {
        return Err(TemplateError::Empty {
            path: path.display().to_string(),
        });
    }

    debug!(path = %path.display(), bytes = text.len(), "Loaded reply template");
    Ok(text)
}

/// Template verbatim, then the message, then the distance to two decimals.
pub fn build_prompt(template: &str, message_content: &str, distance: DistanceKm) -> String {
    format!(
        "{template}\n\n\
         ---\n\
         Incoming message:\n\
         {message_content}\n\
         ---\n\n\
         Driving distance from our base to the requested location: {distance} km"
    )
}

/// Asks the LLM for one completion per quote. No retry of its own.
pub struct ReplyComposer {
    llm: Arc<dyn LlmProvider>,
    max_tokens: u32,
    temperature: f32,
}

impl ReplyComposer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Generate the reply body. The completion is returned with surrounding
    /// whitespace trimmed; blank completions count as failures.
    pub async fn compose(
        &self,
        template: &str,
        message_content: &str,
        distance: DistanceKm,
    ) -> Result<String, GenerationError> {
        let prompt = build_prompt(template, message_content, distance);
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let response = self.llm.complete(request).await?;

        let cost = costs::estimate(
            self.llm.cost_per_token(),
            response.input_tokens,
            response.output_tokens,
        );
        info!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            cost_usd = %cost,
            "Reply generated"
        );

        let body = response.content.trim();
        if body.is_empty() {
            return Err(GenerationError::EmptyCompletion {
                model: self.llm.model_name().to_string(),
            });
        }
        Ok(body.to_string())
    }
}
