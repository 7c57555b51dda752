//! Bridges rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message};
use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::costs;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Wraps any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        costs::model_cost(&self.model_name)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, prompt) = split_messages(&request.messages);

        let mut builder = self.model.completion_request(Message::user(prompt));
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(&self.model_name, e.to_string()))?;

        let texts: Vec<&str> = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect();
        let content = join_text(&self.model_name, &texts)?;

        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        })
    }
}

/// Map a provider error message onto the `LlmError` variant it describes.
fn classify_error(provider: &str, reason: String) -> LlmError {
    let lower = reason.to_lowercase();
    if reason.contains("429") || lower.contains("rate limit") {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        }
    } else if reason.contains("401")
        || lower.contains("unauthorized")
        || lower.contains("invalid x-api-key")
        || lower.contains("invalid api key")
        || lower.contains("incorrect api key")
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason,
        }
    }
}

/// Concatenate the text parts of a completion. A completion with no text
/// part at all (only tool calls or reasoning) is an invalid response.
fn join_text(provider: &str, texts: &[&str]) -> Result<String, LlmError> {
    if texts.is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: "completion contained no text".into(),
        });
    }
    Ok(texts.concat())
}

/// System messages become the preamble; everything else is joined into the prompt.
fn split_messages(messages: &[ChatMessage]) -> (Option<String>, String) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let prompt: Vec<&str> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let preamble = (!system.is_empty()).then(|| system.join("\n\n"));
    (preamble, prompt.join("\n\n"))
}
