//! Adapter bridging rig-core completion models to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{
    AssistantContent, CompletionError, CompletionModel, CompletionRequestBuilder, Message,
};
use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::costs;
use crate::llm::provider::{
    ChatRole, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};

/// Wraps a rig `CompletionModel` behind `LlmProvider`.
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
impl<M: CompletionModel> LlmProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        costs::per_token(&self.model_name)
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        // System messages become the preamble; the final user message is the
        // prompt; everything in between is chat history.
        let mut preamble = String::new();
        let mut history: Vec<Message> = Vec::new();
        let mut prompt: Option<Message> = None;

        let mut messages = request.messages.into_iter().peekable();
        while let Some(msg) = messages.next() {
            match msg.role {
                ChatRole::System => {
                    if !preamble.is_empty() {
                        preamble.push_str("\n\n");
                    }
                    preamble.push_str(&msg.content);
                }
                ChatRole::User => {
                    let m = Message::user(msg.content);
                    if messages.peek().is_none() {
                        prompt = Some(m);
                    } else {
                        history.push(m);
                    }
                }
                ChatRole::Assistant => history.push(Message::assistant(msg.content)),
            }
        }

        let prompt = prompt.ok_or_else(|| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: "completion request must end with a user message".to_string(),
        })?;

        let mut builder = CompletionRequestBuilder::new(self.model.clone(), prompt);
        if !preamble.is_empty() {
            builder = builder.preamble(preamble);
        }
        builder = builder.messages(history);
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature as f64);
        }
        let max_tokens = request.max_tokens;
        if let Some(max) = max_tokens {
            builder = builder.max_tokens(max as u64);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_completion_error(&self.model_name, e))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let input_tokens = response.usage.input_tokens as u32;
        let output_tokens = response.usage.output_tokens as u32;

        // rig does not surface a finish reason generically; treat an output
        // that consumed the whole budget as truncated.
        let finish_reason = match max_tokens {
            Some(max) if output_tokens >= max => FinishReason::Length,
            _ => FinishReason::Stop,
        };

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
            finish_reason,
            response_id: None,
        })
    }
}

fn map_completion_error(provider: &str, error: CompletionError) -> LlmError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason: error.to_string(),
    }
}
