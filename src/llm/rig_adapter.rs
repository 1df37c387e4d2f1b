//! `LlmProvider` over any rig completion model.

use std::time::Duration;

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionError, CompletionModel, Message};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Anthropic rejects requests without `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Wraps a rig `CompletionModel` behind our provider trait.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: String,
    timeout: Duration,
}

impl<M> RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    pub fn new(model: M, model_name: &str, provider: &str, timeout: Duration) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider: provider.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, mut history) = split_messages(&request.messages);
        let Some(prompt) = history.pop() else {
            return Err(LlmError::RequestFailed {
                provider: self.provider.clone(),
                reason: "request has no user or assistant messages".to_string(),
            });
        };

        let mut builder = self
            .model
            .completion_request(prompt)
            .max_tokens(u64::from(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)));
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        for message in history {
            builder = builder.message(message);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.provider.clone(),
                timeout: self.timeout,
            })?
            .map_err(|e| map_completion_error(&self.provider, e))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        debug!(
            model = %self.model_name,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "completion received"
        );

        Ok(CompletionResponse {
            content,
            input_tokens: saturating_u32(response.usage.input_tokens),
            output_tokens: saturating_u32(response.usage.output_tokens),
        })
    }
}

/// System messages become the preamble; the rest keep their order.
fn split_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Message>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let preamble = (!system.is_empty()).then(|| system.join("\n\n"));

    let history = messages
        .iter()
        .filter_map(|m| match m.role {
            Role::System => None,
            Role::User => Some(Message::user(m.content.clone())),
            Role::Assistant => Some(Message::assistant(m.content.clone())),
        })
        .collect();

    (preamble, history)
}

/// Map a rig error onto our taxonomy. rig reports provider HTTP failures as
/// text, so status codes are recognised by substring.
fn map_completion_error(provider: &str, err: CompletionError) -> LlmError {
    if let CompletionError::JsonError(e) = &err {
        return LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: e.to_string(),
        };
    }

    let reason = err.to_string();
    let lower = reason.to_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("authentication")
        || lower.contains("api key")
        || lower.contains("api-key")
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason,
        }
    }
}

fn saturating_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
