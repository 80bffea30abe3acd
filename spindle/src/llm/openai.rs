//! OpenAI-compatible Chat Completions client implementing [`ModelClient`].
//!
//! Structured output uses the JSON-schema response format so the provider
//! constrains generation to the caller's schema; the parsed value is returned
//! as-is and schema mismatches surface as [`AgentError::Schema`] for the
//! caller's retry budget.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};

use crate::error::AgentError;
use crate::message::Message;

use super::{ModelClient, ModelResponse, ModelUsage, StructuredResponse};

/// Chat Completions client for any OpenAI-compatible endpoint.
///
/// **Interaction**: Built by [`model_from_config`](crate::llm::model_from_config);
/// the only production [`ModelClient`]. Base URL override supports
/// OpenAI-compatible gateways.
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiModel {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>, model: impl Into<String>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }

    /// Convert transcript messages to request messages (text roles only).
    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System(s) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(s.as_str()),
                ),
                Message::User(s) => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(s.as_str()),
                ),
                Message::Assistant(s) => {
                    ChatCompletionRequestMessage::Assistant((s.as_str()).into())
                }
            })
            .collect()
    }

    /// Classify a provider error: auth and exhausted quota are unrecoverable,
    /// everything else is transient and eligible for the caller's retries.
    fn map_api_error(detail: String) -> AgentError {
        let lower = detail.to_lowercase();
        if lower.contains("invalid_api_key")
            || lower.contains("incorrect api key")
            || lower.contains("authentication")
            || lower.contains("401")
        {
            AgentError::Auth(detail)
        } else if lower.contains("insufficient_quota") || lower.contains("quota") {
            AgentError::Quota(detail)
        } else {
            AgentError::Model(detail)
        }
    }

    async fn create(
        &self,
        messages: &[Message],
        response_format: Option<ResponseFormat>,
    ) -> Result<(String, Option<ModelUsage>), AgentError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));
        if let Some(format) = response_format {
            args.response_format(format);
        }
        let request = args
            .build()
            .map_err(|e| AgentError::Model(format!("request build failed: {}", e)))?;

        debug!(model = %self.model, message_count = messages.len(), "chat completion create");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| Self::map_api_error(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Model("provider returned no choices".to_string()))?;
        let content = choice.message.content.unwrap_or_default();
        let usage = response.usage.map(|u| ModelUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        Ok((content, usage))
    }
}

#[async_trait]
impl ModelClient for OpenAiModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse, AgentError> {
        let (content, usage) = self.create(messages, None).await?;
        Ok(ModelResponse { content, usage })
    }

    async fn invoke_structured(
        &self,
        messages: &[Message],
        schema_name: &str,
        schema: &Value,
    ) -> Result<StructuredResponse, AgentError> {
        let format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: schema_name.to_string(),
                schema: Some(schema.clone()),
                strict: Some(true),
            },
        };
        let (content, usage) = self.create(messages, Some(format)).await?;
        let value = serde_json::from_str(&content)
            .map_err(|e| AgentError::Schema(format!("{}: {}", e, content)))?;
        Ok(StructuredResponse { value, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_classified_unrecoverable() {
        let err = OpenAiModel::map_api_error("401 Unauthorized: invalid_api_key".into());
        assert!(matches!(err, AgentError::Auth(_)));
    }

    #[test]
    fn quota_errors_are_classified_unrecoverable() {
        let err = OpenAiModel::map_api_error("You exceeded your current quota".into());
        assert!(matches!(err, AgentError::Quota(_)));
    }

    #[test]
    fn other_errors_are_transient() {
        let err = OpenAiModel::map_api_error("connection reset by peer".into());
        assert!(matches!(err, AgentError::Model(_)));
    }
}
