//! Model client abstraction: one trait for every LLM call in the engine.
//!
//! All components reach the model through [`ModelClient`]; no component
//! instantiates a vendor client directly. [`OpenAiModel`] is the production
//! implementation, [`MockModel`] the scripted one for tests. Vendor-specific
//! details never leak above this boundary.
//!
//! Structured output: [`ModelClient::invoke_structured`] constrains generation
//! with a caller-supplied JSON schema and returns the parsed value plus usage
//! metadata when the provider reports it.

mod mock;
mod openai;

pub use mock::MockModel;
pub use openai::OpenAiModel;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ModelConfig;
use crate::error::{AgentError, ValidationError};
use crate::message::Message;

/// Token usage for one model call, when the provider reports it.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ModelUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response from a plain completion: assistant text plus optional usage.
#[derive(Clone, Debug)]
pub struct ModelResponse {
    pub content: String,
    pub usage: Option<ModelUsage>,
}

/// Response from a schema-constrained completion: parsed JSON plus usage.
#[derive(Clone, Debug)]
pub struct StructuredResponse {
    pub value: Value,
    pub usage: Option<ModelUsage>,
}

/// Model client: given messages, return assistant text or schema-shaped JSON.
///
/// **Interaction**: Used by the agent runner and the plan/critique/refine
/// nodes. Implementations: [`MockModel`] (scripted), [`OpenAiModel`]
/// (OpenAI-compatible API via `async-openai`).
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Identifier recorded on agent spans (e.g. `"gpt-4o-mini"`, `"mock"`).
    fn model_id(&self) -> &str;

    /// One plain completion turn.
    async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse, AgentError>;

    /// One completion constrained to `schema`; returns the parsed JSON value.
    ///
    /// `schema_name` labels the schema for providers that require a name.
    /// Output that cannot be parsed as JSON surfaces as [`AgentError::Schema`].
    async fn invoke_structured(
        &self,
        messages: &[Message],
        schema_name: &str,
        schema: &Value,
    ) -> Result<StructuredResponse, AgentError>;
}

/// Shared accessor: builds the model client the whole engine uses.
pub fn model_from_config(config: &ModelConfig) -> Result<Arc<dyn ModelClient>, ValidationError> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| ValidationError::Config("model api key is not set".into()))?;
    Ok(Arc::new(OpenAiModel::new(
        api_key,
        config.base_url.clone(),
        config.model_name.clone(),
    )))
}

/// Retries transient failures at most `retries` times before giving up.
///
/// [`AgentError::Model`] and [`AgentError::Schema`] are retried; everything
/// unrecoverable (auth, quota, storage, cancellation) propagates immediately.
/// This is the single retry site for model calls: callers must not wrap it in
/// another retry layer.
pub(crate) async fn invoke_structured_with_retry(
    model: &dyn ModelClient,
    messages: &[Message],
    schema_name: &str,
    schema: &Value,
    retries: u32,
) -> Result<StructuredResponse, AgentError> {
    let mut attempt = 0;
    loop {
        match model.invoke_structured(messages, schema_name, schema).await {
            Ok(response) => return Ok(response),
            Err(err) if err.is_unrecoverable() => return Err(err),
            Err(err) => {
                if attempt >= retries {
                    return Err(err);
                }
                attempt += 1;
                tracing::debug!(attempt, error = %err, "retrying structured model call");
            }
        }
    }
}

/// Plain-completion twin of [`invoke_structured_with_retry`].
pub(crate) async fn invoke_with_retry(
    model: &dyn ModelClient,
    messages: &[Message],
    retries: u32,
) -> Result<ModelResponse, AgentError> {
    let mut attempt = 0;
    loop {
        match model.invoke(messages).await {
            Ok(response) => return Ok(response),
            Err(err) if err.is_unrecoverable() => return Err(err),
            Err(err) => {
                if attempt >= retries {
                    return Err(err);
                }
                attempt += 1;
                tracing::debug!(attempt, error = %err, "retrying model call");
            }
        }
    }
}
