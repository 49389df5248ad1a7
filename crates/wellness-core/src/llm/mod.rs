pub mod openai;

pub use openai::OpenAIClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wellness_common::config::AppConfig;

/// Builds the configured client. Gemini is reached through its
/// OpenAI-compatible endpoint, so both providers share one implementation.
pub fn create_llm_client(config: &AppConfig) -> Option<Arc<dyn LLMClient>> {
    let api_key = config.get_active_key().filter(|k| !k.is_empty())?;
    Some(Arc::new(OpenAIClient::new(
        api_key,
        config.get_model_name(),
        config.get_embedding_model_name(),
        config.get_base_url(),
    )))
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMResponse<T> {
    pub data: T,
    pub usage: TokenUsage,
}

/// An upstream provider (AI endpoint, push relay) failed or is not configured.
/// Callers downcast to this to report a gateway error instead of a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError(pub String);

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upstream provider error: {}", self.0)
    }
}

impl std::error::Error for UpstreamError {}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(&self, system_prompt: Option<&str>, prompt: &str) -> Result<LLMResponse<String>>;

    async fn embed(&self, text: &str) -> Result<LLMResponse<Vec<f32>>>;
}

/// The span from the first `{` to the last `}` of a completion, or `None`.
/// Models often wrap JSON in prose or code fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
