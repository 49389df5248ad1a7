use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use super::{LLMClient, LLMResponse, TokenUsage};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: Option<u32>,
    total_tokens: u32,
}

impl From<Usage> for TokenUsage {
    fn from(u: Usage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens.unwrap_or(0),
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String, embedding_model: String, base_url: Option<String>) -> Self {
        let actual_base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            base_url: actual_base_url,
            model,
            embedding_model,
        }
    }

    async fn call_chat_completion(&self, system_prompt: Option<&str>, user_prompt: &str) -> Result<LLMResponse<String>> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut messages = Vec::new();
        if let Some(sys) = system_prompt {
            messages.push(Message { role: "system".to_string(), content: sys.to_string() });
        }
        messages.push(Message { role: "user".to_string(), content: user_prompt.to_string() });

        let req = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.7,
            max_tokens: 500,
        };

        let res = self.client.post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(anyhow!("OpenAI API error ({}): {}", status, body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse OpenAI response: {} - body: {}", e, body))?;

        let content = parsed.choices.first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("No content in OpenAI response"))?;

        Ok(LLMResponse { data: content, usage: parsed.usage.map(Into::into).unwrap_or_default() })
    }

    /// Embeddings in input order.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<LLMResponse<Vec<Vec<f32>>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));

        let req = EmbedRequest {
            model: self.embedding_model.clone(),
            input: texts,
        };

        let res = self.client.post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(anyhow!("OpenAI Embedding API error ({}): {}", status, body));
        }

        let parsed: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse OpenAI embedding response: {} - body: {}", e, body))?;

        let embeddings = parsed.data.into_iter().map(|d| d.embedding).collect();

        Ok(LLMResponse { data: embeddings, usage: parsed.usage.map(Into::into).unwrap_or_default() })
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(&self, system_prompt: Option<&str>, prompt: &str) -> Result<LLMResponse<String>> {
        self.call_chat_completion(system_prompt, prompt).await
    }

    async fn embed(&self, text: &str) -> Result<LLMResponse<Vec<f32>>> {
        let results = self.embed_batch(vec![text.to_string()]).await?;
        let emb = results.data.into_iter().next().ok_or_else(|| anyhow!("Empty embedding response"))?;
        Ok(LLMResponse { data: emb, usage: results.usage })
    }
}

#[cfg(test)]
#[path = "openai_tests.rs"]
mod openai_tests;
