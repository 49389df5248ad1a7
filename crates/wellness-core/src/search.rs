use crate::llm::{LLMClient, UpstreamError};
use crate::storage::DocumentStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use wellness_common::config::SearchConfig;
use wellness_common::Insights;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub entry_id: String,
    pub encrypted_content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_insights: Option<Insights>,
}

#[derive(Clone)]
pub struct JournalSearch {
    store: DocumentStore,
    llm: Option<Arc<dyn LLMClient>>,
    embedding_cache: Cache<String, Arc<Vec<f32>>>,
    config: SearchConfig,
}

impl JournalSearch {
    pub fn new(store: DocumentStore, llm: Option<Arc<dyn LLMClient>>, config: SearchConfig) -> Self {
        let embedding_cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(3600))
            .build();
        Self { store, llm, embedding_cache, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    async fn embed_query(&self, query: &str) -> Result<Arc<Vec<f32>>> {
        if let Some(hit) = self.embedding_cache.get(query).await {
            return Ok(hit);
        }
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| UpstreamError("no embedding provider configured".into()))?;
        let embedding = llm
            .embed(query)
            .await
            .map_err(|e| UpstreamError(format!("query embedding failed: {}", e)))?
            .data;
        if embedding.is_empty() {
            return Err(UpstreamError("empty query embedding".into()).into());
        }
        let embedding = Arc::new(embedding);
        self.embedding_cache.insert(query.to_string(), embedding.clone()).await;
        Ok(embedding)
    }

    /// Entries most similar to `query`, best first. Only recent entries that
    /// already carry an embedding are considered.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<usize>,
        threshold: Option<f32>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SearchHit>> {
        let limit = limit.unwrap_or(self.config.default_limit);
        let threshold = threshold.unwrap_or(self.config.default_threshold);
        let query_embedding = self.embed_query(query).await?;

        let entries = self.store.recent_journal(user_id, self.config.scan_limit, now)?;
        let mut hits: Vec<SearchHit> = entries
            .into_iter()
            .filter(|e| !e.embedding.is_empty())
            .filter_map(|e| {
                let similarity = cosine_similarity(&query_embedding, &e.embedding);
                (similarity >= threshold).then(|| SearchHit {
                    entry_id: e.entry_id,
                    encrypted_content: e.encrypted_content,
                    metadata: e.metadata,
                    created_at: e.created_at,
                    similarity,
                    extracted_insights: e.extracted_insights,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        tracing::debug!(user_id, hits = hits.len(), "journal search");
        Ok(hits)
    }
}
