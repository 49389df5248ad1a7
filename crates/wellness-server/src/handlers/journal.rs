use crate::auth::Claims;
use crate::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use wellness_common::crypto::Envelope;
use wellness_common::{JournalEntryView, UserContext};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageCursor {
    entry_id: String,
}

pub(crate) fn encode_cursor(entry_id: &str) -> String {
    let cursor = PageCursor { entry_id: entry_id.to_string() };
    STANDARD.encode(serde_json::to_vec(&cursor).unwrap_or_default())
}

pub(crate) fn decode_cursor(raw: &str) -> Option<String> {
    let bytes = STANDARD.decode(raw).ok()?;
    let cursor: PageCursor = serde_json::from_slice(&bytes).ok()?;
    cursor.entry_id.parse::<i64>().ok().map(|_| cursor.entry_id)
}

fn require_envelope(content: Option<String>) -> ApiResult<String> {
    let content = content
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Encrypted content is required"))?;
    if !Envelope::is_valid(&content) {
        return Err(ApiError::bad_request("Encrypted content is not a valid encrypted envelope"));
    }
    Ok(content)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRequest {
    #[serde(default)]
    encrypted_content: Option<String>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

pub async fn create_entry(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<EntryRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let content = require_envelope(payload.encrypted_content)?;
    let retention = Duration::days(state.config.journal.retention_days);
    let entry = state.store.create_journal(
        &claims.user_id,
        content,
        payload.metadata.unwrap_or_default(),
        Utc::now(),
        retention,
    )?;
    tracing::debug!(user_id = %claims.user_id, entry_id = %entry.entry_id, "Journal entry created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "entryId": entry.entry_id, "createdAt": entry.created_at })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    last_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    entries: Vec<JournalEntryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_key: Option<String>,
}

pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<EntryPage>> {
    let journal = &state.config.journal;
    let limit = query.limit.unwrap_or(journal.default_page_size).clamp(1, journal.max_page_size);
    let before = match query.last_key.as_deref() {
        Some(raw) => Some(decode_cursor(raw).ok_or_else(|| ApiError::bad_request("Invalid lastKey"))?),
        None => None,
    };

    let (entries, next) = state.store.journal_page(&claims.user_id, limit, before.as_deref(), Utc::now())?;
    Ok(Json(EntryPage {
        entries: entries.iter().map(|e| e.view()).collect(),
        last_key: next.as_deref().map(encode_cursor),
    }))
}

pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(entry_id): Path<String>,
) -> ApiResult<Json<JournalEntryView>> {
    let entry = state
        .store
        .get_journal(&claims.user_id, &entry_id, Utc::now())?
        .ok_or_else(|| ApiError::not_found("Journal entry not found"))?;
    Ok(Json(entry.view()))
}

pub async fn update_entry(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(entry_id): Path<String>,
    ApiJson(payload): ApiJson<EntryRequest>,
) -> ApiResult<Json<Value>> {
    let content = require_envelope(payload.encrypted_content)?;
    let metadata = payload.metadata;
    let updated = state
        .store
        .update_journal(&claims.user_id, &entry_id, Utc::now(), |entry| {
            entry.encrypted_content = content;
            if let Some(metadata) = metadata {
                entry.metadata = metadata;
            }
        })?
        .ok_or_else(|| ApiError::not_found("Journal entry not found"))?;

    Ok(Json(json!({
        "message": "Journal entry updated successfully",
        "updatedAt": updated.updated_at,
    })))
}

pub async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(entry_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.store.delete_journal(&claims.user_id, &entry_id)?;
    state.context.invalidate(&claims.user_id).await;
    Ok(Json(json!({ "message": "Journal entry deleted successfully" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(default)]
    entry_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

pub async fn process_entry(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<ProcessRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(entry_id), Some(content)) = (
        payload.entry_id.filter(|s| !s.is_empty()),
        payload.content.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(ApiError::bad_request("Entry ID and content are required"));
    };

    let outcome = state
        .enrichment
        .process_entry(&claims.user_id, &entry_id, &content)
        .await?
        .ok_or_else(|| ApiError::not_found("Journal entry not found"))?;

    Ok(Json(json!({
        "message": "Journal entry processed successfully",
        "insights": outcome,
    })))
}

#[derive(Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    threshold: Option<f32>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<SearchRequest>,
) -> ApiResult<Json<Value>> {
    let query = payload
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Search query is required"))?;

    let hits = state
        .search
        .search(&claims.user_id, &query, payload.limit, payload.threshold, Utc::now())
        .await?;
    Ok(Json(json!({
        "query": query,
        "count": hits.len(),
        "entries": hits,
    })))
}

pub async fn context(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserContext>> {
    Ok(Json(state.context.user_context(&claims.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip_and_rejects_garbage() {
        let cursor = encode_cursor("1767225600000");
        assert_eq!(decode_cursor(&cursor).as_deref(), Some("1767225600000"));
        assert!(decode_cursor("not base64!").is_none());
        assert!(decode_cursor(&STANDARD.encode(br#"{"entryId":"abc"}"#)).is_none());
    }
}
