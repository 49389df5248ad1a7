use crate::auth::Claims;
use crate::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use base64::Engine;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use wellness_common::crypto::Envelope;
use wellness_common::{
    CheckinData, PhotoData, PhotoType, SupplementData, TrackingKind, TrackingRecord, WeightData, WeightUnit,
};
use wellness_core::storage::blob::{content_type_for, photo_key};
use wellness_core::ObjectStore;

const HISTORY_DEFAULT_DAYS: i64 = 7;

/// Body carrying a client-encrypted record instead of plain fields.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptedBody {
    encrypted_data: String,
    #[serde(default)]
    timestamp: Option<i64>,
}

fn encrypted_body(body: &Value) -> ApiResult<Option<EncryptedBody>> {
    if body.get("encryptedData").is_none() {
        return Ok(None);
    }
    let parsed: EncryptedBody = serde_json::from_value(body.clone())
        .map_err(|_| ApiError::bad_request("encryptedData must be a string"))?;
    if !Envelope::is_valid(&parsed.encrypted_data) {
        return Err(ApiError::bad_request("encryptedData is not a valid encrypted envelope"));
    }
    Ok(Some(parsed))
}

fn client_timestamp(ms: Option<i64>) -> ApiResult<DateTime<Utc>> {
    match ms {
        Some(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| ApiError::bad_request("Invalid timestamp")),
        None => Ok(Utc::now()),
    }
}

/// Serialises `data` and stamps it with `createdAt`.
fn stamped<T: Serialize>(data: &T, now: DateTime<Utc>) -> ApiResult<Value> {
    let mut value = serde_json::to_value(data).map_err(anyhow::Error::from)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("createdAt".into(), json!(now));
    }
    Ok(value)
}

fn store_encrypted(state: &AppState, user_id: &str, kind: TrackingKind, body: EncryptedBody) -> ApiResult<DateTime<Utc>> {
    let timestamp = client_timestamp(body.timestamp)?;
    let record = TrackingRecord::encrypted(user_id, kind, timestamp, body.encrypted_data);
    state.store.put_tracking(&record)?;
    Ok(timestamp)
}

pub async fn checkin(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user_id = claims.user_id.as_str();

    if let Some(encrypted) = encrypted_body(&body)? {
        let timestamp = store_encrypted(&state, user_id, TrackingKind::Checkin, encrypted)?;
        state.store.update_emotion_context(user_id, |ctx| ctx.last_check_in = Some(timestamp))?;
        state.context.invalidate(user_id).await;
        return Ok((
            StatusCode::CREATED,
            Json(json!({ "message": "Check-in recorded successfully", "timestamp": timestamp })),
        ));
    }

    let data: CheckinData = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid check-in: {}", e)))?;
    if data.mood.is_some_and(|m| !(1..=10).contains(&m)) {
        return Err(ApiError::bad_request("Mood must be between 1 and 10"));
    }
    if data.energy.is_some_and(|e| !(1..=10).contains(&e)) {
        return Err(ApiError::bad_request("Energy must be between 1 and 10"));
    }

    let now = Utc::now();
    let record = TrackingRecord::plain(user_id, TrackingKind::Checkin, now, stamped(&data, now)?);
    state.store.put_tracking(&record)?;
    state.store.update_emotion_context(user_id, |ctx| ctx.last_check_in = Some(now))?;
    state.context.invalidate(user_id).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Check-in recorded successfully", "checkin": record })),
    ))
}

#[derive(Deserialize)]
pub struct WeightRequest {
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    unit: Option<WeightUnit>,
    #[serde(default)]
    note: Option<String>,
}

pub async fn weight(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<WeightRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (Some(weight), Some(unit)) = (payload.weight, payload.unit) else {
        return Err(ApiError::bad_request("Weight and unit are required"));
    };
    if !(weight > 0.0 && weight <= 1000.0) {
        return Err(ApiError::bad_request("Weight must be between 0 and 1000"));
    }

    let now = Utc::now();
    let data = WeightData { weight, unit, note: payload.note };
    let record = TrackingRecord::plain(&claims.user_id, TrackingKind::Weight, now, stamped(&data, now)?);
    state.store.put_tracking(&record)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Weight recorded successfully", "weight": record })),
    ))
}

pub async fn supplement(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user_id = claims.user_id.as_str();

    if let Some(encrypted) = encrypted_body(&body)? {
        let timestamp = store_encrypted(&state, user_id, TrackingKind::Supplement, encrypted)?;
        return Ok((
            StatusCode::CREATED,
            Json(json!({ "message": "Supplement tracking recorded successfully", "timestamp": timestamp })),
        ));
    }

    if !body.get("taken").is_some_and(Value::is_boolean) {
        return Err(ApiError::bad_request("taken field is required as boolean"));
    }
    let data: SupplementData = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid supplement record: {}", e)))?;

    let now = Utc::now();
    let record = TrackingRecord::plain(user_id, TrackingKind::Supplement, now, stamped(&data, now)?);
    state.store.put_tracking(&record)?;
    if data.taken {
        state.store.update_emotion_context(user_id, |ctx| ctx.supplements_taken = Some(now))?;
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Supplement tracking recorded successfully", "supplement": record })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRequest {
    #[serde(default)]
    photo_type: Option<PhotoType>,
    #[serde(default)]
    base64_image: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

/// Accepts raw base64 or a `data:<mime>;base64,` URL.
fn decode_image(encoded: &str) -> Option<Vec<u8>> {
    let raw = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    base64::engine::general_purpose::STANDARD.decode(raw.trim()).ok()
}

pub async fn photo(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<PhotoRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (Some(photo_type), Some(encoded), Some(mime_type)) =
        (payload.photo_type, payload.base64_image.filter(|s| !s.is_empty()), payload.mime_type.filter(|s| !s.is_empty()))
    else {
        return Err(ApiError::bad_request("base64Image, mimeType, and photoType are required"));
    };
    let bytes = decode_image(&encoded)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::bad_request("base64Image is not valid base64"))?;

    let key = photo_key(&claims.user_id, photo_type, &mime_type);
    state.photos.put(&key, &bytes).await?;
    let ttl = std::time::Duration::from_secs(state.config.photos.url_ttl_secs);
    let photo_url = state.photos.get_access_url(&key, ttl).await?;

    let now = Utc::now();
    let data = PhotoData { photo_type, photo_key: key, note: payload.note };
    let record = TrackingRecord::plain(&claims.user_id, TrackingKind::Photo, now, stamped(&data, now)?);
    state.store.put_tracking(&record)?;
    tracing::info!(user_id = %claims.user_id, size = bytes.len(), "Photo stored");

    let mut response = serde_json::to_value(&record).map_err(anyhow::Error::from)?;
    if let Some(data) = response.get_mut("data").and_then(Value::as_object_mut) {
        data.insert("photoUrl".into(), Value::String(photo_url));
    }
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Photo uploaded successfully", "photo": response })),
    ))
}

#[derive(Deserialize)]
pub struct SignedUrlQuery {
    #[serde(default)]
    expires: Option<i64>,
    #[serde(default)]
    signature: Option<String>,
}

pub async fn serve_photo(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    ApiQuery(query): ApiQuery<SignedUrlQuery>,
) -> ApiResult<impl IntoResponse> {
    let (Some(expires), Some(signature)) = (query.expires, query.signature) else {
        return Err(ApiError::Unauthorized("Missing photo signature".into()));
    };
    if !state.photos.signer().verify(&key, expires, &signature) {
        return Err(ApiError::Unauthorized("Invalid or expired photo link".into()));
    }
    let bytes = state
        .photos
        .get(&key)
        .await
        .map_err(|_| ApiError::not_found("Photo not found"))?
        .ok_or_else(|| ApiError::not_found("Photo not found"))?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&key))], bytes))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken as midnight UTC.
fn parse_date(raw: Option<&str>, default: DateTime<Utc>) -> ApiResult<DateTime<Utc>> {
    let Some(s) = raw else {
        return Ok(default);
    };
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Ok(d.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| ApiError::bad_request("Dates must be RFC 3339 timestamps or YYYY-MM-DD"))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<Json<Vec<TrackingRecord>>> {
    let now = Utc::now();
    let start = parse_date(query.start_date.as_deref(), now - Duration::days(HISTORY_DEFAULT_DAYS))?;
    let end = parse_date(query.end_date.as_deref(), now)?;
    if start > end {
        return Err(ApiError::bad_request("startDate must not be after endDate"));
    }
    Ok(Json(state.store.tracking_between(&claims.user_id, start, end)?))
}
