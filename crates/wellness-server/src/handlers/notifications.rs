use crate::auth::Claims;
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use wellness_common::{
    NotificationContent, NotificationKind, NotificationPreferences, PushSubscription, QuietHours, Urgency,
};
use wellness_core::notify::templates::DEFAULT_ICON;

pub async fn vapid_public_key(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let key = state
        .config
        .notifications
        .vapid_public_key
        .clone()
        .ok_or_else(|| ApiError::not_found("Push notifications are not configured"))?;
    Ok(Json(json!({ "publicKey": key })))
}

#[derive(Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    subscription: Option<Value>,
    #[serde(default)]
    phone: Option<String>,
}

fn parse_subscription(raw: Option<Value>) -> Option<PushSubscription> {
    let subscription: PushSubscription = serde_json::from_value(raw?).ok()?;
    let complete = !subscription.endpoint.is_empty()
        && !subscription.keys.p256dh.is_empty()
        && !subscription.keys.auth.is_empty();
    complete.then_some(subscription)
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<SubscribeRequest>,
) -> ApiResult<Json<Value>> {
    let subscription = parse_subscription(payload.subscription)
        .ok_or_else(|| ApiError::bad_request("Valid push subscription required"))?;
    let phone = payload.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());

    state
        .store
        .update_user(&claims.user_id, |user| {
            user.push_subscription = Some(subscription);
            if phone.is_some() {
                user.phone = phone;
            }
        })?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    tracing::info!(user_id = %claims.user_id, "Push subscription saved");

    Ok(Json(json!({ "message": "Notification subscription saved successfully" })))
}

pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Value>> {
    state
        .store
        .update_user(&claims.user_id, |user| user.push_subscription = None)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({ "message": "Notification subscription removed" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesRequest {
    #[serde(default)]
    disabled_types: Option<Vec<String>>,
    #[serde(default)]
    quiet_hours: Option<QuietHours>,
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<PreferencesRequest>,
) -> ApiResult<Json<Value>> {
    if payload.quiet_hours.is_some_and(|q| q.start > 23 || q.end > 23) {
        return Err(ApiError::bad_request("Quiet hours must be between 0 and 23"));
    }

    let ctx = state.store.update_emotion_context(&claims.user_id, |ctx| {
        let prefs = ctx.notification_preferences.get_or_insert_with(NotificationPreferences::default);
        if let Some(types) = payload.disabled_types {
            prefs.disabled_types = types;
        }
        if let Some(quiet) = payload.quiet_hours {
            prefs.quiet_hours = Some(quiet);
        }
    })?;

    Ok(Json(json!({ "preferences": ctx.notification_preferences })))
}

#[derive(Deserialize, Default)]
pub struct TestRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    urgency: Option<Urgency>,
}

pub async fn send_test(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    payload: Option<ApiJson<TestRequest>>,
) -> ApiResult<Json<Value>> {
    let payload = payload.map(|ApiJson(p)| p).unwrap_or_default();
    let content = NotificationContent {
        title: payload.title.unwrap_or_else(|| "Test Notification".into()),
        body: payload.body.unwrap_or_else(|| "Notifications are working.".into()),
        icon: Some(DEFAULT_ICON.into()),
        badge: Some(DEFAULT_ICON.into()),
        data: Some(json!({ "type": "test", "url": "/" })),
        ..Default::default()
    };

    let report = state
        .dispatcher
        .send_direct(&claims.user_id, content, payload.urgency.unwrap_or_default())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let message = if report.sent { "Notification sent" } else { "Notification could not be delivered" };
    Ok(Json(json!({
        "message": message,
        "sent": report.sent,
        "channel": report.channel,
    })))
}

pub async fn trigger(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> ApiResult<Json<Value>> {
    let kind = NotificationKind::parse(&kind)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown notification kind: {}", kind)))?;
    let summary = state.dispatcher.dispatch_scheduled(kind, Utc::now()).await?;
    Ok(Json(json!({ "kind": kind, "summary": summary })))
}
