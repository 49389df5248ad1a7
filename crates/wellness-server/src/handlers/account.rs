use crate::auth::{validate_email, validate_password, Claims};
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::AppState;
use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use wellness_common::{crypto, User};

#[derive(Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl CredentialsRequest {
    fn required(self) -> ApiResult<(String, String)> {
        match (self.email, self.password) {
            (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
                Ok((email.trim().to_lowercase(), password))
            }
            _ => Err(ApiError::bad_request("Email and password are required")),
        }
    }
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (email, password) = payload.required()?;
    if !validate_email(&email) {
        return Err(ApiError::bad_request("Invalid email format"));
    }
    if let Some(reason) = validate_password(&password) {
        return Err(ApiError::bad_request(reason));
    }
    if state.store.get_user_by_email(&email)?.is_some() {
        return Err(ApiError::Conflict("User already exists".into()));
    }

    let cost = state.config.auth.bcrypt_cost;
    let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| anyhow::anyhow!("hash task failed: {}", e))?
        .map_err(|e| anyhow::anyhow!("bcrypt failed: {}", e))?;

    let user = User::new(&email, password_hash, crypto::generate_salt());
    if !state.store.create_user(&user)? {
        return Err(ApiError::Conflict("User already exists".into()));
    }
    tracing::info!(user_id = %user.user_id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created successfully",
            "user": user.to_public(),
        })),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> ApiResult<Json<Value>> {
    let (email, password) = payload.required()?;

    let attempts = state.login_limiter.get(&email).await.unwrap_or(0);
    if attempts >= state.config.auth.login_attempt_limit {
        tracing::warn!("Login locked out after repeated failures");
        return Err(ApiError::TooManyRequests);
    }

    let user = state.store.get_user_by_email(&email)?;
    let hash_to_check = user
        .as_ref()
        .map(|u| u.password_hash.clone())
        .unwrap_or_else(|| state.dummy_hash.clone());
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash_to_check).unwrap_or(false))
        .await
        .map_err(|e| anyhow::anyhow!("verify task failed: {}", e))?;

    let user = match user {
        Some(user) if valid => user,
        _ => {
            state
                .login_limiter
                .entry(email)
                .and_upsert_with(|existing| std::future::ready(existing.map_or(1, |e| e.into_value() + 1)))
                .await;
            return Err(ApiError::Unauthorized("Invalid credentials".into()));
        }
    };
    state.login_limiter.invalidate(&email).await;

    let token = state.jwt.create_token(&user)?;
    let now = chrono::Utc::now();
    let user = state
        .store
        .update_user(&user.user_id, |u| u.last_login = Some(now))?
        .unwrap_or(user);
    tracing::info!(user_id = %user.user_id, "User logged in");

    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "user": user.to_public(),
    })))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Value>> {
    let user = state
        .store
        .get_user(&claims.user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({ "user": user.to_public() })))
}
