use crate::error::ApiError;
use crate::AppState;
use anyhow::{anyhow, Result};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wellness_common::User;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub exp: usize,
}

/// HS256 signing keys for session tokens.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: chrono::Duration::hours(ttl_hours),
        }
    }

    pub fn create_token(&self, user: &User) -> Result<String> {
        let expiration = chrono::Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| anyhow!("token expiry out of range"))?
            .timestamp() as usize;

        let claims = Claims {
            sub: user.user_id.clone(),
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            exp: expiration,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(token_data.claims)
    }
}

pub fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

/// `None` when the password is acceptable, otherwise the reason.
pub fn validate_password(password: &str) -> Option<&'static str> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Some("Password must be at least 8 characters long");
    }
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Some("Password must contain at least one letter and one number");
    }
    None
}

/// Rejects requests without a valid bearer token and exposes the token's
/// [`Claims`] to handlers as a request extension.
pub async fn auth_middleware(State(state): State<Arc<AppState>>, mut request: Request, next: Next) -> Response {
    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if !token.trim().is_empty() => token.trim(),
        _ => return ApiError::Unauthorized("Missing or invalid Authorization header".into()).into_response(),
    };

    match state.jwt.verify_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!("Token rejected: {}", e);
            ApiError::Unauthorized("Invalid or expired token".into()).into_response()
        }
    }
}

pub const OPERATOR_KEY_HEADER: &str = "x-operator-key";

/// Gate for operator-only routes: the `x-operator-key` header must match the
/// configured operator key.
pub async fn operator_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(OPERATOR_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match (state.config.auth.operator_key.as_deref(), presented) {
        (Some(expected), Some(key)) if !expected.is_empty() && key == expected => next.run(request).await,
        _ => {
            tracing::warn!(path = %request.uri().path(), "Operator request rejected");
            ApiError::Forbidden("Operator key required".into()).into_response()
        }
    }
}
