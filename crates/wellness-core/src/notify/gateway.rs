use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use wellness_common::{PushSubscription, Urgency};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// The push service no longer accepts this subscription.
    Expired,
    Failed(String),
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Expired => f.write_str("push subscription expired"),
            PushError::Failed(msg) => write!(f, "push delivery failed: {}", msg),
        }
    }
}

impl std::error::Error for PushError {}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &str,
        ttl_secs: u64,
        urgency: Urgency,
    ) -> std::result::Result<(), PushError>;
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushRelayRequest<'a> {
    subscription: &'a PushSubscription,
    payload: &'a str,
    ttl: u64,
    urgency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    vapid_subject: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SmsRelayRequest<'a> {
    phone: &'a str,
    message: &'a str,
    sms_type: &'a str,
}

fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_default()
}

/// Posts push messages to a Web Push relay. The relay holds the VAPID
/// private key and performs payload encryption.
pub struct HttpPushGateway {
    client: Client,
    url: String,
    api_key: Option<String>,
    vapid_subject: Option<String>,
}

impl HttpPushGateway {
    pub fn new(url: String, api_key: Option<String>, vapid_subject: Option<String>) -> Self {
        Self { client: http_client(), url, api_key, vapid_subject }
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &str,
        ttl_secs: u64,
        urgency: Urgency,
    ) -> std::result::Result<(), PushError> {
        let body = PushRelayRequest {
            subscription,
            payload,
            ttl: ttl_secs,
            urgency: urgency.as_str(),
            vapid_subject: self.vapid_subject.as_deref(),
        };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let res = req.send().await.map_err(|e| PushError::Failed(e.to_string()))?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::GONE || status == StatusCode::NOT_FOUND {
            return Err(PushError::Expired);
        }
        let text = res.text().await.unwrap_or_default();
        Err(PushError::Failed(format!("relay returned {}: {}", status, text)))
    }
}

pub struct HttpSmsGateway {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpSmsGateway {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        Self { client: http_client(), url, api_key }
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send(&self, phone: &str, message: &str) -> Result<()> {
        let body = SmsRelayRequest { phone, message, sms_type: "Transactional" };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("SMS gateway error ({}): {}", status, text));
        }
        Ok(())
    }
}
