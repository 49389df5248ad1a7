use async_trait::async_trait;
use anyhow::{anyhow, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use uuid::Uuid;
use wellness_common::PhotoType;

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores raw bytes under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// URL granting read access to `key` until `ttl` elapses.
    async fn get_access_url(&self, key: &str, ttl: Duration) -> Result<String>;
}

/// Storage key for a new photo: `{user}/{type}/{uuid}.{ext}`.
pub fn photo_key(user_id: &str, photo_type: PhotoType, mime_type: &str) -> String {
    let ext = mime_type
        .split('/')
        .nth(1)
        .map(|s| s.split(';').next().unwrap_or(s).trim())
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("jpg");
    format!("{}/{}/{}.{}", user_id, photo_type.as_str(), Uuid::new_v4(), ext)
}

pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

/// HMAC-SHA256 signatures over `key` and an expiry timestamp.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    fn mac(&self, key: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow!("Invalid signing secret: {}", e))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, key: &str, expires: i64) -> Result<String> {
        Ok(hex::encode(self.mac(key, expires)?.finalize().into_bytes()))
    }

    /// Constant-time check of the signature, then the expiry.
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> bool {
        let Ok(sig) = hex::decode(signature) else {
            return false;
        };
        let Ok(mac) = self.mac(key, expires) else {
            return false;
        };
        mac.verify_slice(&sig).is_ok() && expires > Utc::now().timestamp()
    }
}

pub struct LocalFileSystemStore {
    base_path: PathBuf,
    base_url: String,
    signer: UrlSigner,
}

impl LocalFileSystemStore {
    pub fn new(base_path: PathBuf, base_url: String, signer: UrlSigner) -> Self {
        Self {
            base_path,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
        }
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Maps a storage key to a path under the base directory, rejecting
    /// anything that could escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(anyhow!("Invalid storage key: {}", key));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalFileSystemStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let file_path = self.resolve(key)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&file_path, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let file_path = self.resolve(key)?;
        match fs::read(&file_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_access_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.resolve(key)?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.signer.sign(key, expires)?;
        Ok(format!("{}/{}?expires={}&signature={}", self.base_url, key, expires, signature))
    }
}
