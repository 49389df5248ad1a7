use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use config::{Config, ConfigError, File, Environment};

// --- Constants for Default Configuration ---
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 3000;

pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 168;
pub const DEFAULT_BCRYPT_COST: u32 = 10;
pub const DEFAULT_LOGIN_ATTEMPT_LIMIT: u32 = 5;
pub const DEFAULT_LOGIN_LOCKOUT_SECS: u64 = 900;

pub const DEFAULT_JOURNAL_RETENTION_DAYS: i64 = 30;
pub const DEFAULT_JOURNAL_PAGE_SIZE: usize = 20;
pub const DEFAULT_JOURNAL_MAX_PAGE_SIZE: usize = 100;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.7;
pub const DEFAULT_SEARCH_SCAN_LIMIT: usize = 100;

pub const DEFAULT_CONTEXT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_CONTEXT_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_CONTEXT_RECENT_ENTRY_LIMIT: usize = 50;
pub const DEFAULT_EMOTION_RETENTION_DAYS: i64 = 30;
pub const DEFAULT_MAX_EMOTIONS: usize = 100;
pub const DEFAULT_PENDING_TASK_LIMIT: usize = 20;

pub const DEFAULT_PHOTO_URL_TTL_SECS: u64 = 3600;

pub const DEFAULT_PUSH_TTL_SECS: u64 = 86400;
pub const DEFAULT_NOTIFICATION_LOG_RETENTION_DAYS: i64 = 30;
pub const DEFAULT_TASK_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_TASK_RETRY_BACKOFF_SECS: u64 = 900;

pub const DEFAULT_WORKER_TICK_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LLMProvider {
    OpenAI,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub login_attempt_limit: u32,
    pub login_lockout_secs: u64,
    /// Shared key for operator-only endpoints. Those endpoints refuse every
    /// request while this is unset.
    #[serde(default)]
    pub operator_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    /// Overrides the provider's default endpoint (self-hosted gateways, tests).
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    pub retention_days: i64,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub default_threshold: f32,
    pub scan_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    pub cache_ttl_secs: u64,
    pub window_days: i64,
    pub recent_entry_limit: usize,
    pub emotion_retention_days: i64,
    pub max_emotions: usize,
    pub pending_task_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    pub dir: String,
    pub url_ttl_secs: u64,
    /// Falls back to the JWT secret when unset.
    #[serde(default)]
    pub signing_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub vapid_public_key: Option<String>,
    #[serde(default)]
    pub vapid_subject: Option<String>,
    #[serde(default)]
    pub push_gateway_url: Option<String>,
    #[serde(default)]
    pub push_gateway_key: Option<String>,
    #[serde(default)]
    pub sms_gateway_url: Option<String>,
    #[serde(default)]
    pub sms_gateway_key: Option<String>,
    pub push_ttl_secs: u64,
    pub log_retention_days: i64,
    /// A task reminder is dismissed after this many failed deliveries.
    pub task_max_attempts: u32,
    /// Delay before the first retry; doubles on each further failure.
    pub task_retry_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub tick_interval_secs: u64,
    /// Reminder kind (`morning`, `lunch`, `supplement`, `evening`) to `HH:MM` UTC.
    #[serde(default = "default_schedules")]
    pub schedules: BTreeMap<String, String>,
}

fn default_schedules() -> BTreeMap<String, String> {
    [
        ("morning", "07:00"),
        ("lunch", "12:00"),
        ("supplement", "20:00"),
        ("evening", "21:00"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub llm: LLMConfig,
    pub journal: JournalConfig,
    pub search: SearchConfig,
    pub context: ContextConfig,
    pub photos: PhotoConfig,
    pub notifications: NotificationConfig,
    pub worker: WorkerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.into(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            login_attempt_limit: DEFAULT_LOGIN_ATTEMPT_LIMIT,
            login_lockout_secs: DEFAULT_LOGIN_LOCKOUT_SECS,
            operator_key: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root_dir: "./data/db".into() }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            openai_api_key: None,
            google_api_key: None,
            model: String::new(),
            embedding_model: String::new(),
            base_url: None,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_JOURNAL_RETENTION_DAYS,
            default_page_size: DEFAULT_JOURNAL_PAGE_SIZE,
            max_page_size: DEFAULT_JOURNAL_MAX_PAGE_SIZE,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SEARCH_LIMIT,
            default_threshold: DEFAULT_SEARCH_THRESHOLD,
            scan_limit: DEFAULT_SEARCH_SCAN_LIMIT,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CONTEXT_CACHE_TTL_SECS,
            window_days: DEFAULT_CONTEXT_WINDOW_DAYS,
            recent_entry_limit: DEFAULT_CONTEXT_RECENT_ENTRY_LIMIT,
            emotion_retention_days: DEFAULT_EMOTION_RETENTION_DAYS,
            max_emotions: DEFAULT_MAX_EMOTIONS,
            pending_task_limit: DEFAULT_PENDING_TASK_LIMIT,
        }
    }
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            dir: "./data/photos".into(),
            url_ttl_secs: DEFAULT_PHOTO_URL_TTL_SECS,
            signing_secret: None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: DEFAULT_WORKER_TICK_INTERVAL_SECS,
            schedules: default_schedules(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            llm: LLMConfig::default(),
            journal: JournalConfig::default(),
            search: SearchConfig::default(),
            context: ContextConfig::default(),
            photos: PhotoConfig::default(),
            notifications: NotificationConfig {
                push_ttl_secs: DEFAULT_PUSH_TTL_SECS,
                log_retention_days: DEFAULT_NOTIFICATION_LOG_RETENTION_DAYS,
                task_max_attempts: DEFAULT_TASK_MAX_ATTEMPTS,
                task_retry_backoff_secs: DEFAULT_TASK_RETRY_BACKOFF_SECS,
                ..NotificationConfig::default()
            },
            worker: WorkerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            // Default settings
            .set_default("server.host", DEFAULT_SERVER_HOST)?
            .set_default("server.port", DEFAULT_SERVER_PORT as i64)?
            .set_default("auth.jwt_secret", "")?
            .set_default("auth.token_ttl_hours", DEFAULT_TOKEN_TTL_HOURS)?
            .set_default("auth.bcrypt_cost", DEFAULT_BCRYPT_COST as i64)?
            .set_default("auth.login_attempt_limit", DEFAULT_LOGIN_ATTEMPT_LIMIT as i64)?
            .set_default("auth.login_lockout_secs", DEFAULT_LOGIN_LOCKOUT_SECS)?
            .set_default("storage.root_dir", "./data/db")?
            .set_default("llm.provider", "Gemini")?
            .set_default("llm.model", "")?
            .set_default("llm.embedding_model", "")?
            .set_default("journal.retention_days", DEFAULT_JOURNAL_RETENTION_DAYS)?
            .set_default("journal.default_page_size", DEFAULT_JOURNAL_PAGE_SIZE as i64)?
            .set_default("journal.max_page_size", DEFAULT_JOURNAL_MAX_PAGE_SIZE as i64)?
            .set_default("search.default_limit", DEFAULT_SEARCH_LIMIT as i64)?
            .set_default("search.default_threshold", DEFAULT_SEARCH_THRESHOLD as f64)?
            .set_default("search.scan_limit", DEFAULT_SEARCH_SCAN_LIMIT as i64)?
            .set_default("context.cache_ttl_secs", DEFAULT_CONTEXT_CACHE_TTL_SECS)?
            .set_default("context.window_days", DEFAULT_CONTEXT_WINDOW_DAYS)?
            .set_default("context.recent_entry_limit", DEFAULT_CONTEXT_RECENT_ENTRY_LIMIT as i64)?
            .set_default("context.emotion_retention_days", DEFAULT_EMOTION_RETENTION_DAYS)?
            .set_default("context.max_emotions", DEFAULT_MAX_EMOTIONS as i64)?
            .set_default("context.pending_task_limit", DEFAULT_PENDING_TASK_LIMIT as i64)?
            .set_default("photos.dir", "./data/photos")?
            .set_default("photos.url_ttl_secs", DEFAULT_PHOTO_URL_TTL_SECS)?
            .set_default("notifications.push_ttl_secs", DEFAULT_PUSH_TTL_SECS)?
            .set_default("notifications.log_retention_days", DEFAULT_NOTIFICATION_LOG_RETENTION_DAYS)?
            .set_default("notifications.task_max_attempts", DEFAULT_TASK_MAX_ATTEMPTS as i64)?
            .set_default("notifications.task_retry_backoff_secs", DEFAULT_TASK_RETRY_BACKOFF_SECS)?
            .set_default("worker.enabled", true)?
            .set_default("worker.tick_interval_secs", DEFAULT_WORKER_TICK_INTERVAL_SECS)?

            // File: config.toml
            .add_source(File::with_name("config").required(false))

            // Environment: WELLNESS_LLM__PROVIDER=OpenAI -> llm.provider=OpenAI
            .add_source(Environment::with_prefix("WELLNESS").separator("__"))

            // Legacy flat ENV overrides
            .set_override_option("auth.jwt_secret", env::var("JWT_SECRET").ok())?
            .set_override_option("auth.operator_key", env::var("OPERATOR_KEY").ok())?
            .set_override_option("llm.openai_api_key", env::var("OPENAI_API_KEY").ok())?
            .set_override_option("llm.google_api_key", env::var("GOOGLE_API_KEY").ok())?
            .set_override_option("llm.model", env::var("LLM_MODEL").ok())?
            .set_override_option("llm.embedding_model", env::var("EMBEDDING_MODEL").ok())?
            .set_override_option("notifications.vapid_public_key", env::var("VAPID_PUBLIC_KEY").ok())?
            .set_override_option("notifications.vapid_subject", env::var("VAPID_SUBJECT").ok())?
            .set_override_option("notifications.push_gateway_url", env::var("PUSH_GATEWAY_URL").ok())?
            .set_override_option("notifications.sms_gateway_url", env::var("SMS_GATEWAY_URL").ok())?
            .set_override_option("server.port", env::var("PORT").ok().and_then(|v| v.parse::<i64>().ok()))?

            .build()?;

        s.try_deserialize()
    }

    pub fn get_active_key(&self) -> Option<String> {
        match self.llm.provider {
            LLMProvider::OpenAI => self.llm.openai_api_key.clone(),
            LLMProvider::Gemini => self.llm.google_api_key.clone(),
        }
    }

    pub fn get_model_name(&self) -> String {
        self.llm.model.clone()
    }

    pub fn get_embedding_model_name(&self) -> String {
        self.llm.embedding_model.clone()
    }

    pub fn get_base_url(&self) -> Option<String> {
        if let Some(url) = &self.llm.base_url {
            return Some(url.clone());
        }
        match self.llm.provider {
            LLMProvider::OpenAI => None,
            LLMProvider::Gemini => Some("https://generativelanguage.googleapis.com/v1beta/openai/".to_string()),
        }
    }

    /// Secret used to sign photo URLs.
    pub fn photo_signing_secret(&self) -> String {
        self.photos
            .signing_secret
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("photos:{}", self.auth.jwt_secret))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
