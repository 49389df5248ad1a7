use anyhow::{Context, Result};
use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use moka::future::Cache;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wellness_common::config::AppConfig;
use wellness_core::llm::create_llm_client;
use wellness_core::notify::{HttpPushGateway, HttpSmsGateway, PushGateway, SmsGateway};
use wellness_core::storage::UrlSigner;
use wellness_core::{
    ContextAggregator, DocumentStore, EnrichmentPipeline, JournalSearch, LLMClient, LocalFileSystemStore,
    NotificationDispatcher,
};

pub mod auth;
pub mod error;
pub mod handlers;

use auth::JwtKeys;

pub struct AppState {
    pub config: AppConfig,
    pub store: DocumentStore,
    pub photos: Arc<LocalFileSystemStore>,
    pub context: ContextAggregator,
    pub search: JournalSearch,
    pub enrichment: EnrichmentPipeline,
    pub dispatcher: NotificationDispatcher,
    pub jwt: JwtKeys,
    /// Verified against when the email is unknown so both paths cost the same.
    pub dummy_hash: String,
    pub login_limiter: Cache<String, u32>,
}

/// External providers. `None` disables the corresponding feature.
#[derive(Default, Clone)]
pub struct Providers {
    pub llm: Option<Arc<dyn LLMClient>>,
    pub push: Option<Arc<dyn PushGateway>>,
    pub sms: Option<Arc<dyn SmsGateway>>,
}

impl Providers {
    pub fn from_config(config: &AppConfig) -> Self {
        let llm = create_llm_client(config);
        match &llm {
            Some(_) => tracing::info!(
                "Using LLM provider {:?} (model: {}, embedding: {})",
                config.llm.provider,
                config.get_model_name(),
                config.get_embedding_model_name()
            ),
            None => tracing::warn!("No AI API key configured. Journal enrichment and search are disabled."),
        }

        let n = &config.notifications;
        let push = n.push_gateway_url.clone().map(|url| {
            Arc::new(HttpPushGateway::new(url, n.push_gateway_key.clone(), n.vapid_subject.clone())) as Arc<dyn PushGateway>
        });
        let sms = n
            .sms_gateway_url
            .clone()
            .map(|url| Arc::new(HttpSmsGateway::new(url, n.sms_gateway_key.clone())) as Arc<dyn SmsGateway>);
        if push.is_none() {
            tracing::warn!("PUSH_GATEWAY_URL not set. Push notifications are disabled.");
        }

        Self { llm, push, sms }
    }
}

impl AppState {
    pub fn new(config: AppConfig, providers: Providers) -> Result<Self> {
        let db_path = PathBuf::from(&config.storage.root_dir);
        std::fs::create_dir_all(&db_path)
            .with_context(|| format!("Failed to create data directory {:?}", db_path))?;
        let store = DocumentStore::open(&db_path)?;

        let photos = Arc::new(LocalFileSystemStore::new(
            PathBuf::from(&config.photos.dir),
            "/photos".into(),
            UrlSigner::new(config.photo_signing_secret()),
        ));

        let context = ContextAggregator::new(store.clone(), config.context.clone());
        let search = JournalSearch::new(store.clone(), providers.llm.clone(), config.search.clone());
        let enrichment = EnrichmentPipeline::new(store.clone(), providers.llm, context.clone());
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            context.clone(),
            providers.push,
            providers.sms,
            config.notifications.clone(),
        );

        let jwt = JwtKeys::new(&config.auth.jwt_secret, config.auth.token_ttl_hours);
        let dummy_hash = bcrypt::hash("__dummy_timing_pad__", config.auth.bcrypt_cost)?;
        let login_limiter = Cache::builder()
            .time_to_live(Duration::from_secs(config.auth.login_lockout_secs))
            .max_capacity(10_000)
            .build();

        Ok(Self {
            config,
            store,
            photos,
            context,
            search,
            enrichment,
            dispatcher,
            jwt,
            dummy_hash,
            login_limiter,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    use handlers::{account, journal, notifications, tracking};

    let protected = Router::new()
        .route("/user/profile", get(account::profile))
        .route("/tracking/checkin", post(tracking::checkin))
        .route("/tracking/weight", post(tracking::weight))
        .route("/tracking/supplement", post(tracking::supplement))
        .route("/tracking/photo", post(tracking::photo))
        .route("/tracking/history", get(tracking::history))
        .route("/journal/entry", post(journal::create_entry))
        .route("/journal/entries", get(journal::list_entries))
        .route(
            "/journal/entry/:entry_id",
            get(journal::get_entry).put(journal::update_entry).delete(journal::delete_entry),
        )
        .route("/journal/process", post(journal::process_entry))
        .route("/journal/search", post(journal::search))
        .route("/journal/context", get(journal::context))
        .route(
            "/notifications/subscribe",
            post(notifications::subscribe).delete(notifications::unsubscribe),
        )
        .route("/notifications/preferences", put(notifications::update_preferences))
        .route("/notifications/test", post(notifications::send_test))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    let operator = Router::new()
        .route("/notifications/trigger/:kind", post(notifications::trigger))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth::operator_middleware));

    let public = Router::new()
        .route("/", get(handlers::root))
        .route("/auth/register", post(account::register))
        .route("/auth/login", post(account::login))
        .route("/notifications/vapid-public-key", get(notifications::vapid_public_key))
        .route("/photos/*key", get(tracking::serve_photo));

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(operator)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .into_inner(),
        )
        .with_state(state)
}
