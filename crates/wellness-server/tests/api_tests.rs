//! End-to-end tests for the HTTP API, driven through the router with
//! `oneshot`. AI and push providers are served by a local mock server.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wellness_common::config::AppConfig;
use wellness_common::crypto;
use wellness_core::llm::OpenAIClient;
use wellness_core::notify::{HttpPushGateway, PushGateway};
use wellness_core::LLMClient;
use wellness_server::{build_router, AppState, Providers};

const PASSWORD: &str = "correct horse 1";
const OPERATOR_KEY: &str = "ops-key";

struct Harness {
    state: Arc<AppState>,
    _dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_providers(Providers::default())
    }

    fn with_mock(server: &MockServer) -> Self {
        let llm: Arc<dyn LLMClient> = Arc::new(OpenAIClient::new(
            "test-key".into(),
            "chat-test".into(),
            "embed-test".into(),
            Some(server.uri()),
        ));
        let push: Arc<dyn PushGateway> =
            Arc::new(HttpPushGateway::new(format!("{}/push", server.uri()), None, None));
        Self::with_providers(Providers { llm: Some(llm), push: Some(push), sms: None })
    }

    fn with_providers(providers: Providers) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let mut config = AppConfig::default();
        config.storage.root_dir = dir.path().join("db").to_string_lossy().into_owned();
        config.photos.dir = dir.path().join("photos").to_string_lossy().into_owned();
        config.auth.jwt_secret = "api-test-secret".into();
        config.auth.bcrypt_cost = 4;
        config.auth.operator_key = Some(OPERATOR_KEY.into());
        config.notifications.vapid_public_key = Some("BPublicKeyForTests".into());
        let state = AppState::new(config, providers).expect("create app state");
        Self { state: Arc::new(state), _dir: dir }
    }

    fn app(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, body)
    }

    async fn register_and_login(&self, email: &str) -> (String, Value) {
        let (status, _) = self
            .send(request(Method::POST, "/auth/register", None, Some(json!({ "email": email, "password": PASSWORD }))))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = self
            .send(request(Method::POST, "/auth/login", None, Some(json!({ "email": email, "password": PASSWORD }))))
            .await;
        assert_eq!(status, StatusCode::OK);
        (body["token"].as_str().unwrap().to_string(), body["user"].clone())
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn operator_request(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::POST).uri(uri);
    if let Some(key) = key {
        builder = builder.header("x-operator-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

fn envelope(value: Value) -> String {
    let key = crypto::derive_key("journal passphrase", &crypto::generate_salt()).unwrap();
    key.encrypt_json(&value).unwrap().encode()
}

// ── auth ──

#[tokio::test]
async fn register_validates_and_rejects_duplicates() {
    let h = Harness::new();

    let (status, body) = h
        .send(request(Method::POST, "/auth/register", None, Some(json!({ "email": "Someone@Example.com", "password": PASSWORD }))))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "someone@example.com");
    assert!(body["user"].get("passwordHash").is_none());
    assert_eq!(body["user"]["encryptionSalt"].as_str().unwrap().len(), 32);

    let (status, body) = h
        .send(request(Method::POST, "/auth/register", None, Some(json!({ "email": "someone@example.com", "password": PASSWORD }))))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User already exists");

    for (payload, message) in [
        (json!({ "email": "x@example.com" }), "Email and password are required"),
        (json!({ "email": "not-an-email", "password": PASSWORD }), "Invalid email format"),
        (json!({ "email": "y@example.com", "password": "short1" }), "Password must be at least 8 characters long"),
    ] {
        let (status, body) = h.send(request(Method::POST, "/auth/register", None, Some(payload))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], message);
    }
}

#[tokio::test]
async fn login_issues_token_and_locks_out_after_failures() {
    let h = Harness::new();
    let (token, user) = h.register_and_login("login@example.com").await;
    assert!(user["lastLogin"].is_string());

    let (status, body) = h.send(request(Method::GET, "/user/profile", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "login@example.com");

    let (status, body) = h
        .send(request(Method::POST, "/auth/login", None, Some(json!({ "email": "nobody@example.com", "password": PASSWORD }))))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    for _ in 0..5 {
        let (status, _) = h
            .send(request(Method::POST, "/auth/login", None, Some(json!({ "email": "login@example.com", "password": "wrong-pass-1" }))))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = h
        .send(request(Method::POST, "/auth/login", None, Some(json!({ "email": "login@example.com", "password": PASSWORD }))))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    for payload in [json!({ "email": "login@example.com" }), json!({ "password": PASSWORD }), json!({})] {
        let (status, body) = h.send(request(Method::POST, "/auth/login", None, Some(payload))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email and password are required");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failed_logins_all_count_towards_lockout() {
    let h = Harness::new();
    h.register_and_login("race@example.com").await;

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let app = h.app();
            tokio::spawn(async move {
                let req = request(
                    Method::POST,
                    "/auth/login",
                    None,
                    Some(json!({ "email": "race@example.com", "password": "wrong-pass-1" })),
                );
                app.oneshot(req).await.unwrap().status()
            })
        })
        .collect();
    for attempt in attempts {
        assert_eq!(attempt.await.unwrap(), StatusCode::UNAUTHORIZED);
    }

    assert_eq!(h.state.login_limiter.get("race@example.com").await, Some(8));
    let (status, _) = h
        .send(request(Method::POST, "/auth/login", None, Some(json!({ "email": "race@example.com", "password": PASSWORD }))))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let h = Harness::new();
    let (status, body) = h.send(request(Method::GET, "/journal/entries", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = h.send(request(Method::GET, "/user/profile", Some("not.a.jwt"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = h.send(request(Method::GET, "/", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "wellness-companion");
}

// ── tracking ──

#[tokio::test]
async fn tracking_records_appear_in_history() {
    let h = Harness::new();
    let (token, _) = h.register_and_login("track@example.com").await;
    let t = Some(token.as_str());

    let (status, body) = h
        .send(request(Method::POST, "/tracking/checkin", t, Some(json!({ "type": "morning", "mood": 7, "energy": 6 }))))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["checkin"]["type"], "checkin");
    assert_eq!(body["checkin"]["data"]["mood"], 7);

    let (status, body) = h
        .send(request(Method::POST, "/tracking/checkin", t, Some(json!({ "type": "evening", "mood": 11 }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Mood must be between 1 and 10");

    let sealed = envelope(json!({ "type": "evening", "mood": 4 }));
    let (status, body) = h
        .send(request(Method::POST, "/tracking/checkin", t, Some(json!({ "encryptedData": sealed, "timestamp": 1_767_225_600_000i64 }))))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["timestamp"], "2026-01-01T00:00:00Z");

    let (status, _) = h
        .send(request(Method::POST, "/tracking/checkin", t, Some(json!({ "encryptedData": "plaintext" }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for (payload, message) in [
        (json!({ "weight": 1200, "unit": "kg" }), "Weight must be between 0 and 1000"),
        (json!({ "weight": 0, "unit": "kg" }), "Weight must be between 0 and 1000"),
        (json!({ "weight": 70 }), "Weight and unit are required"),
        (json!({ "unit": "kg" }), "Weight and unit are required"),
    ] {
        let (status, body) = h.send(request(Method::POST, "/tracking/weight", t, Some(payload))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], message);
    }
    let (status, _) = h
        .send(request(Method::POST, "/tracking/weight", t, Some(json!({ "weight": 70.5, "unit": "kg" }))))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = h
        .send(request(Method::POST, "/tracking/supplement", t, Some(json!({ "taken": "yes" }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "taken field is required as boolean");
    let (status, _) = h
        .send(request(Method::POST, "/tracking/supplement", t, Some(json!({ "taken": true, "supplements": ["vitamin d"] }))))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = h.send(request(Method::GET, "/tracking/history", t, None)).await;
    assert_eq!(status, StatusCode::OK);
    let mut kinds: Vec<&str> = body.as_array().unwrap().iter().map(|r| r["type"].as_str().unwrap()).collect();
    kinds.sort_unstable();
    // The encrypted check-in is dated 2026-01-01, outside the default window.
    assert_eq!(kinds, vec!["checkin", "supplement", "weight"]);

    let (status, body) = h
        .send(request(Method::GET, "/tracking/history?startDate=2025-12-31T00:00:00Z&endDate=2026-01-02T00:00:00Z", t, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert!(body[0]["encryptedData"].is_string());

    let (status, body) = h
        .send(request(Method::GET, "/tracking/history?startDate=2026-01-01&endDate=2026-01-02", t, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = h.send(request(Method::GET, "/tracking/history?startDate=last-week", t, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Dates must be RFC 3339 timestamps or YYYY-MM-DD");
}

#[tokio::test]
async fn photos_are_served_only_through_signed_links() {
    let h = Harness::new();
    let (token, _) = h.register_and_login("photo@example.com").await;
    let t = Some(token.as_str());

    let (status, body) = h
        .send(request(Method::POST, "/tracking/photo", t, Some(json!({ "photoType": "food", "mimeType": "image/png" }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "base64Image, mimeType, and photoType are required");

    let (status, body) = h
        .send(request(
            Method::POST,
            "/tracking/photo",
            t,
            Some(json!({ "photoType": "food", "mimeType": "image/png", "base64Image": "not base64!!" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "base64Image is not valid base64");

    let (status, body) = h
        .send(request(
            Method::POST,
            "/tracking/photo",
            t,
            Some(json!({ "photoType": "food", "mimeType": "image/png", "base64Image": "aGVsbG8gcGhvdG8=", "note": "lunch" })),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let url = body["photo"]["data"]["photoUrl"].as_str().unwrap().to_string();
    assert!(url.starts_with("/photos/"));
    assert!(body["photo"]["data"]["photoKey"].as_str().unwrap().ends_with(".png"));

    let resp = h.app().oneshot(request(Method::GET, &url, None, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/png");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"hello photo");

    let tampered = format!("{}00", url);
    let (status, _) = h.send(request(Method::GET, &tampered, None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ── journal ──

#[tokio::test]
async fn journal_crud_and_pagination() {
    let h = Harness::new();
    let (token, _) = h.register_and_login("journal@example.com").await;
    let t = Some(token.as_str());

    let (status, body) = h
        .send(request(Method::POST, "/journal/entry", t, Some(json!({ "metadata": {} }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Encrypted content is required");

    let mut ids = Vec::new();
    for i in 0..3 {
        let (status, body) = h
            .send(request(
                Method::POST,
                "/journal/entry",
                t,
                Some(json!({ "encryptedContent": envelope(json!({ "text": i })), "metadata": { "wordCount": i } })),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["entryId"].as_str().unwrap().to_string());
    }
    assert!(ids.windows(2).all(|w| w[0] != w[1]));

    let (status, page) = h.send(request(Method::GET, "/journal/entries?limit=2", t, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["entries"].as_array().unwrap().len(), 2);
    assert_eq!(page["entries"][0]["entryId"], ids[2].as_str());
    let last_key = page["lastKey"].as_str().unwrap().to_string();

    let (status, page) = h
        .send(request(Method::GET, &format!("/journal/entries?limit=2&lastKey={}", last_key), t, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["entries"].as_array().unwrap().len(), 1);
    assert_eq!(page["entries"][0]["entryId"], ids[0].as_str());
    assert!(page.get("lastKey").is_none());

    let (status, body) = h.send(request(Method::GET, "/journal/entries?lastKey=garbage", t, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid lastKey");

    let (status, body) = h.send(request(Method::GET, "/journal/entries?limit=abc", t, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to deserialize query string"));

    let uri = format!("/journal/entry/{}", ids[1]);
    let replacement = envelope(json!({ "text": "edited" }));
    let (status, _) = h
        .send(request(Method::PUT, &uri, t, Some(json!({ "encryptedContent": replacement }))))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, entry) = h.send(request(Method::GET, &uri, t, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["encryptedContent"], replacement.as_str());
    assert_eq!(entry["metadata"]["wordCount"], 1);

    let (status, _) = h.send(request(Method::DELETE, &uri, t, None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.send(request(Method::DELETE, &uri, t, None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = h.send(request(Method::GET, &uri, t, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Journal entry not found");
    let (status, _) = h
        .send(request(Method::PUT, &uri, t, Some(json!({ "encryptedContent": replacement }))))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn entries_are_private_to_their_owner() {
    let h = Harness::new();
    let (alice, _) = h.register_and_login("alice@example.com").await;
    let (bob, _) = h.register_and_login("bob@example.com").await;

    let (_, body) = h
        .send(request(Method::POST, "/journal/entry", Some(&alice), Some(json!({ "encryptedContent": envelope(json!("secret")) }))))
        .await;
    let uri = format!("/journal/entry/{}", body["entryId"].as_str().unwrap());

    let (status, _) = h.send(request(Method::GET, &uri, Some(&bob), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, page) = h.send(request(Method::GET, "/journal/entries", Some(&bob), None)).await;
    assert!(page["entries"].as_array().unwrap().is_empty());
}

async fn mount_ai(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("emotional insights"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "Sure! {\"primaryEmotion\": \"Anxious\", \"emotionIntensity\": 6, \"sentiment\": \"negative\", \"suggestedSupport\": \"Take a breath.\"}" } }]
        })))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "{\"tasks\": [{\"description\": \"Email the manager\", \"context\": \"deadline pressure\", \"priority\": \"high\"}]}" } }]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.6, 0.8] }]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn process_search_and_context() {
    let server = MockServer::start().await;
    mount_ai(&server).await;
    let h = Harness::with_mock(&server);
    let (token, _) = h.register_and_login("ai@example.com").await;
    let t = Some(token.as_str());

    let (_, body) = h
        .send(request(Method::POST, "/journal/entry", t, Some(json!({ "encryptedContent": envelope(json!("work")) }))))
        .await;
    let entry_id = body["entryId"].as_str().unwrap().to_string();

    let (status, body) = h
        .send(request(Method::POST, "/journal/process", t, Some(json!({ "entryId": entry_id }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Entry ID and content are required");

    let (status, _) = h
        .send(request(Method::POST, "/journal/process", t, Some(json!({ "entryId": "1", "content": "x" }))))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h
        .send(request(
            Method::POST,
            "/journal/process",
            t,
            Some(json!({ "entryId": entry_id, "content": "Stressful day at work. I need to email my manager." })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["insights"]["taskCount"], 1);
    assert_eq!(body["insights"]["emotion"]["primaryEmotion"], "anxious");
    assert_eq!(body["insights"]["suggestedSupport"], "Take a breath.");

    let (_, entry) = h.send(request(Method::GET, &format!("/journal/entry/{}", entry_id), t, None)).await;
    assert_eq!(entry["metadata"]["hasInsights"], true);
    assert_eq!(entry["metadata"]["sentiment"], "negative");

    let (status, body) = h
        .send(request(Method::POST, "/journal/search", t, Some(json!({ "query": "work stress" }))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "work stress");
    assert_eq!(body["count"], 1);
    assert_eq!(body["entries"][0]["entryId"], entry_id.as_str());

    let (status, body) = h.send(request(Method::POST, "/journal/search", t, Some(json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Search query is required");

    let (status, ctx) = h.send(request(Method::GET, "/journal/context", t, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx["recentMood"]["dominant"], "anxious");
    assert_eq!(ctx["pendingTasks"][0]["description"], "Email the manager");
    assert!(ctx["activeTopics"].as_array().unwrap().iter().any(|t| t == "anxious"));
}

#[tokio::test]
async fn search_without_ai_provider_is_a_gateway_error() {
    let h = Harness::new();
    let (token, _) = h.register_and_login("noai@example.com").await;
    let (status, body) = h
        .send(request(Method::POST, "/journal/search", Some(&token), Some(json!({ "query": "anything" }))))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
}

// ── notifications ──

#[tokio::test]
async fn subscription_preferences_and_test_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/push"))
        .and(body_string_contains("https://push.example/endpoint"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;
    let h = Harness::with_mock(&server);
    let (token, _) = h.register_and_login("notify@example.com").await;
    let t = Some(token.as_str());

    let (status, body) = h.send(request(Method::GET, "/notifications/vapid-public-key", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["publicKey"], "BPublicKeyForTests");

    let (status, body) = h
        .send(request(Method::POST, "/notifications/subscribe", t, Some(json!({ "subscription": { "endpoint": "https://push.example/endpoint" } }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Valid push subscription required");

    let subscription = json!({
        "endpoint": "https://push.example/endpoint",
        "expirationTime": null,
        "keys": { "p256dh": "BKey", "auth": "secret" }
    });
    let (status, _) = h
        .send(request(Method::POST, "/notifications/subscribe", t, Some(json!({ "subscription": subscription, "phone": "+15550100" }))))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, profile) = h.send(request(Method::GET, "/user/profile", t, None)).await;
    assert_eq!(profile["user"]["phone"], "+15550100");

    let (status, body) = h
        .send(request(Method::POST, "/notifications/test", t, Some(json!({ "title": "Hi", "urgency": "high" }))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sent"], true);
    assert_eq!(body["channel"], "push");

    let (status, body) = h.send(operator_request("/notifications/trigger/lunch", Some(OPERATOR_KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["sent"], 1);

    let (status, _) = h.send(operator_request("/notifications/trigger/brunch", Some(OPERATOR_KEY))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .send(request(Method::PUT, "/notifications/preferences", t, Some(json!({ "quietHours": { "start": 25, "end": 7 } }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = h
        .send(request(Method::PUT, "/notifications/preferences", t, Some(json!({ "disabledTypes": ["lunch"] }))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["preferences"]["disabledTypes"][0], "lunch");

    let (_, body) = h.send(operator_request("/notifications/trigger/lunch", Some(OPERATOR_KEY))).await;
    assert_eq!(body["summary"]["skipped"], 1);

    let (status, _) = h.send(request(Method::DELETE, "/notifications/subscribe", t, None)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, profile) = h.send(request(Method::GET, "/user/profile", t, None)).await;
    assert!(profile["user"].get("pushSubscription").is_none());
}

#[tokio::test]
async fn scheduled_trigger_is_operator_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/push"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    let h = Harness::with_mock(&server);
    let (victim, _) = h.register_and_login("victim@example.com").await;
    let subscription = json!({
        "endpoint": "https://push.example/victim",
        "keys": { "p256dh": "BKey", "auth": "secret" }
    });
    let (status, _) = h
        .send(request(Method::POST, "/notifications/subscribe", Some(&victim), Some(json!({ "subscription": subscription }))))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (caller, _) = h.register_and_login("caller@example.com").await;
    let (status, body) = h.send(request(Method::POST, "/notifications/trigger/lunch", Some(&caller), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Operator key required");

    let (status, _) = h.send(operator_request("/notifications/trigger/lunch", Some("guess"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = h.send(operator_request("/notifications/trigger/lunch", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn scheduled_trigger_is_closed_without_an_operator_key() {
    let h = Harness::new();
    let mut config = h.state.config.clone();
    config.auth.operator_key = None;
    let dir = TempDir::new().unwrap();
    config.storage.root_dir = dir.path().join("db").to_string_lossy().into_owned();
    let app = build_router(Arc::new(AppState::new(config, Providers::default()).unwrap()));

    let resp = app.oneshot(operator_request("/notifications/trigger/lunch", Some(""))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
