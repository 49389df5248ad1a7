pub mod account;
pub mod journal;
pub mod notifications;
pub mod tracking;

use axum::Json;
use serde_json::{json, Value};

pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "wellness-companion",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
