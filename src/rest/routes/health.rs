use crate::AppContext;
use axum::{extract::State, Json};
use serde_json::{json, Value};

pub async fn health(State(ctx): State<AppContext>) -> Json<Value> {
    let uptime = (chrono::Utc::now() - ctx.started_at).num_seconds();
    Json(json!({
        "status": "ok",
        "uptime_secs": uptime,
        "tasks": ctx.registry.list().len(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
