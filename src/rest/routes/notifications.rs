// rest/routes/notifications.rs — Notification store routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::AppContext;

pub async fn list_notifications(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({ "notifications": ctx.notifications.list_all() }))
}

pub async fn list_unread(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({ "notifications": ctx.notifications.list_unread() }))
}

pub async fn unread_count(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({ "count": ctx.notifications.unread_count() }))
}

pub async fn mark_read(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if ctx.notifications.mark_read(&id) {
        Ok(Json(json!({ "read": id })))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Notification not found" })),
        ))
    }
}

pub async fn mark_all_read(State(ctx): State<AppContext>) -> Json<Value> {
    ctx.notifications.mark_all_read();
    Json(json!({ "count": 0 }))
}

pub async fn delete_notification(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if ctx.notifications.delete(&id) {
        Ok(Json(json!({ "deleted": id })))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Notification not found" })),
        ))
    }
}

pub async fn delete_all(State(ctx): State<AppContext>) -> Json<Value> {
    ctx.notifications.delete_all();
    Json(json!({ "deleted": "all" }))
}
