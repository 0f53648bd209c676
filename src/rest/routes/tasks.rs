// rest/routes/tasks.rs — Task lifecycle routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::model::CreateTaskRequest;
use crate::rest::error_response;
use crate::AppContext;

pub async fn list_tasks(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({ "tasks": ctx.registry.list() }))
}

pub async fn get_task(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match ctx.registry.get(&id) {
        Some(task) => Ok(Json(json!(task))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Task not found" })),
        )),
    }
}

pub async fn create_task(
    State(ctx): State<AppContext>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if body.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Task name is required" })),
        ));
    }
    match ctx
        .executor
        .create(&body.name, &body.task_type, &body.parameters)
    {
        Ok(task) => Ok((StatusCode::CREATED, Json(json!(task)))),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn stop_task(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if ctx.registry.stop(&id) {
        Ok(Json(json!(ctx.registry.get(&id))))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Task not found or cannot be stopped" })),
        ))
    }
}

pub async fn pause_task(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if ctx.registry.pause(&id) {
        Ok(Json(json!(ctx.registry.get(&id))))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Task not found or cannot be paused" })),
        ))
    }
}

pub async fn resume_task(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if ctx.registry.resume(&id) {
        Ok(Json(json!(ctx.registry.get(&id))))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Task not found or cannot be resumed" })),
        ))
    }
}

pub async fn delete_task(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if ctx.registry.delete(&id) {
        Ok(Json(json!({ "deleted": id })))
    } else {
        // Either unknown, or still running — stop it first.
        Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "Task not found or still active" })),
        ))
    }
}
