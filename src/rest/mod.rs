// rest/mod.rs — Public REST API server.
//
// Axum HTTP server in front of the task registry, notification store, and
// queue gateway. All state-changing responses carry the task snapshot so
// pollers and SSE subscribers see the same data.
//
// Endpoints:
//   GET    /api/v1/health
//   GET    /api/v1/tasks
//   POST   /api/v1/tasks
//   GET    /api/v1/tasks/{id}
//   DELETE /api/v1/tasks/{id}
//   POST   /api/v1/tasks/{id}/stop
//   POST   /api/v1/tasks/{id}/pause
//   POST   /api/v1/tasks/{id}/resume
//   GET    /api/v1/notifications
//   DELETE /api/v1/notifications
//   GET    /api/v1/notifications/unread
//   GET    /api/v1/notifications/unread/count
//   POST   /api/v1/notifications/{id}/read
//   POST   /api/v1/notifications/read-all
//   DELETE /api/v1/notifications/{id}
//   POST   /api/v1/queue/publish
//   GET    /api/v1/events   (SSE)

pub mod routes;
pub mod sse;

use anyhow::Result;
use axum::{
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::TaskError;
use crate::AppContext;

pub async fn start_rest_server(ctx: AppContext) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.server.bind_address, ctx.config.server.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::health))
        // Tasks
        .route(
            "/api/v1/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/api/v1/tasks/{id}",
            get(routes::tasks::get_task).delete(routes::tasks::delete_task),
        )
        .route("/api/v1/tasks/{id}/stop", post(routes::tasks::stop_task))
        .route("/api/v1/tasks/{id}/pause", post(routes::tasks::pause_task))
        .route("/api/v1/tasks/{id}/resume", post(routes::tasks::resume_task))
        // Notifications
        .route(
            "/api/v1/notifications",
            get(routes::notifications::list_notifications)
                .delete(routes::notifications::delete_all),
        )
        .route(
            "/api/v1/notifications/unread",
            get(routes::notifications::list_unread),
        )
        .route(
            "/api/v1/notifications/unread/count",
            get(routes::notifications::unread_count),
        )
        .route(
            "/api/v1/notifications/{id}/read",
            post(routes::notifications::mark_read),
        )
        .route(
            "/api/v1/notifications/read-all",
            post(routes::notifications::mark_all_read),
        )
        .route(
            "/api/v1/notifications/{id}",
            delete(routes::notifications::delete_notification),
        )
        // Queue
        .route("/api/v1/queue/publish", post(routes::queue::publish))
        // Events
        .route("/api/v1/events", get(sse::events_sse))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Map a domain error onto an HTTP response body.
pub(crate) fn error_response(err: TaskError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        TaskError::Validation(_) => StatusCode::BAD_REQUEST,
        TaskError::NotFound(_) => StatusCode::NOT_FOUND,
        TaskError::Permission(_) => StatusCode::FORBIDDEN,
        TaskError::Cancelled => StatusCode::CONFLICT,
        TaskError::Transport(_) => StatusCode::BAD_GATEWAY,
        TaskError::Launch(_) | TaskError::Process(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}
