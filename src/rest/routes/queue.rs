// rest/routes/queue.rs — Direct publish onto the broker, outside any task.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::queue_gateway::Headers;
use crate::rest::error_response;
use crate::AppContext;

#[derive(Deserialize)]
pub struct PublishRequest {
    pub queue: String,
    pub message: String,
    #[serde(default)]
    pub headers: Option<Headers>,
}

pub async fn publish(
    State(ctx): State<AppContext>,
    Json(body): Json<PublishRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match ctx
        .queue
        .publish(&body.queue, &body.message, body.headers)
        .await
    {
        Ok(accepted) => Ok(Json(json!({ "published": accepted }))),
        Err(e) => Err(error_response(e)),
    }
}
