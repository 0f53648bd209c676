// rest/sse.rs — SSE push event bridge.
//
// GET /api/v1/events
//
// Streams every daemon event (TaskUpdated, AlarmTriggered, the notification
// family) as Server-Sent Events. A subscriber that falls behind the
// broadcast buffer is disconnected and expected to re-fetch state on
// reconnect.

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures_util::stream;
use std::time::Duration;

use crate::AppContext;

pub async fn events_sse(State(ctx): State<AppContext>) -> impl IntoResponse {
    let rx = ctx.events.subscribe();

    let s = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    // Envelope shape: {"event": name, "payload": ...}
                    let parsed: serde_json::Value = match serde_json::from_str(&envelope) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    let name = parsed
                        .get("event")
                        .and_then(|v| v.as_str())
                        .unwrap_or("event")
                        .to_string();
                    let payload = parsed
                        .get("payload")
                        .cloned()
                        .unwrap_or(serde_json::Value::Null);
                    let sse_event = Event::default().event(name).data(payload.to_string());
                    return Some((Ok::<Event, std::convert::Infallible>(sse_event), rx));
                }
                // Lagged: skip ahead rather than dropping the stream.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(s).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
