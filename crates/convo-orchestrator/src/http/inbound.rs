//! `POST /v1/messages/inbound` — the canonical entry point the Channel
//! Gateway forwards every normalized inbound message to.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use convo_channels::InboundMessage;
use convo_core::types::CorrelationId;
use serde_json::json;
use tracing::warn;

use crate::app::AppState;
use crate::pipeline;

pub async fn inbound_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(msg): Json<InboundMessage>,
) -> impl IntoResponse {
    let correlation_id =
        CorrelationId::from_header_or_new(headers.get("x-request-id").and_then(|v| v.to_str().ok()));

    match pipeline::process_inbound(&state, &msg, &correlation_id).await {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "conversation_id": result.conversation_id.as_str(),
                "delivery_id": result.delivery_id.as_str(),
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(event_id = %msg.event_id, error = %e, "inbound pipeline failed");
            e.into_response()
        }
    }
}
