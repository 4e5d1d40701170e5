use axum::{Json, extract::State};
use kiosk_engine::render;
use kiosk_types::api::{InboundEvent, RenderInstruction};
use serde_json::{Value, json};
use tracing::debug;

use crate::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// One decoded chat event in, one render instruction out.
pub async fn handle_event(
    State(state): State<AppState>,
    Json(req): Json<InboundEvent>,
) -> Json<RenderInstruction> {
    debug!("Event from user {}: {:?}", req.user_id, req.event);
    let reply = state.engine.handle(req.user_id, req.event).await;
    Json(render(&reply))
}
