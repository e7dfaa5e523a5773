//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use pwchat_shared::dto::{McpCommandReply, McpErrorBody, McpStatusDto};

use crate::{domain::McpError, ui::state::AppState};

type CommandResult = Result<Json<McpCommandReply>, (StatusCode, Json<McpErrorBody>)>;

fn command_reply(result: Result<(), McpError>, done: &str) -> CommandResult {
    match result {
        Ok(()) => Ok(Json(McpCommandReply {
            status: done.to_string(),
        })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(McpErrorBody {
                message: None,
                error: Some(e.to_string()),
            }),
        )),
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// `GET /mcp/status`
pub async fn mcp_status(State(state): State<Arc<AppState>>) -> Json<McpStatusDto> {
    Json(state.mcp_control_usecase.status().await)
}

/// `POST /mcp/connect`
pub async fn mcp_connect(State(state): State<Arc<AppState>>) -> CommandResult {
    command_reply(state.mcp_control_usecase.connect().await, "connected")
}

/// `POST /mcp/disconnect`
pub async fn mcp_disconnect(State(state): State<Arc<AppState>>) -> CommandResult {
    command_reply(state.mcp_control_usecase.disconnect().await, "disconnected")
}

/// `POST /mcp/reconnect`
pub async fn mcp_reconnect(State(state): State<Arc<AppState>>) -> CommandResult {
    command_reply(state.mcp_control_usecase.reconnect().await, "reconnected")
}
