//! Server execution logic.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::usecase::{McpControlUseCase, RoomChatUseCase};

use super::{
    handler::{
        health_check, mcp_connect, mcp_disconnect, mcp_reconnect, mcp_status, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// pwchat development server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(room_chat_usecase, mcp_control_usecase);
/// server.run("127.0.0.1".to_string(), 8000).await?;
/// ```
pub struct Server {
    /// RoomChatUseCase（ルームチャットのユースケース）
    room_chat_usecase: Arc<RoomChatUseCase>,
    /// McpControlUseCase（MCP 接続制御のユースケース）
    mcp_control_usecase: Arc<McpControlUseCase>,
}

impl Server {
    /// Create a new Server instance
    pub fn new(
        room_chat_usecase: Arc<RoomChatUseCase>,
        mcp_control_usecase: Arc<McpControlUseCase>,
    ) -> Self {
        Self {
            room_chat_usecase,
            mcp_control_usecase,
        }
    }

    /// Build the router with all routes and shared state
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            room_chat_usecase: self.room_chat_usecase.clone(),
            mcp_control_usecase: self.mcp_control_usecase.clone(),
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/ws/chat/{room_id}/{user_id}", get(websocket_handler))
            // HTTP エンドポイント
            .route("/mcp/status", get(mcp_status))
            .route("/mcp/connect", post(mcp_connect))
            .route("/mcp/disconnect", post(mcp_disconnect))
            .route("/mcp/reconnect", post(mcp_reconnect))
            .route("/api/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Run the server until Ctrl+C / SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();

        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!("pwchat server listening on {}", listener.local_addr()?);
        tracing::info!("Rooms: ws://{}/ws/chat/{{room_id}}/{{user_id}}", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
