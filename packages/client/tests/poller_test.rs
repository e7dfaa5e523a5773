//! Integration tests for the HTTP side of the Status Poller.

use std::sync::{Arc, Mutex};

use axum::{Json, Router, http::StatusCode, routing::post};
use pwchat_client::{
    ClientError, HttpMcpApi, McpApi, McpCommand, StatusPoller,
    domain::{McpStatus, StatusBadge},
    poller::{PollerConfig, RefreshOutcome},
    ui::{NotifyLevel, StatusSink},
};
use pwchat_server::{
    domain::{McpConnector, McpError},
    infrastructure::RoomHub,
    ui::Server,
    usecase::{McpControlUseCase, RoomChatUseCase},
};
use pwchat_shared::time::SystemClock;
use serde_json::json;

/// Connector that succeeds or fails depending on a switch
struct SwitchConnector {
    reachable: bool,
}

#[async_trait::async_trait]
impl McpConnector for SwitchConnector {
    async fn open(&self, _server_url: &str) -> Result<(), McpError> {
        if self.reachable {
            Ok(())
        } else {
            Err(McpError::Unreachable("connection refused".to_string()))
        }
    }

    async fn close(&self) -> Result<(), McpError> {
        Ok(())
    }
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{}", addr)
}

async fn start_server(reachable: bool) -> String {
    let room_chat = Arc::new(RoomChatUseCase::new(
        Arc::new(RoomHub::new(50)),
        Arc::new(SystemClock),
    ));
    let mcp = Arc::new(McpControlUseCase::new(
        Arc::new(SwitchConnector { reachable }),
        "http://localhost:5000/projectwise/mcp/".to_string(),
        "gpt-4o-mini".to_string(),
    ));
    serve(Server::new(room_chat, mcp).router()).await
}

#[derive(Default)]
struct RecordingSink {
    badges: Mutex<Vec<StatusBadge>>,
    notifications: Mutex<Vec<(NotifyLevel, String)>>,
}

impl StatusSink for RecordingSink {
    fn show_status(&self, badge: &StatusBadge) {
        self.badges.lock().unwrap().push(badge.clone());
    }

    fn notify(&self, level: NotifyLevel, message: &str) {
        self.notifications
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}

#[tokio::test]
async fn test_fetch_status_returns_raw_body() {
    // テスト項目: /mcp/status の JSON がそのまま取得できる
    // given (前提条件):
    let base_url = start_server(true).await;
    let api = HttpMcpApi::new(&base_url).unwrap();

    // when (操作):
    let raw = api.fetch_status().await.unwrap();

    // then (期待する結果):
    assert_eq!(raw["connected"], false);
    assert_eq!(raw["connecting"], false);
    assert_eq!(raw["llm_model"], "gpt-4o-mini");
}

#[tokio::test]
async fn test_fetch_status_fails_on_non_success() {
    // テスト項目: 2xx 以外の応答は StatusFetch エラーになる
    // given (前提条件):
    let base_url = serve(Router::new()).await;
    let api = HttpMcpApi::new(&base_url).unwrap();

    // when (操作):
    let result = api.fetch_status().await;

    // then (期待する結果):
    assert_eq!(
        result,
        Err(ClientError::StatusFetch("HTTP 404 Not Found".to_string()))
    );
}

#[tokio::test]
async fn test_failed_command_carries_server_error_detail() {
    // テスト項目: サーバーが 500 {error} を返したときは error の内容が詳細になる
    // given (前提条件):
    let base_url = start_server(false).await;
    let api = HttpMcpApi::new(&format!("{}/", base_url)).unwrap();

    // when (操作):
    let result = api.send_command(McpCommand::Connect).await;

    // then (期待する結果):
    assert_eq!(
        result,
        Err(ClientError::Command {
            command: "connect",
            detail: "MCP server unreachable: connection refused".to_string(),
        })
    );
}

#[tokio::test]
async fn test_command_detail_prefers_message_then_http_status() {
    // テスト項目: 詳細は message を優先し、本文が無ければ HTTP ステータスになる
    // given (前提条件):
    let app = Router::new()
        .route(
            "/mcp/connect",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"message": "busy", "error": "ignored"})),
                )
            }),
        )
        .route("/mcp/disconnect", post(|| async { StatusCode::BAD_GATEWAY }));
    let api = HttpMcpApi::new(&serve(app).await).unwrap();

    // when (操作):
    let connect = api.send_command(McpCommand::Connect).await;
    let disconnect = api.send_command(McpCommand::Disconnect).await;

    // then (期待する結果):
    assert_eq!(
        connect,
        Err(ClientError::Command {
            command: "connect",
            detail: "busy".to_string(),
        })
    );
    assert_eq!(
        disconnect,
        Err(ClientError::Command {
            command: "disconnect",
            detail: "HTTP 502 Bad Gateway".to_string(),
        })
    );
}

#[tokio::test]
async fn test_poller_connect_command_against_server() {
    // テスト項目: 実サーバーに対して connect を送ると connecting 表示の後に connected が通知される
    // given (前提条件):
    let base_url = start_server(true).await;
    let sink = Arc::new(RecordingSink::default());
    let poller = StatusPoller::new(
        Arc::new(HttpMcpApi::new(&base_url).unwrap()),
        sink.clone(),
        Arc::new(SystemClock),
        PollerConfig::default(),
    );

    // when (操作):
    let result = poller.command(McpCommand::Connect).await;

    // then (期待する結果):
    assert!(result.is_ok());
    let statuses: Vec<McpStatus> = sink.badges.lock().unwrap().iter().map(|b| b.status).collect();
    assert_eq!(statuses, vec![McpStatus::Connecting, McpStatus::Connected]);
    assert_eq!(
        *sink.notifications.lock().unwrap(),
        vec![(NotifyLevel::Success, "MCP connected".to_string())]
    );
    let badge = sink.badges.lock().unwrap().last().cloned().unwrap();
    assert_eq!(badge.llm_model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(
        badge.server_url.as_deref(),
        Some("http://localhost:5000/projectwise/mcp/")
    );
}

#[tokio::test]
async fn test_poller_reports_unreachable_server() {
    // テスト項目: サーバーに到達できないとき refresh はエラー表示とエラー通知を行う
    // given (前提条件):
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let sink = Arc::new(RecordingSink::default());
    let poller = StatusPoller::new(
        Arc::new(HttpMcpApi::new(&format!("http://{}", addr)).unwrap()),
        sink.clone(),
        Arc::new(SystemClock),
        PollerConfig::default(),
    );

    // when (操作):
    let first = poller.refresh().await;
    let second = poller.refresh().await;

    // then (期待する結果):
    assert_eq!(first, RefreshOutcome::Failed { notified: true });
    assert_eq!(second, RefreshOutcome::Failed { notified: false });
    assert_eq!(sink.notifications.lock().unwrap().len(), 1);
    assert_eq!(
        sink.badges.lock().unwrap().last().map(|b| b.status),
        Some(McpStatus::Error)
    );
}
