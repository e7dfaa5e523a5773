//! UseCase: MCP 接続の監視と制御
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - McpControlUseCase の connect / disconnect / reconnect / status
//!
//! ### なぜこのテストが必要か
//! - クライアントのステータスポーラーは `connecting` を観測できる必要がある
//!   （接続処理中にロックを保持しないこと）
//! - 接続失敗の詳細が status の `error` に反映されることを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：接続・切断・再接続
//! - 異常系：接続先に到達できない
//! - エッジケース：接続処理中の status 取得

use std::sync::Arc;

use pwchat_shared::dto::McpStatusDto;
use tokio::sync::Mutex;

use crate::domain::{McpConnector, McpError, McpLinkState};

/// MCP 接続制御のユースケース
pub struct McpControlUseCase {
    /// McpConnector（MCP 接続の抽象化）
    connector: Arc<dyn McpConnector>,
    state: Mutex<McpLinkState>,
    server_url: String,
    llm_model: String,
}

impl McpControlUseCase {
    /// 新しい McpControlUseCase を作成（初期状態は Disconnected）
    pub fn new(connector: Arc<dyn McpConnector>, server_url: String, llm_model: String) -> Self {
        Self {
            connector,
            state: Mutex::new(McpLinkState::Disconnected),
            server_url,
            llm_model,
        }
    }

    /// 現在の接続状態
    pub async fn state(&self) -> McpLinkState {
        self.state.lock().await.clone()
    }

    /// `GET /mcp/status` のレスポンスを構築
    pub async fn status(&self) -> McpStatusDto {
        let state = self.state().await;
        McpStatusDto {
            connected: state.is_connected(),
            connecting: state.is_connecting(),
            error: state.error().map(str::to_string),
            llm_model: self.llm_model.clone(),
            mcp_server_url: self.server_url.clone(),
        }
    }

    /// MCP サーバーへ接続
    ///
    /// 接続処理中は状態を `Connecting` にし、ロックは保持しない。
    pub async fn connect(&self) -> Result<(), McpError> {
        *self.state.lock().await = McpLinkState::Connecting;
        tracing::info!("Connecting to MCP server at {}", self.server_url);

        let result = self.connector.open(&self.server_url).await;

        let mut state = self.state.lock().await;
        match &result {
            Ok(()) => {
                *state = McpLinkState::Connected;
                tracing::info!("MCP server connected");
            }
            Err(e) => {
                *state = McpLinkState::Failed(e.to_string());
                tracing::warn!("MCP connect failed: {}", e);
            }
        }
        result
    }

    /// MCP サーバーから切断
    ///
    /// 切断処理が失敗しても状態は `Disconnected` になる。
    pub async fn disconnect(&self) -> Result<(), McpError> {
        let result = self.connector.close().await;
        *self.state.lock().await = McpLinkState::Disconnected;

        match &result {
            Ok(()) => tracing::info!("MCP server disconnected"),
            Err(e) => tracing::warn!("MCP disconnect reported an error: {}", e),
        }
        result
    }

    /// 切断してから再接続
    pub async fn reconnect(&self) -> Result<(), McpError> {
        if let Err(e) = self.disconnect().await {
            tracing::debug!("Ignoring shutdown error during reconnect: {}", e);
        }
        self.connect().await
    }
}
