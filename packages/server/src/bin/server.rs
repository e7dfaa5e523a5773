//! pwchat development server.
//!
//! Serves room chat over WebSocket and the MCP status/control API.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin pwchat-server
//! cargo run --bin pwchat-server -- --host 0.0.0.0 --port 8000 --mcp-url http://localhost:5000/projectwise/mcp/
//! ```

use std::sync::Arc;

use clap::Parser;
use pwchat_server::{
    infrastructure::{HttpProbeConnector, RoomHub},
    ui::Server,
    usecase::{McpControlUseCase, RoomChatUseCase},
};
use pwchat_shared::{logger::setup_logger, time::SystemClock};

#[derive(Parser, Debug)]
#[command(name = "pwchat-server")]
#[command(about = "Room chat and MCP control server for pwchat", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8000")]
    port: u16,

    /// MCP server endpoint supervised by /mcp/*
    #[arg(long, default_value = "http://localhost:5000/projectwise/mcp/")]
    mcp_url: String,

    /// Model name reported by /mcp/status (display hint only)
    #[arg(long, default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Messages kept per room and replayed to joiners
    #[arg(long, default_value = "200")]
    history_limit: usize,

    /// Do not connect to the MCP server at startup
    #[arg(long)]
    no_mcp_autoconnect: bool,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    // 1. Infrastructure
    let hub = Arc::new(RoomHub::new(args.history_limit));
    let connector = match HttpProbeConnector::new() {
        Ok(connector) => Arc::new(connector),
        Err(e) => {
            tracing::error!("Failed to build MCP connector: {}", e);
            std::process::exit(1);
        }
    };

    // 2. UseCases
    let room_chat_usecase = Arc::new(RoomChatUseCase::new(hub, Arc::new(SystemClock)));
    let mcp_control_usecase = Arc::new(McpControlUseCase::new(
        connector,
        args.mcp_url,
        args.llm_model,
    ));

    if !args.no_mcp_autoconnect {
        let usecase = mcp_control_usecase.clone();
        tokio::spawn(async move {
            // Failure is recorded in the link state and reported by /mcp/status.
            let _ = usecase.connect().await;
        });
    }

    // 3. Server
    let server = Server::new(room_chat_usecase, mcp_control_usecase);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
