//! Terminal chat client with automatic reconnect and MCP status polling.
//!
//! Joins a chat room over WebSocket, reconnects with exponential backoff when
//! the connection drops, and polls the server's MCP link status.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin pwchat-client -- --room room1 --user alice
//! cargo run --bin pwchat-client -- -s http://127.0.0.1:8000 --ephemeral
//! ```

use std::path::PathBuf;

use clap::Parser;

use pwchat_client::{ClientOptions, run_client};
use pwchat_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "pwchat-client")]
#[command(about = "Room chat client with auto-reconnect and MCP status", long_about = None)]
struct Args {
    /// Server base URL
    #[arg(short = 's', long, default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Room to join (defaults to the last room)
    #[arg(short = 'r', long)]
    room: Option<String>,

    /// User id (defaults to the last user id)
    #[arg(short = 'u', long)]
    user: Option<String>,

    /// Path of the persisted state file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Do not read or write the state file
    #[arg(long)]
    ephemeral: bool,

    /// Disable automatic reconnect (persisted)
    #[arg(long)]
    no_auto_reconnect: bool,

    /// Disable the MCP status badge and polling
    #[arg(long)]
    no_mcp_status: bool,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; keep them quiet so they do not clobber the prompt
    setup_logger(env!("CARGO_BIN_NAME"), "warn");

    let args = Args::parse();
    let options = ClientOptions {
        server: args.server,
        room: args.room,
        user: args.user,
        state_file: args.state_file,
        ephemeral: args.ephemeral,
        no_auto_reconnect: args.no_auto_reconnect,
        no_mcp_status: args.no_mcp_status,
    };

    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
