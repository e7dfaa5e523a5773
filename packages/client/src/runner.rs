//! Client execution logic: wires the Connection Manager, the Status Poller and
//! the terminal together.

use std::{path::PathBuf, sync::Arc};

use pwchat_shared::time::SystemClock;
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

use crate::{
    connection::{ConnectionConfig, ConnectionController},
    error::ClientError,
    poller::{HttpMcpApi, McpCommand, PollerConfig, StatusPoller},
    store::LocalStore,
    ui::{ChatView, ConsoleView, NullStatusSink, PROMPT, StatusSink},
};

const HELP: &str = "commands: /join <room> <user>, /leave, /auto on|off, \
/mcp connect|disconnect|reconnect|refresh, /hide, /show, /quit";

/// Command-line options for [`run_client`]
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Server base URL (`http[s]://host:port`)
    pub server: String,
    pub room: Option<String>,
    pub user: Option<String>,
    pub state_file: Option<PathBuf>,
    /// Keep all state in memory
    pub ephemeral: bool,
    pub no_auto_reconnect: bool,
    pub no_mcp_status: bool,
}

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Join { room: String, user: String },
    Leave,
    AutoReconnect(bool),
    Mcp(McpCommand),
    RefreshStatus,
    Hide,
    Show,
    Help,
    Quit,
    Message(String),
    /// A malformed command, with the text to show
    Invalid(String),
}

/// Parse one line typed at the prompt. Lines not starting with `/` are chat messages.
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };

    let words: Vec<&str> = command.split_whitespace().collect();
    match words.as_slice() {
        ["join", room, user] => Input::Join {
            room: room.to_string(),
            user: user.to_string(),
        },
        ["join", ..] => Input::Invalid("usage: /join <room> <user>".to_string()),
        ["leave"] => Input::Leave,
        ["auto", "on"] => Input::AutoReconnect(true),
        ["auto", "off"] => Input::AutoReconnect(false),
        ["auto", ..] => Input::Invalid("usage: /auto on|off".to_string()),
        ["mcp", "connect"] => Input::Mcp(McpCommand::Connect),
        ["mcp", "disconnect"] => Input::Mcp(McpCommand::Disconnect),
        ["mcp", "reconnect"] => Input::Mcp(McpCommand::Reconnect),
        ["mcp", "refresh"] => Input::RefreshStatus,
        ["mcp", ..] => {
            Input::Invalid("usage: /mcp connect|disconnect|reconnect|refresh".to_string())
        }
        ["hide"] => Input::Hide,
        ["show"] => Input::Show,
        ["help"] => Input::Help,
        ["quit"] | ["exit"] => Input::Quit,
        _ => Input::Invalid(format!("unknown command '{}', try /help", line)),
    }
}

/// Errors already shown to the user are logged; only a stopped manager is fatal.
fn keep_running(result: Result<(), ClientError>) -> Result<(), ClientError> {
    match result {
        Err(ClientError::Closed) => Err(ClientError::Closed),
        Err(e) => {
            tracing::debug!("{}", e);
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// Spawn a blocking thread for rustyline (synchronous readline)
fn spawn_readline() -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}

/// Run the terminal client until `/quit`, Ctrl+C or Ctrl+D
pub async fn run_client(options: ClientOptions) -> Result<(), Box<dyn std::error::Error>> {
    let store = if options.ephemeral {
        LocalStore::in_memory()
    } else {
        let path = options
            .state_file
            .clone()
            .unwrap_or_else(LocalStore::default_path);
        LocalStore::open(path)?
    };
    let store = Arc::new(store);
    if options.no_auto_reconnect {
        store.set_auto_reconnect(false)?;
    }

    let console = Arc::new(ConsoleView::new());
    let view: Arc<dyn ChatView> = console.clone();
    let sink: Arc<dyn StatusSink> = if options.no_mcp_status {
        Arc::new(NullStatusSink)
    } else {
        console.clone()
    };

    let (connection, manager) = ConnectionController::spawn(
        ConnectionConfig::new(options.server.clone()),
        store.clone(),
        view.clone(),
    );
    let poller = Arc::new(StatusPoller::new(
        Arc::new(HttpMcpApi::new(&options.server)?),
        sink,
        Arc::new(SystemClock),
        PollerConfig::default(),
    ));
    if !options.no_mcp_status {
        poller.start();
    }

    println!("\npwchat client for {}. {}\n", options.server, HELP);

    let last = store.last_session();
    let room = options.room.clone().or_else(|| last.as_ref().map(|(r, _)| r.clone()));
    let user = options.user.clone().or_else(|| last.as_ref().map(|(_, u)| u.clone()));
    match (room, user) {
        (Some(room), Some(user)) => {
            keep_running(connection.on_connect_requested(&room, &user).await)?;
        }
        _ => view.notice("not in a room, use /join <room> <user>"),
    }

    let mut input_rx = spawn_readline();
    while let Some(line) = input_rx.recv().await {
        match parse_input(&line) {
            Input::Join { room, user } => {
                keep_running(connection.on_connect_requested(&room, &user).await)?;
            }
            Input::Leave => connection.on_disconnect_requested().await?,
            Input::AutoReconnect(enabled) => {
                connection.on_auto_reconnect_changed(enabled).await?;
                let state = if enabled { "on" } else { "off" };
                view.notice(&format!("auto-reconnect {}", state));
            }
            Input::Mcp(command) => {
                if let Err(e) = poller.command(command).await
                    && options.no_mcp_status
                {
                    view.notice(&e.to_string());
                }
            }
            Input::RefreshStatus => {
                poller.refresh().await;
            }
            Input::Hide => {
                poller.set_visible(false);
                view.notice("status polling paused");
            }
            Input::Show => {
                if options.no_mcp_status {
                    view.notice("status polling is disabled (--no-mcp-status)");
                } else {
                    poller.set_visible(true);
                }
            }
            Input::Help => view.notice(HELP),
            Input::Quit => break,
            Input::Message(text) => keep_running(connection.on_send_requested(&text).await)?,
            Input::Invalid(message) => view.notice(&message),
        }
    }

    poller.stop();
    keep_running(connection.shutdown().await)?;
    if let Err(e) = manager.await {
        tracing::warn!("Connection manager task failed: {}", e);
    }
    tracing::info!("Client exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_is_a_message() {
        // テスト項目: スラッシュで始まらない行はチャットメッセージになる
        // given (前提条件):
        let line = "  hello /join room  ";

        // when (操作):
        let input = parse_input(line);

        // then (期待する結果):
        assert_eq!(input, Input::Message("hello /join room".to_string()));
    }

    #[test]
    fn test_parse_commands() {
        // テスト項目: 各コマンドが正しく解釈される
        // given (前提条件):
        let cases = [
            (
                "/join room1 bob",
                Input::Join {
                    room: "room1".to_string(),
                    user: "bob".to_string(),
                },
            ),
            ("/leave", Input::Leave),
            ("/auto off", Input::AutoReconnect(false)),
            ("/auto on", Input::AutoReconnect(true)),
            ("/mcp reconnect", Input::Mcp(McpCommand::Reconnect)),
            ("/mcp refresh", Input::RefreshStatus),
            ("/hide", Input::Hide),
            ("/show", Input::Show),
            ("/quit", Input::Quit),
            ("/exit", Input::Quit),
        ];

        // when (操作):

        // then (期待する結果):
        for (line, expected) in cases {
            assert_eq!(parse_input(line), expected, "line: {}", line);
        }
    }

    #[test]
    fn test_malformed_commands_are_invalid() {
        // テスト項目: 引数が足りない・未知のコマンドは Invalid になる
        // given (前提条件):
        let lines = ["/join room1", "/auto maybe", "/mcp", "/dance"];

        // when (操作):

        // then (期待する結果):
        for line in lines {
            assert!(
                matches!(parse_input(line), Input::Invalid(_)),
                "line: {}",
                line
            );
        }
    }

    #[test]
    fn test_keep_running_only_fails_when_manager_stopped() {
        // テスト項目: 表示済みのエラーは継続し、マネージャ停止のみ致命的になる
        // given (前提条件):

        // when (操作):

        // then (期待する結果):
        assert!(keep_running(Err(ClientError::NotConnected)).is_ok());
        assert!(keep_running(Err(ClientError::Transport("reset".to_string()))).is_ok());
        assert_eq!(keep_running(Err(ClientError::Closed)), Err(ClientError::Closed));
    }
}
