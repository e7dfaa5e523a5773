//! Connection Manager: one room WebSocket with automatic reconnect.
//!
//! A single task owns the socket and every piece of connection state. It
//! multiplexes three event sources with `tokio::select!`:
//!
//! - commands from [`ConnectionController`] handles
//! - frames from the live socket
//! - the scheduled retry deadline
//!
//! Closure of the socket for any reason other than an explicit leave schedules
//! a retry after [`ReconnectPolicy::delay_for`] while auto-reconnect is on. A
//! server close with [`REPLACED_CLOSE_CODE`] means another client took over the
//! same session, and is settled without a retry.

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use pwchat_shared::{
    dto::{ChatRequest, LeaveRequest, REPLACED_CLOSE_CODE},
    time::now_millis,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::Instant,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Error as WsError, Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

use crate::{
    domain::{ChatLine, Inbound, ReconnectPolicy, classify_inbound, room_url, validate_session},
    error::ClientError,
    formatter::MessageFormatter,
    store::{HistoryEntry, LocalStore},
    ui::{ChatView, LinkState},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const COMMAND_BUFFER: usize = 32;
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for one Connection Manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server base URL (`http[s]://host[:port]`), mapped to `ws[s]://`
    pub base_url: String,
    pub policy: ReconnectPolicy,
    /// How long to wait after sending `leave` before closing the socket
    pub leave_grace: Duration,
}

impl ConnectionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            policy: ReconnectPolicy::default(),
            leave_grace: Duration::from_millis(150),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Observable state of the Connection Manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub room: Option<String>,
    pub user: Option<String>,
    /// A socket is currently open
    pub open: bool,
    pub reconnect_attempt: u32,
    pub auto_reconnect: bool,
    /// A retry is scheduled
    pub retry_pending: bool,
}

enum Command {
    Connect {
        room: String,
        user: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    SetAutoReconnect {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running Connection Manager.
///
/// Cloning the handle is cheap; the manager stops when every handle is
/// dropped or [`ConnectionController::shutdown`] is called.
#[derive(Clone)]
pub struct ConnectionController {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<ConnectionSnapshot>,
}

impl ConnectionController {
    /// Start the manager task.
    ///
    /// The initial auto-reconnect preference is read from `store`.
    pub fn spawn(
        config: ConnectionConfig,
        store: Arc<LocalStore>,
        view: Arc<dyn ChatView>,
    ) -> (Self, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let auto_reconnect = store.auto_reconnect();
        let (snapshot_tx, snapshot_rx) = watch::channel(ConnectionSnapshot {
            auto_reconnect,
            ..ConnectionSnapshot::default()
        });

        let manager = ConnectionManager {
            config,
            store,
            view,
            socket: None,
            room: None,
            user: None,
            reconnect_attempt: 0,
            auto_reconnect,
            retry_at: None,
            superseded: false,
            snapshot: snapshot_tx,
        };
        let handle = tokio::spawn(manager.run(commands_rx));

        (
            Self {
                commands: commands_tx,
                snapshot: snapshot_rx,
            },
            handle,
        )
    }

    /// Join `room` as `user`, replacing any current connection
    pub async fn on_connect_requested(&self, room: &str, user: &str) -> Result<(), ClientError> {
        self.request(|reply| Command::Connect {
            room: room.to_string(),
            user: user.to_string(),
            reply,
        })
        .await?
    }

    /// Leave the room and turn auto-reconnect off
    pub async fn on_disconnect_requested(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    pub async fn on_send_requested(&self, text: &str) -> Result<(), ClientError> {
        self.request(|reply| Command::Send {
            text: text.to_string(),
            reply,
        })
        .await?
    }

    pub async fn on_auto_reconnect_changed(&self, enabled: bool) -> Result<(), ClientError> {
        self.request(|reply| Command::SetAutoReconnect { enabled, reply }).await
    }

    /// Close the socket without sending `leave` and stop the manager task
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot.clone()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| ClientError::Closed)?;
        reply_rx.await.map_err(|_| ClientError::Closed)
    }
}

struct ConnectionManager {
    config: ConnectionConfig,
    store: Arc<LocalStore>,
    view: Arc<dyn ChatView>,
    socket: Option<Socket>,
    room: Option<String>,
    user: Option<String>,
    reconnect_attempt: u32,
    auto_reconnect: bool,
    retry_at: Option<Instant>,
    /// The server replaced this session with a newer connection
    superseded: bool,
    snapshot: watch::Sender<ConnectionSnapshot>,
}

impl ConnectionManager {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.close_socket().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.close_socket().await;
                        break;
                    }
                },
                frame = next_frame(&mut self.socket) => self.handle_frame(frame).await,
                () = wait_for_retry(self.retry_at) => self.retry().await,
            }
        }
        tracing::debug!("Connection manager stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { room, user, reply } => {
                self.reconnect_attempt = 0;
                let result = self.connect(room, user).await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            Command::Send { text, reply } => {
                let result = self.send(&text).await;
                let _ = reply.send(result);
            }
            Command::SetAutoReconnect { enabled, reply } => {
                self.set_auto_reconnect(enabled);
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn connect(&mut self, room: String, user: String) -> Result<(), ClientError> {
        let url = match validate_session(&room, &user)
            .and_then(|()| room_url(&self.config.base_url, &room, &user))
        {
            Ok(url) => url,
            Err(e) => {
                self.view.notice(&e.to_string());
                return Err(e);
            }
        };

        self.retry_at = None;
        self.superseded = false;
        self.close_socket().await;
        self.room = Some(room.clone());
        self.user = Some(user.clone());
        self.view.link_changed(LinkState::Connecting {
            room: room.clone(),
            user: user.clone(),
        });

        tracing::info!("Connecting to {} (attempt {})", url, self.reconnect_attempt);
        let opened = match tokio::time::timeout(OPEN_TIMEOUT, connect_async(url.as_str())).await {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(e)) => Err(ClientError::Transport(e.to_string())),
            Err(_) => Err(ClientError::Transport(format!(
                "timed out after {}s",
                OPEN_TIMEOUT.as_secs()
            ))),
        };

        match opened {
            Ok(socket) => {
                tracing::info!("Connected to room '{}' as '{}'", room, user);
                self.socket = Some(socket);
                self.reconnect_attempt = 0;
                self.view.link_changed(LinkState::Connected {
                    room: room.clone(),
                    user: user.clone(),
                });
                if let Err(e) = self.store.set_last_session(&room, &user) {
                    tracing::warn!("Failed to persist last session: {}", e);
                }
                self.view.replay(&self.store.room_history(&room));
                self.publish();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to open {}: {}", url, e);
                self.render_system(e.to_string());
                self.on_closed();
                Err(e)
            }
        }
    }

    async fn retry(&mut self) {
        self.retry_at = None;
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        let (Some(room), Some(user)) = (self.room.clone(), self.user.clone()) else {
            return;
        };
        // Failures are already rendered and reschedule through on_closed.
        let _ = self.connect(room, user).await;
    }

    async fn disconnect(&mut self) {
        self.retry_at = None;
        self.auto_reconnect = false;
        if let Err(e) = self.store.set_auto_reconnect(false) {
            tracing::warn!("Failed to persist auto-reconnect preference: {}", e);
        }

        if let Some(mut socket) = self.socket.take() {
            match serde_json::to_string(&LeaveRequest::default()) {
                Ok(json) => {
                    if let Err(e) = socket.send(Message::Text(json.into())).await {
                        tracing::debug!("Failed to send leave: {}", e);
                    }
                }
                Err(e) => tracing::error!("Failed to serialize leave: {}", e),
            }
            tokio::time::sleep(self.config.leave_grace).await;
            if let Err(e) = socket.close(Some(normal_closure())).await {
                tracing::debug!("Close after leave failed: {}", e);
            }
        }

        tracing::info!("Left room {:?}", self.room);
        self.room = None;
        self.user = None;
        self.reconnect_attempt = 0;
        self.view.link_changed(LinkState::Disconnected);
        self.publish();
    }

    async fn send(&mut self, text: &str) -> Result<(), ClientError> {
        let (Some(socket), Some(room), Some(user)) =
            (self.socket.as_mut(), self.room.clone(), self.user.clone())
        else {
            let e = ClientError::NotConnected;
            self.view.notice(&e.to_string());
            return Err(e);
        };

        if text.trim().is_empty() {
            let e = ClientError::Validation("message is empty".to_string());
            self.view.notice(&e.to_string());
            return Err(e);
        }

        let json = serde_json::to_string(&ChatRequest {
            message: text.to_string(),
        })
        .map_err(|e| ClientError::Transport(e.to_string()))?;

        if let Err(e) = socket.send(Message::Text(json.into())).await {
            tracing::warn!("Failed to send message: {}", e);
            let e = ClientError::Transport(e.to_string());
            self.render_system(e.to_string());
            self.socket = None;
            self.on_closed();
            return Err(e);
        }

        let line = ChatLine::own(&user, text);
        let at_ms = now_millis();
        self.view.render(&line, at_ms);
        self.remember(&room, &line, at_ms);
        Ok(())
    }

    fn set_auto_reconnect(&mut self, enabled: bool) {
        self.auto_reconnect = enabled;
        if let Err(e) = self.store.set_auto_reconnect(enabled) {
            tracing::warn!("Failed to persist auto-reconnect preference: {}", e);
        }
        if !enabled && self.retry_at.take().is_some() {
            tracing::info!("Pending reconnect cancelled");
            self.view.link_changed(LinkState::Disconnected);
        }
        self.publish();
    }

    async fn handle_frame(&mut self, frame: Option<Result<Message, WsError>>) {
        match frame {
            Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
            Some(Ok(Message::Binary(data))) => {
                self.render_system(MessageFormatter::format_binary_message(data.len()));
            }
            Some(Ok(Message::Close(close))) => {
                tracing::info!("Server closed the connection: {:?}", close);
                if close
                    .as_ref()
                    .is_some_and(|frame| u16::from(frame.code) == REPLACED_CLOSE_CODE)
                {
                    self.superseded = true;
                    self.view
                        .notice("this session was opened elsewhere; use /join to take it back");
                }
                let line = match close.filter(|frame| !frame.reason.is_empty()) {
                    Some(frame) => {
                        format!("server closed the connection: {}", frame.reason.as_str())
                    }
                    None => "server closed the connection".to_string(),
                };
                self.render_system(line);
                // The stream ends once the close handshake completes.
            }
            Some(Ok(_)) => {}
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                self.socket = None;
                self.on_closed();
            }
            Some(Err(e)) => {
                tracing::warn!("WebSocket read error: {}", e);
                self.render_system(format!("connection error: {}", e));
                self.socket = None;
                self.on_closed();
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        let (Some(room), Some(user)) = (self.room.clone(), self.user.clone()) else {
            return;
        };
        let at_ms = now_millis();

        match classify_inbound(text, &user) {
            Inbound::History(lines) => {
                for line in &lines {
                    self.view.render(line, at_ms);
                }
            }
            Inbound::Peer(line) => {
                self.view.render(&line, at_ms);
                self.remember(&room, &line, at_ms);
            }
            Inbound::OwnEcho => tracing::debug!("Ignoring echo of own message"),
            Inbound::System(content) => self.render_system(content),
        }
    }

    /// Socket is gone without an explicit leave: schedule a retry or settle.
    fn on_closed(&mut self) {
        self.socket = None;
        let known_session = self.room.is_some() && self.user.is_some();
        let superseded = std::mem::take(&mut self.superseded);

        if self.auto_reconnect && known_session && !superseded {
            let delay = self.config.policy.delay_for(self.reconnect_attempt);
            self.retry_at = Some(Instant::now() + delay);
            tracing::info!(
                "Reconnecting in {:?} (attempt {})",
                delay,
                self.reconnect_attempt + 1
            );
            self.view.link_changed(LinkState::Reconnecting {
                attempt: self.reconnect_attempt + 1,
                delay,
            });
        } else {
            self.view.link_changed(LinkState::Disconnected);
        }
        self.publish();
    }

    async fn close_socket(&mut self) {
        if let Some(mut socket) = self.socket.take()
            && let Err(e) = socket.close(Some(normal_closure())).await
        {
            tracing::debug!("Closing previous socket failed: {}", e);
        }
    }

    fn render_system(&self, content: String) {
        self.view.render(&ChatLine::system(content), now_millis());
    }

    fn remember(&self, room: &str, line: &ChatLine, at_ms: i64) {
        if let Err(e) = self
            .store
            .append_history(room, HistoryEntry::from_line(line, at_ms))
        {
            tracing::warn!("Failed to persist history: {}", e);
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(ConnectionSnapshot {
            room: self.room.clone(),
            user: self.user.clone(),
            open: self.socket.is_some(),
            reconnect_attempt: self.reconnect_attempt,
            auto_reconnect: self.auto_reconnect,
            retry_pending: self.retry_at.is_some(),
        });
    }
}

fn normal_closure() -> CloseFrame {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "client leaving".into(),
    }
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<Result<Message, WsError>> {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_for_retry(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
