//! Status Poller: reflects the server's MCP link status in the UI.
//!
//! ## 概要
//! - `refresh` は同時に 1 つしか実行されない（AtomicBool による再入ガード）
//! - 接続中 (connecting) は短い間隔、失敗時は長い間隔でポーリングする
//! - 通知は connected / disconnected への遷移時のみ。エラー通知はクールダウン付き
//! - タイマーは 1 つのタスクで、間隔が変わると `Notify` で起こされて再設定される
//! - コマンド送信ごとに世代番号を進め、送信前に始まった取得の結果は破棄する

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use pwchat_shared::{dto::McpErrorBody, time::Clock};
use serde_json::Value;
use tokio::{
    sync::{Mutex, Notify, oneshot},
    task::JoinHandle,
};

use crate::{
    domain::{McpStatus, PollIntervals, StatusBadge, is_notifiable_transition, map_status},
    error::ClientError,
    ui::{NotifyLevel, StatusSink},
};

/// Minimum time between two error notifications
pub const ERROR_COOLDOWN: Duration = Duration::from_millis(15_000);

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote MCP control commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpCommand {
    Connect,
    Disconnect,
    Reconnect,
}

impl McpCommand {
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Reconnect => "reconnect",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::Connect => "/mcp/connect",
            Self::Disconnect => "/mcp/disconnect",
            Self::Reconnect => "/mcp/reconnect",
        }
    }

    /// Status shown before the request resolves
    pub fn optimistic_status(self) -> McpStatus {
        match self {
            Self::Connect | Self::Reconnect => McpStatus::Connecting,
            Self::Disconnect => McpStatus::Disconnected,
        }
    }
}

/// HTTP side of the poller
#[async_trait]
pub trait McpApi: Send + Sync {
    /// `GET /mcp/status`, returning the raw JSON body
    async fn fetch_status(&self) -> Result<Value, ClientError>;

    async fn send_command(&self, command: McpCommand) -> Result<(), ClientError>;
}

/// [`McpApi`] over reqwest
pub struct HttpMcpApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpMcpApi {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl McpApi for HttpMcpApi {
    async fn fetch_status(&self) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(format!("{}/mcp/status", self.base_url))
            .send()
            .await
            .map_err(|e| ClientError::StatusFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::StatusFetch(format!("HTTP {}", status)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ClientError::StatusFetch(e.to_string()))
    }

    async fn send_command(&self, command: McpCommand) -> Result<(), ClientError> {
        let failed = |detail: String| ClientError::Command {
            command: command.name(),
            detail,
        };

        let response = self
            .http
            .post(format!("{}{}", self.base_url, command.path()))
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.json::<McpErrorBody>().await.ok();
        let detail = body
            .as_ref()
            .and_then(McpErrorBody::detail)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status));
        Err(failed(detail))
    }
}

/// Poller tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub intervals: PollIntervals,
    pub error_cooldown: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            intervals: PollIntervals::default(),
            error_cooldown: ERROR_COOLDOWN,
        }
    }
}

/// Mutable poller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    /// Last status shown on the badge
    pub last_known: McpStatus,
    /// Current polling period
    pub interval: Duration,
    /// Unix ms before which error notifications are suppressed
    pub error_cooldown_until: i64,
}

impl PollState {
    pub fn new(intervals: &PollIntervals) -> Self {
        Self {
            last_known: McpStatus::Disconnected,
            interval: intervals.normal,
            error_cooldown_until: 0,
        }
    }
}

/// Result of one [`StatusPoller::refresh`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another refresh was already in flight
    Skipped,
    /// A control command was issued while fetching; the response was dropped
    Superseded,
    Updated { status: McpStatus, notified: bool },
    Failed { notified: bool },
}

struct Timer {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct InFlight<'a> {
    flag: &'a AtomicBool,
    done: &'a Notify,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.done.notify_waiters();
    }
}

pub struct StatusPoller {
    api: Arc<dyn McpApi>,
    sink: Arc<dyn StatusSink>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    state: Mutex<PollState>,
    in_flight: AtomicBool,
    fetch_done: Notify,
    /// Bumped by every control command
    generation: AtomicU64,
    timer: std::sync::Mutex<Option<Timer>>,
    interval_changed: Notify,
}

impl StatusPoller {
    pub fn new(
        api: Arc<dyn McpApi>,
        sink: Arc<dyn StatusSink>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        Self {
            api,
            sink,
            clock,
            state: Mutex::new(PollState::new(&config.intervals)),
            config,
            in_flight: AtomicBool::new(false),
            fetch_done: Notify::new(),
            generation: AtomicU64::new(0),
            timer: std::sync::Mutex::new(None),
            interval_changed: Notify::new(),
        }
    }

    pub async fn state(&self) -> PollState {
        self.state.lock().await.clone()
    }

    /// Fetch the status once and update the badge.
    ///
    /// Returns [`RefreshOutcome::Skipped`] without fetching if another call is
    /// still outstanding, and [`RefreshOutcome::Superseded`] without touching
    /// the badge if a control command was issued before the response arrived.
    pub async fn refresh(&self) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Status refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        }
        let _in_flight = InFlight {
            flag: &self.in_flight,
            done: &self.fetch_done,
        };
        let generation = self.generation.load(Ordering::Acquire);

        let fetched = match self.api.fetch_status().await {
            Ok(raw) => map_status(&raw),
            Err(e) => Err(e),
        };

        let mut state = self.state.lock().await;
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!("Dropping status fetched before a control command");
            return RefreshOutcome::Superseded;
        }
        match fetched {
            Ok(badge) => {
                self.sink.show_status(&badge);
                let notified = is_notifiable_transition(state.last_known, badge.status);
                if notified {
                    match badge.status {
                        McpStatus::Connected => {
                            self.sink.notify(NotifyLevel::Success, "MCP connected")
                        }
                        _ => self.sink.notify(NotifyLevel::Warning, "MCP disconnected"),
                    }
                }
                tracing::debug!("MCP status {} -> {}", state.last_known, badge.status);
                state.last_known = badge.status;
                self.set_interval(&mut state, self.config.intervals.after_success(badge.status));
                RefreshOutcome::Updated {
                    status: badge.status,
                    notified,
                }
            }
            Err(e) => {
                tracing::warn!("MCP status refresh failed: {}", e);
                self.sink.show_status(&StatusBadge::error(e.to_string()));
                state.last_known = McpStatus::Error;

                let now = self.clock.now_millis();
                let notified = now > state.error_cooldown_until;
                if notified {
                    self.sink.notify(NotifyLevel::Error, &e.to_string());
                    let cooldown = i64::try_from(self.config.error_cooldown.as_millis())
                        .unwrap_or(i64::MAX);
                    state.error_cooldown_until = now.saturating_add(cooldown);
                }
                self.set_interval(&mut state, self.config.intervals.failure);
                RefreshOutcome::Failed { notified }
            }
        }
    }

    fn set_interval(&self, state: &mut PollState, interval: Duration) {
        if state.interval != interval {
            state.interval = interval;
            self.interval_changed.notify_one();
        }
    }

    /// Start the periodic timer with an immediate refresh.
    ///
    /// Returns `false` if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if timer.is_some() {
            return false;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let poller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            poller.refresh().await;
            loop {
                let interval = poller.state.lock().await.interval;
                tokio::select! {
                    _ = &mut stop_rx => break,
                    () = poller.interval_changed.notified() => continue,
                    () = tokio::time::sleep(interval) => {
                        poller.refresh().await;
                    }
                }
            }
            tracing::debug!("Status poller timer stopped");
        });

        *timer = Some(Timer {
            stop: stop_tx,
            handle,
        });
        tracing::debug!("Status poller started");
        true
    }

    /// Stop the timer. An in-flight refresh still completes.
    ///
    /// Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        match timer {
            Some(Timer { stop, handle }) => {
                let _ = stop.send(());
                drop(handle);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|timer| !timer.handle.is_finished())
    }

    /// Pause polling while the view is hidden
    pub fn set_visible(self: &Arc<Self>, visible: bool) {
        if visible {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Send a control command, showing its expected outcome immediately.
    ///
    /// A refresh always follows, whether or not the command succeeded. Status
    /// fetches started before the command resolved are discarded.
    pub async fn command(&self, command: McpCommand) -> Result<(), ClientError> {
        let optimistic = command.optimistic_status();
        {
            let mut state = self.state.lock().await;
            self.generation.fetch_add(1, Ordering::AcqRel);
            state.last_known = optimistic;
            self.sink.show_status(&StatusBadge::new(optimistic));
        }

        let result = self.api.send_command(command).await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = &result {
            tracing::warn!("{}", e);
            self.sink.notify(NotifyLevel::Error, &e.to_string());
        }

        self.reconcile().await;
        result
    }

    /// Refresh once, waiting out a fetch that is already in flight
    async fn reconcile(&self) {
        loop {
            let done = self.fetch_done.notified();
            tokio::pin!(done);
            done.as_mut().enable();
            match self.refresh().await {
                RefreshOutcome::Skipped => done.await,
                // Superseded: a later command reconciles on its own.
                _ => break,
            }
        }
    }
}
