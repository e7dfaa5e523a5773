//! Integration tests for the Connection Manager against real WebSocket servers.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use pwchat_client::{
    ClientError, ConnectionConfig, ConnectionController, ConnectionSnapshot, LocalStore,
    domain::{ChatLine, LineKind, ReconnectPolicy},
    store::HistoryEntry,
    ui::{ChatView, LinkState},
};
use pwchat_server::{
    infrastructure::{HttpProbeConnector, RoomHub},
    ui::Server,
    usecase::{McpControlUseCase, RoomChatUseCase},
};
use pwchat_shared::time::SystemClock;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Line(ChatLine),
    Replay(usize),
    Link(LinkState),
    Notice(String),
}

/// ChatView that records everything it is asked to show
#[derive(Default)]
struct RecordingView {
    events: Mutex<Vec<Event>>,
}

impl RecordingView {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn lines(&self) -> Vec<ChatLine> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Line(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    fn reconnects(&self) -> Vec<(u32, u128)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Link(LinkState::Reconnecting { attempt, delay }) => {
                    Some((attempt, delay.as_millis()))
                }
                _ => None,
            })
            .collect()
    }

    fn connecting_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Link(LinkState::Connecting { .. })))
            .count()
    }
}

impl ChatView for RecordingView {
    fn render(&self, line: &ChatLine, _at_ms: i64) {
        self.events.lock().unwrap().push(Event::Line(line.clone()));
    }

    fn replay(&self, entries: &[HistoryEntry]) {
        self.events.lock().unwrap().push(Event::Replay(entries.len()));
    }

    fn link_changed(&self, state: LinkState) {
        self.events.lock().unwrap().push(Event::Link(state));
    }

    fn notice(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Notice(message.to_string()));
    }
}

struct Client {
    controller: ConnectionController,
    view: Arc<RecordingView>,
    store: Arc<LocalStore>,
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        base: Duration::from_millis(20),
        cap: Duration::from_millis(50),
    }
}

fn client(base_url: &str, policy: ReconnectPolicy) -> Client {
    let view = Arc::new(RecordingView::default());
    let store = Arc::new(LocalStore::in_memory());
    let (controller, _handle) = ConnectionController::spawn(
        ConnectionConfig::new(base_url).with_policy(policy),
        store.clone(),
        view.clone(),
    );
    Client {
        controller,
        view,
        store,
    }
}

/// Base URL of a port nothing listens on
fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{}", addr)
}

async fn start_chat_server() -> String {
    let room_chat = Arc::new(RoomChatUseCase::new(
        Arc::new(RoomHub::new(50)),
        Arc::new(SystemClock),
    ));
    let mcp = Arc::new(McpControlUseCase::new(
        Arc::new(HttpProbeConnector::new().unwrap()),
        "http://127.0.0.1:9/mcp/".to_string(),
        "gpt-4o-mini".to_string(),
    ));
    serve(Server::new(room_chat, mcp).router()).await
}

async fn wait_for_snapshot(
    client: &Client,
    predicate: impl FnMut(&ConnectionSnapshot) -> bool,
) -> ConnectionSnapshot {
    let mut rx = client.controller.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("connection manager stopped")
        .clone()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

#[tokio::test]
async fn test_failed_opens_back_off_exponentially_up_to_cap() {
    // テスト項目: 接続失敗が続くと待ち時間が倍々に伸び、上限で頭打ちになる
    // given (前提条件):
    let client = client(&refused_base_url(), fast_policy());

    // when (操作):
    let result = client.controller.on_connect_requested("room1", "bob").await;
    wait_until(|| client.view.reconnects().len() >= 4).await;

    // then (期待する結果):
    assert!(matches!(result, Err(ClientError::Transport(_))));
    assert_eq!(
        client.view.reconnects()[..4],
        [(1, 20), (2, 40), (3, 50), (4, 50)]
    );
    client.controller.on_disconnect_requested().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_cancels_pending_retry() {
    // テスト項目: 明示的な切断は予定済みの再接続を取り消し、以後再接続しない
    // given (前提条件):
    let policy = ReconnectPolicy {
        base: Duration::from_millis(200),
        cap: Duration::from_millis(200),
    };
    let client = client(&refused_base_url(), policy);
    let _ = client.controller.on_connect_requested("room1", "bob").await;
    assert!(client.controller.snapshot().retry_pending);

    // when (操作):
    client.controller.on_disconnect_requested().await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    // then (期待する結果):
    let snapshot = client.controller.snapshot();
    assert!(!snapshot.retry_pending);
    assert!(!snapshot.auto_reconnect);
    assert!(!snapshot.open);
    assert_eq!(snapshot.room, None);
    assert_eq!(client.view.connecting_count(), 1);
    assert!(!client.store.auto_reconnect());
    assert_eq!(
        client.view.events().last(),
        Some(&Event::Link(LinkState::Disconnected))
    );
}

#[tokio::test]
async fn test_auto_reconnect_off_cancels_pending_retry() {
    // テスト項目: 自動再接続を無効にすると予定済みの再接続が取り消される
    // given (前提条件):
    let policy = ReconnectPolicy {
        base: Duration::from_millis(200),
        cap: Duration::from_millis(200),
    };
    let client = client(&refused_base_url(), policy);
    let _ = client.controller.on_connect_requested("room1", "bob").await;

    // when (操作):
    client
        .controller
        .on_auto_reconnect_changed(false)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    // then (期待する結果):
    let snapshot = client.controller.snapshot();
    assert!(!snapshot.retry_pending);
    assert_eq!(snapshot.room.as_deref(), Some("room1"));
    assert_eq!(client.view.connecting_count(), 1);
}

#[tokio::test]
async fn test_blank_user_fails_validation_without_opening() {
    // テスト項目: user id が空の場合は検証エラーになりソケットを開かない
    // given (前提条件):
    let client = client(&refused_base_url(), fast_policy());

    // when (操作):
    let result = client.controller.on_connect_requested("room1", "").await;

    // then (期待する結果):
    assert_eq!(
        result,
        Err(ClientError::Validation("user id is required".to_string()))
    );
    assert_eq!(
        client.view.events(),
        vec![Event::Notice("user id is required".to_string())]
    );
    assert_eq!(client.controller.snapshot(), ConnectionSnapshot {
        auto_reconnect: true,
        ..ConnectionSnapshot::default()
    });
}

#[tokio::test]
async fn test_send_without_socket_is_not_connected() {
    // テスト項目: 接続していない状態での送信は NotConnected になり通知される
    // given (前提条件):
    let client = client(&refused_base_url(), fast_policy());

    // when (操作):
    let result = client.controller.on_send_requested("hello").await;

    // then (期待する結果):
    assert_eq!(result, Err(ClientError::NotConnected));
    assert_eq!(
        client.view.events(),
        vec![Event::Notice("not connected to a room".to_string())]
    );
}

#[tokio::test]
async fn test_non_json_frame_is_shown_verbatim_and_connection_stays_open() {
    // テスト項目: JSON でないフレームはそのまま表示され、接続は維持される
    // given (前提条件):
    let app = Router::new().route(
        "/ws/chat/{room}/{user}",
        get(|ws: WebSocketUpgrade| async move {
            ws.on_upgrade(|mut socket| async move {
                let _ = socket.send(Message::Text("not json".into())).await;
                while let Some(Ok(_)) = socket.recv().await {}
            })
        }),
    );
    let client = client(&serve(app).await, fast_policy());

    // when (操作):
    client
        .controller
        .on_connect_requested("room1", "bob")
        .await
        .unwrap();
    wait_until(|| !client.view.lines().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // then (期待する結果):
    assert_eq!(client.view.lines(), vec![ChatLine::system("not json")]);
    let snapshot = client.controller.snapshot();
    assert!(snapshot.open);
    assert_eq!(snapshot.reconnect_attempt, 0);
    assert!(client.controller.on_send_requested("still here").await.is_ok());
}

#[derive(Clone, Default)]
struct Hits(Arc<AtomicUsize>);

async fn flaky_handler(State(hits): State<Hits>, ws: WebSocketUpgrade) -> Response {
    match hits.0.fetch_add(1, Ordering::SeqCst) {
        0 | 1 => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        2 => ws.on_upgrade(|mut socket| async move {
            let _ = socket.send(Message::Close(None)).await;
        }),
        _ => ws.on_upgrade(|mut socket| async move {
            while let Some(Ok(_)) = socket.recv().await {}
        }),
    }
}

#[tokio::test]
async fn test_successful_open_resets_attempt_counter() {
    // テスト項目: 接続に成功すると再接続回数が 0 に戻り、次の切断では最短の待ち時間から再開する
    // given (前提条件): 最初の 2 回は拒否、3 回目は即切断、4 回目以降は維持するサーバー
    let hits = Hits::default();
    let app = Router::new()
        .route("/ws/chat/{room}/{user}", get(flaky_handler))
        .with_state(hits.clone());
    let client = client(&serve(app).await, fast_policy());

    // when (操作):
    let first = client.controller.on_connect_requested("room1", "bob").await;
    let snapshot = wait_for_snapshot(&client, |s| s.open && hits.0.load(Ordering::SeqCst) >= 4).await;

    // then (期待する結果):
    assert!(first.is_err());
    assert_eq!(snapshot.reconnect_attempt, 0);
    assert_eq!(client.view.reconnects(), vec![(1, 20), (2, 40), (1, 20)]);
    assert!(
        client
            .view
            .lines()
            .contains(&ChatLine::system("server closed the connection"))
    );
}

#[tokio::test]
async fn test_peer_message_round_trip_through_server() {
    // テスト項目: 送信者には自分の行だけ、相手には peer 行が 1 つ表示され、双方の履歴に保存される
    // given (前提条件):
    let base_url = start_chat_server().await;
    let alice = client(&base_url, fast_policy());
    let bob = client(&base_url, fast_policy());
    alice
        .controller
        .on_connect_requested("room1", "alice")
        .await
        .unwrap();
    bob.controller
        .on_connect_requested("room1", "bob")
        .await
        .unwrap();
    wait_until(|| {
        alice
            .view
            .lines()
            .contains(&ChatLine::system("bob joined the room"))
    })
    .await;

    // when (操作):
    alice.controller.on_send_requested("hi").await.unwrap();
    wait_until(|| bob.view.lines().iter().any(|l| l.kind == LineKind::Peer)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // then (期待する結果):
    let peer_lines: Vec<ChatLine> = bob
        .view
        .lines()
        .into_iter()
        .filter(|l| l.kind == LineKind::Peer)
        .collect();
    assert_eq!(peer_lines, vec![ChatLine::peer("alice", "hi")]);

    let alice_chat: Vec<ChatLine> = alice
        .view
        .lines()
        .into_iter()
        .filter(|l| l.kind != LineKind::System)
        .collect();
    assert_eq!(alice_chat, vec![ChatLine::own("alice", "hi")]);

    assert_eq!(alice.store.room_history("room1").len(), 1);
    assert_eq!(alice.store.room_history("room1")[0].kind, LineKind::Own);
    assert_eq!(bob.store.room_history("room1")[0].kind, LineKind::Peer);
    assert_eq!(
        alice.store.last_session(),
        Some(("room1".to_string(), "alice".to_string()))
    );
}

#[tokio::test]
async fn test_leave_is_announced_and_does_not_reconnect() {
    // テスト項目: 切断時に leave が送られて相手に通知され、切断した側は再接続しない
    // given (前提条件):
    let base_url = start_chat_server().await;
    let alice = client(&base_url, fast_policy());
    let bob = client(&base_url, fast_policy());
    alice
        .controller
        .on_connect_requested("room 1", "alice")
        .await
        .unwrap();
    bob.controller
        .on_connect_requested("room 1", "bob")
        .await
        .unwrap();
    wait_until(|| {
        alice
            .view
            .lines()
            .contains(&ChatLine::system("bob joined the room"))
    })
    .await;

    // when (操作):
    bob.controller.on_disconnect_requested().await.unwrap();
    wait_until(|| {
        alice
            .view
            .lines()
            .contains(&ChatLine::system("bob left the room"))
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // then (期待する結果):
    assert!(
        !alice
            .view
            .lines()
            .contains(&ChatLine::system("bob disconnected"))
    );
    assert_eq!(bob.view.connecting_count(), 1);
    assert!(bob.view.reconnects().is_empty());
    assert!(alice.controller.snapshot().open);
}

#[tokio::test]
async fn test_same_user_on_second_client_takes_over_without_flapping() {
    // テスト項目: 同じルーム・ユーザーで別クライアントが参加すると、古い側は再接続せずに切断状態で止まる
    // given (前提条件):
    let base_url = start_chat_server().await;
    let first = client(&base_url, fast_policy());
    let second = client(&base_url, fast_policy());
    first
        .controller
        .on_connect_requested("room1", "bob")
        .await
        .unwrap();

    // when (操作):
    second
        .controller
        .on_connect_requested("room1", "bob")
        .await
        .unwrap();
    let settled = wait_for_snapshot(&first, |s| !s.open).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    // then (期待する結果):
    assert!(!settled.retry_pending);
    assert!(first.view.reconnects().is_empty());
    assert_eq!(first.view.connecting_count(), 1);
    assert_eq!(
        first.view.events().last(),
        Some(&Event::Link(LinkState::Disconnected))
    );
    assert!(
        first
            .view
            .events()
            .iter()
            .any(|e| matches!(e, Event::Notice(text) if text.contains("opened elsewhere")))
    );
    assert!(first.controller.snapshot().auto_reconnect);
    assert_eq!(second.view.connecting_count(), 1);
    assert!(second.view.reconnects().is_empty());
    assert!(second.controller.snapshot().open);
}

#[tokio::test]
async fn test_blank_message_is_reported_and_text_is_sent_as_typed() {
    // テスト項目: 空白だけのメッセージは通知されて送信されず、それ以外は入力どおりに送信される
    // given (前提条件):
    let base_url = start_chat_server().await;
    let alice = client(&base_url, fast_policy());
    alice
        .controller
        .on_connect_requested("room1", "alice")
        .await
        .unwrap();

    // when (操作):
    let blank = alice.controller.on_send_requested("   ").await;
    let padded = alice.controller.on_send_requested(" hi ").await;

    // then (期待する結果):
    assert_eq!(
        blank,
        Err(ClientError::Validation("message is empty".to_string()))
    );
    assert!(padded.is_ok());
    assert!(
        alice
            .view
            .events()
            .contains(&Event::Notice("message is empty".to_string()))
    );
    let own: Vec<String> = alice
        .view
        .lines()
        .into_iter()
        .filter(|line| line.kind == LineKind::Own)
        .map(|line| line.content)
        .collect();
    assert_eq!(own, vec![" hi ".to_string()]);
    assert!(alice.controller.snapshot().open);
}

#[tokio::test]
async fn test_rejoin_replays_local_history() {
    // テスト項目: 再参加時にローカルに保存された履歴が再生される
    // given (前提条件):
    let base_url = start_chat_server().await;
    let alice = client(&base_url, fast_policy());
    alice
        .controller
        .on_connect_requested("room1", "alice")
        .await
        .unwrap();
    alice.controller.on_send_requested("first").await.unwrap();
    alice.controller.on_send_requested("second").await.unwrap();

    // when (操作):
    alice
        .controller
        .on_connect_requested("room1", "alice")
        .await
        .unwrap();

    // then (期待する結果):
    let replays: Vec<usize> = alice
        .view
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Replay(count) => Some(count),
            _ => None,
        })
        .collect();
    assert_eq!(replays, vec![0, 2]);
}

#[tokio::test]
async fn test_shutdown_stops_manager() {
    // テスト項目: shutdown 後の操作は Closed エラーになる
    // given (前提条件):
    let client = client(&refused_base_url(), fast_policy());

    // when (操作):
    client.controller.shutdown().await.unwrap();

    // then (期待する結果):
    assert_eq!(
        client.controller.on_send_requested("hi").await,
        Err(ClientError::Closed)
    );
}
