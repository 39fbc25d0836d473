//! 세션 소켓 통합 테스트
//!
//! Axum WebSocket mock 서버로 실제 연결/재연결/하트비트를 검증한다.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use parley_core::models::connection::ConnectionStatus;
use parley_core::models::frame::ServerFrame;
use parley_core::models::session::SessionId;
use parley_core::ports::credentials::StaticToken;
use parley_core::ports::transport::{SessionTransport, TransportEvent};
use parley_network::session_socket::{SessionSocket, SocketPolicy};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const TOKEN: &str = "jwt-test";

/// Mock 서버 상태
#[derive(Default)]
struct MockState {
    connections: AtomicU32,
    pings: AtomicU32,
    /// 첫 연결을 `connected` 직후 끊는다
    drop_first: bool,
    /// ping을 이만큼 받으면 서버가 연결을 닫는다
    close_after_pings: Option<u32>,
    received: Mutex<Vec<serde_json::Value>>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<Arc<MockState>>,
) -> Response {
    if query.get("token").map(String::as_str) != Some(TOKEN) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, id, state))
}

async fn send_json(socket: &mut WebSocket, value: serde_json::Value) -> bool {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .is_ok()
}

async fn handle_socket(mut socket: WebSocket, id: String, state: Arc<MockState>) {
    let connection = state.connections.fetch_add(1, Ordering::SeqCst) + 1;

    send_json(
        &mut socket,
        serde_json::json!({"type": "connected", "session_id": id, "gauge": 50, "mood": "neutral"}),
    )
    .await;

    if state.drop_first && connection == 1 {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    // 잘못된 프레임은 클라이언트가 버려야 한다
    let _ = socket.send(Message::Text("{not json".into())).await;
    send_json(&mut socket, serde_json::json!({"type": "mystery"})).await;

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
            continue;
        };
        state.received.lock().push(value.clone());

        match value["type"].as_str() {
            Some("ping") => {
                let pings = state.pings.fetch_add(1, Ordering::SeqCst) + 1;
                send_json(&mut socket, serde_json::json!({"type": "pong"})).await;
                if state.close_after_pings.is_some_and(|limit| pings >= limit) {
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
            }
            Some("user_message") => {
                let said = value["text"].as_str().unwrap_or_default().to_string();
                send_json(&mut socket, serde_json::json!({"type": "prospect_thinking"})).await;
                send_json(
                    &mut socket,
                    serde_json::json!({
                        "type": "prospect_response",
                        "message_id": "srv-1",
                        "text": format!("Vous dites: {said}"),
                        "gauge": 56,
                        "gauge_delta": 6,
                        "mood": "curious",
                    }),
                )
                .await;
            }
            Some("end_session") => {
                send_json(
                    &mut socket,
                    serde_json::json!({
                        "type": "session_ended",
                        "evaluation": {"final_gauge": 56, "converted": false,
                                       "strengths": ["écoute"], "improvements": []},
                    }),
                )
                .await;
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
            _ => {}
        }
    }
}

async fn spawn_server(state: Arc<MockState>) -> SocketAddr {
    let app = Router::new()
        .route("/ws/training/{id}", get(ws_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn policy(max_attempts: u32, heartbeat: Duration) -> SocketPolicy {
    SocketPolicy {
        max_attempts,
        base_delay: Duration::from_millis(200),
        heartbeat_interval: heartbeat,
    }
}

fn socket_for(
    addr: SocketAddr,
    token: &str,
    policy: SocketPolicy,
) -> (SessionSocket, mpsc::Receiver<TransportEvent>) {
    SessionSocket::channel(
        &format!("http://{addr}"),
        &SessionId::new("42"),
        Arc::new(StaticToken::new(token)),
        policy,
        64,
    )
}

async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("이벤트 대기 타임아웃")
        .expect("이벤트 채널 닫힘")
}

async fn expect_connected(rx: &mut mpsc::Receiver<TransportEvent>) {
    assert_eq!(next_event(rx).await, TransportEvent::Connected);
    match next_event(rx).await {
        TransportEvent::Frame(ServerFrame::Connected(ack)) => {
            assert_eq!(ack.gauge, 50);
            assert_eq!(ack.session_id, Some(SessionId::new("42")));
        }
        other => panic!("connected 프레임 예상: {other:?}"),
    }
}

#[tokio::test]
async fn full_conversation_roundtrip() {
    let state = Arc::new(MockState::default());
    let addr = spawn_server(state.clone()).await;
    let (socket, mut rx) = socket_for(addr, TOKEN, policy(3, Duration::from_secs(30)));

    socket.connect().await.unwrap();
    // 두 번째 connect는 no-op
    socket.connect().await.unwrap();
    expect_connected(&mut rx).await;
    assert!(socket.connection_state().is_connected());

    socket
        .send_user_message(Some("Bonjour".into()), None)
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        TransportEvent::Frame(ServerFrame::ProspectThinking)
    );
    match next_event(&mut rx).await {
        TransportEvent::Frame(ServerFrame::ProspectResponse(resp)) => {
            assert_eq!(resp.text, "Vous dites: Bonjour");
            assert_eq!(resp.gauge_delta, 6);
        }
        other => panic!("prospect_response 예상: {other:?}"),
    }

    socket.end_session().await.unwrap();
    match next_event(&mut rx).await {
        TransportEvent::Frame(ServerFrame::SessionEnded(ended)) => {
            assert_eq!(ended.evaluation.final_gauge, 56);
            assert_eq!(ended.evaluation.strengths, vec!["écoute".to_string()]);
        }
        other => panic!("session_ended 예상: {other:?}"),
    }
    socket.disconnect();
    assert_eq!(
        socket.connection_state().status,
        ConnectionStatus::Disconnected
    );

    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
    let received = state.received.lock().clone();
    let user = received
        .iter()
        .find(|v| v["type"] == "user_message")
        .expect("user_message 미수신");
    assert_eq!(user["text"], "Bonjour");
    assert!(user["timestamp"].is_string());
}

#[tokio::test]
async fn heartbeat_pings_and_swallows_pongs() {
    let state = Arc::new(MockState::default());
    let addr = spawn_server(state.clone()).await;
    let (socket, mut rx) = socket_for(addr, TOKEN, policy(3, Duration::from_millis(40)));

    socket.connect().await.unwrap();
    expect_connected(&mut rx).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(state.pings.load(Ordering::SeqCst) >= 2);

    // pong과 잘못된 프레임은 상위로 올라오지 않는다
    assert!(rx.try_recv().is_err());
    socket.disconnect();
}

#[tokio::test]
async fn heartbeat_stops_after_disconnect() {
    let state = Arc::new(MockState::default());
    let addr = spawn_server(state.clone()).await;
    let (socket, mut rx) = socket_for(addr, TOKEN, policy(3, Duration::from_millis(40)));

    socket.connect().await.unwrap();
    expect_connected(&mut rx).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    socket.disconnect();

    // 전송 중이던 ping이 도착할 시간
    tokio::time::sleep(Duration::from_millis(100)).await;
    let pings = state.pings.load(Ordering::SeqCst);
    assert!(pings >= 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(state.pings.load(Ordering::SeqCst), pings);
}

#[tokio::test]
async fn heartbeat_stops_when_server_closes() {
    let state = Arc::new(MockState {
        close_after_pings: Some(2),
        ..MockState::default()
    });
    let addr = spawn_server(state.clone()).await;
    // 재연결 없이 바로 최종 끊김
    let (socket, mut rx) = socket_for(addr, TOKEN, policy(0, Duration::from_millis(40)));

    socket.connect().await.unwrap();
    expect_connected(&mut rx).await;
    assert_eq!(
        next_event(&mut rx).await,
        TransportEvent::Disconnected { will_retry: false }
    );
    assert_eq!(state.pings.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(state.pings.load(Ordering::SeqCst), 2);
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
    assert!(!socket.connection_state().is_connected());
}

#[tokio::test]
async fn reconnect_after_disconnect_opens_new_connection() {
    let state = Arc::new(MockState::default());
    let addr = spawn_server(state.clone()).await;
    let (socket, mut rx) = socket_for(addr, TOKEN, policy(3, Duration::from_secs(30)));

    socket.connect().await.unwrap();
    expect_connected(&mut rx).await;

    socket.disconnect();
    socket.connect().await.unwrap();
    expect_connected(&mut rx).await;

    assert!(socket.connection_state().is_connected());
    assert_eq!(state.connections.load(Ordering::SeqCst), 2);
    socket.disconnect();
}

#[tokio::test]
async fn reconnects_after_unexpected_close() {
    let state = Arc::new(MockState {
        drop_first: true,
        ..MockState::default()
    });
    let addr = spawn_server(state.clone()).await;
    let (socket, mut rx) = socket_for(addr, TOKEN, policy(3, Duration::from_secs(30)));

    socket.connect().await.unwrap();
    expect_connected(&mut rx).await;

    assert_eq!(
        next_event(&mut rx).await,
        TransportEvent::Reconnecting {
            attempt: 1,
            max_attempts: 3
        }
    );
    expect_connected(&mut rx).await;

    let connection = socket.connection_state();
    assert!(connection.is_connected());
    assert_eq!(connection.reconnect_attempts, 0);
    assert_eq!(state.connections.load(Ordering::SeqCst), 2);
    socket.disconnect();
}

#[tokio::test]
async fn rejected_token_exhausts_retries() {
    let state = Arc::new(MockState::default());
    let addr = spawn_server(state.clone()).await;
    let (socket, mut rx) = socket_for(addr, "wrong", policy(2, Duration::from_secs(30)));

    socket.connect().await.unwrap();

    let mut attempts = Vec::new();
    loop {
        match next_event(&mut rx).await {
            TransportEvent::Reconnecting { attempt, .. } => attempts.push(attempt),
            TransportEvent::Disconnected { will_retry: false } => break,
            other => panic!("예상치 못한 이벤트: {other:?}"),
        }
    }
    assert_eq!(attempts, vec![1, 2]);
    assert_eq!(state.connections.load(Ordering::SeqCst), 0);
    assert!(socket.connection_state().is_exhausted());
}
