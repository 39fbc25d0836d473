//! 재연결되는 실시간 세션 소켓.
//!
//! `SessionTransport` 포트 구현. 연결당 하나의 감독 태스크가
//! 수신 디코딩, 하트비트, 재연결(선형 backoff)을 처리한다.
//! 수신 프레임은 도착 순서대로 `TransportEvent`로 전달된다.

use async_trait::async_trait;
use chrono::Utc;
use parley_core::config::AppConfig;
use parley_core::error::CoreError;
use parley_core::models::connection::{ConnectionState, ConnectionStatus};
use parley_core::models::frame::{ClientFrame, ServerFrame};
use parley_core::models::message::AudioClip;
use parley_core::models::session::SessionId;
use parley_core::ports::credentials::CredentialProvider;
use parley_core::ports::transport::{SessionTransport, TransportEvent, TransportFactory};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::connectivity::{ConnectionTracker, ReconnectDecision};
use crate::ws_client::{WsClient, WsMessage, WsSender};

/// 재연결/하트비트 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub heartbeat_interval: Duration,
}

impl SocketPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.transport.max_reconnect_attempts,
            base_delay: config.reconnect_base_delay(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }
}

impl Default for SocketPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default_config())
    }
}

/// 수신 루프 종료 사유
#[derive(Debug, PartialEq, Eq)]
enum LoopExit {
    /// 서버 종료 또는 에러: 재연결 대상
    Closed,
    /// `disconnect()` 호출
    Shutdown,
}

/// 감독 태스크 한 번의 실행
struct Run {
    generation: u64,
    shutdown: watch::Sender<bool>,
}

struct SocketShared {
    ws: WsClient,
    path: String,
    policy: SocketPolicy,
    tracker: ConnectionTracker,
    sender: Mutex<Option<WsSender>>,
    events: mpsc::Sender<TransportEvent>,
    /// 현재 실행. `disconnect()`가 즉시 비운다.
    run: Mutex<Option<Run>>,
    generations: AtomicU64,
}

/// 세션 범위 소켓: 하나의 세션 뷰가 독점 소유한다
pub struct SessionSocket {
    shared: Arc<SocketShared>,
}

impl SessionSocket {
    /// 새 소켓 생성 (연결은 `connect()`에서)
    pub fn new(
        base_url: &str,
        session_id: &SessionId,
        credentials: Arc<dyn CredentialProvider>,
        policy: SocketPolicy,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(SocketShared {
                ws: WsClient::new(base_url, credentials),
                path: format!("/ws/training/{session_id}"),
                policy,
                tracker: ConnectionTracker::new(policy.max_attempts, policy.base_delay),
                sender: Mutex::new(None),
                events,
                run: Mutex::new(None),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// 이벤트 수신기와 함께 생성
    pub fn channel(
        base_url: &str,
        session_id: &SessionId,
        credentials: Arc<dyn CredentialProvider>,
        policy: SocketPolicy,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self::new(base_url, session_id, credentials, policy, tx),
            rx,
        )
    }

    /// 연결 상태 변경 구독
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.tracker.subscribe()
    }

    async fn send_frame(&self, frame: ClientFrame) -> Result<(), CoreError> {
        let sender = self.shared.sender.lock().clone();
        let sender = sender.ok_or(CoreError::NotConnected)?;
        trace!("프레임 전송: {}", frame.kind());
        sender.send_text(frame.encode(Utc::now())?).await
    }

    fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }
}

impl SocketShared {
    async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            debug!("전송 이벤트 수신자 없음");
        }
    }

    /// `generation` 실행이 아직 현재 실행인지
    fn owns(&self, generation: u64) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|run| run.generation == generation)
    }

    /// 스스로 끝난 실행(재시도 소진)의 핸들 정리
    fn release(&self, generation: u64) {
        let mut run = self.run.lock();
        if run.as_ref().is_some_and(|r| r.generation == generation) {
            *run = None;
        }
    }

    /// 감독 루프: 연결 → 수신 → (예기치 않은 종료 시) 재연결
    async fn supervise(self: Arc<Self>, generation: u64, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.tracker.mark_connecting();
            let connected = tokio::select! {
                result = self.ws.connect(&self.path) => result,
                _ = shutdown.changed() => break,
            };

            match connected {
                Ok((sender, rx)) => {
                    if *shutdown.borrow() {
                        if let Err(e) = sender.close().await {
                            debug!("소켓 종료 프레임 전송 실패: {e}");
                        }
                        break;
                    }
                    *self.sender.lock() = Some(sender.clone());
                    self.tracker.mark_connected();
                    self.emit(TransportEvent::Connected).await;

                    let exit = self.pump(&sender, rx, &mut shutdown).await;
                    if exit == LoopExit::Shutdown {
                        break;
                    }
                    if self.owns(generation) {
                        *self.sender.lock() = None;
                    }
                    info!("세션 소켓이 예기치 않게 닫힘");
                }
                Err(e) => warn!("세션 소켓 연결 실패: {e}"),
            }

            if *shutdown.borrow() {
                break;
            }

            match self.tracker.record_unexpected_close() {
                ReconnectDecision::Retry { attempt, delay } => {
                    self.emit(TransportEvent::Reconnecting {
                        attempt,
                        max_attempts: self.policy.max_attempts,
                    })
                    .await;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                ReconnectDecision::GiveUp { .. } => {
                    self.release(generation);
                    self.emit(TransportEvent::Disconnected { will_retry: false })
                        .await;
                    return;
                }
            }
        }

        // 종료 상태 반영은 disconnect()가 이미 했다
        debug!("세션 소켓 감독 루프 종료 (실행 {generation})");
    }

    /// 연결 하나의 수신/하트비트 루프. 하트비트 타이머는 이 루프와 함께 사라진다.
    async fn pump(
        &self,
        sender: &WsSender,
        mut rx: mpsc::Receiver<WsMessage>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> LoopExit {
        let mut heartbeat = tokio::time::interval(self.policy.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(WsMessage::Text(raw)) => self.dispatch(&raw).await,
                    Some(WsMessage::Binary(data)) => {
                        debug!("바이너리 프레임 무시 ({} bytes)", data.len());
                    }
                    Some(WsMessage::Close) | None => return LoopExit::Closed,
                },
                _ = heartbeat.tick() => {
                    let ping = ClientFrame::Ping.encode(Utc::now());
                    match ping {
                        Ok(raw) => {
                            if let Err(e) = sender.send_text(raw).await {
                                warn!("하트비트 전송 실패: {e}");
                            }
                        }
                        Err(e) => warn!("하트비트 인코딩 실패: {e}"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        if let Err(e) = sender.close().await {
                            debug!("소켓 종료 프레임 전송 실패: {e}");
                        }
                        return LoopExit::Shutdown;
                    }
                }
            }
        }
    }

    /// 수신 프레임 디코딩 및 전달. 잘못된 프레임은 버린다.
    async fn dispatch(&self, raw: &str) {
        match ServerFrame::decode(raw) {
            Ok(ServerFrame::Pong) => trace!("pong"),
            Ok(frame) => {
                debug!("프레임 수신: {}", frame.kind());
                self.emit(TransportEvent::Frame(frame)).await;
            }
            Err(e) => warn!("잘못된 프레임 무시: {e}"),
        }
    }
}

#[async_trait]
impl SessionTransport for SessionSocket {
    async fn connect(&self) -> Result<(), CoreError> {
        let (generation, shutdown) = {
            let mut run = self.shared.run.lock();
            if run.is_some() {
                debug!("이미 연결 중: connect 무시");
                return Ok(());
            }
            let generation = self.shared.generations.fetch_add(1, Ordering::SeqCst) + 1;
            let (shutdown, rx) = watch::channel(false);
            *run = Some(Run {
                generation,
                shutdown,
            });
            (generation, rx)
        };

        // 소진 후 수동 재시도는 카운터를 새로 시작
        if self.shared.tracker.state().is_exhausted() {
            self.shared.tracker.mark_disconnected();
        }
        tokio::spawn(self.shared.clone().supervise(generation, shutdown));
        Ok(())
    }

    async fn send_user_message(
        &self,
        text: Option<String>,
        audio: Option<AudioClip>,
    ) -> Result<(), CoreError> {
        if !self.is_connected() {
            self.shared
                .emit(TransportEvent::Error(
                    "실시간 연결이 없어 메시지를 보낼 수 없음".to_string(),
                ))
                .await;
            return Err(CoreError::NotConnected);
        }
        self.send_frame(ClientFrame::UserMessage { text, audio }).await
    }

    async fn end_session(&self) -> Result<(), CoreError> {
        if !self.is_connected() {
            debug!("연결 없음: end_session 무시");
            return Ok(());
        }
        self.send_frame(ClientFrame::EndSession).await
    }

    fn disconnect(&self) {
        let Some(run) = self.shared.run.lock().take() else {
            return;
        };
        run.shutdown.send_replace(true);
        *self.shared.sender.lock() = None;
        self.shared.tracker.mark_disconnected();
        info!("세션 소켓 연결 해제");
    }

    /// 송신 핸들이 없으면 `Connected`로 보고하지 않는다
    fn connection_state(&self) -> ConnectionState {
        let mut state = self.shared.tracker.state();
        if state.is_connected() && self.shared.sender.lock().is_none() {
            state.status = ConnectionStatus::Connecting;
        }
        state
    }
}

impl Drop for SessionSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// 세션마다 새 `SessionSocket`을 여는 팩토리
pub struct SocketFactory {
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    policy: SocketPolicy,
}

impl SocketFactory {
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
        policy: SocketPolicy,
    ) -> Self {
        Self {
            base_url: base_url.to_string(),
            credentials,
            policy,
        }
    }
}

impl TransportFactory for SocketFactory {
    fn open(
        &self,
        session_id: &SessionId,
        events: mpsc::Sender<TransportEvent>,
    ) -> Arc<dyn SessionTransport> {
        Arc::new(SessionSocket::new(
            &self.base_url,
            session_id,
            self.credentials.clone(),
            self.policy,
            events,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parley_core::ports::credentials::StaticToken;

    fn unreachable_socket(
        policy: SocketPolicy,
    ) -> (SessionSocket, mpsc::Receiver<TransportEvent>) {
        SessionSocket::channel(
            "http://127.0.0.1:1",
            &SessionId::new("42"),
            Arc::new(StaticToken::new("tok")),
            policy,
            64,
        )
    }

    #[tokio::test]
    async fn reconnect_attempts_are_bounded() {
        let policy = SocketPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            heartbeat_interval: Duration::from_secs(30),
        };
        let (socket, mut rx) = unreachable_socket(policy);
        socket.connect().await.unwrap();

        let mut attempts = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("이벤트 대기 타임아웃")
                .expect("채널 닫힘");
            match event {
                TransportEvent::Reconnecting {
                    attempt,
                    max_attempts,
                } => {
                    assert_eq!(max_attempts, 3);
                    attempts.push(attempt);
                }
                TransportEvent::Disconnected { will_retry: false } => break,
                other => panic!("예상치 못한 이벤트: {other:?}"),
            }
        }

        assert_eq!(attempts, vec![1, 2, 3]);
        assert!(socket.connection_state().is_exhausted());
        // 최종 끊김 이후 추가 시도 없음
        let extra = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn disconnect_suppresses_reconnect() {
        let policy = SocketPolicy {
            max_attempts: 50,
            base_delay: Duration::from_millis(300),
            heartbeat_interval: Duration::from_secs(30),
        };
        let (socket, mut rx) = unreachable_socket(policy);
        socket.connect().await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_matches!(first, TransportEvent::Reconnecting { attempt: 1, .. });

        socket.disconnect();
        assert_eq!(socket.connection_state().status, ConnectionStatus::Disconnected);

        let next = tokio::time::timeout(Duration::from_millis(800), rx.recv()).await;
        assert!(next.is_err(), "disconnect 이후 이벤트: {next:?}");
    }

    #[tokio::test]
    async fn connect_right_after_disconnect_starts_new_run() {
        let policy = SocketPolicy {
            max_attempts: 50,
            base_delay: Duration::from_millis(300),
            heartbeat_interval: Duration::from_secs(30),
        };
        let (socket, mut rx) = unreachable_socket(policy);
        socket.connect().await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_matches!(first, TransportEvent::Reconnecting { attempt: 1, .. });

        // 이전 감독 태스크가 아직 backoff 대기 중일 때 다시 연결
        socket.disconnect();
        socket.connect().await.unwrap();

        let next = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("새 실행의 재연결 이벤트 없음")
            .unwrap();
        assert_matches!(next, TransportEvent::Reconnecting { attempt: 1, .. });
        assert_ne!(socket.connection_state().status, ConnectionStatus::Disconnected);

        socket.disconnect();
        assert_eq!(socket.connection_state().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn tracker_connected_without_sender_is_not_connected() {
        let (socket, mut rx) = unreachable_socket(SocketPolicy::default());
        socket.shared.tracker.mark_connected();

        let state = socket.connection_state();
        assert!(!state.is_connected());
        assert_eq!(state.status, ConnectionStatus::Connecting);

        // 연결 여부 판단이 전송 경로와 같으므로 호출 측은 미리 fallback을 고른다
        let err = socket
            .send_user_message(Some("allô".into()), None)
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::NotConnected);
        assert_matches!(rx.try_recv(), Ok(TransportEvent::Error(_)));
    }

    #[tokio::test]
    async fn send_while_disconnected_reports_error() {
        let (socket, mut rx) = unreachable_socket(SocketPolicy::default());

        let err = socket
            .send_user_message(Some("allô".into()), None)
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::NotConnected);
        assert_matches!(rx.recv().await, Some(TransportEvent::Error(_)));

        // end_session은 연결이 없으면 no-op
        assert!(socket.end_session().await.is_ok());
    }

    #[tokio::test]
    async fn factory_opens_disconnected_socket() {
        let factory = SocketFactory::new(
            "http://127.0.0.1:1",
            Arc::new(StaticToken::new("tok")),
            SocketPolicy::default(),
        );
        let (tx, _rx) = mpsc::channel(4);
        let transport = factory.open(&SessionId::new("7"), tx);
        assert_eq!(
            transport.connection_state().status,
            ConnectionStatus::Disconnected
        );
        assert_eq!(transport.connection_state().max_attempts, 5);
    }

    #[test]
    fn policy_from_config() {
        let mut config = AppConfig::default_config();
        config.transport.max_reconnect_attempts = 7;
        config.transport.reconnect_base_delay_ms = 250;
        let policy = SocketPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.heartbeat_interval, Duration::from_secs(30));
    }
}
