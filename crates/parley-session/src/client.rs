//! 세션 클라이언트.
//!
//! 부트스트랩, 전송 경로 선택(실시간 소켓 또는 HTTP fallback), 종료/리포트를
//! 하나의 API로 묶는다. 상태 변경은 모두 `SessionStore` 리듀서를 거치고,
//! 변경 알림은 `broadcast`로 구독자에게 전달된다.

use parking_lot::Mutex;
use parley_core::config::AppConfig;
use parley_core::error::CoreError;
use parley_core::models::connection::ConnectionState;
use parley_core::models::frame::ServerFrame;
use parley_core::models::session::{SessionId, SessionRequest, UserInput};
use parley_core::models::summary::{SessionReport, SessionSummary};
use parley_core::ports::session_api::SessionApi;
use parley_core::ports::transport::{SessionTransport, TransportEvent, TransportFactory};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::lifecycle::Lifecycle;
use crate::overlays::OverlayKind;
use crate::store::{SessionAction, SessionStore, SessionUpdate};

/// 클라이언트 동작 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// 응답 대기 한도 (푸시/HTTP 공통)
    pub response_timeout: Duration,
    /// 전송 이벤트/업데이트 채널 용량
    pub event_buffer: usize,
}

impl ClientSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            response_timeout: config.response_timeout(),
            event_buffer: config.session.event_buffer,
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.response_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default_config())
    }
}

struct Shared {
    api: Arc<dyn SessionApi>,
    transport: Arc<dyn SessionTransport>,
    session_id: SessionId,
    settings: ClientSettings,
    store: Mutex<SessionStore>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl Shared {
    /// 리듀서 적용 후 변경 알림 발행. 락은 리듀서 호출 동안만 잡는다.
    fn dispatch(&self, action: SessionAction) -> Vec<SessionUpdate> {
        let updates = self.store.lock().apply(action);
        self.publish(&updates);
        updates
    }

    fn publish(&self, updates: &[SessionUpdate]) {
        for update in updates {
            // 구독자가 없으면 무시
            let _ = self.updates.send(update.clone());
        }
    }

    fn sync_connection(&self) {
        self.dispatch(SessionAction::Connection(self.transport.connection_state()));
    }

    /// 전송 이벤트를 도착 순서대로 스토어에 반영
    async fn run_events(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("전송 이벤트 루프 종료");
    }

    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => {
                let ended = matches!(frame, ServerFrame::SessionEnded(_));
                self.dispatch(SessionAction::Frame(frame));
                if ended {
                    self.transport.disconnect();
                    self.sync_connection();
                }
            }
            TransportEvent::Error(message) => {
                self.dispatch(SessionAction::TransportError(message));
            }
            TransportEvent::Connected
            | TransportEvent::Reconnecting { .. }
            | TransportEvent::Disconnected { .. } => self.sync_connection(),
        }
    }
}

/// 세션 하나를 조정하는 클라이언트
///
/// 전송을 독점 소유하며, drop되면 전송을 동기적으로 끊는다.
pub struct SessionClient {
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("session_id", &self.shared.session_id)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// 세션 부트스트랩 후 실시간 연결 시작
    ///
    /// 쿼터/구독 한도는 `SessionError::UpgradeRequired`로 돌아온다.
    /// 부트스트랩은 자동 재시도하지 않는다.
    pub async fn start(
        api: Arc<dyn SessionApi>,
        transports: &dyn TransportFactory,
        request: &SessionRequest,
        settings: ClientSettings,
    ) -> Result<Self, SessionError> {
        let mut store = SessionStore::new();
        store.apply(SessionAction::Starting);
        info!(
            "세션 시작: skill={} level={}",
            request.skill_id, request.level
        );

        let bootstrap = match api.bootstrap(request).await {
            Ok(bootstrap) => bootstrap,
            Err(e) => {
                warn!("세션 부트스트랩 실패: {e}");
                store.apply(SessionAction::BootstrapFailed(e.to_string()));
                return Err(e.into());
            }
        };

        let session_id = bootstrap.session_id.clone();
        store.apply(SessionAction::Bootstrapped(Box::new(bootstrap)));

        let (event_tx, event_rx) = mpsc::channel(settings.event_buffer);
        let transport = transports.open(&session_id, event_tx);
        let (updates, _) = broadcast::channel(settings.event_buffer);

        let shared = Arc::new(Shared {
            api,
            transport,
            session_id,
            settings,
            store: Mutex::new(store),
            updates,
        });
        let pump = tokio::spawn(shared.clone().run_events(event_rx));

        if let Err(e) = shared.transport.connect().await {
            // 연결이 없어도 HTTP fallback으로 진행 가능
            warn!("실시간 연결 시작 실패: {e}");
        }

        Ok(Self { shared, pump })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.shared.session_id
    }

    /// 변경 알림 구독
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.shared.updates.subscribe()
    }

    /// 현재 상태 스냅샷
    pub fn snapshot(&self) -> SessionStore {
        self.shared.store.lock().clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.store.lock().lifecycle()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.transport.connection_state()
    }

    /// 준비 확인. `active`가 되었으면 `true`
    pub fn confirm_ready(&self) -> bool {
        self.shared.dispatch(SessionAction::ConfirmReady);
        self.lifecycle() == Lifecycle::Active
    }

    pub fn dismiss(&self, kind: OverlayKind) {
        self.shared.dispatch(SessionAction::Dismiss(kind));
    }

    /// 사용자 입력 전송
    ///
    /// 사용자 항목은 즉시 추가된다. 연결돼 있으면 소켓으로, 아니면 HTTP로 보낸다.
    /// 어느 경로의 실패든 같은 `SessionUpdate::Error`로 드러난다.
    pub async fn send(&self, input: UserInput) -> Result<(), SessionError> {
        let input = input.validated().map_err(|_| SessionError::EmptyInput)?;

        let (send_id, updates) = self.shared.store.lock().begin_send(input.clone())?;
        self.shared.publish(&updates);

        if self.shared.transport.connection_state().is_connected() {
            match self
                .shared
                .transport
                .send_user_message(input.text.clone(), input.audio.clone())
                .await
            {
                Ok(()) => {
                    self.arm_response_timeout(send_id);
                    return Ok(());
                }
                Err(CoreError::NotConnected) => {
                    debug!("전송 직전 연결 끊김: HTTP fallback");
                }
                Err(e) => return Err(self.fail_send(e.into())),
            }
        }

        self.send_via_http(&input).await
    }

    async fn send_via_http(&self, input: &UserInput) -> Result<(), SessionError> {
        info!("실시간 연결 없음: HTTP로 메시지 전송");
        let settings = self.shared.settings;
        let exchange = tokio::time::timeout(
            settings.response_timeout,
            self.shared
                .api
                .send_message(&self.shared.session_id, input),
        )
        .await;

        match exchange {
            Ok(Ok(exchange)) => {
                let ended = exchange.session_ended.is_some();
                self.shared.dispatch(SessionAction::Exchange(exchange));
                if ended {
                    self.shared.transport.disconnect();
                    self.shared.sync_connection();
                }
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail_send(e.into())),
            Err(_) => Err(self.fail_send(SessionError::ResponseTimeout {
                timeout_ms: settings.timeout_ms(),
            })),
        }
    }

    fn fail_send(&self, err: SessionError) -> SessionError {
        warn!("메시지 전송 실패: {err}");
        self.shared
            .dispatch(SessionAction::SendFailed(err.to_string()));
        err
    }

    /// 푸시 경로 응답 타임아웃 타이머
    fn arm_response_timeout(&self, send_id: u64) {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let settings = self.shared.settings;
        tokio::spawn(async move {
            tokio::time::sleep(settings.response_timeout).await;
            if let Some(shared) = shared.upgrade() {
                shared.dispatch(SessionAction::ResponseTimedOut {
                    send_id,
                    timeout_ms: settings.timeout_ms(),
                });
            }
        });
    }

    /// 명시적 종료
    ///
    /// 연결돼 있을 때만 가능하다. 종료 프레임을 보낸 뒤 서버의
    /// `session_ended` 푸시를 기다려 요약을 돌려준다.
    pub async fn end(&self) -> Result<SessionSummary, SessionError> {
        let mut updates = self.subscribe();

        if self.lifecycle().is_terminal() {
            return Err(SessionError::AlreadyEnded);
        }
        if !self.shared.transport.connection_state().is_connected() {
            return Err(SessionError::NotConnected);
        }

        info!("세션 종료 요청: {}", self.shared.session_id);
        self.shared.transport.end_session().await?;

        let settings = self.shared.settings;
        let wait = async {
            loop {
                match updates.recv().await {
                    Ok(SessionUpdate::Ended(summary)) => return Ok(summary),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("업데이트 {skipped}개 건너뜀");
                        let summary = self.shared.store.lock().summary().cloned();
                        if let Some(summary) = summary {
                            return Ok(summary);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(SessionError::Core(CoreError::Internal(
                            "업데이트 채널 닫힘".to_string(),
                        )))
                    }
                }
            }
        };

        match tokio::time::timeout(settings.response_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::ResponseTimeout {
                timeout_ms: settings.timeout_ms(),
            }),
        }
    }

    /// 종료된 세션의 상세 리포트
    pub async fn fetch_report(&self) -> Result<SessionReport, SessionError> {
        let lifecycle = self.lifecycle();
        if !lifecycle.is_terminal() {
            return Err(SessionError::NotEnded(lifecycle));
        }
        Ok(self.shared.api.fetch_report(&self.shared.session_id).await?)
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.shared.transport.disconnect();
        self.pump.abort();
        debug!("세션 클라이언트 해제: {}", self.shared.session_id);
    }
}
