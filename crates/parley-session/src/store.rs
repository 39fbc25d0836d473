//! 세션 상태 스토어.
//!
//! 서버 푸시 프레임과 로컬 액션을 하나의 트랜스크립트/게이지/연결 뷰로 합치는
//! 리듀서. 모든 변경은 `apply()`를 거치며, 변경마다 UI가 그릴
//! `SessionUpdate` 목록을 돌려준다.
//!
//! 불변식:
//! - 트랜스크립트는 추가만 된다 (도착 순서 유지, 정렬하지 않음).
//! - 게이지는 서버가 알린 값/델타만 반영한다.
//! - `ended` 이후에는 트랜스크립트, 게이지, 요약이 바뀌지 않는다.

use parley_core::models::connection::ConnectionState;
use parley_core::models::frame::{MessageExchange, ProspectResponse, ServerFrame};
use parley_core::models::gauge::{GaugeState, Mood};
use parley_core::models::message::{MessageId, TranscriptEntry};
use parley_core::models::session::{LevelConfig, Persona, SessionBootstrap, SessionId, UserInput};
use parley_core::models::summary::{Evaluation, SessionSummary};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::lifecycle::Lifecycle;
use crate::overlays::{Overlay, OverlayKind, Overlays};

/// 리듀서 입력
#[derive(Debug, Clone)]
pub enum SessionAction {
    /// 부트스트랩 요청 시작
    Starting,
    Bootstrapped(Box<SessionBootstrap>),
    /// 부트스트랩 실패: 다시 시도 가능하도록 `idle`로
    BootstrapFailed(String),
    /// 준비 확인 (`preparing → active`)
    ConfirmReady,
    /// 낙관적 사용자 메시지 추가
    LocalUserMessage(UserInput),
    /// 전송 계층에서 온 서버 프레임
    Frame(ServerFrame),
    /// HTTP fallback 교환 결과: 푸시와 같은 변경
    Exchange(MessageExchange),
    /// 전송 실패 (어느 경로든)
    SendFailed(String),
    /// 푸시 응답 타임아웃
    ResponseTimedOut { send_id: u64, timeout_ms: u64 },
    Connection(ConnectionState),
    TransportError(String),
    Dismiss(OverlayKind),
}

/// UI로 내보내는 변경 알림
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Lifecycle(Lifecycle),
    EntryAppended(TranscriptEntry),
    Gauge(GaugeState),
    Thinking(bool),
    OverlayShown(Overlay),
    OverlayDismissed(OverlayKind),
    Connection(ConnectionState),
    Error(String),
    Ended(SessionSummary),
}

/// 세션 하나의 클라이언트 측 상태
#[derive(Debug, Clone)]
pub struct SessionStore {
    lifecycle: Lifecycle,
    session_id: Option<SessionId>,
    persona: Persona,
    scenario: Option<String>,
    config: LevelConfig,
    transcript: Vec<TranscriptEntry>,
    gauge: GaugeState,
    starting_gauge: i32,
    connection: ConnectionState,
    overlays: Overlays,
    thinking: bool,
    pending_send: Option<u64>,
    next_send_id: u64,
    summary: Option<SessionSummary>,
    last_error: Option<String>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            session_id: None,
            persona: Persona::default(),
            scenario: None,
            config: LevelConfig::default(),
            transcript: Vec::new(),
            gauge: GaugeState::new(0, Mood::Neutral),
            starting_gauge: 0,
            connection: ConnectionState::default(),
            overlays: Overlays::default(),
            thinking: false,
            pending_send: None,
            next_send_id: 0,
            summary: None,
            last_error: None,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn gauge(&self) -> &GaugeState {
        &self.gauge
    }

    pub fn starting_gauge(&self) -> i32 {
        self.starting_gauge
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn overlays(&self) -> &Overlays {
        &self.overlays
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    /// 응답을 기다리는 전송 ID
    pub fn pending_send(&self) -> Option<u64> {
        self.pending_send
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// 전송 가능 여부 검사
    pub fn ensure_can_send(&self) -> Result<(), SessionError> {
        match self.lifecycle {
            Lifecycle::Active => {}
            Lifecycle::Ended => return Err(SessionError::AlreadyEnded),
            other => return Err(SessionError::NotActive(other)),
        }
        if self.pending_send.is_some() || self.thinking {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    /// 검사 후 낙관적 추가. 새 전송 ID와 변경 목록을 반환
    pub fn begin_send(
        &mut self,
        input: UserInput,
    ) -> Result<(u64, Vec<SessionUpdate>), SessionError> {
        self.ensure_can_send()?;
        let updates = self.apply(SessionAction::LocalUserMessage(input));
        let send_id = self.pending_send.ok_or(SessionError::Busy)?;
        Ok((send_id, updates))
    }

    /// 리듀서
    pub fn apply(&mut self, action: SessionAction) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();

        match action {
            SessionAction::Starting => self.transition(Lifecycle::Starting, &mut updates),
            SessionAction::Bootstrapped(bootstrap) => self.seed(*bootstrap, &mut updates),
            SessionAction::BootstrapFailed(message) => {
                self.transition(Lifecycle::Idle, &mut updates);
                self.surface_error(message, &mut updates);
            }
            SessionAction::ConfirmReady => {
                if self.lifecycle == Lifecycle::Preparing {
                    self.transition(Lifecycle::Active, &mut updates);
                }
            }
            SessionAction::LocalUserMessage(input) => {
                if self.lifecycle.is_terminal() {
                    debug!("종료된 세션: 로컬 메시지 무시");
                } else {
                    let entry = TranscriptEntry::user(input.text, input.audio);
                    self.append(entry, &mut updates);
                    self.next_send_id += 1;
                    self.pending_send = Some(self.next_send_id);
                    self.last_error = None;
                }
            }
            SessionAction::Frame(frame) => self.apply_frame(frame, &mut updates),
            SessionAction::Exchange(exchange) => {
                if self.lifecycle.accepts_frames() {
                    self.apply_response(&exchange.response, &mut updates);
                    // HTTP 응답은 중복으로 버려져도 대기 중인 전송을 끝낸다
                    self.clear_pending(&mut updates);
                    if let Some(evaluation) = exchange.session_ended {
                        self.finish(&evaluation, &mut updates);
                    }
                } else {
                    debug!("세션 단계 {}: fallback 응답 무시", self.lifecycle);
                }
            }
            SessionAction::SendFailed(message) => {
                self.clear_pending(&mut updates);
                self.surface_error(message, &mut updates);
            }
            SessionAction::ResponseTimedOut {
                send_id,
                timeout_ms,
            } => {
                if self.pending_send == Some(send_id) && !self.lifecycle.is_terminal() {
                    warn!("응답 타임아웃 (send #{send_id})");
                    self.clear_pending(&mut updates);
                    self.surface_error(
                        SessionError::ResponseTimeout { timeout_ms }.to_string(),
                        &mut updates,
                    );
                }
            }
            SessionAction::Connection(state) => {
                if state != self.connection {
                    self.connection = state;
                    updates.push(SessionUpdate::Connection(state));
                }
            }
            SessionAction::TransportError(message) => self.surface_error(message, &mut updates),
            SessionAction::Dismiss(kind) => {
                if self.overlays.dismiss(kind) {
                    updates.push(SessionUpdate::OverlayDismissed(kind));
                }
            }
        }

        updates
    }

    fn apply_frame(&mut self, frame: ServerFrame, updates: &mut Vec<SessionUpdate>) {
        if !self.lifecycle.accepts_frames() {
            debug!("세션 단계 {}: {} 프레임 무시", self.lifecycle, frame.kind());
            return;
        }

        match frame {
            ServerFrame::Connected(ack) => {
                self.gauge.value = parley_core::models::gauge::clamp_gauge(ack.gauge);
                self.gauge.mood = ack.mood;
                updates.push(SessionUpdate::Gauge(self.gauge.clone()));
            }
            ServerFrame::ProspectThinking => {
                if !self.thinking {
                    self.thinking = true;
                    updates.push(SessionUpdate::Thinking(true));
                }
            }
            ServerFrame::ProspectResponse(response) => self.apply_response(&response, updates),
            ServerFrame::GaugeUpdate(update) => {
                self.gauge
                    .announce(update.gauge, update.gauge_delta, update.mood);
                updates.push(SessionUpdate::Gauge(self.gauge.clone()));
            }
            ServerFrame::Reversal(notice) => {
                self.show(Overlay::reversal(notice.message), updates);
            }
            ServerFrame::Event(event) => {
                self.show(Overlay::event(event.kind, event.description), updates);
            }
            ServerFrame::SessionEnded(ended) => {
                if let Some(reason) = &ended.reason {
                    info!("서버가 세션 종료: {reason}");
                }
                self.finish(&ended.evaluation, updates);
            }
            ServerFrame::Error(error) => {
                self.clear_pending(updates);
                self.surface_error(error.message, updates);
            }
            ServerFrame::Pong => {}
        }
    }

    /// 상대방 응답 반영: 푸시/HTTP 경로 공통
    fn apply_response(&mut self, response: &ProspectResponse, updates: &mut Vec<SessionUpdate>) {
        let entry = response.to_entry();
        if matches!(entry.id, MessageId::Remote(_)) && self.contains(&entry.id) {
            debug!("중복 메시지 무시: {}", entry.id);
            return;
        }

        self.append(entry, updates);
        self.gauge
            .announce(response.gauge, response.gauge_delta, response.mood);
        updates.push(SessionUpdate::Gauge(self.gauge.clone()));
        self.clear_pending(updates);

        if self.config.hints_enabled {
            if let Some(tip) = response.first_tip() {
                self.show(Overlay::hint(tip), updates);
            }
        }
    }

    fn seed(&mut self, bootstrap: SessionBootstrap, updates: &mut Vec<SessionUpdate>) {
        if self.lifecycle != Lifecycle::Starting {
            warn!("부트스트랩 결과 무시 (현재: {})", self.lifecycle);
            return;
        }

        let opening = bootstrap.opening_entry();
        self.session_id = Some(bootstrap.session_id);
        self.persona = bootstrap.persona;
        self.scenario = bootstrap.scenario;
        self.gauge = GaugeState::new(bootstrap.gauge, bootstrap.mood);
        self.starting_gauge = self.gauge.value;
        self.config = bootstrap.config;

        self.append(opening, updates);
        updates.push(SessionUpdate::Gauge(self.gauge.clone()));

        let next = if self.config.requires_ready_confirmation {
            Lifecycle::Preparing
        } else {
            Lifecycle::Active
        };
        self.transition(next, updates);
    }

    fn finish(&mut self, evaluation: &Evaluation, updates: &mut Vec<SessionUpdate>) {
        let summary = SessionSummary::from_evaluation(evaluation, self.starting_gauge);
        info!(
            "세션 종료: 게이지 {} → {} (전환: {})",
            summary.starting_gauge, summary.final_gauge, summary.converted
        );
        self.clear_pending(updates);
        self.summary = Some(summary.clone());
        self.transition(Lifecycle::Ended, updates);
        updates.push(SessionUpdate::Ended(summary));
    }

    fn transition(&mut self, next: Lifecycle, updates: &mut Vec<SessionUpdate>) {
        if !self.lifecycle.can_transition(next) {
            warn!("허용되지 않은 전이 무시: {} → {next}", self.lifecycle);
            return;
        }
        debug!("라이프사이클: {} → {next}", self.lifecycle);
        self.lifecycle = next;
        updates.push(SessionUpdate::Lifecycle(next));
    }

    fn append(&mut self, entry: TranscriptEntry, updates: &mut Vec<SessionUpdate>) {
        self.transcript.push(entry.clone());
        updates.push(SessionUpdate::EntryAppended(entry));
    }

    fn contains(&self, id: &MessageId) -> bool {
        self.transcript.iter().any(|e| &e.id == id)
    }

    fn show(&mut self, overlay: Overlay, updates: &mut Vec<SessionUpdate>) {
        self.overlays.set(overlay.clone());
        updates.push(SessionUpdate::OverlayShown(overlay));
    }

    fn clear_pending(&mut self, updates: &mut Vec<SessionUpdate>) {
        self.pending_send = None;
        if self.thinking {
            self.thinking = false;
            updates.push(SessionUpdate::Thinking(false));
        }
    }

    fn surface_error(&mut self, message: String, updates: &mut Vec<SessionUpdate>) {
        self.last_error = Some(message.clone());
        updates.push(SessionUpdate::Error(message));
    }
}
