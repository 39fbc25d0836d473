//! 실시간 세션 전송 포트.
//!
//! 구현: `parley-network::session_socket` (tokio-tungstenite)

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::models::connection::ConnectionState;
use crate::models::frame::ServerFrame;
use crate::models::message::AudioClip;
use crate::models::session::SessionId;

/// 전송 계층이 상위로 올리는 이벤트
///
/// 수신 순서가 그대로 유지된다.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// 연결(또는 재연결) 성공
    Connected,
    /// 디코딩된 서버 프레임 (`pong` 제외)
    Frame(ServerFrame),
    /// 재연결 시도 중
    Reconnecting { attempt: u32, max_attempts: u32 },
    /// 연결 종료. `will_retry == false`면 최종 상태
    Disconnected { will_retry: bool },
    /// 사용자에게 보여줄 전송 에러
    Error(String),
}

/// 재연결되는 양방향 세션 전송
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// 연결 시작. 이미 연결 중/연결됨이면 no-op
    async fn connect(&self) -> Result<(), CoreError>;

    /// 사용자 메시지 전송. 연결이 없으면 `CoreError::NotConnected`
    async fn send_user_message(
        &self,
        text: Option<String>,
        audio: Option<AudioClip>,
    ) -> Result<(), CoreError>;

    /// 종료 프레임 전송. 연결이 없으면 no-op
    async fn end_session(&self) -> Result<(), CoreError>;

    /// 의도적 종료: 이후 자동 재연결 없음
    fn disconnect(&self);

    /// 현재 연결 상태
    fn connection_state(&self) -> ConnectionState;
}

/// 세션 ID가 정해진 뒤 전송을 여는 팩토리
///
/// 전송 인스턴스는 세션 하나에 독점 소유된다.
pub trait TransportFactory: Send + Sync {
    fn open(
        &self,
        session_id: &SessionId,
        events: mpsc::Sender<TransportEvent>,
    ) -> Arc<dyn SessionTransport>;
}
