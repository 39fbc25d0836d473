//! 세션 REST API 포트.
//!
//! 구현: `parley-network` crate (reqwest)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::frame::MessageExchange;
use crate::models::session::{SessionBootstrap, SessionId, SessionRequest, UserInput};
use crate::models::summary::SessionReport;

/// 인증된 세션 REST API
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// 서버 세션 생성 및 첫 대화 상태 수신
    ///
    /// 쿼터/구독 한도는 `CoreError::QuotaExceeded`로 구분된다.
    async fn bootstrap(&self, request: &SessionRequest) -> Result<SessionBootstrap, CoreError>;

    /// 실시간 연결이 없을 때의 일회성 메시지 교환
    async fn send_message(
        &self,
        session_id: &SessionId,
        input: &UserInput,
    ) -> Result<MessageExchange, CoreError>;

    /// 종료된 세션의 상세 리포트 조회
    async fn fetch_report(&self, session_id: &SessionId) -> Result<SessionReport, CoreError>;
}
