//! 세션 레이어 에러.

use parley_core::error::CoreError;
use thiserror::Error;

use crate::lifecycle::Lifecycle;

/// 세션 조정 에러
///
/// 쿼터 초과는 일반 에러가 아니라 `UpgradeRequired`로 분리된다.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Core(CoreError),

    /// 텍스트/오디오 모두 없음: 네트워크 호출 전에 거절
    #[error("빈 입력: 텍스트 또는 오디오가 필요함")]
    EmptyInput,

    /// 이전 전송의 응답 대기 중 (큐잉 없음)
    #[error("이전 메시지의 응답을 기다리는 중")]
    Busy,

    #[error("진행 중인 세션이 아님 (현재: {0})")]
    NotActive(Lifecycle),

    #[error("세션이 아직 종료되지 않음 (현재: {0})")]
    NotEnded(Lifecycle),

    #[error("실시간 연결 없음")]
    NotConnected,

    /// 구독/쿼터 한도: 업그레이드 안내 경로
    #[error("업그레이드 필요 ({code}): {message}")]
    UpgradeRequired { code: String, message: String },

    #[error("응답 타임아웃: {timeout_ms}ms 동안 응답 없음")]
    ResponseTimeout { timeout_ms: u64 },

    #[error("이미 종료된 세션")]
    AlreadyEnded,
}

impl SessionError {
    /// 사용자가 다시 시도할 만한 에러인지
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Core(e) => e.is_transient(),
            SessionError::NotConnected | SessionError::ResponseTimeout { .. } => true,
            _ => false,
        }
    }
}

impl From<CoreError> for SessionError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::QuotaExceeded { code, message } => {
                SessionError::UpgradeRequired { code, message }
            }
            CoreError::NotConnected => SessionError::NotConnected,
            other => SessionError::Core(other),
        }
    }
}
