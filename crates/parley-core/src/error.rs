//! Parley 핵심 에러 타입.
//!
//! 어댑터 crate는 이 타입을 그대로 반환하고,
//! 세션 레이어는 자체 에러 타입에서 `#[from] CoreError`로 래핑한다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 직렬화, 설정, 유효성 검증, 네트워크 등 도메인 공통 에러를 정의한다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 ({field}): {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 인증 실패 (토큰 만료, 자격증명 오류 등)
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "Session", "Report")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),

    /// 네트워크 에러 (연결 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// Rate Limit 초과 (429)
    #[error("요청 한도 초과, {retry_after_secs}초 후 재시도")]
    RateLimit {
        /// 재시도 대기 시간 (초)
        retry_after_secs: u64,
    },

    /// 서비스 일시 불가 (503)
    #[error("서비스 일시 불가: {0}")]
    ServiceUnavailable(String),

    /// 구독/쿼터 한도 도달: 업그레이드 필요
    #[error("이용 한도 초과 ({code}): {message}")]
    QuotaExceeded {
        /// 서버가 보낸 에러 코드
        code: String,
        /// 서버 메시지
        message: String,
    },

    /// 실시간 연결이 없는 상태에서 송신 시도
    #[error("실시간 연결 없음")]
    NotConnected,

    /// 프로토콜 위반 (잘못된 프레임 등)
    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    /// 응답 대기 타임아웃
    #[error("응답 타임아웃: {timeout_ms}ms 초과")]
    Timeout {
        /// 초과된 타임아웃 시간 (밀리초)
        timeout_ms: u64,
    },

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// 사용자가 재시도할 수 있는 일시적 에러인지
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Network(_)
                | CoreError::ServiceUnavailable(_)
                | CoreError::RateLimit { .. }
                | CoreError::Timeout { .. }
                | CoreError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CoreError::Network("x".into()).is_transient());
        assert!(CoreError::Timeout { timeout_ms: 10 }.is_transient());
        assert!(!CoreError::Auth("x".into()).is_transient());
        assert!(!CoreError::QuotaExceeded {
            code: "quota_exceeded".into(),
            message: String::new(),
        }
        .is_transient());
    }
}
