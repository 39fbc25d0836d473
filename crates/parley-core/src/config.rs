//! 애플리케이션 설정 구조체.
//!
//! 서버 URL, 실시간 전송(재연결/하트비트), 세션 응답 타임아웃 등
//! 런타임 설정을 정의한다. 바이너리에서 `config` crate로 파일/환경변수를 겹쳐 로드.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 서버 연결 설정
    pub server: ServerConfig,
    /// 실시간 전송 설정
    #[serde(default)]
    pub transport: TransportConfig,
    /// 세션 설정
    #[serde(default)]
    pub session: SessionConfig,
}

/// 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API/소켓 서버 기본 URL (예: "https://api.example.com")
    pub base_url: String,
    /// 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// 실시간 전송 설정: 재연결 정책과 하트비트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// 예기치 않은 종료 후 최대 재연결 시도 횟수
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// 재연결 기본 지연 (밀리초). n번째 시도는 `base * n`
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// 하트비트(ping) 주기 (밀리초)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

/// 세션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 상대방 응답 대기 타임아웃 (밀리초)
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// 전송 이벤트 채널 버퍼 크기
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl AppConfig {
    /// 기본 설정 생성
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:8000".to_string(),
                request_timeout_ms: default_request_timeout_ms(),
            },
            transport: TransportConfig::default(),
            session: SessionConfig::default(),
        }
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        let base = self.server.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(CoreError::Validation {
                field: "server.base_url".to_string(),
                message: format!("http(s) URL이어야 함: {base}"),
            });
        }
        if self.transport.heartbeat_interval_ms == 0 {
            return Err(CoreError::Validation {
                field: "transport.heartbeat_interval_ms".to_string(),
                message: "0보다 커야 함".to_string(),
            });
        }
        if self.session.event_buffer == 0 {
            return Err(CoreError::Validation {
                field: "session.event_buffer".to_string(),
                message: "0보다 커야 함".to_string(),
            });
        }
        Ok(())
    }

    /// 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// 재연결 기본 지연
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.transport.reconnect_base_delay_ms)
    }

    /// 하트비트 주기
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.transport.heartbeat_interval_ms)
    }

    /// 응답 대기 타임아웃
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.session.response_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}
fn default_heartbeat_interval_ms() -> u64 {
    30_000
}
fn default_response_timeout_ms() -> u64 {
    45_000
}
fn default_event_buffer() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn partial_json_fills_defaults() {
        let raw = r#"{"server":{"base_url":"https://api.parley.test"}}"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.server.request_timeout_ms, 30_000);
        assert_eq!(config.transport.max_reconnect_attempts, 5);
        assert_eq!(config.session.event_buffer, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_http_base_url() {
        let mut config = AppConfig::default_config();
        config.server.base_url = "ftp://nope".to_string();
        let err = config.validate().unwrap_err();
        assert_matches!(err, CoreError::Validation { ref field, .. } if field == "server.base_url");
    }

    #[test]
    fn rejects_zero_heartbeat() {
        let mut config = AppConfig::default_config();
        config.transport.heartbeat_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_helpers() {
        let config = AppConfig::default_config();
        assert_eq!(config.reconnect_base_delay(), Duration::from_secs(1));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.response_timeout(), Duration::from_secs(45));
    }
}
