//! 실시간 연결 상태 모델.

use serde::{Deserialize, Serialize};

/// 연결 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// 연결 끊김
    #[default]
    Disconnected,
    /// 연결 중 (최초 연결 또는 재연결)
    Connecting,
    /// 연결됨
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
        }
    }
}

/// 연결 상태 + 재연결 시도 카운터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// 연속 재연결 시도 횟수 (연결 성공 시 0)
    pub reconnect_attempts: u32,
    /// 최대 재연결 시도 횟수
    pub max_attempts: u32,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// 재시도를 모두 소진하고 끊긴 상태
    pub fn is_exhausted(&self) -> bool {
        self.status == ConnectionStatus::Disconnected
            && self.max_attempts > 0
            && self.reconnect_attempts >= self.max_attempts
    }
}
