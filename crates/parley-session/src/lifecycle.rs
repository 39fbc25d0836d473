//! 세션 라이프사이클.
//!
//! `idle → starting → (preparing) → active → ended`. `ended`는 종착 상태다.

use std::fmt;

/// 세션 라이프사이클 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    /// 부트스트랩 요청 중
    Starting,
    /// 준비 확인 대기 (레벨 설정에 따라)
    Preparing,
    Active,
    Ended,
}

impl Lifecycle {
    /// 허용된 전이인지 확인
    pub fn can_transition(self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Idle)
                | (Starting, Preparing)
                | (Starting, Active)
                | (Preparing, Active)
                | (Preparing, Ended)
                | (Active, Ended)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Lifecycle::Ended
    }

    /// 서버 프레임을 받아들이는 단계
    pub fn accepts_frames(self) -> bool {
        matches!(self, Lifecycle::Preparing | Lifecycle::Active)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Starting => "starting",
            Lifecycle::Preparing => "preparing",
            Lifecycle::Active => "active",
            Lifecycle::Ended => "ended",
        };
        f.write_str(label)
    }
}
