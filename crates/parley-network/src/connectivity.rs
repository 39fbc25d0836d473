//! 연결 상태 관리.
//!
//! 실시간 소켓의 연결 상태와 재연결 카운터를 추적하고,
//! 예기치 않은 종료마다 재시도 여부와 지연(`base * attempt`)을 결정한다.

use parley_core::models::connection::{ConnectionState, ConnectionStatus};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 예기치 않은 종료 후의 결정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// `delay` 후 `attempt`번째 재연결
    Retry { attempt: u32, delay: Duration },
    /// 시도 소진: 최종 끊김
    GiveUp { attempts: u32 },
}

/// 연결 상태 추적기
///
/// 상태는 `watch` 채널로 브로드캐스트되며, 상태 변경은 전송 계층만 수행한다.
pub struct ConnectionTracker {
    base_delay: Duration,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionTracker {
    /// 새 추적기 생성
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState {
            status: ConnectionStatus::Disconnected,
            reconnect_attempts: 0,
            max_attempts,
        });
        Self {
            base_delay,
            state_tx,
        }
    }

    /// 현재 상태
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// 상태 변경 수신기 생성
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// n번째 재연결 지연 (선형 증가)
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// 연결 시도 시작
    pub fn mark_connecting(&self) {
        self.state_tx
            .send_modify(|s| s.status = ConnectionStatus::Connecting);
    }

    /// 연결 성공: 재연결 카운터 리셋
    pub fn mark_connected(&self) {
        let previous = self.state();
        if previous.reconnect_attempts > 0 {
            info!("{}회 시도 후 재연결 성공", previous.reconnect_attempts);
        }
        self.state_tx.send_modify(|s| {
            s.status = ConnectionStatus::Connected;
            s.reconnect_attempts = 0;
        });
    }

    /// 의도적 종료: 재연결 없음
    pub fn mark_disconnected(&self) {
        debug!("연결 종료 (의도적)");
        self.state_tx.send_modify(|s| {
            s.status = ConnectionStatus::Disconnected;
            s.reconnect_attempts = 0;
        });
    }

    /// 예기치 않은 종료(또는 연결 실패) 기록
    pub fn record_unexpected_close(&self) -> ReconnectDecision {
        let current = self.state();
        let next = current.reconnect_attempts + 1;

        if next > current.max_attempts {
            warn!(
                "재연결 {}회 모두 실패 - 연결 끊김",
                current.reconnect_attempts
            );
            self.state_tx
                .send_modify(|s| s.status = ConnectionStatus::Disconnected);
            return ReconnectDecision::GiveUp {
                attempts: current.reconnect_attempts,
            };
        }

        self.state_tx.send_modify(|s| {
            s.status = ConnectionStatus::Connecting;
            s.reconnect_attempts = next;
        });
        let delay = self.reconnect_delay(next);
        debug!("재연결 예약 ({next}/{}): {delay:?} 후", current.max_attempts);
        ReconnectDecision::Retry {
            attempt: next,
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_disconnected() {
        let tracker = ConnectionTracker::new(3, Duration::from_millis(100));
        let state = tracker.state();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(state.max_attempts, 3);
        assert!(!state.is_exhausted());
    }

    #[test]
    fn delay_grows_linearly() {
        let tracker = ConnectionTracker::new(5, Duration::from_millis(250));
        assert_eq!(tracker.reconnect_delay(1), Duration::from_millis(250));
        assert_eq!(tracker.reconnect_delay(4), Duration::from_millis(1_000));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let tracker = ConnectionTracker::new(3, Duration::from_millis(10));
        tracker.mark_connected();

        for expected in 1..=3 {
            match tracker.record_unexpected_close() {
                ReconnectDecision::Retry { attempt, delay } => {
                    assert_eq!(attempt, expected);
                    assert_eq!(delay, Duration::from_millis(10 * u64::from(expected)));
                }
                other => panic!("재시도 예상: {other:?}"),
            }
            assert_eq!(tracker.state().status, ConnectionStatus::Connecting);
        }

        assert_eq!(
            tracker.record_unexpected_close(),
            ReconnectDecision::GiveUp { attempts: 3 }
        );
        assert!(tracker.state().is_exhausted());
    }

    #[test]
    fn success_resets_attempts() {
        let tracker = ConnectionTracker::new(2, Duration::from_millis(10));
        tracker.record_unexpected_close();
        tracker.record_unexpected_close();
        tracker.mark_connected();
        assert_eq!(tracker.state().reconnect_attempts, 0);
        assert!(matches!(
            tracker.record_unexpected_close(),
            ReconnectDecision::Retry { attempt: 1, .. }
        ));
    }

    #[test]
    fn zero_max_attempts_gives_up_immediately() {
        let tracker = ConnectionTracker::new(0, Duration::from_millis(10));
        assert_eq!(
            tracker.record_unexpected_close(),
            ReconnectDecision::GiveUp { attempts: 0 }
        );
    }

    #[tokio::test]
    async fn subscribe_receives_changes() {
        let tracker = ConnectionTracker::new(1, Duration::from_millis(10));
        let mut rx = tracker.subscribe();

        tracker.mark_connecting();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, ConnectionStatus::Connecting);

        tracker.mark_connected();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_connected());
    }
}
