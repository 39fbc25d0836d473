//! 감정 게이지 모델.
//!
//! 서버가 계산한 점수와 무드를 그대로 보관한다. 클라이언트는 델타를 재계산하지 않는다.

use serde::{Deserialize, Serialize};

/// 게이지 하한
pub const GAUGE_MIN: i32 = 0;
/// 게이지 상한
pub const GAUGE_MAX: i32 = 100;

/// 상대방(프로스펙트)의 현재 무드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Hostile,
    Annoyed,
    Skeptical,
    #[default]
    Neutral,
    Curious,
    Interested,
    Convinced,
    /// 클라이언트가 모르는 라벨: 프레임 전체를 버리지 않기 위한 fallback
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Mood::Hostile => "hostile",
            Mood::Annoyed => "annoyed",
            Mood::Skeptical => "skeptical",
            Mood::Neutral => "neutral",
            Mood::Curious => "curious",
            Mood::Interested => "interested",
            Mood::Convinced => "convinced",
            Mood::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// 게이지 상태: 값, 무드, 마지막 변화량
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeState {
    /// 현재 점수 (`GAUGE_MIN..=GAUGE_MAX`)
    pub value: i32,
    /// 현재 무드
    pub mood: Mood,
    /// 서버가 알린 마지막 변화량
    pub last_delta: i32,
}

impl GaugeState {
    /// 초기 게이지 (변화량 0)
    pub fn new(value: i32, mood: Mood) -> Self {
        Self {
            value: clamp_gauge(value),
            mood,
            last_delta: 0,
        }
    }

    /// 서버가 알린 값/델타를 그대로 반영
    pub fn announce(&mut self, value: i32, delta: i32, mood: Mood) {
        self.value = clamp_gauge(value);
        self.last_delta = delta;
        self.mood = mood;
    }
}

/// 범위 밖 값은 경계로 자른다
pub fn clamp_gauge(value: i32) -> i32 {
    value.clamp(GAUGE_MIN, GAUGE_MAX)
}
