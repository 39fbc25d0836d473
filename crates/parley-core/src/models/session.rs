//! 세션 모델.
//!
//! 부트스트랩 요청/응답, 레벨별 설정, 사용자 입력을 표현한다.
//! 서버 페이로드의 모양 차이(문자열/객체, 숫자/문자열 ID)는 여기서 한 번에 정규화된다.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::models::gauge::Mood;
use crate::models::message::{AudioClip, TranscriptEntry};

/// 서버가 할당한 세션 ID (와이어에서는 문자열 또는 정수)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawSessionId {
            Text(String),
            Number(i64),
        }

        Ok(match RawSessionId::deserialize(deserializer)? {
            RawSessionId::Text(s) => SessionId(s),
            RawSessionId::Number(n) => SessionId(n.to_string()),
        })
    }
}

/// 세션 생성 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// 연습할 스킬 ID
    pub skill_id: String,
    /// 산업군 ID (선택)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_id: Option<String>,
    /// 난이도 레벨
    pub level: u8,
}

/// 프로스펙트 페르소나
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    pub name: String,
    pub role: String,
    pub company: String,
    pub description: String,
}

/// 게이지 변동성 등급
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    Low,
    #[default]
    Medium,
    High,
}

/// 레벨별 세션 옵션
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// 게이지 표시 여부
    pub show_gauge: bool,
    /// 힌트 제공 여부
    pub hints_enabled: bool,
    /// 전환 성공 임계값
    pub conversion_threshold: i32,
    /// 상황 이벤트 활성화
    pub events_enabled: bool,
    /// 상황 이벤트 발생 확률 (0.0–1.0)
    pub event_probability: f32,
    /// 반전 활성화
    pub reversals_enabled: bool,
    /// 반전 발생 확률 (0.0–1.0)
    pub reversal_probability: f32,
    pub volatility: Volatility,
    /// 라이브 루프 전에 "준비 완료" 확인이 필요한지
    pub requires_ready_confirmation: bool,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            show_gauge: true,
            hints_enabled: true,
            conversion_threshold: 70,
            events_enabled: false,
            event_probability: 0.0,
            reversals_enabled: false,
            reversal_probability: 0.0,
            volatility: Volatility::Medium,
            requires_ready_confirmation: false,
        }
    }
}

/// 첫 메시지: 문자열 또는 객체로 온다
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OpeningMessage {
    Text(String),
    Detailed {
        #[serde(default)]
        id: Option<String>,
        text: String,
        #[serde(default)]
        audio: Option<AudioClip>,
        #[serde(default)]
        mood: Option<Mood>,
    },
}

impl OpeningMessage {
    /// 정규화된 트랜스크립트 항목으로 변환
    pub fn into_entry(self) -> TranscriptEntry {
        match self {
            OpeningMessage::Text(text) => TranscriptEntry::counterpart(None, text),
            OpeningMessage::Detailed {
                id,
                text,
                audio,
                mood,
            } => {
                let mut entry = TranscriptEntry::counterpart(id, text);
                entry.audio = audio;
                entry.mood = mood;
                entry
            }
        }
    }
}

/// 세션 생성 응답
#[derive(Debug, Clone, Deserialize)]
pub struct SessionBootstrap {
    pub session_id: SessionId,
    #[serde(default)]
    pub persona: Persona,
    #[serde(default)]
    pub scenario: Option<String>,
    pub opening_message: OpeningMessage,
    /// 초기 게이지
    #[serde(alias = "initial_gauge")]
    pub gauge: i32,
    #[serde(default, alias = "initial_mood")]
    pub mood: Mood,
    #[serde(default)]
    pub config: LevelConfig,
}

impl SessionBootstrap {
    /// 첫 트랜스크립트 시드
    pub fn opening_entry(&self) -> TranscriptEntry {
        let mut entry = self.opening_message.clone().into_entry();
        if entry.mood.is_none() {
            entry.mood = Some(self.mood);
        }
        entry
    }
}

/// 사용자 입력: 텍스트와 오디오 중 최소 하나
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInput {
    pub text: Option<String>,
    pub audio: Option<AudioClip>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            audio: None,
        }
    }

    pub fn audio(clip: AudioClip) -> Self {
        Self {
            text: None,
            audio: Some(clip),
        }
    }

    /// 빈 입력 검증. 공백 텍스트는 없는 것으로 정규화한다.
    pub fn validated(self) -> Result<Self, CoreError> {
        let text = self
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let audio = self.audio.filter(|a| !a.is_empty());

        if text.is_none() && audio.is_none() {
            return Err(CoreError::Validation {
                field: "input".to_string(),
                message: "텍스트 또는 오디오가 필요함".to_string(),
            });
        }
        Ok(Self { text, audio })
    }
}
