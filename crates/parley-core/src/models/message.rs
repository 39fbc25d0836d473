//! 트랜스크립트 메시지 모델.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::models::gauge::Mood;

/// 트랜스크립트 항목 ID
///
/// 로컬에서 낙관적으로 추가한 항목은 클라이언트가 생성한 UUID를,
/// 서버 프레임에서 온 항목은 서버 ID를 사용한다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "origin", content = "id", rename_all = "snake_case")]
pub enum MessageId {
    Local(Uuid),
    Remote(String),
}

impl MessageId {
    /// 새 로컬 ID
    pub fn local() -> Self {
        MessageId::Local(Uuid::new_v4())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Local(id) => write!(f, "local-{id}"),
            MessageId::Remote(id) => f.write_str(id),
        }
    }
}

/// 발화자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    #[serde(alias = "prospect", alias = "assistant")]
    Counterpart,
}

/// 녹음/합성 오디오. 와이어에서는 base64 문자열
#[derive(Clone, PartialEq, Eq)]
pub struct AudioClip(pub Vec<u8>);

impl AudioClip {
    /// 원시 바이트
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// base64 표현
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// base64 문자열에서 복원
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded.trim()).map(AudioClip)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AudioClip({} bytes)", self.0.len())
    }
}

impl Serialize for AudioClip {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for AudioClip {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        AudioClip::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// 행동 패턴 주석 (서버가 감지한 화법 패턴 등)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// 패턴 라벨
    pub label: String,
    /// 상세 설명
    #[serde(default)]
    pub detail: Option<String>,
}

/// 트랜스크립트 항목: 도착 순서대로 추가만 된다
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: MessageId,
    pub role: Role,
    pub text: Option<String>,
    pub audio: Option<AudioClip>,
    pub mood: Option<Mood>,
    /// 이 메시지로 인한 게이지 변화량
    pub gauge_delta: Option<i32>,
    pub annotation: Option<Annotation>,
    /// 시나리오 이벤트로 주입된 메시지
    #[serde(default)]
    pub is_event: bool,
    /// 클라이언트 도착 시각
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    /// 로컬 사용자 메시지
    pub fn user(text: Option<String>, audio: Option<AudioClip>) -> Self {
        Self {
            id: MessageId::local(),
            role: Role::User,
            text,
            audio,
            mood: None,
            gauge_delta: None,
            annotation: None,
            is_event: false,
            timestamp: Utc::now(),
        }
    }

    /// 서버 ID가 없을 때도 쓸 수 있는 상대방 메시지
    pub fn counterpart(id: Option<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.map(MessageId::Remote).unwrap_or_else(MessageId::local),
            role: Role::Counterpart,
            text: Some(text.into()),
            audio: None,
            mood: None,
            gauge_delta: None,
            annotation: None,
            is_event: false,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn audio_clip_wire_form_is_base64() {
        let clip = AudioClip(vec![0, 1, 2, 250]);
        let json = serde_json::to_string(&clip).unwrap();
        assert_eq!(json, r#""AAEC+g==""#);
        let back: AudioClip = serde_json::from_str(&json).unwrap();
        assert_eq!(back, clip);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(serde_json::from_str::<AudioClip>(r#""@@not base64@@""#).is_err());
    }

    #[test]
    fn prospect_alias_maps_to_counterpart() {
        let role: Role = serde_json::from_str(r#""prospect""#).unwrap();
        assert_eq!(role, Role::Counterpart);
    }

    #[test]
    fn counterpart_without_server_id_gets_local_id() {
        let entry = TranscriptEntry::counterpart(None, "Bonjour");
        assert_matches!(entry.id, MessageId::Local(_));
        let entry = TranscriptEntry::counterpart(Some("m-1".into()), "Bonjour");
        assert_eq!(entry.id, MessageId::Remote("m-1".into()));
    }
}
