//! 실시간 세션 와이어 프로토콜.
//!
//! 모든 프레임은 `type` 판별자와 `timestamp`를 가진 JSON 객체다.
//! 서버 프레임은 여기서 태그드 유니언으로 한 번에 디코딩되고,
//! 이후 레이어는 모양(shape)으로 분기하지 않는다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::gauge::Mood;
use crate::models::message::{Annotation, AudioClip, MessageId, Role, TranscriptEntry};
use crate::models::session::SessionId;
use crate::models::summary::Evaluation;

/// 클라이언트 → 서버 프레임
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    UserMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<AudioClip>,
    },
    EndSession,
    Ping,
}

impl ClientFrame {
    /// `timestamp`를 붙인 JSON 문자열로 인코딩
    pub fn encode(&self, timestamp: DateTime<Utc>) -> Result<String, CoreError> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert(
                "timestamp".to_string(),
                serde_json::Value::String(timestamp.to_rfc3339()),
            );
        }
        Ok(serde_json::to_string(&value)?)
    }

    /// 프레임 종류 이름 (로그용)
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::UserMessage { .. } => "user_message",
            ClientFrame::EndSession => "end_session",
            ClientFrame::Ping => "ping",
        }
    }
}

/// 서버 → 클라이언트 프레임
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// 연결 확인 + 초기 게이지
    Connected(ConnectedAck),
    /// 상대방이 답변을 작성 중
    ProspectThinking,
    /// 상대방 메시지 + 게이지 변화
    ProspectResponse(ProspectResponse),
    /// 메시지와 무관한 게이지 갱신
    GaugeUpdate(GaugeUpdate),
    /// 반전 알림
    Reversal(ReversalNotice),
    /// 상황 이벤트 알림
    Event(SituationalEvent),
    /// 세션 종료 + 최종 평가
    SessionEnded(SessionEnded),
    Error(ServerError),
    Pong,
}

impl ServerFrame {
    /// 텍스트 프레임 디코딩
    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw).map_err(|e| CoreError::Protocol(format!("프레임 파싱 실패: {e}")))
    }

    /// 프레임 종류 이름 (로그용)
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Connected(_) => "connected",
            ServerFrame::ProspectThinking => "prospect_thinking",
            ServerFrame::ProspectResponse(_) => "prospect_response",
            ServerFrame::GaugeUpdate(_) => "gauge_update",
            ServerFrame::Reversal(_) => "reversal",
            ServerFrame::Event(_) => "event",
            ServerFrame::SessionEnded(_) => "session_ended",
            ServerFrame::Error(_) => "error",
            ServerFrame::Pong => "pong",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAck {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub gauge: i32,
    #[serde(default)]
    pub mood: Mood,
}

/// 메시지에 포함된 코칭 피드백
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectResponse {
    #[serde(default, alias = "id")]
    pub message_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub audio: Option<AudioClip>,
    pub gauge: i32,
    #[serde(default)]
    pub gauge_delta: i32,
    #[serde(default)]
    pub mood: Mood,
    #[serde(default, alias = "behavior")]
    pub annotation: Option<Annotation>,
    #[serde(default)]
    pub is_event: bool,
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

impl ProspectResponse {
    /// 트랜스크립트 항목으로 변환 (도착 시각 = 지금)
    pub fn to_entry(&self) -> TranscriptEntry {
        TranscriptEntry {
            id: self
                .message_id
                .clone()
                .map(MessageId::Remote)
                .unwrap_or_else(MessageId::local),
            role: Role::Counterpart,
            text: Some(self.text.clone()),
            audio: self.audio.clone(),
            mood: Some(self.mood),
            gauge_delta: Some(self.gauge_delta),
            annotation: self.annotation.clone(),
            is_event: self.is_event,
            timestamp: Utc::now(),
        }
    }

    /// 첫 번째 팁
    pub fn first_tip(&self) -> Option<&str> {
        self.feedback
            .as_ref()
            .and_then(|f| f.tips.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeUpdate {
    pub gauge: i32,
    #[serde(default)]
    pub gauge_delta: i32,
    #[serde(default)]
    pub mood: Mood,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalNotice {
    #[serde(default, alias = "reason")]
    pub message: String,
    #[serde(default)]
    pub gauge_drop: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SituationalEvent {
    #[serde(default, alias = "event_type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnded {
    pub evaluation: Evaluation,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// HTTP fallback 전송 응답: 푸시 프레임과 같은 모양
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageExchange {
    #[serde(flatten)]
    pub response: ProspectResponse,
    /// 이 교환으로 대화가 자연 종료된 경우의 평가
    #[serde(default)]
    pub session_ended: Option<Evaluation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_encodes_with_type_and_timestamp() {
        let frame = ClientFrame::UserMessage {
            text: Some("Je comprends votre besoin".into()),
            audio: None,
        };
        let raw = frame.encode(Utc::now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "user_message");
        assert_eq!(value["text"], "Je comprends votre besoin");
        assert!(value.get("audio").is_none());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn ping_encodes_as_bare_tag() {
        let raw = ClientFrame::Ping.encode(Utc::now()).unwrap();
        let back: ClientFrame = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, ClientFrame::Ping);
    }

    #[test]
    fn decodes_prospect_response_with_feedback() {
        let raw = r#"{
            "type": "prospect_response",
            "timestamp": "2026-01-28T10:00:00Z",
            "message_id": "m-7",
            "text": "Intéressant",
            "gauge": 58,
            "gauge_delta": 8,
            "mood": "curious",
            "behavior": {"label": "reformulation"},
            "feedback": {"tips": ["Posez une question ouverte", "Chiffrez"]}
        }"#;
        let frame = ServerFrame::decode(raw).unwrap();
        let ServerFrame::ProspectResponse(resp) = frame else {
            panic!("prospect_response 아님");
        };
        assert_eq!(resp.gauge, 58);
        assert_eq!(resp.gauge_delta, 8);
        assert_eq!(resp.first_tip(), Some("Posez une question ouverte"));

        let entry = resp.to_entry();
        assert_eq!(entry.id, MessageId::Remote("m-7".into()));
        assert_eq!(entry.role, Role::Counterpart);
        assert_eq!(entry.gauge_delta, Some(8));
        assert_eq!(entry.annotation.map(|a| a.label).as_deref(), Some("reformulation"));
    }

    #[test]
    fn decodes_unit_frames_with_timestamp() {
        let frame = ServerFrame::decode(r#"{"type":"prospect_thinking","timestamp":"t"}"#).unwrap();
        assert_eq!(frame, ServerFrame::ProspectThinking);
        let frame = ServerFrame::decode(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(frame, ServerFrame::Pong);
    }

    #[test]
    fn decodes_session_ended() {
        let raw = r#"{"type":"session_ended","evaluation":{"final_gauge":70,"converted":true}}"#;
        let ServerFrame::SessionEnded(ended) = ServerFrame::decode(raw).unwrap() else {
            panic!("session_ended 아님");
        };
        assert_eq!(ended.evaluation.final_gauge, 70);
        assert!(ended.evaluation.converted);
        assert!(ended.evaluation.strengths.is_empty());
    }

    #[test]
    fn malformed_frames_are_protocol_errors() {
        for raw in [
            "not json",
            r#"{"type":"mystery"}"#,
            r#"{"type":"gauge_update"}"#,
            r#"{"gauge":3}"#,
        ] {
            let err = ServerFrame::decode(raw).unwrap_err();
            assert!(matches!(err, CoreError::Protocol(_)), "{raw}");
        }
    }

    #[test]
    fn exchange_shares_response_shape() {
        let raw = r#"{"text":"Trop cher.","gauge":41,"gauge_delta":-4,"mood":"annoyed"}"#;
        let exchange: MessageExchange = serde_json::from_str(raw).unwrap();
        assert_eq!(exchange.response.gauge, 41);
        assert_eq!(exchange.response.mood, Mood::Annoyed);
        assert!(exchange.session_ended.is_none());
    }
}
