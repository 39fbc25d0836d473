//! 세션 종료 평가와 요약.

use serde::{Deserialize, Serialize};

use crate::models::session::SessionId;

/// 서버가 보낸 최종 평가 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub final_gauge: i32,
    /// 서버가 기록한 시작 게이지 (없으면 부트스트랩 값 사용)
    #[serde(default)]
    pub starting_gauge: Option<i32>,
    #[serde(default)]
    pub converted: bool,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default, alias = "feedback")]
    pub overall_feedback: Option<String>,
}

/// 종료 화면에 표시되는 불변 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub final_gauge: i32,
    pub starting_gauge: i32,
    /// `final_gauge - starting_gauge`
    pub delta: i32,
    pub converted: bool,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub overall_feedback: Option<String>,
}

impl SessionSummary {
    /// 평가 페이로드에서 요약 생성
    pub fn from_evaluation(evaluation: &Evaluation, bootstrap_gauge: i32) -> Self {
        let starting_gauge = evaluation.starting_gauge.unwrap_or(bootstrap_gauge);
        Self {
            final_gauge: evaluation.final_gauge,
            starting_gauge,
            delta: evaluation.final_gauge - starting_gauge,
            converted: evaluation.converted,
            strengths: evaluation.strengths.clone(),
            improvements: evaluation.improvements.clone(),
            overall_feedback: evaluation.overall_feedback.clone(),
        }
    }
}

/// 종료 후 조회하는 상세 리포트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub evaluation: Evaluation,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub message_count: Option<u32>,
}
