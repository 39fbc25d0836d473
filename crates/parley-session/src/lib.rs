//! # parley-session
//!
//! 실시간 롤플레이 세션 조정.
//! 서버 푸시와 로컬 입력을 하나의 트랜스크립트/게이지/연결 뷰로 합치는
//! 리듀서(`store`)와, 전송 경로를 숨기는 `SessionClient`를 제공한다.

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod overlays;
pub mod store;
