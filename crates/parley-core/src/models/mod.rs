//! Parley 도메인 모델.
//!
//! 서버-클라이언트 간 공유하는 세션/트랜스크립트/게이지 구조체와
//! 실시간 프로토콜 프레임을 정의한다.

pub mod connection;
pub mod frame;
pub mod gauge;
pub mod message;
pub mod session;
pub mod summary;
