//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! `parley-network`가 이 trait들을 구현하며,
//! `parley-session`은 `Arc<dyn T>`로만 의존한다.
//!
//! 모든 async trait은 `async_trait` 매크로를 사용하여
//! object safety를 보장한다.

pub mod credentials;
pub mod session_api;
pub mod transport;
