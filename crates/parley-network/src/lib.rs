//! # parley-network
//!
//! Parley HTTP/WebSocket 네트워크 어댑터.
//! 세션 REST API, 재연결되는 실시간 세션 소켓, JWT 인증을 담당한다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use parley_network::http_client::HttpSessionApi;
//! use parley_network::session_socket::{SessionSocket, SocketPolicy};
//! ```

pub mod auth;
pub mod connectivity;
pub mod http_client;
pub mod session_socket;
pub mod ws_client;
