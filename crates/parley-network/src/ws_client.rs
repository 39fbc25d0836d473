//! WebSocket 클라이언트.
//!
//! `tokio-tungstenite` 기반 단일 연결. 재연결 정책은 `session_socket`이 담당한다.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parley_core::error::CoreError;
use parley_core::ports::credentials::CredentialProvider;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket 클라이언트: 토큰을 URI 쿼리로 실어 연결
pub struct WsClient {
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

/// WebSocket으로 수신한 메시지
#[derive(Debug, Clone, PartialEq)]
pub enum WsMessage {
    /// 텍스트 메시지 (JSON)
    Text(String),
    /// 바이너리 메시지
    Binary(Vec<u8>),
    /// 연결 종료
    Close,
}

impl WsClient {
    /// 새 WebSocket 클라이언트 생성
    pub fn new(base_url: &str, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// `http(s)` 기본 URL을 `ws(s)` 엔드포인트 URL로 변환
    pub fn socket_url(&self, path: &str, token: &str) -> Result<Url, CoreError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| CoreError::Config(format!("잘못된 소켓 URL: {e}")))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(CoreError::Config(format!(
                    "지원하지 않는 스킴: {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| CoreError::Config(format!("스킴 변경 실패: {scheme}")))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    /// WebSocket 연결 수립
    ///
    /// 수신 메시지는 `rx`로, 송신은 반환된 `WsSender`로 처리.
    pub async fn connect(
        &self,
        path: &str,
    ) -> Result<(WsSender, mpsc::Receiver<WsMessage>), CoreError> {
        let token = self.credentials.access_token().await?;
        let url = self.socket_url(path, &token)?;

        // 토큰이 로그에 남지 않도록 쿼리 제외
        info!("WebSocket 연결: {}{}", url.origin().ascii_serialization(), url.path());

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 연결 실패: {e}")))?;

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(Self::read_loop(read, tx));

        Ok((
            WsSender {
                write: Arc::new(tokio::sync::Mutex::new(write)),
            },
            rx,
        ))
    }

    /// 수신 루프
    async fn read_loop(mut read: SplitStream<WsStream>, tx: mpsc::Sender<WsMessage>) {
        while let Some(msg) = read.next().await {
            let forwarded = match msg {
                Ok(Message::Text(text)) => WsMessage::Text(text.as_str().to_owned()),
                Ok(Message::Binary(data)) => WsMessage::Binary(data.to_vec()),
                Ok(Message::Close(_)) => {
                    let _ = tx.send(WsMessage::Close).await;
                    break;
                }
                Ok(_) => continue, // Ping/Pong은 자동 처리
                Err(e) => {
                    warn!("WebSocket 수신 에러: {e}");
                    let _ = tx.send(WsMessage::Close).await;
                    break;
                }
            };
            if tx.send(forwarded).await.is_err() {
                break;
            }
        }
        debug!("WebSocket 수신 루프 종료");
    }
}

/// WebSocket 송신기
#[derive(Clone)]
pub struct WsSender {
    write: Arc<tokio::sync::Mutex<SplitSink<WsStream, Message>>>,
}

impl WsSender {
    /// 텍스트 메시지 전송
    pub async fn send_text(&self, text: String) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        write
            .send(Message::text(text))
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 전송 실패: {e}")))
    }

    /// 연결 종료
    pub async fn close(&self) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        write
            .send(Message::Close(None))
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 종료 실패: {e}")))
    }
}
