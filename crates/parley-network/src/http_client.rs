//! 세션 REST API 클라이언트.
//!
//! `SessionApi` 포트 구현. 주입된 `CredentialProvider`로 Bearer 헤더를 붙인다.
//! 부트스트랩과 메시지 전송은 자동 재시도하지 않고, 멱등한 리포트 조회만 재시도한다.

use async_trait::async_trait;
use parley_core::error::CoreError;
use parley_core::models::frame::MessageExchange;
use parley_core::models::message::AudioClip;
use parley_core::models::session::{SessionBootstrap, SessionId, SessionRequest, UserInput};
use parley_core::models::summary::SessionReport;
use parley_core::ports::credentials::CredentialProvider;
use parley_core::ports::session_api::SessionApi;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 기본 재시도 횟수 (리포트 조회)
const DEFAULT_MAX_RETRIES: u32 = 3;

/// 403 응답 중 업그레이드 안내로 분기할 에러 코드
const QUOTA_CODES: &[&str] = &["quota_exceeded", "subscription_required"];

/// 재시도 가능한 에러인지 판별
fn is_retryable(error: &CoreError) -> bool {
    matches!(
        error,
        CoreError::Network(_) | CoreError::ServiceUnavailable(_) | CoreError::RateLimit { .. }
    )
}

/// 서버 에러 본문 `{"code": ..., "message": ...}`
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "error_code")]
    code: Option<String>,
    #[serde(default, alias = "detail")]
    message: Option<String>,
}

/// fallback 전송 본문: 소켓 `user_message`와 같은 필드
#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<&'a AudioClip>,
}

/// 세션 REST 클라이언트: `SessionApi` 포트 구현
pub struct HttpSessionApi {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    timeout: Duration,
    max_retries: u32,
}

impl HttpSessionApi {
    /// 새 HTTP 세션 API 클라이언트 생성
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            timeout,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Authorization 헤더가 포함된 요청 빌더 반환
    async fn authorized_request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, CoreError> {
        let token = self.credentials.access_token().await?;
        let url = format!("{}{}", self.base_url, path);
        Ok(self.client.request(method, &url).bearer_auth(token))
    }

    /// 전송 실패 매핑 (타임아웃 구분)
    fn transport_error(&self, what: &str, e: reqwest::Error) -> CoreError {
        if e.is_timeout() {
            CoreError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            CoreError::Network(format!("{what} 요청 실패: {e}"))
        }
    }

    /// 응답 상태 코드 확인 및 에러 매핑
    async fn check_response(
        &self,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, CoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = resp.text().await.unwrap_or_else(|e| {
            warn!("응답 본문 읽기 실패: {e}");
            String::new()
        });
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = body.message.clone().unwrap_or_else(|| text.clone());

        match status.as_u16() {
            401 => Err(CoreError::Auth(format!("인증 실패: {message}"))),
            402 => Err(CoreError::QuotaExceeded {
                code: body.code.unwrap_or_else(|| "payment_required".to_string()),
                message,
            }),
            403 => match body.code {
                Some(code) if QUOTA_CODES.contains(&code.as_str()) => {
                    Err(CoreError::QuotaExceeded { code, message })
                }
                _ => Err(CoreError::Auth(format!("권한 없음: {message}"))),
            },
            404 => Err(CoreError::NotFound {
                resource_type: "Session".to_string(),
                id: message,
            }),
            429 => Err(CoreError::RateLimit {
                retry_after_secs: retry_after.unwrap_or(60),
            }),
            503 => Err(CoreError::ServiceUnavailable(message)),
            _ => Err(CoreError::Internal(format!("API 에러 ({status}): {message}"))),
        }
    }

    /// 재시도가 포함된 요청 실행
    ///
    /// exponential backoff: 1s → 2s → 4s
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !is_retryable(&e) || attempt >= self.max_retries => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if let CoreError::RateLimit { retry_after_secs } = &e {
                        delay = Duration::from_secs(*retry_after_secs);
                    }
                    warn!(
                        "요청 실패 (시도 {attempt}/{}): {e}, {delay:?} 후 재시도",
                        self.max_retries + 1
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn bootstrap(&self, request: &SessionRequest) -> Result<SessionBootstrap, CoreError> {
        debug!(
            "세션 생성 요청: skill={} sector={:?} level={}",
            request.skill_id, request.sector_id, request.level
        );

        let req = self
            .authorized_request(reqwest::Method::POST, "/api/v1/training/sessions")
            .await?;
        let resp = req
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error("세션 생성", e))?;

        let resp = self.check_response(resp).await?;
        let bootstrap: SessionBootstrap = resp
            .json()
            .await
            .map_err(|e| CoreError::Protocol(format!("세션 응답 파싱 실패: {e}")))?;

        debug!("세션 생성 성공: session_id={}", bootstrap.session_id);
        Ok(bootstrap)
    }

    async fn send_message(
        &self,
        session_id: &SessionId,
        input: &UserInput,
    ) -> Result<MessageExchange, CoreError> {
        debug!("fallback 메시지 전송: session_id={session_id}");

        let path = format!("/api/v1/training/sessions/{session_id}/messages");
        let body = OutgoingMessage {
            text: input.text.as_deref(),
            audio: input.audio.as_ref(),
        };
        let req = self.authorized_request(reqwest::Method::POST, &path).await?;
        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error("메시지 전송", e))?;

        let resp = self.check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| CoreError::Protocol(format!("메시지 응답 파싱 실패: {e}")))
    }

    async fn fetch_report(&self, session_id: &SessionId) -> Result<SessionReport, CoreError> {
        debug!("리포트 조회: session_id={session_id}");

        self.execute_with_retry(|| async {
            let path = format!("/api/v1/training/sessions/{session_id}/report");
            let req = self.authorized_request(reqwest::Method::GET, &path).await?;
            let resp = req
                .send()
                .await
                .map_err(|e| self.transport_error("리포트 조회", e))?;

            let resp = self.check_response(resp).await?;
            resp.json::<SessionReport>()
                .await
                .map_err(|e| CoreError::Protocol(format!("리포트 파싱 실패: {e}")))
        })
        .await
    }
}
