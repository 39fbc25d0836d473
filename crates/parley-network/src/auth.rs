//! 로그인 기반 자격증명.
//!
//! 이메일/비밀번호로 받은 액세스 토큰을 보관하고, 만료가 가까우면
//! 리프레시 토큰으로 교체한다. `CredentialProvider` 포트로 REST 클라이언트와
//! 세션 소켓이 같은 토큰을 쓴다.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parley_core::error::CoreError;
use parley_core::ports::credentials::CredentialProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const LOGIN_PATH: &str = "/api/v1/auth/tokens";
const REFRESH_PATH: &str = "/api/v1/auth/tokens/refresh";

/// 만료 전 선제 갱신 여유
const REFRESH_MARGIN_SECS: i64 = 120;

/// `expires_in`이 없을 때 가정하는 수명
const DEFAULT_LIFETIME_SECS: i64 = 3600;

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization_id: Option<&'a str>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct IssuedToken {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn issued(token: IssuedToken, carried_refresh: Option<String>) -> Self {
        let lifetime = token.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS);
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token.or(carried_refresh),
            expires_at: Utc::now() + Duration::seconds(lifetime),
        }
    }

    fn expiring(&self) -> bool {
        Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS) >= self.expires_at
    }
}

/// 로그인 토큰 보관소
#[derive(Clone)]
pub struct TokenManager {
    base_url: String,
    client: reqwest::Client,
    session: Arc<RwLock<Option<Session>>>,
}

impl TokenManager {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// 이메일/비밀번호 로그인
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        organization_id: Option<&str>,
    ) -> Result<(), CoreError> {
        let body = LoginRequest {
            email,
            password,
            organization_id,
        };
        let token = self.issue(LOGIN_PATH, &body, "로그인").await?;

        let session = Session::issued(token, None);
        debug!("로그인 성공: 만료 {}", session.expires_at);
        *self.session.write().await = Some(session);
        Ok(())
    }

    /// 리프레시 토큰으로 액세스 토큰 교체
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .ok_or_else(not_logged_in)?
            .refresh_token
            .clone()
            .ok_or_else(|| CoreError::Auth("리프레시 토큰 없음".to_string()))?;

        let body = RefreshRequest {
            refresh_token: &refresh_token,
        };
        let token = self.issue(REFRESH_PATH, &body, "토큰 갱신").await?;

        let session = Session::issued(token, Some(refresh_token));
        debug!("토큰 갱신: 만료 {}", session.expires_at);
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn issue<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        what: &str,
    ) -> Result<IssuedToken, CoreError> {
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("{what} 요청 실패: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::Auth(format!("{what} 실패 ({status}): {text}")));
        }

        resp.json()
            .await
            .map_err(|e| CoreError::Protocol(format!("{what} 응답 파싱 실패: {e}")))
    }
}

fn not_logged_in() -> CoreError {
    CoreError::Auth("로그인되지 않음".to_string())
}

#[async_trait]
impl CredentialProvider for TokenManager {
    /// 만료가 가까우면 먼저 갱신을 시도한다. 갱신 실패 시 기존 토큰을 그대로 쓴다.
    async fn access_token(&self) -> Result<String, CoreError> {
        let expiring = self
            .session
            .read()
            .await
            .as_ref()
            .ok_or_else(not_logged_in)?
            .expiring();

        if expiring {
            if let Err(e) = self.refresh().await {
                warn!("토큰 갱신 실패, 기존 토큰 사용: {e}");
            }
        }

        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or_else(not_logged_in)
    }
}
