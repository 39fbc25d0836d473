//! 인증 정보 제공자 포트.
//!
//! 전역 저장소에서 토큰을 꺼내는 대신, REST 클라이언트와 소켓 생성자에 주입한다.

use async_trait::async_trait;

use crate::error::CoreError;

/// 베어러 토큰 제공자
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// 현재 유효한 액세스 토큰
    async fn access_token(&self) -> Result<String, CoreError>;
}

/// 고정 토큰: CLI 인자나 테스트에서 사용
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<String, CoreError> {
        if self.0.is_empty() {
            return Err(CoreError::Auth("빈 토큰".to_string()));
        }
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_round_trip() {
        let creds = StaticToken::new("abc");
        assert_eq!(creds.access_token().await.unwrap(), "abc");
        assert_eq!(format!("{creds:?}"), "StaticToken(***)");
    }

    #[tokio::test]
    async fn empty_static_token_is_auth_error() {
        let err = StaticToken::new("").access_token().await.unwrap_err();
        assert!(matches!(err, CoreError::Auth(_)));
    }
}
