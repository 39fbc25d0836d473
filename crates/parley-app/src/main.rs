//! # parley-app
//!
//! Parley 롤플레이 세션 터미널 클라이언트 진입점.
//! 설정 로드, 어댑터 와이어링(DI), 세션 루프(재시도/종료)를 담당한다.

mod settings;
mod terminal;

use anyhow::{bail, Result};
use clap::Parser;
use parley_core::models::session::SessionRequest;
use parley_core::ports::credentials::{CredentialProvider, StaticToken};
use parley_core::ports::session_api::SessionApi;
use parley_network::auth::TokenManager;
use parley_network::http_client::HttpSessionApi;
use parley_network::session_socket::{SocketFactory, SocketPolicy};
use parley_session::client::{ClientSettings, SessionClient};
use parley_session::error::SessionError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::terminal::Outcome;

/// Parley 세일즈 롤플레이 클라이언트
///
/// 시뮬레이션된 잠재고객과 실시간으로 대화하며 게이지를 올린다.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 서버 URL (API와 소켓 공통)
    #[arg(long, short = 's', env = "PARLEY_API_URL")]
    server: Option<String>,

    /// 연습할 스킬 ID
    #[arg(long)]
    skill: String,

    /// 업종 ID
    #[arg(long)]
    sector: Option<String>,

    /// 난이도 레벨
    #[arg(long, default_value = "1")]
    level: u8,

    /// 액세스 토큰 (없으면 이메일/비밀번호 로그인)
    #[arg(long, env = "PARLEY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(long, env = "PARLEY_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// 조직 ID (로그인 시)
    #[arg(long)]
    organization: Option<String>,

    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉터리의 config.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "warn")]
    log_level: String,
}

/// 자격증명 결정: 토큰 우선, 없으면 로그인
async fn resolve_credentials(args: &Args, base_url: &str) -> Result<Arc<dyn CredentialProvider>> {
    if let Some(token) = &args.token {
        return Ok(Arc::new(StaticToken::new(token.clone())));
    }

    match (&args.email, &args.password) {
        (Some(email), Some(password)) => {
            let manager = TokenManager::new(base_url);
            manager
                .login(email, password, args.organization.as_deref())
                .await?;
            info!("로그인 완료: {email}");
            Ok(Arc::new(manager))
        }
        _ => bail!("--token(PARLEY_TOKEN) 또는 PARLEY_EMAIL/PARLEY_PASSWORD가 필요합니다"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // tracing 초기화
    let log_filter = format!(
        "parley={},parley_app={},parley_core={},parley_network={},parley_session={}",
        args.log_level, args.log_level, args.log_level, args.log_level, args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // 설정 로드
    let config = settings::load(args.config.as_deref(), args.server.as_deref())?;
    info!("서버: {}", config.server.base_url);

    // ── 어댑터 생성 (DI 와이어링) ──
    let credentials = resolve_credentials(&args, &config.server.base_url).await?;
    let api: Arc<dyn SessionApi> = Arc::new(HttpSessionApi::new(
        &config.server.base_url,
        credentials.clone(),
        config.request_timeout(),
    )?);
    let sockets = SocketFactory::new(
        &config.server.base_url,
        credentials,
        SocketPolicy::from_config(&config),
    );
    let client_settings = ClientSettings::from_config(&config);

    let request = SessionRequest {
        skill_id: args.skill.clone(),
        sector_id: args.sector.clone(),
        level: args.level,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // ── 세션 루프 ──
    loop {
        println!("세션 준비 중…");
        let client =
            match SessionClient::start(api.clone(), &sockets, &request, client_settings).await {
                Ok(client) => client,
                Err(SessionError::UpgradeRequired { code, message }) => {
                    println!("!! 이용 한도에 도달했습니다 ({code}): {message}");
                    println!("플랜을 업그레이드한 뒤 다시 시도하세요.");
                    return Ok(());
                }
                Err(e) => {
                    error!("세션 시작 실패: {e}");
                    println!("!! 세션을 시작하지 못했습니다: {e}");
                    println!("/retry 다시 시도 | /quit 종료");
                    if wait_for_retry(&mut lines).await? {
                        continue;
                    }
                    return Ok(());
                }
            };

        let outcome = terminal::run_session(&client, &mut lines).await?;
        // drop 시 소켓 연결 해제
        drop(client);

        match outcome {
            Outcome::Retry => continue,
            Outcome::Exit => break,
        }
    }

    info!("Parley 종료");
    Ok(())
}

/// 부트스트랩 실패 후 재시도 여부 입력
async fn wait_for_retry<R>(lines: &mut tokio::io::Lines<R>) -> Result<bool>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        match terminal::parse_command(&line) {
            Some(terminal::Command::Retry) => return Ok(true),
            Some(terminal::Command::Quit) => return Ok(false),
            _ => println!("/retry 또는 /quit"),
        }
    }
    Ok(false)
}
