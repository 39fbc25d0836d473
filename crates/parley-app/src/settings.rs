//! 설정 로드.
//!
//! 우선순위: 기본값 → 설정 파일 → 환경변수(`PARLEY__SECTION__KEY`) → CLI 인자.
//! 설정 파일은 `--config`로 지정하거나 플랫폼 기본 경로에서 찾는다.
//!
//! # 플랫폼별 기본 경로:
//! - macOS: `~/Library/Application Support/com.parley.parley/config.toml`
//! - Windows: `%APPDATA%\parley\parley\config\config.toml`
//! - Linux: `~/.config/parley/config.toml`

use config::{Config, Environment, File};
use directories::ProjectDirs;
use parley_core::config::AppConfig;
use parley_core::error::CoreError;
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_PREFIX: &str = "PARLEY";

/// 플랫폼 기본 설정 파일 경로
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "parley", "parley").map(|p| p.config_dir().join("config.toml"))
}

/// 설정 로드 (프로세스 환경변수 사용)
pub fn load(config_file: Option<&Path>, server: Option<&str>) -> Result<AppConfig, CoreError> {
    let file = match config_file {
        Some(path) => Some((path.to_path_buf(), true)),
        None => default_config_path().map(|path| (path, false)),
    };
    layered(file, server, None)
}

/// 계층 병합. `env`가 `Some`이면 프로세스 환경 대신 사용
fn layered(
    file: Option<(PathBuf, bool)>,
    server: Option<&str>,
    env: Option<config::Map<String, String>>,
) -> Result<AppConfig, CoreError> {
    let defaults = Config::try_from(&AppConfig::default_config()).map_err(config_error)?;
    let mut builder = Config::builder().add_source(defaults);

    if let Some((path, required)) = file {
        debug!("설정 파일: {} (필수: {required})", path.display());
        builder = builder.add_source(File::from(path).required(required));
    }

    builder = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .set_override_option("server.base_url", server.map(str::to_string))
        .map_err(config_error)?;

    let config: AppConfig = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(config_error)?;
    config.validate()?;
    Ok(config)
}

fn config_error(e: config::ConfigError) -> CoreError {
    CoreError::Config(e.to_string())
}
