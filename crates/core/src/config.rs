//! 설정 관리: stevedore.toml 파싱 및 런타임 설정
//!
//! [`StevedoreConfig`]는 프로젝트 전체 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`STEVEDORE_PROJECT_NAME=shop` 형식)
//! 3. 설정 파일 (`stevedore.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), stevedore_core::error::StevedoreError> {
//! use stevedore_core::config::StevedoreConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = StevedoreConfig::load("stevedore.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = StevedoreConfig::parse("[project]\nname = \"shop\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, StevedoreError};
use crate::types::{CONTAINER_MODE_PREFIX, LabelKeys, ServiceRelationship};

/// Stevedore 통합 설정
///
/// `stevedore.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StevedoreConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Docker 연결 설정
    #[serde(default)]
    pub docker: DockerConfig,
    /// 프로젝트 설정
    #[serde(default)]
    pub project: ProjectConfig,
    /// 서비스 선언 (서비스 이름 -> 설정)
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

impl StevedoreConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StevedoreError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, StevedoreError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StevedoreError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                StevedoreError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, StevedoreError> {
        toml::from_str(toml_str).map_err(|e| {
            StevedoreError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `STEVEDORE_{SECTION}_{FIELD}`
    /// 서비스 선언은 오버라이드 대상이 아닙니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "STEVEDORE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "STEVEDORE_GENERAL_LOG_FORMAT");

        // Docker
        override_string(&mut self.docker.socket, "STEVEDORE_DOCKER_SOCKET");
        override_u64(&mut self.docker.timeout_secs, "STEVEDORE_DOCKER_TIMEOUT_SECS");

        // Project
        override_string(&mut self.project.name, "STEVEDORE_PROJECT_NAME");
        override_u64(
            &mut self.project.stop_timeout_secs,
            "STEVEDORE_PROJECT_STOP_TIMEOUT_SECS",
        );
        override_bool(&mut self.project.log_enabled, "STEVEDORE_PROJECT_LOG_ENABLED");
        override_usize(
            &mut self.project.log_tail_lines,
            "STEVEDORE_PROJECT_LOG_TAIL_LINES",
        );
        override_string(
            &mut self.project.credentials_file,
            "STEVEDORE_PROJECT_CREDENTIALS_FILE",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), StevedoreError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if !is_valid_name(&self.project.name) {
            return Err(ConfigError::InvalidValue {
                field: "project.name".to_owned(),
                reason: "must be non-empty and contain only [a-z0-9_-]".to_owned(),
            }
            .into());
        }

        if !self.project.labels.is_well_formed() {
            return Err(ConfigError::InvalidValue {
                field: "project.labels".to_owned(),
                reason: "label keys must be non-empty and distinct".to_owned(),
            }
            .into());
        }

        for (name, service) in &self.services {
            if !is_valid_name(name) {
                return Err(ConfigError::InvalidValue {
                    field: format!("services.{name}"),
                    reason: "service name must contain only [a-z0-9_-]".to_owned(),
                }
                .into());
            }
            if service.image.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("services.{name}.image"),
                    reason: "image must not be empty".to_owned(),
                }
                .into());
            }
            if let Some(bad) = service.links.iter().find(|l| parse_link(l).is_none()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("services.{name}.links"),
                    reason: format!("malformed link '{bad}', expected 'service[:alias]'"),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Docker 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker 소켓 경로 (비어 있으면 플랫폼 기본값)
    pub socket: String,
    /// API 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: String::new(),
            timeout_secs: 120,
        }
    }
}

/// 프로젝트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// 프로젝트 이름 (컨테이너 이름과 레이블에 사용)
    pub name: String,
    /// 정지/재시작 시 유예 시간 (초)
    pub stop_timeout_secs: u64,
    /// `up` 이후 로그 전달 활성화
    pub log_enabled: bool,
    /// 로그 스트림 시작 시 가져올 과거 줄 수
    pub log_tail_lines: usize,
    /// 레지스트리 인증 파일 경로 (비어 있으면 `~/.docker/config.json`)
    pub credentials_file: String,
    /// 예약 레이블 키
    #[serde(default)]
    pub labels: LabelKeys,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            stop_timeout_secs: 10,
            log_enabled: true,
            log_tail_lines: 10,
            credentials_file: String::new(),
            labels: LabelKeys::default(),
        }
    }
}

/// 서비스 하나의 원하는 상태
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// 이미지 참조 (`redis`, `redis:7`, `registry.local:5000/team/app@sha256:...`)
    pub image: String,
    /// 실행 명령
    pub command: Vec<String>,
    /// 환경변수 (`KEY=VALUE`)
    pub environment: Vec<String>,
    /// 사용자 레이블
    pub labels: BTreeMap<String, String>,
    /// 가상 터미널 할당 여부
    pub tty: bool,
    /// 링크 (`service` 또는 `service:alias`)
    pub links: Vec<String>,
    /// IPC 모드 (`container:<service>`는 관계로 해석)
    pub ipc: Option<String>,
    /// 네트워크 모드 (`container:<service>`는 관계로 해석)
    pub net: Option<String>,
}

impl ServiceConfig {
    /// 선언된 링크, IPC, 네트워크 설정에서 서비스 관계 목록을 도출합니다.
    ///
    /// 순서는 링크 선언 순서, 그다음 IPC, 네트워크입니다.
    pub fn relationships(&self) -> Vec<ServiceRelationship> {
        let mut rels: Vec<ServiceRelationship> = self
            .links
            .iter()
            .filter_map(|l| parse_link(l))
            .map(|(target, alias)| ServiceRelationship::link(target, alias))
            .collect();

        if let Some(target) = self.ipc.as_deref().and_then(shared_target) {
            rels.push(ServiceRelationship::ipc(target));
        }
        if let Some(target) = self.net.as_deref().and_then(shared_target) {
            rels.push(ServiceRelationship::net(target));
        }

        rels
    }
}

/// `service[:alias]` 형식의 링크 선언을 해석합니다.
fn parse_link(link: &str) -> Option<(&str, &str)> {
    let (target, alias) = match link.split_once(':') {
        Some((target, alias)) => (target.trim(), alias.trim()),
        None => (link.trim(), link.trim()),
    };
    if target.is_empty() || alias.is_empty() {
        return None;
    }
    Some((target, alias))
}

fn shared_target(mode: &str) -> Option<&str> {
    mode.strip_prefix(CONTAINER_MODE_PREFIX)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
