//! 컴포즈 설정
//!
//! [`ComposeConfig`]는 core의 [`ProjectConfig`](stevedore_core::config::ProjectConfig)와
//! [`DockerConfig`](stevedore_core::config::DockerConfig)를 기반으로
//! 생명주기 코드가 사용하는 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use stevedore_core::config::StevedoreConfig;
//! use stevedore_compose::config::ComposeConfig;
//!
//! let core_config = StevedoreConfig::default();
//! let config = ComposeConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use stevedore_core::config::StevedoreConfig;
use stevedore_core::types::LabelKeys;

use crate::error::ComposeError;

/// 컴포즈 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// 프로젝트 이름
    pub project_name: String,
    /// Docker 소켓 경로 (비어 있으면 플랫폼 기본값)
    pub docker_socket: String,
    /// Docker API 타임아웃 (초)
    pub docker_timeout_secs: u64,
    /// 정지/재시작 유예 시간 (초)
    pub stop_timeout_secs: u64,
    /// `up` 이후 로그 전달 여부
    pub log_enabled: bool,
    /// 로그 스트림 시작 시 과거 줄 수
    pub log_tail_lines: usize,
    /// 예약 레이블 키
    pub labels: LabelKeys,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            project_name: "default".to_owned(),
            docker_socket: String::new(),
            docker_timeout_secs: 120,
            stop_timeout_secs: 10,
            log_enabled: true,
            log_tail_lines: 10,
            labels: LabelKeys::default(),
        }
    }
}

/// 설정 상한값 상수
const MAX_STOP_TIMEOUT_SECS: u64 = 3600;
const MAX_DOCKER_TIMEOUT_SECS: u64 = 3600;
const MAX_LOG_TAIL_LINES: usize = 10_000;

impl ComposeConfig {
    /// core 설정에서 컴포즈 설정을 생성합니다.
    pub fn from_core(core: &StevedoreConfig) -> Self {
        Self {
            project_name: core.project.name.clone(),
            docker_socket: core.docker.socket.clone(),
            docker_timeout_secs: core.docker.timeout_secs,
            stop_timeout_secs: core.project.stop_timeout_secs,
            log_enabled: core.project.log_enabled,
            log_tail_lines: core.project.log_tail_lines,
            labels: core.project.labels.clone(),
        }
    }

    /// 정지 유예 시간을 반환합니다.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ComposeError> {
        if self.project_name.is_empty() {
            return Err(ComposeError::Config {
                field: "project_name".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.stop_timeout_secs > MAX_STOP_TIMEOUT_SECS {
            return Err(ComposeError::Config {
                field: "stop_timeout_secs".to_owned(),
                reason: format!("must be 0-{MAX_STOP_TIMEOUT_SECS}"),
            });
        }

        if self.docker_timeout_secs == 0 || self.docker_timeout_secs > MAX_DOCKER_TIMEOUT_SECS {
            return Err(ComposeError::Config {
                field: "docker_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_DOCKER_TIMEOUT_SECS}"),
            });
        }

        if self.log_tail_lines > MAX_LOG_TAIL_LINES {
            return Err(ComposeError::Config {
                field: "log_tail_lines".to_owned(),
                reason: format!("must be 0-{MAX_LOG_TAIL_LINES}"),
            });
        }

        if !self.labels.is_well_formed() {
            return Err(ComposeError::Config {
                field: "labels".to_owned(),
                reason: "label keys must be non-empty and distinct".to_owned(),
            });
        }

        Ok(())
    }
}

/// 컴포즈 설정 빌더
#[derive(Default)]
pub struct ComposeConfigBuilder {
    config: ComposeConfig,
}

impl ComposeConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 프로젝트 이름을 설정합니다.
    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.config.project_name = name.into();
        self
    }

    /// Docker 소켓 경로를 설정합니다.
    pub fn docker_socket(mut self, socket: impl Into<String>) -> Self {
        self.config.docker_socket = socket.into();
        self
    }

    /// Docker API 타임아웃(초)을 설정합니다.
    pub fn docker_timeout_secs(mut self, secs: u64) -> Self {
        self.config.docker_timeout_secs = secs;
        self
    }

    /// 정지 유예 시간(초)을 설정합니다.
    pub fn stop_timeout_secs(mut self, secs: u64) -> Self {
        self.config.stop_timeout_secs = secs;
        self
    }

    /// 로그 전달 여부를 설정합니다.
    pub fn log_enabled(mut self, enabled: bool) -> Self {
        self.config.log_enabled = enabled;
        self
    }

    /// 로그 tail 줄 수를 설정합니다.
    pub fn log_tail_lines(mut self, lines: usize) -> Self {
        self.config.log_tail_lines = lines;
        self
    }

    /// 예약 레이블 키를 설정합니다.
    pub fn labels(mut self, labels: LabelKeys) -> Self {
        self.config.labels = labels;
        self
    }

    /// 설정을 검증하고 `ComposeConfig`를 생성합니다.
    pub fn build(self) -> Result<ComposeConfig, ComposeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
