//! 컴포즈 에러 타입
//!
//! [`ComposeError`]는 컨테이너 생명주기, 의존성 해석, 이미지 pull,
//! 로그 스트리밍 중 발생하는 모든 에러를 표현합니다.
//! `From<ComposeError> for StevedoreError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use stevedore_core::error::{ConfigError, ContainerError, StevedoreError};
use stevedore_core::types::RelationshipKind;

/// 컴포즈 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// 런타임 API 호출 실패
    #[error("runtime api error: {0}")]
    Backend(String),

    /// Docker 소켓 연결 실패
    #[error("runtime connection error: {0}")]
    Connection(String),

    /// 런타임이 404를 반환함 (이미지 또는 컨테이너 없음)
    #[error("not found: {0}")]
    NotFound(String),

    /// IPC/NET 관계의 대상 서비스에 컨테이너가 없음
    #[error("service '{service}' requires a running '{target}' container for {kind} sharing")]
    DependencyNotFound {
        /// 관계를 선언한 서비스
        service: String,
        /// 대상 서비스
        target: String,
        /// 관계 종류
        kind: RelationshipKind,
    },

    /// 서비스 관계 그래프에 순환이 있음
    #[error("dependency cycle detected: {}", chain.join(" -> "))]
    DependencyCycle {
        /// 순환 경로 (첫 원소와 마지막 원소가 같음)
        chain: Vec<String>,
    },

    /// 이미지 pull 실패
    #[error("failed to pull image '{image}': {reason}")]
    ImagePull {
        /// 이미지 참조
        image: String,
        /// 실패 사유
        reason: String,
    },

    /// 이미지 참조 형식 오류
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidReference {
        /// 원본 참조 문자열
        reference: String,
        /// 오류 사유
        reason: String,
    },

    /// 레지스트리 인증 파일 로딩 실패
    #[error("credential store error: {path}: {reason}")]
    Credentials {
        /// 인증 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 프로젝트에 선언되지 않은 서비스
    #[error("service not declared in project: {0}")]
    UnknownService(String),

    /// 컨테이너 핸들의 소유 서비스가 이미 해제됨
    #[error("owning service of container '{0}' has been dropped")]
    ServiceDropped(String),

    /// 로그 스트림 읽기 실패
    #[error("log stream error: {0}")]
    LogStream(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<ComposeError> for StevedoreError {
    fn from(err: ComposeError) -> Self {
        match err {
            ComposeError::NotFound(what) => {
                StevedoreError::Container(ContainerError::NotFound(what))
            }
            ComposeError::DependencyNotFound { .. } => {
                StevedoreError::Container(ContainerError::DependencyNotFound(err.to_string()))
            }
            ComposeError::DependencyCycle { .. } => {
                StevedoreError::Container(ContainerError::DependencyCycle(err.to_string()))
            }
            ComposeError::ImagePull { image, reason } => {
                StevedoreError::Container(ContainerError::ImagePull { image, reason })
            }
            ComposeError::Config { field, reason } => {
                StevedoreError::Config(ConfigError::InvalidValue { field, reason })
            }
            ComposeError::Credentials { .. } => StevedoreError::Config(ConfigError::ParseFailed {
                reason: err.to_string(),
            }),
            ComposeError::Backend(_)
            | ComposeError::Connection(_)
            | ComposeError::InvalidReference { .. }
            | ComposeError::UnknownService(_)
            | ComposeError::ServiceDropped(_)
            | ComposeError::LogStream(_) => {
                StevedoreError::Container(ContainerError::RuntimeApi(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_not_found_display() {
        let err = ComposeError::DependencyNotFound {
            service: "web".to_owned(),
            target: "vpn".to_owned(),
            kind: RelationshipKind::NetNamespace,
        };
        let msg = err.to_string();
        assert!(msg.contains("web"));
        assert!(msg.contains("vpn"));
        assert!(msg.contains("net"));
    }

    #[test]
    fn dependency_cycle_display_joins_chain() {
        let err = ComposeError::DependencyCycle {
            chain: vec!["a".to_owned(), "b".to_owned(), "a".to_owned()],
        };
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn image_pull_display() {
        let err = ComposeError::ImagePull {
            image: "redis:latest".to_owned(),
            reason: "denied".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("redis:latest"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn converts_not_found() {
        let err: StevedoreError = ComposeError::NotFound("no such image".to_owned()).into();
        assert!(matches!(
            err,
            StevedoreError::Container(ContainerError::NotFound(_))
        ));
    }

    #[test]
    fn converts_dependency_not_found() {
        let err: StevedoreError = ComposeError::DependencyNotFound {
            service: "web".to_owned(),
            target: "shm".to_owned(),
            kind: RelationshipKind::IpcNamespace,
        }
        .into();
        assert!(matches!(
            err,
            StevedoreError::Container(ContainerError::DependencyNotFound(_))
        ));
    }

    #[test]
    fn converts_config_error() {
        let err: StevedoreError = ComposeError::Config {
            field: "stop_timeout_secs".to_owned(),
            reason: "too large".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            StevedoreError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn converts_backend_error() {
        let err: StevedoreError = ComposeError::Backend("boom".to_owned()).into();
        assert!(matches!(
            err,
            StevedoreError::Container(ContainerError::RuntimeApi(_))
        ));
    }
}
