//! 에러 타입: 도메인별 에러 정의

/// Stevedore 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum StevedoreError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 컨테이너 생명주기 에러
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 컨테이너 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// 런타임 API 호출 실패
    #[error("runtime api error: {0}")]
    RuntimeApi(String),

    /// 컨테이너 또는 이미지를 찾을 수 없음
    #[error("not found: {0}")]
    NotFound(String),

    /// 의존 서비스의 컨테이너가 없음
    #[error("dependency not found: {0}")]
    DependencyNotFound(String),

    /// 서비스 관계에 순환이 존재함
    #[error("dependency cycle: {0}")]
    DependencyCycle(String),

    /// 이미지 pull 실패
    #[error("image pull failed for '{image}': {reason}")]
    ImagePull { image: String, reason: String },
}
