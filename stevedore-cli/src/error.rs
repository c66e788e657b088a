//! CLI-specific error types and exit code mapping

use stevedore_compose::ComposeError;
use stevedore_core::error::StevedoreError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Cannot reach the container runtime.
    #[error("container runtime not reachable: {0}")]
    RuntimeUnavailable(String),

    /// Service relationships cannot be satisfied.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from stevedore-core.
    #[error("{0}")]
    Core(#[from] StevedoreError),

    /// Lifecycle error from stevedore-compose.
    #[error("{0}")]
    Compose(ComposeError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                          |
    /// |------|----------------------------------|
    /// | 0    | Success                          |
    /// | 1    | General / command error          |
    /// | 2    | Configuration error              |
    /// | 3    | Container runtime unreachable    |
    /// | 4    | Dependency missing or cyclic     |
    /// | 10   | IO error                         |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(StevedoreError::Config(_)) => 2,
            Self::RuntimeUnavailable(_) => 3,
            Self::Dependency(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) | Self::Compose(_) => 1,
        }
    }
}

impl From<ComposeError> for CliError {
    fn from(e: ComposeError) -> Self {
        match e {
            ComposeError::Connection(_) => Self::RuntimeUnavailable(e.to_string()),
            ComposeError::Config { .. } | ComposeError::Credentials { .. } => {
                Self::Config(e.to_string())
            }
            ComposeError::DependencyNotFound { .. } | ComposeError::DependencyCycle { .. } => {
                Self::Dependency(e.to_string())
            }
            other => Self::Compose(other),
        }
    }
}
