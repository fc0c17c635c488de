use derive_more::From;
use hg_core::CoreReason;
use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum RuntimeReason {
    #[error("bootstrap error")]
    Bootstrap,
    #[error("lane error")]
    Lane,
    #[error("shutdown error")]
    Shutdown,
    #[error("{0}")]
    Core(CoreReason),
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for RuntimeReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Bootstrap => 2101,
            Self::Lane => 2102,
            Self::Shutdown => 2103,
            Self::Core(c) => c.error_code(),
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type RuntimeError = StructError<RuntimeReason>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Lift a window-operator error into the runtime, keeping its core reason
/// and error code.
pub(crate) fn core_failure(context: &str, err: hg_core::CoreError) -> RuntimeError {
    StructError::from(RuntimeReason::Core(err.reason().clone()))
        .with_detail(format!("{context}: {err}"))
}
