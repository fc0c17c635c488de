use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CoreReason {
    #[error("invalid window spec")]
    InvalidWindowSpec,
    #[error("accumulator function error")]
    Accumulator,
    #[error("result emit error")]
    Emit,
    #[error("event time out of range")]
    EventTimeRange,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::InvalidWindowSpec => 1101,
            Self::Accumulator => 1102,
            Self::Emit => 1103,
            Self::EventTimeRange => 1104,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;

/// Shorthand for a configuration-time window shape error.
pub(crate) fn invalid_spec(detail: impl Into<String>) -> CoreError {
    StructError::from(CoreReason::InvalidWindowSpec).with_detail(detail.into())
}
