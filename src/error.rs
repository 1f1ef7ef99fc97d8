//! Status codes and error types shared by every public operation.

use thiserror::Error;

const ERROR_BASE: i32 = -1_073_741_824;

/// Status codes returned across the API boundary.
///
/// Values match the platform C status codes so a caller can compare them
/// against the native constants without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    InvalidParameter = -22,
    StreamsPipe = -86,
    TryAgain = -11,
    PermissionDenied = -13,
    OutOfMemory = -12,
    IoError = -5,
    Unknown = ERROR_BASE,
    TimedOut = ERROR_BASE + 1,
    NotSupported = ERROR_BASE + 2,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

/// Errors that can occur in pipeline, tensor and handle operations.
#[derive(Error, Debug)]
pub enum MlError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("streams pipe error: {0}")]
    StreamsPipe(String),

    #[error("try again: {0}")]
    TryAgain(String),

    #[error("timed out: {0}")]
    TimedOut(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl MlError {
    pub fn status(&self) -> Status {
        match self {
            MlError::InvalidParameter(_) => Status::InvalidParameter,
            MlError::StreamsPipe(_) => Status::StreamsPipe,
            MlError::TryAgain(_) => Status::TryAgain,
            MlError::TimedOut(_) => Status::TimedOut,
            MlError::NotSupported(_) => Status::NotSupported,
            MlError::PermissionDenied(_) => Status::PermissionDenied,
            MlError::OutOfMemory(_) => Status::OutOfMemory,
            MlError::Io(_) => Status::IoError,
            MlError::Unknown(_) => Status::Unknown,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MlError::InvalidParameter(msg.into())
    }

    pub(crate) fn pipe(msg: impl Into<String>) -> Self {
        MlError::StreamsPipe(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MlError>;

/// Collapse an operation result into its status code.
pub fn status_of<T>(result: &Result<T>) -> Status {
    match result {
        Ok(_) => Status::Success,
        Err(e) => e.status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_values_match_native_codes() {
        assert_eq!(Status::Success.code(), 0);
        assert_eq!(Status::InvalidParameter.code(), -22);
        assert_eq!(Status::StreamsPipe.code(), -86);
        assert_eq!(Status::TimedOut.code(), Status::Unknown.code() + 1);
        assert_eq!(Status::NotSupported.code(), Status::Unknown.code() + 2);
    }

    #[test]
    fn test_error_maps_to_status() {
        let err = MlError::invalid("bad index");
        assert_eq!(err.status(), Status::InvalidParameter);

        let io: MlError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(io.status(), Status::IoError);

        let ok: Result<()> = Ok(());
        assert_eq!(status_of(&ok), Status::Success);
    }
}
