//! Error taxonomy.
//!
//! Only [`SpecError`] and [`DirectoryError`] end an invocation. [`FetchError`]
//! is stored on the attribute it belongs to and [`RenderError`] is replaced
//! by a placeholder in the one cell it affects.

use shared::{CodecError, UnknownRegion};
use thiserror::Error;

/// Problems with the user's field expression. Reported before any network
/// activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("unknown field '{0}' (see --list-fields)")]
    UnknownField(String),
    #[error("could not parse field list {0:?}")]
    Malformed(String),
}

/// Master-server enumeration failed; there is nothing to render.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    UnknownRegion(#[from] UnknownRegion),
    #[error("invalid start address {0:?} (expected ip:port)")]
    InvalidStart(String),
    #[error("could not resolve master server {address}: {reason}")]
    Resolve { address: String, reason: String },
    #[error("master server query failed: {0}")]
    Network(#[from] std::io::Error),
    #[error("master server did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("malformed master server reply: {0}")]
    Malformed(#[from] CodecError),
}

/// Failure of one attribute fetch for one server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("timed out")]
    Timeout,
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("query task aborted: {0}")]
    Aborted(String),
}

impl From<CodecError> for FetchError {
    fn from(err: CodecError) -> Self {
        FetchError::Malformed(err.to_string())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => FetchError::Timeout,
            _ => FetchError::Unreachable(err.to_string()),
        }
    }
}

/// A single cell could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("{0} not available")]
    Unavailable(&'static str),
    #[error("field '{field}' cannot display {value}")]
    Untransformable { field: &'static str, value: String },
}

/// Fatal errors surfaced by the binary.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_errors_are_classified() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(FetchError::from(refused), FetchError::Unreachable(_)));

        let slow = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(FetchError::from(slow), FetchError::Timeout);
    }

    #[test]
    fn test_codec_errors_are_malformed() {
        let err = FetchError::from(CodecError::Split);
        assert_eq!(
            err,
            FetchError::Malformed("split responses are not supported".to_string())
        );
    }

    #[test]
    fn test_region_error_keeps_message() {
        let err = DirectoryError::from(UnknownRegion("XX".to_string()));
        assert!(err.to_string().starts_with("region 'XX' does not exist"));
    }
}
