//! Failure taxonomy and ranking.

use std::fmt::{self, Display};

/// Closed taxonomy of attempt failures.
///
/// Every failed attempt ends up in exactly one of these categories; the
/// dispatcher uses the fixed ranking (see [`ErrorCode::rank`]) to decide
/// which of several observed failures to surface to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The local attempt deadline fired before a reply arrived. Not used for
    /// the caller's own cancellation.
    Timeout,
    /// A socket-level failure (connection refused, reset, unreachable, ...).
    Network,
    /// A reply arrived but was malformed or otherwise unexpected at the
    /// protocol level.
    InvalidResponse,
    /// A server failure, or the synthesized catch-all when nothing more
    /// specific was observed.
    ServFail,
}

impl ErrorCode {
    /// The surfacing rank of this category. Lower ranks are considered more
    /// actionable and win when aggregating several failures; ties keep the
    /// first-seen failure.
    pub fn rank(self) -> u8 {
        match self {
            Self::Timeout => 0,
            Self::Network => 1,
            Self::ServFail => 2,
            Self::InvalidResponse => 3,
        }
    }

    /// Classifies an executor error into its taxonomy category.
    pub fn classify(error: &ExecError) -> Self {
        match error {
            ExecError::Io(_) => Self::Network,
            ExecError::Protocol(_) => Self::InvalidResponse,
            ExecError::Timeout => Self::Timeout,
            ExecError::Other(_) => Self::ServFail,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::InvalidResponse => "invalid response",
            Self::ServFail => "server failure",
        })
    }
}

/// Errors raised by a [`QueryExecutor`] for a single attempt.
///
/// These never escape the dispatcher: every variant is caught, classified
/// into an [`ErrorCode`], and converted into a failed
/// [`DnsResponse`](crate::DnsResponse).
///
/// [`QueryExecutor`]: crate::executor::QueryExecutor
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Socket-level failure while talking to the endpoint.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    /// The endpoint replied with something the executor could not decode.
    #[error("bad response from endpoint: {0}")]
    Protocol(String),
    /// The executor's own internal deadline fired.
    #[error("query timed out inside the executor")]
    Timeout,
    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Errors encountered constructing a [`MultiResolver`](crate::MultiResolver).
///
/// This is the only error type the public API surfaces directly; query
/// failures are reported on the returned response instead.
#[derive(Debug, thiserror::Error)]
pub enum MultiResolverError {
    /// Produced when a resolver is built without any endpoints.
    #[error("no resolver endpoints configured")]
    NoEndpoints,
}
