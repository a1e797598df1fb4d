//! Query responses.

use std::time::Duration;

use crate::endpoint::{Endpoint, EndpointKey, Transport};
use crate::error::ErrorCode;
use crate::record::{Answer, Question};

/// Response codes a resolver can report, mirroring the common DNS RCODEs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// No error condition.
    NoError,
    /// The endpoint could not interpret the query.
    FormErr,
    /// The endpoint failed to process the query.
    ServFail,
    /// The queried name does not exist.
    NxDomain,
    /// The endpoint does not support the requested query kind.
    NotImp,
    /// The endpoint refused to answer.
    Refused,
}

/// Message carried by the response synthesized when the caller cancels a
/// query before any attempt produced a result.
const CANCELLED_MESSAGE: &str = "query cancelled by caller";

/// The outcome of one logical query.
///
/// A response is built once, when an attempt (or the whole dispatch)
/// concludes, and is immutable afterwards. Failures are reported here rather
/// than through `Err`: callers inspect [`status`](Self::status),
/// [`error`](Self::error), and [`error_code`](Self::error_code).
#[derive(Debug, Clone)]
pub struct DnsResponse {
    /// The response status.
    pub status: ResponseStatus,
    /// Human-readable error detail; empty on success.
    pub error: String,
    /// The failure category, when the response represents a failure.
    pub error_code: Option<ErrorCode>,
    /// Answer records.
    pub answers: Vec<Answer>,
    /// The question section the answers belong to.
    pub questions: Vec<Question>,
    /// Transport of the endpoint that produced this response.
    pub transport: Option<Transport>,
    /// Identity of the endpoint that produced this response.
    pub endpoint: Option<EndpointKey>,
    /// Wall-clock round-trip time of the producing attempt, including any
    /// time spent queued on the per-endpoint limiter.
    pub round_trip_time: Option<Duration>,
}

impl DnsResponse {
    fn empty(status: ResponseStatus) -> Self {
        Self {
            status,
            error: String::new(),
            error_code: None,
            answers: Vec::new(),
            questions: Vec::new(),
            transport: None,
            endpoint: None,
            round_trip_time: None,
        }
    }

    /// Creates a successful response carrying `answers` for `questions`.
    pub fn answered(questions: Vec<Question>, answers: Vec<Answer>) -> Self {
        Self {
            answers,
            questions,
            ..Self::empty(ResponseStatus::NoError)
        }
    }

    /// Creates a non-NoError response as reported by an endpoint, e.g. an
    /// NXDOMAIN. Carries no error message, so an NXDOMAIN with status
    /// reporting is still "the endpoint answered".
    pub fn with_status(status: ResponseStatus, questions: Vec<Question>) -> Self {
        Self {
            questions,
            ..Self::empty(status)
        }
    }

    /// Creates a failed response in the given taxonomy category.
    pub fn failed(code: ErrorCode, error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            error_code: Some(code),
            ..Self::empty(ResponseStatus::ServFail)
        }
    }

    /// Creates the synthesized server-failure response used when every
    /// endpoint was exhausted without any classified failure to surface.
    pub fn servfail(error: impl ToString) -> Self {
        Self::failed(ErrorCode::ServFail, error)
    }

    /// Creates the cancellation signal produced when the caller's token was
    /// cancelled. Shaped like a server failure but recognizable via
    /// [`is_cancellation`](Self::is_cancellation); never stamped with an
    /// endpoint because no attempt produced it.
    pub fn cancelled() -> Self {
        Self::failed(ErrorCode::ServFail, CANCELLED_MESSAGE)
    }

    /// Whether this response terminates a dispatch successfully: a response
    /// is present with status NoError and no error message.
    ///
    /// The answer count is deliberately not consulted; an empty NoError
    /// response is a valid terminal result at this layer.
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::NoError && self.error.is_empty()
    }

    /// Whether this response is the caller-cancellation signal rather than a
    /// real server failure.
    pub fn is_cancellation(&self) -> bool {
        self.endpoint.is_none() && self.error == CANCELLED_MESSAGE
    }

    /// Stamps the response with the endpoint that produced it and the
    /// attempt's measured round-trip time.
    pub(crate) fn stamp(mut self, endpoint: &Endpoint, rtt: Duration) -> Self {
        self.transport = Some(endpoint.transport());
        self.endpoint = Some(endpoint.key());
        self.round_trip_time = Some(rtt);
        self
    }
}
