//! Per-call context handed to bound methods.
//!
//! [`ServerCallContext`] exposes what the request said about the call and
//! lets the method shape the response metadata. Response headers may be sent
//! at most once, either explicitly or implicitly by the first message write;
//! after that, adding a header is an error.

use std::{fmt, sync::Arc, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    cancellation::CallCancellation,
    error::CallError,
    metadata::Metadata,
    response::ResponseOutput,
    transport::{RequestHead, format_peer},
};

/// Request header carrying the client's timeout.
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

/// Parse a `grpc-timeout` value: up to eight ASCII digits and a unit.
///
/// Units are `H`, `M`, `S`, `m`, `u` and `n`. Malformed values yield `None`.
///
/// ```
/// use std::time::Duration;
///
/// use grpcframe::context::parse_grpc_timeout;
///
/// assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
/// assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
/// assert_eq!(parse_grpc_timeout("123456789S"), None);
/// ```
#[must_use]
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value.len().checked_sub(1)?;
    let (digits, unit) = value.split_at_checked(split)?;
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

struct CallInfo {
    method: String,
    host: String,
    peer: Option<String>,
    deadline: Option<Instant>,
    request_headers: Metadata,
    cancel: CallCancellation,
}

/// Call-scoped view of the request and control over response metadata.
///
/// Cloning is cheap; all clones refer to the same call.
#[derive(Clone)]
pub struct ServerCallContext {
    info: Arc<CallInfo>,
    output: Arc<ResponseOutput>,
}

impl ServerCallContext {
    pub(crate) fn new(
        head: RequestHead,
        deadline: Option<Instant>,
        cancel: CallCancellation,
        output: Arc<ResponseOutput>,
    ) -> Self {
        let method = head.path().trim_start_matches('/').to_owned();
        let host = head.host().to_owned();
        let peer = head.peer().map(format_peer);
        Self {
            info: Arc::new(CallInfo {
                method,
                host,
                peer,
                deadline,
                request_headers: head.into_headers(),
                cancel,
            }),
            output,
        }
    }

    /// Full method name, `<service>/<method>`.
    #[must_use]
    pub fn method(&self) -> &str { &self.info.method }

    #[must_use]
    pub fn host(&self) -> &str { &self.info.host }

    /// Remote address as `ipv4:<addr>:<port>` or `ipv6:[<addr>]:<port>`.
    #[must_use]
    pub fn peer(&self) -> Option<&str> { self.info.peer.as_deref() }

    /// Instant at which the call is cancelled, if the client set a timeout.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> { self.info.deadline }

    #[must_use]
    pub fn request_headers(&self) -> &Metadata { &self.info.request_headers }

    /// Token cancelled when the client goes away or the deadline passes.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken { self.info.cancel.token() }

    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.info.cancel.is_cancelled() }

    /// Whether response headers have gone out.
    #[must_use]
    pub fn headers_sent(&self) -> bool { self.output.headers_sent() }

    /// Add a response header to be sent with the first response write.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::HeadersAlreadySent`] once headers are out.
    pub fn append_response_header(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CallError> {
        self.output.append_header(key.into(), value.into())
    }

    /// Send the response headers now instead of with the first message.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::HeadersAlreadySent`] if headers were already sent
    /// and [`CallError::Cancelled`] if the call is cancelled first.
    pub async fn write_response_headers(&self) -> Result<(), CallError> {
        self.output.send_headers().await
    }

    /// Add a trailer to be sent after the status.
    pub fn append_response_trailer(&self, key: impl Into<String>, value: impl Into<String>) {
        self.output.append_trailer(key.into(), value.into());
    }

    /// Snapshot of the trailers added so far.
    #[must_use]
    pub fn response_trailers(&self) -> Metadata { self.output.trailers() }
}

impl fmt::Debug for ServerCallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCallContext")
            .field("method", &self.info.method)
            .field("peer", &self.info.peer)
            .field("deadline", &self.info.deadline)
            .field("headers_sent", &self.headers_sent())
            .finish_non_exhaustive()
    }
}
