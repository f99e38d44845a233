//! Boundary with the HTTP/2 transport.
//!
//! The transport owns connections, streams and flow control. For each gRPC
//! call it hands the server an [`IncomingCall`]: the parsed request head, the
//! request body as a byte stream, a [`ResponseTransport`] to write the reply,
//! and a cancellation token it trips when the client goes away.

use std::{io, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::{metadata::Metadata, request::RequestBody};

/// HTTP status of a response the call layer accepted.
pub const HTTP_OK: u16 = 200;

/// HTTP status sent when the request's media type is rejected.
pub const HTTP_UNSUPPORTED_MEDIA_TYPE: u16 = 415;

/// Largest value the `grpc-timeout` header can carry (eight ASCII digits).
pub const MAX_TIMEOUT_VALUE: u32 = 99_999_999;

/// Request pseudo-headers and headers relevant to a call.
#[derive(Clone, Debug)]
pub struct RequestHead {
    path: String,
    host: String,
    peer: Option<SocketAddr>,
    headers: Metadata,
}

impl RequestHead {
    /// Start a request head for `path` (`/<service>/<method>`).
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host: String::new(),
            peer: None,
            headers: Metadata::new(),
        }
    }

    /// Set the `:authority` of the request.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the remote address of the connection.
    #[must_use]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Append a request header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    /// Set the `content-type` header, replacing any previous value.
    #[must_use]
    pub fn with_content_type(mut self, value: impl Into<String>) -> Self {
        self.headers.insert("content-type", value);
        self
    }

    /// Set `grpc-timeout` from a duration.
    ///
    /// Millisecond precision is used while it fits the header's eight digits.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_millis();
        let value = if millis <= MAX_TIMEOUT_VALUE.into() {
            format!("{millis}m")
        } else {
            format!("{}S", timeout.as_secs().min(MAX_TIMEOUT_VALUE.into()))
        };
        self.headers.insert("grpc-timeout", value);
        self
    }

    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> { self.peer }

    #[must_use]
    pub fn headers(&self) -> &Metadata { &self.headers }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> { self.headers.get("content-type") }

    pub(crate) fn into_headers(self) -> Metadata { self.headers }
}

/// Response half of an HTTP/2 stream.
///
/// The call layer guarantees the ordering head, zero or more data writes,
/// then trailers, each at most once except data. Each `send_data` call must
/// be flushed before it returns.
#[async_trait]
pub trait ResponseTransport: Send + 'static {
    /// Send the response status line and headers.
    async fn send_head(&mut self, status: u16, headers: Metadata) -> io::Result<()>;

    /// Write and flush a chunk of the response body.
    async fn send_data(&mut self, data: Bytes) -> io::Result<()>;

    /// Whether trailers can be appended after the body.
    fn supports_trailers(&self) -> bool;

    /// Send the terminal trailers and end the stream.
    async fn send_trailers(&mut self, trailers: Metadata) -> io::Result<()>;
}

/// Static capabilities of the hosting transport, checked at startup.
pub trait TransportCapabilities {
    /// Whether responses can carry trailers.
    fn supports_trailers(&self) -> bool;
}

/// A call accepted by the transport and ready to dispatch.
pub struct IncomingCall {
    pub head: RequestHead,
    pub body: RequestBody,
    pub response: Box<dyn ResponseTransport>,
    pub cancellation: CancellationToken,
}

impl IncomingCall {
    /// Bundle the parts of a call with a fresh cancellation token.
    #[must_use]
    pub fn new(head: RequestHead, body: RequestBody, response: Box<dyn ResponseTransport>) -> Self {
        Self {
            head,
            body,
            response,
            cancellation: CancellationToken::new(),
        }
    }

    /// Use a host-owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Format a peer address the way gRPC reports it.
///
/// ```
/// use grpcframe::transport::format_peer;
///
/// assert_eq!(format_peer("127.0.0.1:50051".parse().unwrap()), "ipv4:127.0.0.1:50051");
/// assert_eq!(format_peer("[::1]:8080".parse().unwrap()), "ipv6:[::1]:8080");
/// ```
#[must_use]
pub fn format_peer(addr: SocketAddr) -> String {
    match addr {
        SocketAddr::V4(v4) => format!("ipv4:{v4}"),
        SocketAddr::V6(v6) => format!("ipv6:[{}]:{}", v6.ip(), v6.port()),
    }
}
