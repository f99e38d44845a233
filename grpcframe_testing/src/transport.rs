//! In-memory response transport that records what the server writes.

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use grpcframe::{
    Code,
    GrpcCodec,
    Metadata,
    ResponseTransport,
    TransportCapabilities,
};
use tokio_util::codec::Decoder;

/// One write made by the server, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Head(u16),
    Data(usize),
    Trailers,
}

#[derive(Debug, Default)]
struct Inner {
    events: Vec<Event>,
    head_status: Option<u16>,
    headers: Metadata,
    body: BytesMut,
    trailers: Option<Metadata>,
}

/// Response transport that captures every write.
///
/// Clones share the same recording, so a test keeps one clone and hands the
/// other to the server.
#[derive(Clone, Debug)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Inner>>,
    trailers: bool,
    fail_data_after: Option<usize>,
}

impl Default for RecordingTransport {
    fn default() -> Self { Self::new() }
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
            trailers: true,
            fail_data_after: None,
        }
    }

    /// A transport that cannot carry trailers.
    #[must_use]
    pub fn without_trailers() -> Self {
        Self {
            trailers: false,
            ..Self::new()
        }
    }

    /// Fail every data write after the first `writes` succeed.
    #[must_use]
    pub fn failing_data_after(mut self, writes: usize) -> Self {
        self.fail_data_after = Some(writes);
        self
    }

    /// Snapshot of everything written so far.
    #[must_use]
    pub fn recording(&self) -> CallRecording {
        let inner = self.lock();
        CallRecording {
            events: inner.events.clone(),
            head_status: inner.head_status,
            headers: inner.headers.clone(),
            body: inner.body.clone().freeze(),
            trailers: inner.trailers.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> { self.inner.lock().expect("recording poisoned") }
}

#[async_trait]
impl ResponseTransport for RecordingTransport {
    async fn send_head(&mut self, status: u16, headers: Metadata) -> io::Result<()> {
        let mut inner = self.lock();
        assert!(inner.head_status.is_none(), "response head sent twice");
        inner.events.push(Event::Head(status));
        inner.head_status = Some(status);
        inner.headers = headers;
        Ok(())
    }

    async fn send_data(&mut self, data: Bytes) -> io::Result<()> {
        let mut inner = self.lock();
        let writes = inner
            .events
            .iter()
            .filter(|e| matches!(e, Event::Data(_)))
            .count();
        if self.fail_data_after.is_some_and(|limit| writes >= limit) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
        }
        assert!(inner.head_status.is_some(), "data sent before head");
        assert!(inner.trailers.is_none(), "data sent after trailers");
        inner.events.push(Event::Data(data.len()));
        inner.body.extend_from_slice(&data);
        Ok(())
    }

    fn supports_trailers(&self) -> bool { self.trailers }

    async fn send_trailers(&mut self, trailers: Metadata) -> io::Result<()> {
        let mut inner = self.lock();
        assert!(inner.trailers.is_none(), "trailers sent twice");
        inner.events.push(Event::Trailers);
        inner.trailers = Some(trailers);
        Ok(())
    }
}

impl TransportCapabilities for RecordingTransport {
    fn supports_trailers(&self) -> bool { self.trailers }
}

/// What the server wrote for one call.
#[derive(Clone, Debug)]
pub struct CallRecording {
    events: Vec<Event>,
    head_status: Option<u16>,
    headers: Metadata,
    body: Bytes,
    trailers: Option<Metadata>,
}

impl CallRecording {
    /// Writes in the order the server made them.
    #[must_use]
    pub fn events(&self) -> &[Event] { &self.events }

    #[must_use]
    pub fn http_status(&self) -> Option<u16> { self.head_status }

    #[must_use]
    pub fn headers(&self) -> &Metadata { &self.headers }

    /// Raw response body bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }

    #[must_use]
    pub fn trailers(&self) -> Option<&Metadata> { self.trailers.as_ref() }

    /// Deframed response message payloads.
    ///
    /// # Panics
    ///
    /// Panics if the body is not a sequence of whole frames.
    #[must_use]
    pub fn messages(&self) -> Vec<Bytes> {
        let mut codec = GrpcCodec::new(usize::MAX, None);
        let mut buf = BytesMut::from(&self.body[..]);
        let mut out = Vec::new();
        while let Some(frame) = codec.decode_eof(&mut buf).expect("response body is not framed") {
            assert!(!frame.is_compressed(), "response frames are never compressed");
            out.push(frame.into_payload());
        }
        out
    }

    /// Status code from the `grpc-status` trailer.
    ///
    /// # Panics
    ///
    /// Panics if there are no trailers or the trailer is malformed.
    #[must_use]
    pub fn code(&self) -> Code {
        let trailers = self.trailers.as_ref().expect("no trailers were written");
        let values: Vec<&str> = trailers.get_all("grpc-status").collect();
        assert_eq!(values.len(), 1, "expected exactly one grpc-status");
        Code::from_i32(values[0].parse().expect("grpc-status is not numeric"))
    }

    /// The `grpc-message` trailer, empty when absent.
    #[must_use]
    pub fn message(&self) -> &str {
        self.trailers
            .as_ref()
            .and_then(|t| t.get("grpc-message"))
            .unwrap_or("")
    }
}
