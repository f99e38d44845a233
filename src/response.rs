//! Response output for a call.
//!
//! [`ResponseOutput`] owns the call's [`ResponseTransport`] behind an async
//! mutex so that exactly one write is in flight at a time. It enforces the
//! wire ordering: headers once, then framed messages, then trailers once.
//! [`ResponseSink`] is the capability handed to streaming methods for writing
//! response messages.

use std::{
    fmt,
    future::Future,
    io,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    cancellation::{CallCancellation, CancelReason},
    codec::{GrpcCodec, encode_message},
    content_type::{GrpcContentType, UnsupportedMediaType},
    error::{CallError, ServerError},
    marshaller::Marshaller,
    metadata::Metadata,
    metrics::{self, Direction},
    status::{Code, Status},
    transport::{HTTP_OK, HTTP_UNSUPPORTED_MEDIA_TYPE, ResponseTransport},
};

/// Trailer carrying the numeric status code.
pub const GRPC_STATUS: &str = "grpc-status";
/// Trailer carrying the status message.
pub const GRPC_MESSAGE: &str = "grpc-message";
/// Response header naming the message encoding.
pub const GRPC_ENCODING: &str = "grpc-encoding";
/// The only message encoding served.
pub const IDENTITY_ENCODING: &str = "identity";

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct OutputState {
    transport: Box<dyn ResponseTransport>,
    codec: GrpcCodec,
    base_headers: Metadata,
    completed: bool,
}

/// Shared, single-writer response channel of one call.
pub(crate) struct ResponseOutput {
    state: AsyncMutex<OutputState>,
    headers_sent: AtomicBool,
    closed: AtomicBool,
    response_headers: Mutex<Metadata>,
    response_trailers: Mutex<Metadata>,
    cancel: CallCancellation,
}

impl ResponseOutput {
    pub(crate) fn new(
        transport: Box<dyn ResponseTransport>,
        codec: GrpcCodec,
        content_type: &GrpcContentType,
        cancel: CallCancellation,
    ) -> Self {
        let mut base_headers = Metadata::new();
        base_headers.append("content-type", content_type.to_header_value());
        base_headers.append(GRPC_ENCODING, IDENTITY_ENCODING);
        Self {
            state: AsyncMutex::new(OutputState {
                transport,
                codec,
                base_headers,
                completed: false,
            }),
            headers_sent: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            response_headers: Mutex::new(Metadata::new()),
            response_trailers: Mutex::new(Metadata::new()),
            cancel,
        }
    }

    pub(crate) fn headers_sent(&self) -> bool { self.headers_sent.load(Ordering::Acquire) }

    pub(crate) fn append_header(&self, key: String, value: String) -> Result<(), CallError> {
        let mut pending = lock(&self.response_headers);
        if self.headers_sent() {
            return Err(CallError::HeadersAlreadySent);
        }
        pending.append(key, value);
        Ok(())
    }

    /// Refuse further message writes once the bound method has returned.
    ///
    /// Trailers are still written by [`finish`](Self::finish).
    pub(crate) fn close(&self) { self.closed.store(true, Ordering::Release); }

    fn is_closed(&self, state: &OutputState) -> bool {
        state.completed || self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn append_trailer(&self, key: String, value: String) {
        lock(&self.response_trailers).append(key, value);
    }

    pub(crate) fn trailers(&self) -> Metadata { lock(&self.response_trailers).clone() }

    /// Explicitly send the response headers.
    pub(crate) async fn send_headers(&self) -> Result<(), CallError> {
        let mut state = self.state.lock().await;
        if self.headers_sent() {
            return Err(CallError::HeadersAlreadySent);
        }
        if self.is_closed(&state) {
            return Err(CallError::CallCompleted);
        }
        let headers = self.take_headers(&state);
        self.guard(state.transport.send_head(HTTP_OK, headers)).await
    }

    /// Frame `payload` and write it, sending headers first if needed.
    pub(crate) async fn write_message(&self, payload: Bytes) -> Result<(), CallError> {
        let mut state = self.state.lock().await;
        if self.is_closed(&state) {
            return Err(CallError::CallCompleted);
        }
        let frame = encode_message(&mut state.codec, payload)?;
        if !self.headers_sent() {
            let headers = self.take_headers(&state);
            self.guard(state.transport.send_head(HTTP_OK, headers)).await?;
        }
        self.guard(state.transport.send_data(frame)).await?;
        metrics::inc_messages(Direction::Outbound);
        Ok(())
    }

    /// Write the terminal status and trailers. Later writes are refused.
    ///
    /// Returns an error only for failures that leave the stream unusable.
    pub(crate) async fn finish(&self, status: Status) -> Result<(), ServerError> {
        let mut state = self.state.lock().await;
        if state.completed {
            tracing::warn!(code = %status.code(), "call already completed; status dropped");
            return Ok(());
        }
        state.completed = true;
        if !state.transport.supports_trailers() {
            return Err(ServerError::TrailersUnsupported);
        }
        if !self.headers_sent() {
            let headers = self.take_headers(&state);
            state
                .transport
                .send_head(HTTP_OK, headers)
                .await
                .map_err(ServerError::Transport)?;
        }
        let user = std::mem::take(&mut *lock(&self.response_trailers));
        state
            .transport
            .send_trailers(status_trailers(status, user))
            .await
            .map_err(ServerError::Trailers)
    }

    /// Answer a call whose media type was rejected.
    ///
    /// The HTTP status is 415 with the rejection as a plain-text body; the
    /// trailers still carry an `INTERNAL` gRPC status with the same text.
    pub(crate) async fn reject(&self, rejection: &UnsupportedMediaType) -> Result<(), ServerError> {
        let mut state = self.state.lock().await;
        state.completed = true;
        self.headers_sent.store(true, Ordering::Release);
        if !state.transport.supports_trailers() {
            return Err(ServerError::TrailersUnsupported);
        }
        let message = rejection.to_string();
        let mut headers = Metadata::new();
        headers.append("content-type", "text/plain");
        state
            .transport
            .send_head(HTTP_UNSUPPORTED_MEDIA_TYPE, headers)
            .await
            .map_err(ServerError::Transport)?;
        state
            .transport
            .send_data(Bytes::from(message.clone()))
            .await
            .map_err(ServerError::Transport)?;
        state
            .transport
            .send_trailers(status_trailers(
                Status::new(Code::Internal, message),
                Metadata::new(),
            ))
            .await
            .map_err(ServerError::Trailers)
    }

    /// Collect the headers to send and mark them sent.
    fn take_headers(&self, state: &OutputState) -> Metadata {
        let mut pending = lock(&self.response_headers);
        let mut headers = state.base_headers.clone();
        headers.extend(std::mem::take(&mut *pending));
        self.headers_sent.store(true, Ordering::Release);
        headers
    }

    /// Await a transport write unless the call is cancelled first.
    ///
    /// A failed write means the stream is gone, so the call is cancelled.
    async fn guard<F>(&self, write: F) -> Result<(), CallError>
    where
        F: Future<Output = io::Result<()>>,
    {
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(CallError::Cancelled),
            result = write => result,
        };
        result.map_err(|error| {
            tracing::debug!(%error, "response write failed; cancelling call");
            self.cancel.cancel(CancelReason::Transport);
            CallError::Cancelled
        })
    }
}

/// Build the terminal trailer set.
///
/// User trailers may not override the reserved status keys.
fn status_trailers(status: Status, user: Metadata) -> Metadata {
    let mut trailers = Metadata::new();
    trailers.append(GRPC_STATUS, status.code().as_i32().to_string());
    if !status.message().is_empty() {
        trailers.append(GRPC_MESSAGE, status.message());
    }
    let extra = status.into_trailers();
    for (key, value) in user.into_iter().chain(extra) {
        if key != GRPC_STATUS && key != GRPC_MESSAGE {
            trailers.append(key, value);
        }
    }
    trailers
}

/// Capability for writing response messages from a streaming method.
///
/// Each [`ResponseSink::write`] frames and flushes one message before it
/// returns. Writes are refused once the call has completed.
pub struct ResponseSink<T> {
    output: Arc<ResponseOutput>,
    marshaller: Arc<dyn Marshaller<T>>,
}

impl<T: 'static> ResponseSink<T> {
    pub(crate) fn new(output: Arc<ResponseOutput>, marshaller: Arc<dyn Marshaller<T>>) -> Self {
        Self { output, marshaller }
    }

    /// Serialize, frame and flush one response message.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::CallCompleted`] after the call finished,
    /// [`CallError::Cancelled`] if the call was cancelled or the transport
    /// failed, and [`CallError::Serialize`] or [`CallError::Codec`] if the
    /// message cannot be encoded.
    ///
    /// The message is serialized before the returned future is first polled,
    /// so the future does not borrow `message`.
    pub fn write(&self, message: &T) -> impl Future<Output = Result<(), CallError>> + Send + 'static {
        let payload = self.marshaller.serialize(message).map_err(CallError::Serialize);
        let output = Arc::clone(&self.output);
        async move { output.write_message(payload?).await }
    }
}

impl<T> Clone for ResponseSink<T> {
    fn clone(&self) -> Self {
        Self {
            output: Arc::clone(&self.output),
            marshaller: Arc::clone(&self.marshaller),
        }
    }
}

impl<T> fmt::Debug for ResponseSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("ResponseSink(..)") }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::{GRPC_MESSAGE, GRPC_STATUS, ResponseOutput, status_trailers};
    use crate::{
        cancellation::CallCancellation,
        codec::GrpcCodec,
        content_type::GrpcContentType,
        error::CallError,
        metadata::Metadata,
        status::{Code, Status},
        transport::ResponseTransport,
    };

    /// Keeps the head it was sent and accepts everything else.
    #[derive(Clone, Default)]
    struct HeadCapture(Arc<Mutex<Option<Metadata>>>);

    #[async_trait]
    impl ResponseTransport for HeadCapture {
        async fn send_head(&mut self, _status: u16, headers: Metadata) -> io::Result<()> {
            *self.0.lock().expect("head lock") = Some(headers);
            Ok(())
        }

        async fn send_data(&mut self, _data: Bytes) -> io::Result<()> { Ok(()) }

        fn supports_trailers(&self) -> bool { true }

        async fn send_trailers(&mut self, _trailers: Metadata) -> io::Result<()> { Ok(()) }
    }

    fn output(transport: HeadCapture) -> Arc<ResponseOutput> {
        Arc::new(ResponseOutput::new(
            Box::new(transport),
            GrpcCodec::default(),
            &GrpcContentType::default(),
            CallCancellation::default(),
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_accepted_header_is_sent() {
        let capture = HeadCapture::default();
        let output = output(capture.clone());
        let appender = {
            let output = Arc::clone(&output);
            tokio::spawn(async move {
                let mut accepted = 0;
                for i in 0..1_000 {
                    if output.append_header(format!("x-{i}"), "v".into()).is_err() {
                        break;
                    }
                    accepted += 1;
                    tokio::task::yield_now().await;
                }
                accepted
            })
        };
        tokio::task::yield_now().await;
        output.send_headers().await.expect("headers sent");
        let accepted = appender.await.expect("appender finished");

        let head = capture.0.lock().expect("head lock").clone().expect("head sent");
        let sent = head.iter().filter(|(key, _)| key.starts_with("x-")).count();
        assert_eq!(sent, accepted);
    }

    #[tokio::test]
    async fn closed_output_refuses_messages() {
        let output = output(HeadCapture::default());
        output.write_message(Bytes::from_static(b"early")).await.expect("open");
        output.close();
        let err = output
            .write_message(Bytes::from_static(b"late"))
            .await
            .expect_err("closed");
        assert!(matches!(err, CallError::CallCompleted));
        output.finish(Status::ok()).await.expect("trailers still written");
    }

    #[test]
    fn status_trailers_lead_and_user_trailers_follow() {
        let user: Metadata = [("x-user", "1")].into_iter().collect();
        let status = Status::new(Code::NotFound, "gone").with_trailer("x-detail", "2");
        let trailers = status_trailers(status, user);

        assert_eq!(trailers.get(GRPC_STATUS), Some("5"));
        assert_eq!(trailers.get(GRPC_MESSAGE), Some("gone"));
        assert_eq!(trailers.get("x-user"), Some("1"));
        assert_eq!(trailers.get("x-detail"), Some("2"));
    }

    #[test]
    fn reserved_keys_cannot_be_overridden() {
        let user: Metadata = [("grpc-status", "0"), ("Grpc-Message", "fine")]
            .into_iter()
            .collect();
        let trailers = status_trailers(Status::internal("broken"), user);

        assert_eq!(trailers.get_all(GRPC_STATUS).collect::<Vec<_>>(), ["13"]);
        assert_eq!(trailers.get_all(GRPC_MESSAGE).collect::<Vec<_>>(), ["broken"]);
    }

    #[test]
    fn empty_message_is_omitted() {
        let trailers = status_trailers(Status::ok(), Metadata::new());
        assert_eq!(trailers.get(GRPC_STATUS), Some("0"));
        assert!(!trailers.contains_key(GRPC_MESSAGE));
    }
}
