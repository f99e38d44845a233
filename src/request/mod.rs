//! Request body types and message reading.
//!
//! The host hands each call its HTTP/2 request body as a [`RequestBody`]
//! stream of byte chunks. [`MessageReader`] runs the [`GrpcCodec`] over those
//! chunks, reassembling messages however the transport splits them, and
//! [`Streaming`] exposes the messages to bound methods as a lazy stream.
//!
//! ```
//! use bytes::Bytes;
//! use grpcframe::request::RequestBody;
//!
//! let body: RequestBody = Box::pin(futures::stream::iter(vec![Ok(Bytes::from_static(
//!     &[0, 0, 0, 0, 0],
//! ))]));
//! # drop(body);
//! ```

use std::{
    fmt,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures::{
    Stream,
    StreamExt,
    stream::{BoxStream, Fuse},
};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

use crate::{
    cancellation::CallCancellation,
    codec::{CodecError, Frame, FramingError, GrpcCodec, ProtocolError},
    metrics::{self, Direction},
    status::Status,
};

/// Request body as delivered by the transport.
///
/// Each item yields a chunk of bytes in arrival order or an I/O error. Chunk
/// boundaries carry no meaning.
pub type RequestBody = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send + 'static>>;

/// Default capacity for request body channels.
///
/// A transport feeding the body slower or faster than the method consumes it
/// will see back-pressure once this many chunks are buffered.
pub const DEFAULT_BODY_CHANNEL_CAPACITY: usize = 16;

/// Create a bounded channel for feeding a request body.
///
/// Returns a sender for the transport to push chunks and a [`RequestBody`]
/// for the call. Dropping the sender ends the body.
///
/// # Panics
///
/// Panics if `capacity` is zero, mirroring [`tokio::sync::mpsc::channel`].
///
/// # Examples
///
/// ```
/// use grpcframe::request::body_channel;
///
/// let (tx, body) = body_channel(8);
/// # drop((tx, body));
/// ```
#[must_use]
pub fn body_channel(capacity: usize) -> (mpsc::Sender<Result<Bytes, io::Error>>, RequestBody) {
    let (tx, rx) = mpsc::channel(capacity);
    let stream = tokio_stream::wrappers::ReceiverStream::new(rx);
    (tx, Box::pin(stream))
}

/// Reads length-prefixed messages from a request body.
///
/// Reads are sequential and every wait selects on the call's cancellation,
/// so a cancelled call unblocks promptly with a `CANCELLED` status.
pub struct MessageReader {
    body: Fuse<RequestBody>,
    buf: BytesMut,
    codec: GrpcCodec,
    cancel: CallCancellation,
    eof: bool,
}

impl MessageReader {
    #[must_use]
    pub fn new(body: RequestBody, codec: GrpcCodec, cancel: CallCancellation) -> Self {
        Self {
            body: body.fuse(),
            buf: BytesMut::new(),
            codec,
            cancel,
            eof: false,
        }
    }

    /// Read the next message payload, or `None` at a clean end of body.
    ///
    /// # Errors
    ///
    /// Returns an `INTERNAL` status for framing errors, `RESOURCE_EXHAUSTED`
    /// for oversized messages and `CANCELLED` if the call is cancelled.
    pub async fn read_message(&mut self) -> Result<Option<Bytes>, Status> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buf)? {
                return accept(frame).map(Some);
            }
            if self.eof {
                return self.codec.decode_eof(&mut self.buf)?.map(accept).transpose();
            }
            self.fill().await?;
        }
    }

    /// Read the single message of a unary or server-streaming request.
    ///
    /// # Errors
    ///
    /// As [`MessageReader::read_message`], plus an `INTERNAL` status when the
    /// body ends before any message arrives.
    pub async fn read_single(&mut self) -> Result<Bytes, Status> {
        self.read_message()
            .await?
            .ok_or_else(|| CodecError::Protocol(ProtocolError::MissingMessage).into())
    }

    /// Consume the rest of the body, failing if it carries any further byte.
    ///
    /// # Errors
    ///
    /// Returns an `INTERNAL` status with "Additional data after the message
    /// received." when data follows the message.
    pub async fn ensure_drained(&mut self) -> Result<(), Status> {
        loop {
            if !self.buf.is_empty() {
                return Err(CodecError::Protocol(ProtocolError::AdditionalData).into());
            }
            if self.eof {
                return Ok(());
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<(), Status> {
        let next = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(self.cancel.status()),
            chunk = self.body.next() => chunk,
        };
        match next {
            Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
            Some(Err(e)) => return Err(CodecError::Io(e).into()),
            None => self.eof = true,
        }
        Ok(())
    }
}

fn accept(frame: Frame) -> Result<Bytes, Status> {
    if frame.is_compressed() {
        return Err(CodecError::Framing(FramingError::UnsupportedCompression).into());
    }
    metrics::inc_messages(Direction::Inbound);
    tracing::trace!(len = frame.len(), "request message received");
    Ok(frame.into_payload())
}

/// Lazy, finite stream of request messages for streaming calls.
///
/// Messages are read from the body only as the method polls for them. The
/// stream ends after the last message or after yielding its first error.
///
/// # Examples
///
/// ```no_run
/// use grpcframe::{request::Streaming, status::Status};
///
/// async fn sum(mut requests: Streaming<u32>) -> Result<u32, Status> {
///     let mut total = 0;
///     while let Some(value) = requests.message().await? {
///         total += value;
///     }
///     Ok(total)
/// }
/// ```
pub struct Streaming<T> {
    inner: BoxStream<'static, Result<T, Status>>,
}

impl<T: Send + 'static> Streaming<T> {
    /// Build a stream that decodes each payload read by `reader`.
    pub fn new<D>(reader: MessageReader, decode: D) -> Self
    where
        D: Fn(Bytes) -> Result<T, Status> + Send + 'static,
    {
        let inner = futures::stream::unfold(Some((reader, decode)), |state| async move {
            let (mut reader, decode) = state?;
            match reader.read_message().await {
                Ok(Some(payload)) => {
                    let item = decode(payload);
                    let next = item.is_ok().then_some((reader, decode));
                    Some((item, next))
                }
                Ok(None) => None,
                Err(status) => Some((Err(status), None)),
            }
        });
        Self {
            inner: inner.boxed(),
        }
    }

    /// Build a stream from pre-decoded items.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, Status>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }
}

impl<T> Streaming<T> {
    /// Receive the next message, or `None` once the client finished sending.
    ///
    /// # Errors
    ///
    /// Returns the status describing a framing failure or cancellation.
    pub async fn message(&mut self) -> Result<Option<T>, Status> {
        self.inner.next().await.transpose()
    }
}

impl<T> Stream for Streaming<T> {
    type Item = Result<T, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T> fmt::Debug for Streaming<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Streaming(..)") }
}
