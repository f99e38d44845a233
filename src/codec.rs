//! Length-prefixed message framing for gRPC bodies.
//!
//! Every message on a gRPC request or response body is preceded by a 5-byte
//! prefix: one compression flag byte and a 4-byte big-endian payload length.
//! [`GrpcCodec`] implements `tokio_util`'s [`Decoder`] and [`Encoder`] for that
//! format so it can drive any byte source, whether the transport delivers
//! whole messages or a byte at a time.
//!
//! # Error Handling
//!
//! Failures are reported through [`CodecError`]. See the [`error`] module for
//! the taxonomy and how each category maps onto a call [`Status`].
//!
//! [`Status`]: crate::status::Status

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::byte_order::{read_network_u32, write_network_u32};

pub mod error;

pub use error::{CodecError, EofError, FramingError, ProtocolError};

/// Size of the message prefix: flag byte plus 4-byte length.
pub const MESSAGE_HEADER_SIZE: usize = 5;

/// Default limit on the size of a received message payload (4 MiB).
pub const DEFAULT_MAX_RECEIVE_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Largest payload the 32-bit length prefix can describe.
pub const MAX_MESSAGE_SIZE: usize = u32::MAX as usize;

const FLAG_IDENTITY: u8 = 0;
const FLAG_COMPRESSED: u8 = 1;

pub(crate) fn clamp_message_size(value: usize) -> usize { value.min(MAX_MESSAGE_SIZE) }

/// One length-prefixed message unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    compressed: bool,
    payload: Bytes,
}

impl Frame {
    /// Wrap `payload` as an uncompressed frame.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            compressed: false,
            payload: payload.into(),
        }
    }

    /// Whether the sender flagged the payload as compressed.
    #[must_use]
    pub const fn is_compressed(&self) -> bool { self.compressed }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.payload.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.payload.is_empty() }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }
}

/// Codec for gRPC length-prefixed messages.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use grpcframe::codec::{Frame, GrpcCodec};
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut codec = GrpcCodec::default();
/// let mut wire = BytesMut::new();
/// codec.encode(Frame::new(&b"hi"[..]), &mut wire).unwrap();
/// assert_eq!(&wire[..], &[0, 0, 0, 0, 2, b'h', b'i']);
///
/// let frame = codec.decode(&mut wire).unwrap().unwrap();
/// assert_eq!(&frame.payload()[..], b"hi");
/// ```
#[derive(Clone, Debug)]
pub struct GrpcCodec {
    max_receive_message_size: usize,
    max_send_message_size: Option<usize>,
}

impl GrpcCodec {
    /// Construct a codec with explicit size limits.
    ///
    /// Limits above [`MAX_MESSAGE_SIZE`] are clamped to it.
    #[must_use]
    pub fn new(max_receive_message_size: usize, max_send_message_size: Option<usize>) -> Self {
        Self {
            max_receive_message_size: clamp_message_size(max_receive_message_size),
            max_send_message_size: max_send_message_size.map(clamp_message_size),
        }
    }

    #[must_use]
    pub const fn max_receive_message_size(&self) -> usize { self.max_receive_message_size }

    #[must_use]
    pub const fn max_send_message_size(&self) -> Option<usize> { self.max_send_message_size }
}

impl Default for GrpcCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_RECEIVE_MESSAGE_SIZE, None) }
}

impl Decoder for GrpcCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((flag, length)) = parse_header(src) else {
            src.reserve(MESSAGE_HEADER_SIZE - src.len());
            return Ok(None);
        };
        let compressed = match flag {
            FLAG_IDENTITY => false,
            FLAG_COMPRESSED => true,
            other => return Err(FramingError::InvalidCompressionFlag(other).into()),
        };
        if length > self.max_receive_message_size {
            return Err(FramingError::OversizedMessage {
                size: length,
                max: self.max_receive_message_size,
            }
            .into());
        }

        let total = MESSAGE_HEADER_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(MESSAGE_HEADER_SIZE);
        let payload = src.split_to(length).freeze();
        Ok(Some(Frame {
            compressed,
            payload,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Clean close: no data remaining at a message boundary
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(build_eof_error(src)),
        }
    }
}

impl Encoder<Frame> for GrpcCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.len();
        if let Some(max) = self.max_send_message_size.filter(|max| size > *max) {
            return Err(FramingError::SendLimitExceeded { size, max }.into());
        }
        let length = u32::try_from(size).map_err(|_| FramingError::LengthOverflow { size })?;

        dst.reserve(MESSAGE_HEADER_SIZE + size);
        dst.put_u8(if item.compressed {
            FLAG_COMPRESSED
        } else {
            FLAG_IDENTITY
        });
        dst.put_slice(&write_network_u32(length));
        dst.put_slice(&item.payload);
        Ok(())
    }
}

/// Split the prefix into its flag byte and declared payload length.
fn parse_header(src: &[u8]) -> Option<(u8, usize)> {
    let header = src.get(..MESSAGE_HEADER_SIZE)?;
    let (&flag, length) = header.split_first()?;
    let length = <[u8; 4]>::try_from(length).ok()?;
    Some((flag, read_network_u32(length) as usize))
}

/// Build the EOF error describing where the body was cut short.
///
/// - [`EofError::MidHeader`]: fewer than five bytes arrived, so the prefix is incomplete.
/// - [`EofError::MidFrame`]: the prefix arrived but the payload was truncated.
fn build_eof_error(src: &BytesMut) -> CodecError {
    let bytes_received = src.len();
    match parse_header(src) {
        Some((_, expected)) => CodecError::Eof(EofError::MidFrame {
            bytes_received: bytes_received.saturating_sub(MESSAGE_HEADER_SIZE),
            expected,
        }),
        None => CodecError::Eof(EofError::MidHeader {
            bytes_received,
            header_size: MESSAGE_HEADER_SIZE,
        }),
    }
}

/// Frame `payload` into a standalone buffer.
///
/// # Errors
///
/// Returns a [`CodecError`] if the payload exceeds the codec's send limit.
pub fn encode_message(codec: &mut GrpcCodec, payload: Bytes) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + payload.len());
    codec.encode(Frame::new(payload), &mut buf)?;
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests;
