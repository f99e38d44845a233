//! Error types for the framing layer.
//!
//! # Error Categories
//!
//! - [`FramingError`]: wire-level issues in the message prefix (invalid flag, oversized or
//!   unrepresentable length, unnegotiated compression).
//! - [`EofError`]: the request body ended part way through a message.
//! - [`ProtocolError`]: the body was well framed but carried the wrong number of messages for
//!   the call shape.
//! - [`CodecError`]: top-level enum wrapping all categories plus I/O errors.
//!
//! Every category converts into the terminal [`Status`] of the call. Size
//! limit violations become `RESOURCE_EXHAUSTED`; everything else is
//! `INTERNAL` carrying the error's message.

use std::io;

use thiserror::Error;

use crate::status::Status;

/// Framing-level errors found while parsing or producing a message prefix.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The flag byte was neither identity (0) nor compressed (1).
    #[error("Invalid message compression flag: {0}.")]
    InvalidCompressionFlag(u8),

    /// A received message is larger than the configured receive limit.
    #[error(
        "Received message exceeds the maximum configured message size ({size} > {max} bytes)."
    )]
    OversizedMessage {
        /// Length declared by the prefix.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// An outbound message is larger than the configured send limit.
    #[error("Sending message exceeds the maximum configured message size ({size} > {max} bytes).")]
    SendLimitExceeded {
        /// Serialized payload size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// An outbound payload cannot be described by a 32-bit length.
    #[error("Message of {size} bytes cannot be framed with a 32-bit length.")]
    LengthOverflow {
        /// Serialized payload size.
        size: usize,
    },

    /// A message was flagged as compressed but only identity encoding is served.
    #[error("Request message is compressed but no message encoding was negotiated.")]
    UnsupportedCompression,
}

/// Premature end of the request body.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The body ended while the 5-byte prefix was being read.
    #[error("Incomplete message: {bytes_received} of {header_size} header bytes received.")]
    MidHeader {
        /// Prefix bytes received before the end of input.
        bytes_received: usize,
        /// Expected prefix size.
        header_size: usize,
    },

    /// The body ended while the payload was being read.
    #[error("Incomplete message: {bytes_received} of {expected} payload bytes received.")]
    MidFrame {
        /// Payload bytes received before the end of input.
        bytes_received: usize,
        /// Payload length declared by the prefix.
        expected: usize,
    },
}

/// Message-count violations for a given call shape.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A single-message request ended before any message arrived.
    #[error("Request stream ended before a message was received.")]
    MissingMessage,

    /// A single-message request carried bytes after its message.
    #[error("Additional data after the message received.")]
    AdditionalData,
}

/// Top-level framing error taxonomy.
///
/// # Examples
///
/// ```
/// use grpcframe::{
///     codec::{CodecError, ProtocolError},
///     status::{Code, Status},
/// };
///
/// let status = Status::from(CodecError::Protocol(ProtocolError::AdditionalData));
/// assert_eq!(status.code(), Code::Internal);
/// assert_eq!(status.message(), "Additional data after the message received.");
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Message prefix error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Message-count violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport I/O error while reading or writing the body.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Premature end of the body.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}

impl CodecError {
    /// Returns the error category as a string for logging.
    ///
    /// One of: `"framing"`, `"protocol"`, `"io"`, or `"eof"`.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
            Self::Eof(_) => "eof",
        }
    }
}

impl From<CodecError> for Status {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Framing(
                e @ (FramingError::OversizedMessage { .. } | FramingError::SendLimitExceeded { .. }),
            ) => Status::resource_exhausted(e.to_string()),
            CodecError::Framing(e) => Status::internal(e.to_string()),
            CodecError::Protocol(e) => Status::internal(e.to_string()),
            CodecError::Eof(e) => Status::internal(e.to_string()),
            CodecError::Io(e) => Status::internal(format!("Error reading the request body: {e}")),
        }
    }
}
