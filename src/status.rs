//! gRPC status codes and the terminal call status.
//!
//! [`Status`] doubles as the explicit RPC fault: a bound method that returns
//! `Err(Status)` (directly or through `?`) has its code, message and trailers
//! written to the client verbatim.

use std::fmt;

use thiserror::Error;

use crate::metadata::Metadata;

/// Canonical gRPC status codes.
///
/// See <https://grpc.github.io/grpc/core/md_doc_statuscodes.html>.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Numeric value carried in the `grpc-status` trailer.
    #[must_use]
    pub const fn as_i32(self) -> i32 { self as i32 }

    /// Parse a numeric code, treating unrecognised values as [`Code::Unknown`].
    #[must_use]
    pub const fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Cancelled,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }

    /// Canonical upper-case name, used as a metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Terminal status of a call, or an explicit fault raised by a handler.
///
/// # Examples
///
/// ```
/// use grpcframe::status::{Code, Status};
///
/// let status = Status::new(Code::NotFound, "no such user").with_trailer("x-user", "42");
/// assert_eq!(status.code(), Code::NotFound);
/// assert_eq!(status.trailers().get("x-user"), Some("42"));
/// ```
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("status: {code}, message: {message:?}")]
pub struct Status {
    code: Code,
    message: String,
    trailers: Metadata,
}

impl Status {
    /// Create a status with `code` and `message`.
    #[must_use]
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            trailers: Metadata::new(),
        }
    }

    /// Successful completion with an empty message.
    #[must_use]
    pub fn ok() -> Self { Self::new(Code::Ok, "") }

    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self { Self::new(Code::Cancelled, message) }

    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self { Self::new(Code::Unknown, message) }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self { Self::new(Code::Internal, message) }

    #[must_use]
    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    #[must_use]
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Attach an extra trailer written alongside the status.
    #[must_use]
    pub fn with_trailer(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailers.append(key, value);
        self
    }

    #[must_use]
    pub const fn code(&self) -> Code { self.code }

    #[must_use]
    pub fn message(&self) -> &str { &self.message }

    /// Extra trailers carried by this status.
    #[must_use]
    pub fn trailers(&self) -> &Metadata { &self.trailers }

    pub(crate) fn into_trailers(self) -> Metadata { self.trailers }
}
