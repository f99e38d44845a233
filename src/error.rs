//! Canonical error types for the crate.
//!
//! - [`HandlerError`]: any fault raised by a bound method. It converts from
//!   every `std::error::Error` so methods can use `?` freely, and remembers
//!   the fault's kind for the status message.
//! - [`CallError`]: misuse or failure of the call context and response sink.
//! - [`ServerError`]: setup-time and connection-fatal errors returned to the
//!   host.

use std::{borrow::Cow, error::Error as StdError, fmt, io};

use thiserror::Error;

use crate::{codec::CodecError, panic::PanicMessage};

/// Boxed error used by marshallers and erased faults.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Fault raised by a bound method.
///
/// Returning a [`crate::status::Status`] through `HandlerError` is an
/// explicit RPC fault and reaches the client verbatim; anything else is
/// reported as `UNKNOWN`.
///
/// # Examples
///
/// ```
/// use grpcframe::error::HandlerError;
///
/// let err = HandlerError::from(std::fmt::Error);
/// assert_eq!(err.kind(), "Error");
///
/// let err = HandlerError::new("InvalidOperation", "not now");
/// assert_eq!(err.to_string(), "InvalidOperation: not now");
/// ```
pub struct HandlerError {
    kind: Cow<'static, str>,
    source: BoxError,
}

impl HandlerError {
    /// Create a fault with an explicit kind and message.
    #[must_use]
    pub fn new(kind: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: Box::new(FaultMessage(message.into())),
        }
    }

    /// Wrap an already boxed error.
    #[must_use]
    pub fn from_boxed(source: BoxError) -> Self {
        Self {
            kind: Cow::Borrowed("Error"),
            source,
        }
    }

    pub(crate) fn from_panic(panic: &PanicMessage) -> Self { Self::new("panic", panic.as_str()) }

    /// Short type name of the original fault.
    #[must_use]
    pub fn kind(&self) -> &str { &self.kind }

    /// The original fault.
    #[must_use]
    pub fn source_error(&self) -> &(dyn StdError + Send + Sync + 'static) { self.source.as_ref() }

    /// Borrow the original fault as `T`, if that is its type.
    #[must_use]
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.source.downcast_ref::<T>()
    }

    /// Take the original fault as `T`, returning `self` unchanged otherwise.
    ///
    /// # Errors
    ///
    /// Returns `self` when the fault is not a `T`.
    pub fn downcast<T: StdError + 'static>(self) -> std::result::Result<T, Self> {
        match self.source.downcast::<T>() {
            Ok(inner) => Ok(*inner),
            Err(source) => Err(Self {
                kind: self.kind,
                source,
            }),
        }
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self {
            kind: Cow::Borrowed(short_type_name::<E>()),
            source: Box::new(error),
        }
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.source)
    }
}

#[derive(Debug)]
struct FaultMessage(String);

impl fmt::Display for FaultMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl StdError for FaultMessage {}

/// Last path segment of a type name, without generic arguments.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Result alias for bound methods.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// Errors raised by the call context and response sink.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CallError {
    /// Response headers were already sent, explicitly or by a message write.
    #[error("Response headers can only be sent once per call.")]
    HeadersAlreadySent,
    /// The call already finished; no more response data may be written.
    #[error("Response messages cannot be written after the call has completed.")]
    CallCompleted,
    /// The call was cancelled while waiting on the transport.
    #[error("The call was cancelled.")]
    Cancelled,
    /// The response marshaller failed.
    #[error("Failed to serialize the response message: {0}")]
    Serialize(#[source] BoxError),
    /// The framed response violated a configured limit.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors returned to the host.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// A method with the same path was already registered.
    #[error("route {0} was already registered")]
    DuplicateRoute(String),
    /// The transport cannot carry trailers, so gRPC cannot be served.
    #[error("the transport does not support response trailers")]
    TrailersUnsupported,
    /// Writing the terminal trailers failed; the stream is unusable.
    #[error("failed to write response trailers: {0}")]
    Trailers(#[source] io::Error),
    /// Writing the response head or body failed outside a running method.
    #[error("response transport failed: {0}")]
    Transport(#[source] io::Error),
}

/// Canonical result alias for setup APIs.
pub type Result<T> = std::result::Result<T, ServerError>;
