//! Panic payloads caught at the call boundary.
//!
//! A bound method that panics ends its call with an `UNKNOWN` status. The
//! payload text becomes part of that status message and of the log record.

use std::{any::Any, fmt};

/// Text recovered from a caught panic payload.
///
/// Payloads raised with `panic!("...")` are `&'static str` or `String`; any
/// other payload type is reported by a fixed placeholder.
///
/// ```
/// use grpcframe::panic::format_panic;
///
/// assert_eq!(format_panic(Box::new("boom")).as_str(), "boom");
/// assert_eq!(format_panic(Box::new(String::from("boom"))).to_string(), "boom");
/// assert_eq!(format_panic(Box::new(5_u32)).as_str(), "non-string panic payload");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct PanicMessage(String);

impl PanicMessage {
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<Box<dyn Any + Send>> for PanicMessage {
    fn from(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<String>() {
            Ok(text) => Self(*text),
            Err(payload) => Self(
                payload
                    .downcast_ref::<&'static str>()
                    .map_or_else(|| "non-string panic payload".to_owned(), |s| (*s).to_owned()),
            ),
        }
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Recover the message of a payload returned by `catch_unwind`.
pub fn format_panic(payload: Box<dyn Any + Send>) -> PanicMessage { payload.into() }
