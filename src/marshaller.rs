//! Message marshalling.
//!
//! A [`Marshaller`] converts between a method's request or response type and
//! the payload bytes carried inside each length-prefixed frame. The framing
//! layer never looks inside payloads. [`BincodeMarshaller`] handles any type
//! implementing [`Message`]; [`RawMarshaller`] passes bytes through.

use bincode::{
    BorrowDecode,
    Encode,
    borrow_decode_from_slice,
    config,
    error::{DecodeError, EncodeError},
    encode_to_vec,
};
use bytes::Bytes;
use thiserror::Error;

use crate::error::BoxError;

/// Converts values of `T` to and from payload bytes.
pub trait Marshaller<T>: Send + Sync + 'static {
    /// Serialize `value` into a message payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    fn serialize(&self, value: &T) -> Result<Bytes, BoxError>;

    /// Deserialize a message payload.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a valid encoding of `T`.
    fn deserialize(&self, bytes: &[u8]) -> Result<T, BoxError>;
}

/// Wrapper trait for application message types.
///
/// Any type deriving [`Encode`] and [`BorrowDecode`] implements this trait
/// through a blanket implementation, using bincode's standard configuration.
pub trait Message: Encode + for<'de> BorrowDecode<'de, ()> {
    /// Serialize the message into a byte vector.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if serialization fails.
    fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> { encode_to_vec(self, config::standard()) }

    /// Deserialize a message, returning it and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if deserialization fails.
    fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), DecodeError>
    where
        Self: Sized,
    {
        borrow_decode_from_slice(bytes, config::standard())
    }
}

impl<T> Message for T where for<'de> T: Encode + BorrowDecode<'de, ()> {}

/// Payload did not decode to exactly one message.
#[derive(Debug, Error)]
#[error("{trailing} unexpected bytes after the message payload")]
pub struct TrailingBytes {
    /// Bytes left undecoded.
    pub trailing: usize,
}

/// Marshaller using `bincode` with its standard configuration.
///
/// # Examples
///
/// ```
/// use grpcframe::marshaller::{BincodeMarshaller, Marshaller};
///
/// let bytes = Marshaller::<u32>::serialize(&BincodeMarshaller, &7).unwrap();
/// let value: u32 = BincodeMarshaller.deserialize(&bytes).unwrap();
/// assert_eq!(value, 7);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeMarshaller;

impl<T: Message + 'static> Marshaller<T> for BincodeMarshaller {
    fn serialize(&self, value: &T) -> Result<Bytes, BoxError> {
        Ok(Bytes::from(value.to_bytes()?))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T, BoxError> {
        let (value, consumed) = T::from_bytes(bytes)?;
        if consumed != bytes.len() {
            return Err(Box::new(TrailingBytes {
                trailing: bytes.len() - consumed,
            }));
        }
        Ok(value)
    }
}

/// Marshaller for methods that work on raw payload bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawMarshaller;

impl Marshaller<Bytes> for RawMarshaller {
    fn serialize(&self, value: &Bytes) -> Result<Bytes, BoxError> { Ok(value.clone()) }

    fn deserialize(&self, bytes: &[u8]) -> Result<Bytes, BoxError> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}
