//! Request bodies delivered in different chunkings.

use std::{io, time::Duration};

use bytes::Bytes;
use futures::{StreamExt, stream};
use grpcframe::request::RequestBody;

/// Deliver `bytes` as one chunk.
#[must_use]
pub fn whole(bytes: impl Into<Vec<u8>>) -> RequestBody { chunked(bytes, usize::MAX) }

/// Deliver `bytes` in chunks of at most `size` bytes.
///
/// # Panics
///
/// Panics if `size` is zero.
#[must_use]
pub fn chunked(bytes: impl Into<Vec<u8>>, size: usize) -> RequestBody {
    assert!(size > 0, "chunk size must be positive");
    let bytes = bytes.into();
    let chunks: Vec<io::Result<Bytes>> = bytes
        .chunks(size.min(bytes.len().max(1)))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(stream::iter(chunks))
}

/// Deliver `bytes` one byte per chunk.
#[must_use]
pub fn byte_at_a_time(bytes: impl Into<Vec<u8>>) -> RequestBody { chunked(bytes, 1) }

/// Deliver `bytes`, then fail with an I/O error.
#[must_use]
pub fn failing_after(bytes: impl Into<Vec<u8>>) -> RequestBody {
    let error = stream::once(async { Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")) });
    Box::pin(whole(bytes).chain(error))
}

/// Deliver `bytes`, then keep the stream open for `hold` before ending it.
#[must_use]
pub fn held_open(bytes: impl Into<Vec<u8>>, hold: Duration) -> RequestBody {
    let end = stream::once(tokio::time::sleep(hold))
        .filter_map(|()| futures::future::ready(None::<io::Result<Bytes>>));
    Box::pin(whole(bytes).chain(end))
}

/// Deliver `bytes` and then never end, as a client that keeps the stream
/// open.
#[must_use]
pub fn open_ended(bytes: impl Into<Vec<u8>>) -> RequestBody {
    Box::pin(whole(bytes).chain(stream::pending()))
}
