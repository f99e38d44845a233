//! Builders for length-prefixed request bytes.

use grpcframe::marshaller::Message;

/// Frame `payload` with an identity (uncompressed) header.
///
/// ```rust
/// use grpcframe_testing::frame;
///
/// assert_eq!(frame(b"ab"), [0, 0, 0, 0, 2, b'a', b'b']);
/// ```
#[must_use]
pub fn frame(payload: &[u8]) -> Vec<u8> { with_flag(0, payload) }

/// Frame `payload` with the compressed flag set.
#[must_use]
pub fn compressed_frame(payload: &[u8]) -> Vec<u8> { with_flag(1, payload) }

/// Concatenate identity frames for each payload.
#[must_use]
pub fn frames<P: AsRef<[u8]>>(payloads: &[P]) -> Vec<u8> {
    payloads.iter().flat_map(|p| frame(p.as_ref())).collect()
}

/// Frame the bincode encoding of `message`.
///
/// # Panics
///
/// Panics if the message cannot be encoded.
#[must_use]
pub fn bincode_frame<M: Message>(message: &M) -> Vec<u8> {
    frame(&message.to_bytes().expect("bincode encoding failed"))
}

fn with_flag(flag: u8, payload: &[u8]) -> Vec<u8> {
    let len = u32::try_from(payload.len()).expect("payload too large for a frame");
    let mut out = Vec::with_capacity(payload.len() + 5);
    out.push(flag);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    out
}
