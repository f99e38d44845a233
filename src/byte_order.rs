//! Helpers for explicit network byte-order conversions.
//!
//! The gRPC message prefix carries its length as a big-endian `u32`. These
//! helpers keep Clippy expectations scoped to the conversion points so the
//! framer can stay explicit about wire endianness.

/// Serialise a `u32` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use grpcframe::byte_order::write_network_u32;
///
/// assert_eq!(write_network_u32(0x1234_5678), [0x12, 0x34, 0x56, 0x78]);
/// ```
#[must_use]
pub fn write_network_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u32` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use grpcframe::byte_order::read_network_u32;
///
/// assert_eq!(read_network_u32([0x00, 0x00, 0x01, 0x00]), 256);
/// ```
#[must_use]
pub fn read_network_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u32::from_be_bytes(bytes)
}
