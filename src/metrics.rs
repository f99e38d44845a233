//! Metric helpers for `grpcframe`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::status::Code;

/// Name of the gauge tracking in-flight calls.
pub const CALLS_ACTIVE: &str = "grpcframe_calls_active";
/// Name of the counter tracking framed messages.
pub const MESSAGES_PROCESSED: &str = "grpcframe_messages_processed_total";
/// Name of the counter tracking finished calls, labelled by status code.
pub const CALLS_COMPLETED: &str = "grpcframe_calls_completed_total";

/// Direction of message processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Request messages received from a client.
    Inbound,
    /// Response messages sent to a client.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only used as a label"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active calls gauge.
pub fn inc_calls() {
    #[cfg(feature = "metrics")]
    gauge!(CALLS_ACTIVE).increment(1.0);
}

/// Decrement the active calls gauge.
pub fn dec_calls() {
    #[cfg(feature = "metrics")]
    gauge!(CALLS_ACTIVE).decrement(1.0);
}

/// Record a framed message for the given direction.
pub fn inc_messages(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a finished call with its terminal status code.
pub fn inc_completed(code: Code) {
    #[cfg(feature = "metrics")]
    counter!(CALLS_COMPLETED, "code" => code.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = code;
}
