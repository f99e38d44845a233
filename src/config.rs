//! Server configuration.
//!
//! [`ServerOptions`] carries the limits applied to every call. Values are set
//! through builder-style methods and clamped to what the wire format can
//! express.

use crate::{
    codec::{DEFAULT_MAX_RECEIVE_MESSAGE_SIZE, GrpcCodec, clamp_message_size},
    request::DEFAULT_BODY_CHANNEL_CAPACITY,
};

/// Limits applied to every call handled by a server.
///
/// # Examples
///
/// ```
/// use grpcframe::config::ServerOptions;
///
/// let options = ServerOptions::default()
///     .max_receive_message_size(1024)
///     .max_send_message_size(Some(2048));
/// assert_eq!(options.receive_limit(), 1024);
/// assert_eq!(options.send_limit(), Some(2048));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerOptions {
    max_receive_message_size: usize,
    max_send_message_size: Option<usize>,
    honour_timeouts: bool,
    body_channel_capacity: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_receive_message_size: DEFAULT_MAX_RECEIVE_MESSAGE_SIZE,
            max_send_message_size: None,
            honour_timeouts: true,
            body_channel_capacity: DEFAULT_BODY_CHANNEL_CAPACITY,
        }
    }
}

impl ServerOptions {
    /// Largest request message payload accepted, in bytes.
    #[must_use]
    pub fn max_receive_message_size(mut self, size: usize) -> Self {
        self.max_receive_message_size = clamp_message_size(size);
        self
    }

    /// Largest response message payload sent, in bytes; `None` for no limit.
    #[must_use]
    pub fn max_send_message_size(mut self, size: Option<usize>) -> Self {
        self.max_send_message_size = size.map(clamp_message_size);
        self
    }

    /// Whether `grpc-timeout` request headers set a call deadline.
    #[must_use]
    pub fn honour_timeouts(mut self, enabled: bool) -> Self {
        self.honour_timeouts = enabled;
        self
    }

    /// Chunks buffered by [`crate::request::body_channel`] bodies created
    /// through [`crate::server::GrpcServer::body_channel`]. Zero is raised to
    /// one.
    #[must_use]
    pub fn body_channel_capacity(mut self, capacity: usize) -> Self {
        self.body_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub const fn receive_limit(&self) -> usize { self.max_receive_message_size }

    #[must_use]
    pub const fn send_limit(&self) -> Option<usize> { self.max_send_message_size }

    #[must_use]
    pub const fn timeouts_enabled(&self) -> bool { self.honour_timeouts }

    #[must_use]
    pub const fn channel_capacity(&self) -> usize { self.body_channel_capacity }

    pub(crate) fn codec(&self) -> GrpcCodec {
        GrpcCodec::new(self.max_receive_message_size, self.max_send_message_size)
    }
}
