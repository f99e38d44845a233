//! Per-call cancellation signal.
//!
//! The host owns a [`CancellationToken`] for each call and cancels it when the
//! client disconnects. The call handler cancels the same token when the
//! deadline passes or the response transport fails, recording why so the
//! terminal status can say so.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::status::Status;

/// Why a call was cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// The client went away, or the host cancelled the call.
    Client,
    /// The `grpc-timeout` deadline elapsed.
    Deadline,
    /// Writing to the response transport failed.
    Transport,
}

impl CancelReason {
    fn message(self) -> &'static str {
        match self {
            Self::Client => "Call canceled by the client.",
            Self::Deadline => "Deadline exceeded.",
            Self::Transport => "Call canceled because the response could not be written.",
        }
    }
}

/// Cancellation token paired with the first recorded reason.
#[derive(Clone, Debug, Default)]
pub struct CallCancellation {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CallCancellation {
    /// Wrap a host-provided token.
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::new(OnceLock::new()),
        }
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken { &self.token }

    /// Cancel the call. Only the first reason is kept.
    ///
    /// If the host already cancelled the token directly, the recorded reason
    /// is [`CancelReason::Client`].
    pub fn cancel(&self, reason: CancelReason) {
        let reason = if self.token.is_cancelled() {
            CancelReason::Client
        } else {
            reason
        };
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.token.is_cancelled() }

    /// Wait until the call is cancelled.
    pub async fn cancelled(&self) { self.token.cancelled().await; }

    /// Reason recorded for the cancellation, if the call has been cancelled.
    ///
    /// A token cancelled directly by the host reports [`CancelReason::Client`].
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.is_cancelled()
            .then(|| self.reason.get().copied().unwrap_or(CancelReason::Client))
    }

    /// `CANCELLED` status describing this cancellation.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::cancelled(self.reason().unwrap_or(CancelReason::Client).message())
    }
}
