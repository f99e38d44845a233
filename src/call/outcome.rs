//! Mapping of call outcomes to a terminal status.

use crate::{
    cancellation::{CallCancellation, CancelReason},
    error::{CallError, HandlerError},
    status::Status,
};

/// Prefix of the message reported for handler faults.
pub const HANDLER_FAULT_PREFIX: &str = "Exception was thrown by handler.";

/// Message reported when a method produced no response.
pub const NO_RESPONSE_MESSAGE: &str = "No message returned from method.";

/// How the shape body of a call ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The method returned normally and any response was written.
    Completed,
    /// A unary-style method returned no response message.
    NoResponse,
    /// The method failed.
    Fault(HandlerError),
    /// The request was refused before or while the method ran.
    Rejected(Status),
    /// The call was cancelled while the method was running.
    Cancelled,
}

impl Outcome {
    /// Classify the outcome into the status written to the trailers.
    ///
    /// An explicit [`Status`] fault wins over cancellation, which wins over
    /// any other fault. A method that returned normally after a response
    /// write failed is still reported as cancelled.
    pub(crate) fn into_status(self, cancel: &CallCancellation) -> Status {
        match self {
            Self::Completed if cancel.reason() == Some(CancelReason::Transport) => cancel.status(),
            Self::Completed => Status::ok(),
            Self::Rejected(status) => status,
            Self::Cancelled => cancel.status(),
            Self::NoResponse if cancel.is_cancelled() => cancel.status(),
            Self::NoResponse => Status::cancelled(NO_RESPONSE_MESSAGE),
            Self::Fault(fault) => map_fault(fault, cancel),
        }
    }
}

fn map_fault(fault: HandlerError, cancel: &CallCancellation) -> Status {
    let fault = match fault.downcast::<Status>() {
        Ok(status) => return status,
        Err(fault) => fault,
    };
    if cancel.is_cancelled() {
        tracing::debug!(%fault, "fault after cancellation");
        return cancel.status();
    }
    match fault.downcast::<CallError>() {
        Ok(CallError::Cancelled) => cancel.status(),
        Ok(CallError::Codec(error)) => error.into(),
        Ok(CallError::Serialize(error)) => {
            tracing::warn!(%error, "response serialization failed");
            Status::internal(format!("Failed to serialize response message: {error}"))
        }
        Ok(other) => {
            tracing::warn!(error = %other, "call context misused");
            Status::unknown(format!("{HANDLER_FAULT_PREFIX} CallError: {other}"))
        }
        Err(fault) => {
            tracing::warn!(kind = fault.kind(), %fault, "handler fault");
            Status::unknown(format!("{HANDLER_FAULT_PREFIX} {fault}"))
        }
    }
}
