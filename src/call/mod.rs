//! Per-call state machines.
//!
//! [`run_call`] takes one [`IncomingCall`] from negotiation to trailers:
//! it validates the media type, builds the call context and message reader,
//! runs the shape body of the bound method under the call's cancellation and
//! deadline, maps the outcome to a status and writes the trailers.

use std::{panic::AssertUnwindSafe, sync::Arc};

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use tokio::time::Instant;
use tracing::Instrument;

use crate::{
    cancellation::{CallCancellation, CancelReason},
    config::ServerOptions,
    content_type::{GrpcContentType, negotiate},
    context::{GRPC_TIMEOUT, ServerCallContext, parse_grpc_timeout},
    error::{CallError, HandlerError, ServerError},
    marshaller::Marshaller,
    method::{MethodType, ServiceFactory},
    metrics,
    panic::format_panic,
    request::MessageReader,
    response::ResponseOutput,
    status::{Code, Status},
    transport::IncomingCall,
};

mod client_streaming;
mod duplex;
pub(crate) mod outcome;
mod server_streaming;
mod unary;

pub(crate) use client_streaming::run_client_streaming;
pub(crate) use duplex::run_duplex;
pub use outcome::{HANDLER_FAULT_PREFIX, NO_RESPONSE_MESSAGE};
use outcome::Outcome;
pub(crate) use server_streaming::run_server_streaming;
pub(crate) use unary::run_unary;

/// Everything a shape body needs from the call.
pub(crate) struct CallParts {
    pub(crate) reader: MessageReader,
    pub(crate) output: Arc<ResponseOutput>,
    pub(crate) context: ServerCallContext,
}

/// Type-erased shape body bound to a service type.
pub(crate) type ShapeFn<S> = Arc<dyn Fn(S, CallParts) -> BoxFuture<'static, Outcome> + Send + Sync>;

/// A registered method ready to serve calls.
pub(crate) trait Route: Send + Sync {
    /// Shape of the bound method; `None` for the fallback route.
    fn method_type(&self) -> Option<MethodType>;

    /// Create the service instance and start the shape body.
    fn start(&self, parts: CallParts) -> BoxFuture<'static, Outcome>;
}

pub(crate) struct BoundRoute<S> {
    method_type: MethodType,
    factory: Arc<dyn ServiceFactory<S>>,
    shape: ShapeFn<S>,
}

impl<S> BoundRoute<S> {
    pub(crate) fn new(
        method_type: MethodType,
        factory: Arc<dyn ServiceFactory<S>>,
        shape: ShapeFn<S>,
    ) -> Self {
        Self {
            method_type,
            factory,
            shape,
        }
    }
}

impl<S: 'static> Route for BoundRoute<S> {
    fn method_type(&self) -> Option<MethodType> { Some(self.method_type) }

    fn start(&self, parts: CallParts) -> BoxFuture<'static, Outcome> {
        (self.shape)(self.factory.create(), parts)
    }
}

/// Message reported for calls on unregistered paths.
pub const UNIMPLEMENTED_MESSAGE: &str = "Method is unimplemented.";

/// Fallback route for paths with no registered method.
pub(crate) struct Unimplemented;

impl Route for Unimplemented {
    fn method_type(&self) -> Option<MethodType> { None }

    fn start(&self, _parts: CallParts) -> BoxFuture<'static, Outcome> {
        futures::future::ready(Outcome::Rejected(Status::unimplemented(UNIMPLEMENTED_MESSAGE)))
            .boxed()
    }
}

/// Decode a request payload with the method's marshaller.
pub(crate) fn decode_request<Req: 'static>(
    marshaller: &dyn Marshaller<Req>,
    payload: &Bytes,
) -> Result<Req, Status> {
    marshaller
        .deserialize(payload)
        .map_err(|e| Status::internal(format!("Failed to deserialize request message: {e}")))
}

/// Read and decode the single request message of a call.
pub(crate) async fn read_request<Req: 'static>(
    reader: &mut MessageReader,
    marshaller: &dyn Marshaller<Req>,
) -> Result<Req, Status> {
    let payload = reader.read_single().await?;
    decode_request(marshaller, &payload)
}

/// Serialize and write the single response of a unary-style call.
pub(crate) async fn write_response<Resp: 'static>(
    output: &ResponseOutput,
    marshaller: &dyn Marshaller<Resp>,
    response: Option<Resp>,
) -> Outcome {
    let Some(response) = response else {
        return Outcome::NoResponse;
    };
    let payload = match marshaller.serialize(&response) {
        Ok(payload) => payload,
        Err(e) => return Outcome::Fault(CallError::Serialize(e).into()),
    };
    match output.write_message(payload).await {
        Ok(()) => Outcome::Completed,
        Err(e) => Outcome::Fault(e.into()),
    }
}

/// Tracks a call in the active-calls gauge while alive.
struct ActiveCall;

impl ActiveCall {
    fn new() -> Self {
        metrics::inc_calls();
        Self
    }
}

impl Drop for ActiveCall {
    fn drop(&mut self) { metrics::dec_calls(); }
}

/// Serve one call on `route` through to its trailers.
///
/// # Errors
///
/// Returns a [`ServerError`] only when the terminal response could not be
/// written, leaving the stream unusable.
pub(crate) async fn run_call(
    route: Arc<dyn Route>,
    call: IncomingCall,
    options: ServerOptions,
) -> Result<(), ServerError> {
    let method = call.head.path().trim_start_matches('/').to_owned();
    let span = tracing::debug_span!(
        "grpc_call",
        method = %method,
        shape = route.method_type().map_or("unknown", MethodType::as_str)
    );
    serve(route, call, options).instrument(span).await
}

async fn serve(
    route: Arc<dyn Route>,
    call: IncomingCall,
    options: ServerOptions,
) -> Result<(), ServerError> {
    let IncomingCall {
        head,
        body,
        response,
        cancellation,
    } = call;
    let cancel = CallCancellation::new(cancellation);

    let content_type = match negotiate(head.content_type()) {
        Ok(content_type) => content_type,
        Err(rejection) => {
            tracing::debug!(%rejection, "request media type rejected");
            metrics::inc_completed(Code::Internal);
            let output = ResponseOutput::new(
                response,
                options.codec(),
                &GrpcContentType::default(),
                cancel,
            );
            return output.reject(&rejection).await;
        }
    };

    let deadline = if options.timeouts_enabled() {
        head.headers()
            .get(GRPC_TIMEOUT)
            .and_then(parse_grpc_timeout)
            .and_then(|timeout| Instant::now().checked_add(timeout))
    } else {
        None
    };

    let _active = ActiveCall::new();
    let output = Arc::new(ResponseOutput::new(
        response,
        options.codec(),
        &content_type,
        cancel.clone(),
    ));
    let parts = CallParts {
        reader: MessageReader::new(body, options.codec(), cancel.clone()),
        output: Arc::clone(&output),
        context: ServerCallContext::new(head, deadline, cancel.clone(), Arc::clone(&output)),
    };

    let outcome = drive(route, parts, &cancel, deadline).await;
    let status = outcome.into_status(&cancel);
    tracing::debug!(code = %status.code(), message = status.message(), "call completed");
    metrics::inc_completed(status.code());

    let result = output.finish(status).await;
    if let Err(error) = &result {
        tracing::error!(%error, "failed to finish call");
    }
    result
}

/// Run the shape body until it ends, the call is cancelled or the deadline
/// passes.
async fn drive(
    route: Arc<dyn Route>,
    parts: CallParts,
    cancel: &CallCancellation,
    deadline: Option<Instant>,
) -> Outcome {
    let body = AssertUnwindSafe(async move { route.start(parts).await }).catch_unwind();
    let expiry = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        biased;
        result = body => result.unwrap_or_else(|panic| {
            let panic = format_panic(panic);
            tracing::warn!(%panic, "method panicked");
            Outcome::Fault(HandlerError::from_panic(&panic))
        }),
        () = cancel.cancelled() => Outcome::Cancelled,
        () = expiry => {
            tracing::debug!("deadline exceeded");
            cancel.cancel(CancelReason::Deadline);
            Outcome::Cancelled
        }
    }
}
