//! Unary calls: one request message, one response message.

use std::{future::Future, sync::Arc};

use super::{CallParts, Outcome, read_request, write_response};
use crate::{context::ServerCallContext, error::HandlerResult, marshaller::Marshaller};

/// Read the request, run the method while draining the rest of the body and
/// write its response.
///
/// Any byte after the request message fails the call and the method's
/// response is discarded.
pub(crate) async fn run_unary<S, Req, Resp, R, F, Fut>(
    handler: Arc<F>,
    request_marshaller: Arc<dyn Marshaller<Req>>,
    response_marshaller: Arc<dyn Marshaller<Resp>>,
    service: S,
    parts: CallParts,
) -> Outcome
where
    Req: 'static,
    Resp: 'static,
    F: Fn(S, Req, ServerCallContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<R>> + Send,
    R: Into<Option<Resp>>,
{
    let CallParts {
        mut reader,
        output,
        context,
    } = parts;
    let request = match read_request(&mut reader, request_marshaller.as_ref()).await {
        Ok(request) => request,
        Err(status) => return Outcome::Rejected(status),
    };
    let (result, drained) = tokio::join!(
        handler(service, request, context),
        reader.ensure_drained()
    );
    if let Err(status) = drained {
        return Outcome::Rejected(status);
    }
    match result {
        Ok(response) => {
            write_response(&output, response_marshaller.as_ref(), response.into()).await
        }
        Err(fault) => Outcome::Fault(fault),
    }
}
