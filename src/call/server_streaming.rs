//! Server-streaming calls: one request message, a response stream.

use std::{future::Future, sync::Arc};

use super::{CallParts, Outcome, read_request};
use crate::{
    context::ServerCallContext,
    error::HandlerResult,
    marshaller::Marshaller,
    response::ResponseSink,
};

/// Read the request and run the method with a response sink.
///
/// Messages the method wrote before failing stay on the wire; only the
/// trailers report the failure. Once the method returns, sinks it handed
/// elsewhere can no longer write while the rest of the body drains.
pub(crate) async fn run_server_streaming<S, Req, Resp, F, Fut>(
    handler: Arc<F>,
    request_marshaller: Arc<dyn Marshaller<Req>>,
    response_marshaller: Arc<dyn Marshaller<Resp>>,
    service: S,
    parts: CallParts,
) -> Outcome
where
    Req: 'static,
    Resp: 'static,
    F: Fn(S, Req, ResponseSink<Resp>, ServerCallContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<()>> + Send,
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
    let sink = ResponseSink::new(Arc::clone(&output), response_marshaller);
    let method = async {
        let result = handler(service, request, sink, context).await;
        output.close();
        result
    };
    let (result, drained) = tokio::join!(method, reader.ensure_drained());
    if let Err(status) = drained {
        return Outcome::Rejected(status);
    }
    match result {
        Ok(()) => Outcome::Completed,
        Err(fault) => Outcome::Fault(fault),
    }
}
