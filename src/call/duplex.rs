//! Duplex-streaming calls: independent request and response streams.

use std::{future::Future, sync::Arc};

use super::{CallParts, Outcome, decode_request};
use crate::{
    context::ServerCallContext,
    error::HandlerResult,
    marshaller::Marshaller,
    request::Streaming,
    response::ResponseSink,
};

pub(crate) async fn run_duplex<S, Req, Resp, F, Fut>(
    handler: Arc<F>,
    request_marshaller: Arc<dyn Marshaller<Req>>,
    response_marshaller: Arc<dyn Marshaller<Resp>>,
    service: S,
    parts: CallParts,
) -> Outcome
where
    Req: Send + 'static,
    Resp: 'static,
    F: Fn(S, Streaming<Req>, ResponseSink<Resp>, ServerCallContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<()>> + Send,
{
    let CallParts {
        reader,
        output,
        context,
    } = parts;
    let requests = Streaming::new(reader, move |payload| {
        decode_request(request_marshaller.as_ref(), &payload)
    });
    let sink = ResponseSink::new(Arc::clone(&output), response_marshaller);
    let result = handler(service, requests, sink, context).await;
    output.close();
    match result {
        Ok(()) => Outcome::Completed,
        Err(fault) => Outcome::Fault(fault),
    }
}
