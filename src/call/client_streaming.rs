//! Client-streaming calls: a request stream, one response message.

use std::{future::Future, sync::Arc};

use super::{CallParts, Outcome, decode_request, write_response};
use crate::{
    context::ServerCallContext,
    error::HandlerResult,
    marshaller::Marshaller,
    request::Streaming,
};

pub(crate) async fn run_client_streaming<S, Req, Resp, R, F, Fut>(
    handler: Arc<F>,
    request_marshaller: Arc<dyn Marshaller<Req>>,
    response_marshaller: Arc<dyn Marshaller<Resp>>,
    service: S,
    parts: CallParts,
) -> Outcome
where
    Req: Send + 'static,
    Resp: 'static,
    F: Fn(S, Streaming<Req>, ServerCallContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<R>> + Send,
    R: Into<Option<Resp>>,
{
    let CallParts {
        reader,
        output,
        context,
    } = parts;
    let requests = Streaming::new(reader, move |payload| {
        decode_request(request_marshaller.as_ref(), &payload)
    });
    match handler(service, requests, context).await {
        Ok(response) => {
            write_response(&output, response_marshaller.as_ref(), response.into()).await
        }
        Err(fault) => Outcome::Fault(fault),
    }
}
