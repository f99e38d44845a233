//! Helpers that run one call through a server and capture the response.

use grpcframe::{
    GrpcServer,
    IncomingCall,
    RequestHead,
    ServerError,
    ServerOptions,
    ServiceBinder,
    request::RequestBody,
};
use tokio_util::sync::CancellationToken;

use crate::transport::{CallRecording, RecordingTransport};

/// Request head for `path` with the plain gRPC media type.
#[must_use]
pub fn grpc_head(path: &str) -> RequestHead {
    RequestHead::new(path)
        .with_host("localhost:50051")
        .with_peer(std::net::SocketAddr::from(([127, 0, 0, 1], 50_051)))
        .with_content_type("application/grpc")
}

/// Build a server from a single service binder.
///
/// # Panics
///
/// Panics if the binder cannot be added.
#[must_use]
pub fn server_with<S>(options: ServerOptions, binder: ServiceBinder<S>) -> GrpcServer {
    GrpcServer::builder()
        .options(options)
        .add_service(binder)
        .expect("service registers")
        .build(&RecordingTransport::new())
        .expect("recording transport carries trailers")
}

/// Serve one call and return the server's result with what it wrote.
pub async fn drive(
    server: &GrpcServer,
    head: RequestHead,
    body: RequestBody,
) -> (Result<(), ServerError>, CallRecording) {
    drive_call(server, head, body, RecordingTransport::new(), CancellationToken::new()).await
}

/// Serve one call on a caller-provided transport and cancellation token.
pub async fn drive_call(
    server: &GrpcServer,
    head: RequestHead,
    body: RequestBody,
    transport: RecordingTransport,
    cancellation: CancellationToken,
) -> (Result<(), ServerError>, CallRecording) {
    let call = IncomingCall::new(head, body, Box::new(transport.clone()))
        .with_cancellation(cancellation);
    let result = server.handle(call).await;
    (result, transport.recording())
}
