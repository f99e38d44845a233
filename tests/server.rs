//! Server construction and fatal transport conditions.

use bytes::Bytes;
use grpcframe::{GrpcServer, ServerError, ServerOptions, ServiceBinder};
use grpcframe_testing::{RecordingTransport, drive_call, frame, grpc_head, whole};
use tokio_util::sync::CancellationToken;

mod common;
use common::{calculator, path, raw_unary};

fn ping_service() -> ServiceBinder<()> {
    ServiceBinder::new(|| ())
        .unary(&raw_unary("Ping"), |(), req: Bytes, _ctx| async move { Ok(req) })
        .expect("bind")
}

#[test]
fn builder_requires_trailer_support() {
    let err = GrpcServer::builder()
        .add_service(ping_service())
        .expect("add")
        .build(&RecordingTransport::without_trailers())
        .expect_err("trailers are required");
    assert!(matches!(err, ServerError::TrailersUnsupported));
}

#[test]
fn builder_applies_options() {
    let server = GrpcServer::builder()
        .options(ServerOptions::default().max_receive_message_size(64))
        .add_service(ping_service())
        .expect("add")
        .build(&RecordingTransport::new())
        .expect("build");
    assert_eq!(server.options().receive_limit(), 64);
    assert!(server.serves(&path("Ping")));
}

#[tokio::test]
async fn call_on_transport_without_trailers_is_fatal() {
    let (result, recording) = drive_call(
        &calculator(),
        grpc_head(&path("Echo")),
        whole(frame(b"x")),
        RecordingTransport::without_trailers(),
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(ServerError::TrailersUnsupported)));
    assert!(recording.trailers().is_none());
}

#[tokio::test]
async fn body_channel_feeds_a_call() {
    let server = calculator();
    let (tx, body) = server.body_channel();
    let feeder = tokio::spawn(async move {
        let wire = frame(b"hello");
        let (head, rest) = wire.split_at(2);
        for chunk in [head, rest] {
            tx.send(Ok(Bytes::copy_from_slice(chunk)))
                .await
                .expect("receiver alive");
        }
    });
    let (result, recording) = drive_call(
        &server,
        grpc_head(&path("Echo")),
        body,
        RecordingTransport::new(),
        CancellationToken::new(),
    )
    .await;
    feeder.await.expect("feeder finishes");

    result.expect("call finishes");
    assert_eq!(recording.messages(), [Bytes::from_static(b"hello")]);
}
