//! Media type negotiation at the call boundary.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use grpcframe::{Code, RequestHead, ServerOptions, ServiceBinder};
use grpcframe_testing::{Event, drive, frame, grpc_head, server_with, whole};
use rstest::rstest;

mod common;
use common::{path, raw_unary};

fn flagging_server(ran: Arc<AtomicBool>) -> grpcframe::GrpcServer {
    let binder = ServiceBinder::new(move || Arc::clone(&ran))
        .unary(&raw_unary("Touch"), |ran: Arc<AtomicBool>, req: Bytes, _ctx| async move {
            ran.store(true, Ordering::SeqCst);
            Ok(req)
        })
        .expect("bind");
    server_with(ServerOptions::default(), binder)
}

#[rstest]
#[case("application/grpc")]
#[case("application/grpc+proto")]
#[case("application/grpc+json")]
#[case("APPLICATION/GRPC")]
#[case("application/grpc; charset=utf-8")]
#[case("application/grpc+proto;a=b;c=d")]
#[case("application/grpc+")]
#[tokio::test]
async fn grpc_family_is_accepted(#[case] content_type: &str) {
    let ran = Arc::new(AtomicBool::new(false));
    let head = grpc_head(&path("Touch")).with_content_type(content_type);
    let (_, recording) = drive(&flagging_server(Arc::clone(&ran)), head, whole(frame(b"x"))).await;

    assert_eq!(recording.code(), Code::Ok);
    assert!(ran.load(Ordering::SeqCst));
}

#[rstest]
#[case::missing(None, "Content-Type is missing from the request.")]
#[case::json(Some("application/json"), "Content-Type 'application/json' is not supported.")]
#[case::grpc_web(
    Some("application/grpc-web"),
    "Content-Type 'application/grpc-web' is not supported."
)]
#[case::leading_space(
    Some(" application/grpc"),
    "Content-Type ' application/grpc' is not supported."
)]
#[tokio::test]
async fn other_media_types_are_rejected(
    #[case] content_type: Option<&str>,
    #[case] expected: &str,
) {
    let ran = Arc::new(AtomicBool::new(false));
    let mut head = RequestHead::new(path("Touch"));
    if let Some(value) = content_type {
        head = head.with_content_type(value);
    }
    let (result, recording) = drive(&flagging_server(Arc::clone(&ran)), head, whole(frame(b"x"))).await;

    result.expect("rejection is a normal response");
    assert!(!ran.load(Ordering::SeqCst), "method must not run");
    assert_eq!(recording.http_status(), Some(415));
    assert_eq!(recording.headers().get("content-type"), Some("text/plain"));
    assert_eq!(recording.body().as_ref(), expected.as_bytes());
    assert_eq!(recording.code(), Code::Internal);
    assert_eq!(recording.message(), expected);
    assert_eq!(
        recording.events(),
        [Event::Head(415), Event::Data(expected.len()), Event::Trailers]
    );
}
