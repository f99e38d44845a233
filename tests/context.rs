//! Call context: request metadata and the headers-once rule.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use grpcframe::{
    CallError,
    Code,
    HandlerError,
    ServerCallContext,
    ServerOptions,
    ServiceBinder,
};
use grpcframe_testing::{Event, drive, frame, grpc_head, server_with, whole};

mod common;
use common::{echo, path, raw_unary};

fn unary_server<F, Fut>(handler: F) -> grpcframe::GrpcServer
where
    F: Fn((), Bytes, ServerCallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = grpcframe::HandlerResult<Bytes>> + Send + 'static,
{
    let binder = ServiceBinder::new(|| ())
        .unary(&raw_unary("Inspect"), handler)
        .expect("bind");
    server_with(ServerOptions::default(), binder)
}

#[tokio::test]
async fn sending_headers_twice_is_unknown() {
    let server = unary_server(|(), req, ctx| async move {
        ctx.write_response_headers().await?;
        ctx.write_response_headers().await?;
        Ok(req)
    });
    let (_, recording) = drive(&server, grpc_head(&path("Inspect")), whole(frame(b"x"))).await;

    assert_eq!(recording.code(), Code::Unknown);
    assert!(
        recording
            .message()
            .contains("Response headers can only be sent once per call.")
    );
    assert!(recording.messages().is_empty());
    assert_eq!(recording.events(), [Event::Head(200), Event::Trailers]);
}

#[tokio::test]
async fn sending_headers_after_a_message_is_unknown() {
    let binder = ServiceBinder::new(|| ())
        .duplex_streaming(&echo(), |(), _requests, sink, ctx: ServerCallContext| async move {
            sink.write(&Bytes::from_static(b"first")).await?;
            ctx.write_response_headers().await?;
            Ok(())
        })
        .expect("bind");
    let server = server_with(ServerOptions::default(), binder);
    let (_, recording) = drive(&server, grpc_head(&path("Echo")), whole(Vec::new())).await;

    assert_eq!(recording.messages().len(), 1);
    assert_eq!(recording.code(), Code::Unknown);
    assert!(
        recording
            .message()
            .contains("Response headers can only be sent once per call.")
    );
}

#[tokio::test]
async fn custom_headers_and_trailers_are_sent() {
    let server = unary_server(|(), req, ctx| async move {
        ctx.append_response_header("x-request-id", "abc")?;
        ctx.append_response_trailer("x-cost", "3");
        ctx.write_response_headers().await?;
        let late = ctx.append_response_header("x-late", "1");
        assert!(matches!(late, Err(CallError::HeadersAlreadySent)));
        ctx.append_response_trailer("x-cost", "4");
        Ok(req)
    });
    let (_, recording) = drive(&server, grpc_head(&path("Inspect")), whole(frame(b"x"))).await;

    assert_eq!(recording.code(), Code::Ok);
    assert_eq!(recording.headers().get("x-request-id"), Some("abc"));
    assert!(!recording.headers().contains_key("x-late"));
    let trailers = recording.trailers().expect("trailers");
    assert_eq!(trailers.get_all("x-cost").collect::<Vec<_>>(), ["3", "4"]);
}

#[derive(Debug, Default)]
struct Seen {
    method: String,
    host: String,
    peer: Option<String>,
    deadline_set: bool,
    headers_sent_before: bool,
    headers_sent_after: bool,
    agent: Option<String>,
}

#[tokio::test]
async fn request_side_is_visible() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let sink = Arc::clone(&seen);
    let binder = ServiceBinder::new(move || Arc::clone(&sink))
        .unary(
            &raw_unary("Inspect"),
            |seen: Arc<Mutex<Seen>>, req: Bytes, ctx: ServerCallContext| async move {
                let before = ctx.headers_sent();
                ctx.write_response_headers().await.map_err(HandlerError::from)?;
                let mut seen = seen.lock().expect("seen lock");
                *seen = Seen {
                    method: ctx.method().to_owned(),
                    host: ctx.host().to_owned(),
                    peer: ctx.peer().map(str::to_owned),
                    deadline_set: ctx.deadline().is_some(),
                    headers_sent_before: before,
                    headers_sent_after: ctx.headers_sent(),
                    agent: ctx.request_headers().get("user-agent").map(str::to_owned),
                };
                Ok(req)
            },
        )
        .expect("bind");
    let server = server_with(ServerOptions::default(), binder);
    let head = grpc_head(&path("Inspect"))
        .with_header("User-Agent", "grpc-test/1.0")
        .with_timeout(Duration::from_secs(30));
    let (_, recording) = drive(&server, head, whole(frame(b"x"))).await;
    assert_eq!(recording.code(), Code::Ok);

    let seen = seen.lock().expect("seen lock");
    assert_eq!(seen.method, "test.Calculator/Inspect");
    assert_eq!(seen.host, "localhost:50051");
    assert_eq!(seen.peer.as_deref(), Some("ipv4:127.0.0.1:50051"));
    assert!(seen.deadline_set);
    assert!(!seen.headers_sent_before);
    assert!(seen.headers_sent_after);
    assert_eq!(seen.agent.as_deref(), Some("grpc-test/1.0"));
}

#[tokio::test]
async fn timeouts_can_be_ignored() {
    let deadline = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&deadline);
    let binder = ServiceBinder::new(move || Arc::clone(&slot))
        .unary(
            &raw_unary("Inspect"),
            |slot: Arc<Mutex<Option<bool>>>, req: Bytes, ctx: ServerCallContext| async move {
                *slot.lock().expect("slot lock") = Some(ctx.deadline().is_some());
                Ok(req)
            },
        )
        .expect("bind");
    let server = server_with(ServerOptions::default().honour_timeouts(false), binder);
    let head = grpc_head(&path("Inspect")).with_timeout(Duration::from_millis(5));
    let (_, recording) = drive(&server, head, whole(frame(b"x"))).await;

    assert_eq!(recording.code(), Code::Ok);
    assert_eq!(*deadline.lock().expect("slot lock"), Some(false));
}
