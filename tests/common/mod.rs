//! Shared methods and services for integration tests.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use bytes::Bytes;
use grpcframe::{
    Code,
    HandlerError,
    Method,
    MethodType,
    RawMarshaller,
    ServerOptions,
    ServiceBinder,
    Status,
    server::GrpcServer,
};
use grpcframe_testing::server_with;

pub const SERVICE: &str = "test.Calculator";

#[derive(bincode::Encode, bincode::BorrowDecode, PartialEq, Debug, Clone)]
pub struct AddRequest {
    pub a: u32,
    pub b: u32,
}

#[derive(bincode::Encode, bincode::BorrowDecode, PartialEq, Debug, Clone)]
pub struct Sum(pub u64);

pub fn add() -> Method<AddRequest, Sum> { Method::bincode(MethodType::Unary, SERVICE, "Add") }

pub fn total() -> Method<u32, Sum> { Method::bincode(MethodType::ClientStreaming, SERVICE, "Total") }

pub fn count() -> Method<u32, u32> { Method::bincode(MethodType::ServerStreaming, SERVICE, "Count") }

pub fn echo() -> Method<Bytes, Bytes> {
    Method::new(MethodType::DuplexStreaming, SERVICE, "Echo", RawMarshaller, RawMarshaller)
}

pub fn raw_unary(name: &'static str) -> Method<Bytes, Bytes> {
    Method::new(MethodType::Unary, SERVICE, name, RawMarshaller, RawMarshaller)
}

pub fn path(name: &str) -> String { format!("/{SERVICE}/{name}") }

/// Per-call service instance.
#[derive(Clone, Copy, Debug, Default)]
pub struct Calculator {
    pub offset: u64,
}

/// A server exposing the four calculator methods.
pub fn calculator() -> GrpcServer { calculator_with(ServerOptions::default()) }

pub fn calculator_with(options: ServerOptions) -> GrpcServer {
    let binder = ServiceBinder::new(Calculator::default)
        .unary(&add(), |svc: Calculator, req: AddRequest, _ctx| async move {
            Ok(Sum(svc.offset + u64::from(req.a) + u64::from(req.b)))
        })
        .expect("bind Add")
        .client_streaming(&total(), |_svc: Calculator, mut requests, _ctx| async move {
            let mut sum = 0_u64;
            while let Some(value) = requests.message().await? {
                sum += u64::from(value);
            }
            Ok(Sum(sum))
        })
        .expect("bind Total")
        .server_streaming(&count(), |_svc: Calculator, upto: u32, sink, _ctx| async move {
            for n in 1..=upto {
                sink.write(&n).await?;
            }
            Ok(())
        })
        .expect("bind Count")
        .duplex_streaming(&echo(), |_svc: Calculator, mut requests, sink, _ctx| async move {
            while let Some(message) = requests.message().await? {
                if message.as_ref() == b"fail" {
                    return Err(HandlerError::from(Status::new(Code::Aborted, "asked to fail")));
                }
                sink.write(&message).await?;
            }
            Ok(())
        })
        .expect("bind Echo");
    server_with(options, binder)
}
