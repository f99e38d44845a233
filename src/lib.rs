#![doc(html_root_url = "https://docs.rs/grpcframe/latest")]
//! Public API for the `grpcframe` library.
//!
//! This crate is the call-handling and message-framing layer of a gRPC
//! server. The host owns the HTTP/2 transport and hands each accepted stream
//! to [`GrpcServer::handle`], which validates the media type, deframes
//! request messages, runs the bound service method for the call's shape and
//! writes framed responses followed by the status trailers.

pub mod byte_order;
mod call;
pub mod cancellation;
pub mod codec;
pub mod config;
pub mod content_type;
pub mod context;
pub mod error;
pub mod marshaller;
pub mod metadata;
pub mod method;
pub mod metrics;
pub mod panic;
pub mod request;
pub mod response;
pub mod server;
pub mod status;
pub mod transport;

pub use call::{HANDLER_FAULT_PREFIX, NO_RESPONSE_MESSAGE, UNIMPLEMENTED_MESSAGE};
pub use codec::{CodecError, Frame, GrpcCodec};
pub use config::ServerOptions;
pub use context::ServerCallContext;
/// Result type alias re-exported for convenience when configuring a server.
pub use error::Result;
pub use error::{CallError, HandlerError, HandlerResult, ServerError};
pub use marshaller::{BincodeMarshaller, Marshaller, RawMarshaller};
pub use metadata::Metadata;
pub use method::{Method, MethodType, ServiceFactory};
pub use request::{RequestBody, Streaming};
pub use response::ResponseSink;
pub use server::{GrpcServer, ServerBuilder, ServiceBinder};
pub use status::{Code, Status};
pub use transport::{IncomingCall, RequestHead, ResponseTransport, TransportCapabilities};
