//! Utilities for driving a [`GrpcServer`](grpcframe::GrpcServer) in tests.
//!
//! The helpers stand in for the HTTP/2 transport: request bodies are built
//! from in-memory byte chunks and responses are captured by a
//! [`RecordingTransport`] for assertions on headers, messages and trailers.
//!
//! ```rust
//! use grpcframe::GrpcServer;
//! use grpcframe_testing::{drive, frame, grpc_head, whole};
//!
//! # async fn example(server: GrpcServer) {
//! let (result, recording) = drive(&server, grpc_head("/pkg.Svc/Call"), whole(frame(b"hi"))).await;
//! assert!(result.is_ok());
//! assert_eq!(recording.messages().len(), 1);
//! # }
//! ```

pub mod body;
pub mod drive;
pub mod frames;
pub mod logging;
pub mod transport;

pub use body::{byte_at_a_time, chunked, failing_after, held_open, open_ended, whole};
pub use drive::{drive, drive_call, grpc_head, server_with};
pub use frames::{bincode_frame, compressed_frame, frame, frames};
pub use logging::{LoggerHandle, logger};
pub use transport::{CallRecording, Event, RecordingTransport};
