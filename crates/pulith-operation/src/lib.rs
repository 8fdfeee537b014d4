//! Asynchronous, cancellable HTTP operations over three execution contexts.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable configuration and types
//! - [`core`](crate::core) - Pure transformations: state table, validation, buffering
//! - [`effects`] - Executors, transports and sinks
//!
//! [`HttpOperation`] ties the layers together. Its network phase runs on
//! the persistent [`IoExecutor`] thread, its optional work transform on a
//! [`ProcessingExecutor`] pool, and its completion on a caller-chosen
//! [`CompletionContext`].
//!
//! # Key Features
//!
//! - **Exactly-Once Completion**: every started operation delivers one
//!   [`Completion`], whether it succeeds, fails, is cancelled or is torn down
//! - **Checkpointed Cancellation**: observed before connecting, between body
//!   chunks, before the transform and before completion
//! - **Bounded Buffering**: in-memory bodies are capped; streaming sinks are
//!   opened before the first byte and closed exactly once
//! - **Mechanism-Only**: no retry policy; transport errors surface verbatim

pub mod core;
pub mod data;
pub mod effects;
mod error;
mod operation;

pub use crate::core::{validate, OperationState, ValidationReport};
pub use data::{
    AcceptancePolicy, BufferLimits, IoConfig, Method, OperationId, Priority, ProcessingConfig,
    ProgressCallback, ProgressCallbacks, RequestDescriptor, ResponseHead, RuntimeConfig,
    TransferProgress,
};
pub use effects::{
    BoxStream, CompletionContext, CompletionQueue, FileSink, InlineContext, IoExecutor, IoHandle,
    Job, ProcessingExecutor, ProcessingHandle, QueueContext, ResponseSink, SinkConfig, Transport,
    TransportResponse, UploadProgress, WriterSink,
};
pub use error::{
    BoxError, ConfigError, OperationError, RequestError, Result, SinkError, StartError,
    TransportError, TransportErrorKind, ValidationError,
};
pub use operation::{
    Completion, HttpOperation, OperationBuilder, Payload, ResponseData, Schedulable,
};

#[cfg(feature = "reqwest")]
pub use effects::ReqwestTransport;
