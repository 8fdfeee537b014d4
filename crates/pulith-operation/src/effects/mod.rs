//! Executors, transports and sinks: everything that performs I/O or owns a
//! thread.

pub mod completion;
pub mod http;
pub mod io;
pub mod processing;
pub mod sink;

pub use completion::{CompletionContext, CompletionQueue, InlineContext, Job, QueueContext};
pub use http::{BoxStream, Transport, TransportResponse, UploadProgress};
pub use io::{IoExecutor, IoHandle};
pub use processing::{ProcessingExecutor, ProcessingHandle};
pub use sink::{FileSink, ResponseSink, SinkConfig, WriterSink};

#[cfg(feature = "reqwest")]
pub use http::ReqwestTransport;
