//! Immutable data types describing an operation.
//!
//! Everything here is fixed before the operation reaches `Connecting` and
//! is only read afterwards.

pub mod config;
pub mod id;
pub mod options;
pub mod policy;
pub mod progress;
pub mod request;
pub mod response;

pub use config::{IoConfig, ProcessingConfig, RuntimeConfig};
pub use id::OperationId;
pub use options::{BufferLimits, Priority};
pub use policy::AcceptancePolicy;
pub use progress::{ProgressCallback, ProgressCallbacks, TransferProgress};
pub use request::{Method, RequestDescriptor};
pub use response::ResponseHead;
