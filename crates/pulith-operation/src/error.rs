//! Error types for pulith-operation.

use std::fmt;
use std::io;

use thiserror::Error;

/// Boxed error returned by work transforms and transport sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Terminal error of an operation, delivered once through its completion.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("response exceeded buffer limit of {limit} bytes ({attempted} bytes attempted)")]
    SizeLimit { limit: usize, attempted: usize },

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("transform failed: {0}")]
    Transform(#[source] BoxError),

    #[error("operation cancelled")]
    Cancelled,
}

impl OperationError {
    /// Returns `true` if the operation ended because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationError::Cancelled)
    }
}

/// Connection-level failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// DNS resolution, TCP connect or TLS handshake failed.
    Connect,
    /// The request or a read timed out.
    Timeout,
    /// The request could not be built or sent.
    Request,
    /// The response body stream failed mid-transfer.
    Body,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Connect => write!(f, "connect"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Request => write!(f, "request"),
            TransportErrorKind::Body => write!(f, "body"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Connection-level failure surfaced verbatim by the transport.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else if e.is_body() || e.is_decode() {
            TransportErrorKind::Body
        } else if e.is_request() || e.is_builder() || e.is_redirect() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        TransportError::new(kind, e.to_string()).with_source(e)
    }
}

/// Response rejected by the acceptance policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unacceptable status code {status}")]
    StatusCode { status: u16 },

    #[error("unacceptable content type {}", content_type.as_deref().unwrap_or("<none>"))]
    ContentType { content_type: Option<String> },
}

/// Failure of the streaming destination.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open sink: {0}")]
    Open(#[source] io::Error),

    #[error("failed to write to sink: {0}")]
    Write(#[source] io::Error),

    #[error("failed to close sink: {0}")]
    Close(#[source] io::Error),

    #[error("sink reconfigured after the first byte was received")]
    Reconfigured,
}

/// Invalid request descriptor.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Failure to schedule an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("operation already started")]
    AlreadyStarted,

    #[error("I/O executor has shut down")]
    ExecutorClosed,
}

/// Invalid runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, OperationError>;
