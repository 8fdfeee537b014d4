use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::data::{ProgressCallback, RequestDescriptor, ResponseHead, TransferProgress};
use crate::error::TransportError;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Response returned by a [`Transport`]: the head and the not yet consumed body.
///
/// Dropping the body stream aborts the transfer.
pub struct TransportResponse {
    pub head: ResponseHead,
    pub body: BoxStream<'static, Result<Bytes, TransportError>>,
}

impl TransportResponse {
    pub fn new<S>(head: ResponseHead, body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        Self {
            head,
            body: Box::pin(body),
        }
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// Upload progress reporter handed to the transport for one request.
///
/// Transports may keep reporting after `send` has returned. Reports are
/// dropped once the operation has been cancelled or has finished.
#[derive(Clone, Default)]
pub struct UploadProgress {
    callback: Option<ProgressCallback>,
    silenced: CancellationToken,
}

impl UploadProgress {
    pub(crate) fn new(callback: Option<ProgressCallback>, silenced: CancellationToken) -> Self {
        Self { callback, silenced }
    }

    /// A reporter that discards every report.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.callback.is_some()
    }

    /// Report `sent` bytes out of `total`.
    pub fn report(&self, sent: u64, total: Option<u64>) {
        if self.silenced.is_cancelled() {
            return;
        }
        if let Some(callback) = &self.callback {
            callback(&TransferProgress {
                transferred: sent,
                total,
            });
        }
    }
}

impl fmt::Debug for UploadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadProgress")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Asynchronous HTTP transport.
///
/// Implementations follow redirects themselves and report the final URL in
/// [`ResponseHead::url`]. Connection-level failures are returned as
/// [`TransportError`] and are never retried by the operation.
///
/// # Implementations
///
/// - [`ReqwestTransport`]: Production implementation using `reqwest`
/// - Scripted implementations for testing
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and resolve once the response head has arrived.
    fn send(
        &self,
        request: &RequestDescriptor,
        upload: UploadProgress,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// Object-safe form of [`Transport`] used by the I/O executor.
pub(crate) trait DynTransport: Send + Sync {
    fn send_boxed<'a>(
        &'a self,
        request: &'a RequestDescriptor,
        upload: UploadProgress,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>>;
}

impl<T: Transport> DynTransport for T {
    fn send_boxed<'a>(
        &'a self,
        request: &'a RequestDescriptor,
        upload: UploadProgress,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>> {
        Box::pin(self.send(request, upload))
    }
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use futures_util::StreamExt;
    use reqwest::header::CONTENT_LENGTH;

    use super::*;
    use crate::data::Method;

    /// Size of the chunks a request body is streamed in.
    const UPLOAD_CHUNK: usize = 64 * 1024;

    /// Production transport using `reqwest`.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Result<Self, TransportError> {
            let client = reqwest::Client::builder().build()?;
            Ok(Self { client })
        }

        /// Use a preconfigured client (timeouts, proxies, TLS).
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }

    fn upload_body(body: Bytes, upload: UploadProgress) -> reqwest::Body {
        let total = body.len() as u64;
        let chunks: Vec<Bytes> = (0..body.len())
            .step_by(UPLOAD_CHUNK)
            .map(|start| body.slice(start..(start + UPLOAD_CHUNK).min(body.len())))
            .collect();

        let mut sent = 0u64;
        let stream = futures_util::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            upload.report(sent, Some(total));
            Ok::<_, std::io::Error>(chunk)
        });
        reqwest::Body::wrap_stream(stream)
    }

    impl Transport for ReqwestTransport {
        async fn send(
            &self,
            request: &RequestDescriptor,
            upload: UploadProgress,
        ) -> Result<TransportResponse, TransportError> {
            let mut builder = self
                .client
                .request(method(request.method), request.url.clone());

            for (key, value) in &request.headers {
                builder = builder.header(key.as_str(), value.as_str());
            }

            if let Some(body) = &request.body {
                builder = builder
                    .header(CONTENT_LENGTH, body.len())
                    .body(upload_body(body.clone(), upload));
            }

            let response = builder.send().await?;

            let mut head = ResponseHead::new(response.url().clone(), response.status().as_u16());
            for (name, value) in response.headers() {
                head = head.header(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
            }
            head.content_length = response.content_length();

            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(TransportError::from));

            Ok(TransportResponse::new(head, body))
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestTransport;
