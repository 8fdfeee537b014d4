use std::fmt;

use bytes::Bytes;
use url::Url;

use crate::error::RequestError;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an outbound request.
///
/// Moved into the operation at construction and never mutated afterwards.
/// After a redirect the operation reports a copy with the final URL through
/// [`RequestDescriptor::with_url`].
///
/// # Examples
///
/// ```
/// use pulith_operation::{Method, RequestDescriptor};
///
/// let request = RequestDescriptor::post("https://example.com/items")
///     .unwrap()
///     .header("Content-Type", "application/json")
///     .body(r#"{"name":"widget"}"#);
///
/// assert_eq!(request.method, Method::Post);
/// assert_eq!(request.body.as_deref(), Some(&br#"{"name":"widget"}"#[..]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method:  Method,
    pub url:     Url,
    pub headers: Vec<(String, String)>,
    pub body:    Option<Bytes>,
}

impl RequestDescriptor {
    /// Create a request without headers or body.
    pub fn new(method: Method, url: &str) -> Result<Self, RequestError> {
        Ok(Self {
            method,
            url: Url::parse(url)?,
            headers: Vec::new(),
            body: None,
        })
    }

    pub fn get(url: &str) -> Result<Self, RequestError> {
        Self::new(Method::Get, url)
    }

    pub fn post(url: &str) -> Result<Self, RequestError> {
        Self::new(Method::Post, url)
    }

    /// Add a single header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Length of the request body, if any.
    pub fn body_len(&self) -> Option<u64> {
        self.body.as_ref().map(|b| b.len() as u64)
    }

    /// Copy of this request pointed at `url`, used to describe the request
    /// that was finally answered after redirects.
    pub fn with_url(&self, url: Url) -> Self {
        Self {
            url,
            ..self.clone()
        }
    }
}
