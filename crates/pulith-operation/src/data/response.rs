use url::Url;

/// Metadata of a received response: final URL, status and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// URL that produced this response, after any redirects.
    pub url: Url,

    pub status: u16,

    pub headers: Vec<(String, String)>,

    /// Declared body length from `Content-Length`, if present.
    pub content_length: Option<u64>,
}

impl ResponseHead {
    pub fn new(url: Url, status: u16) -> Self {
        Self {
            url,
            status,
            headers: Vec::new(),
            content_length: None,
        }
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    /// First value of the named header, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Raw `Content-Type` header value.
    pub fn content_type(&self) -> Option<&str> {
        self.header_value("content-type")
    }

    /// MIME essence of the content type: parameters stripped, lowercased.
    ///
    /// ```
    /// use pulith_operation::ResponseHead;
    /// use url::Url;
    ///
    /// let head = ResponseHead::new(Url::parse("http://localhost/").unwrap(), 200)
    ///     .header("Content-Type", "Application/JSON; charset=utf-8");
    /// assert_eq!(head.mime_type().as_deref(), Some("application/json"));
    /// ```
    pub fn mime_type(&self) -> Option<String> {
        self.content_type().map(mime_essence)
    }
}

pub(crate) fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
