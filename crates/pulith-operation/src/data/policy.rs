use std::ops::RangeInclusive;

use super::response::mime_essence;

/// Caller-configured acceptance criteria for a response.
///
/// Fixed at operation construction and read-only afterwards.
///
/// # Examples
///
/// ```
/// use pulith_operation::AcceptancePolicy;
///
/// let policy = AcceptancePolicy::default()
///     .status_codes(vec![200..=200, 304..=304])
///     .content_types(["application/json"])
///     .abort_on_status_code_error(true);
///
/// assert!(policy.accepts_status(304));
/// assert!(!policy.accepts_status(201));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptancePolicy {
    /// Acceptable status code ranges, inclusive.
    ///
    /// Default: 200..=299
    pub status_codes: Vec<RangeInclusive<u16>>,

    /// Acceptable MIME types. Empty means any content type is acceptable.
    ///
    /// Entries are stored as MIME essences (lowercased, parameters stripped).
    ///
    /// Default: empty
    pub content_types: Vec<String>,

    /// Abort the operation when the status code is not acceptable.
    ///
    /// Default: false
    pub abort_on_status_code_error: bool,

    /// Abort the operation when the content type is not acceptable.
    ///
    /// Default: false
    pub abort_on_content_type_error: bool,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self {
            status_codes: Self::default_status_codes(),
            content_types: Self::default_content_types(),
            abort_on_status_code_error: false,
            abort_on_content_type_error: false,
        }
    }
}

impl AcceptancePolicy {
    /// The 2xx range.
    pub fn default_status_codes() -> Vec<RangeInclusive<u16>> {
        vec![200..=299]
    }

    /// No restriction on content type.
    pub fn default_content_types() -> Vec<String> {
        Vec::new()
    }

    #[must_use]
    pub fn status_codes(mut self, ranges: Vec<RangeInclusive<u16>>) -> Self {
        self.status_codes = ranges;
        self
    }

    #[must_use]
    pub fn content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.content_types = types.into_iter().map(|t| mime_essence(t.as_ref())).collect();
        self
    }

    #[must_use]
    pub fn abort_on_status_code_error(mut self, abort: bool) -> Self {
        self.abort_on_status_code_error = abort;
        self
    }

    #[must_use]
    pub fn abort_on_content_type_error(mut self, abort: bool) -> Self {
        self.abort_on_content_type_error = abort;
        self
    }

    pub fn accepts_status(&self, status: u16) -> bool {
        self.status_codes.iter().any(|range| range.contains(&status))
    }

    /// `content_type` may carry parameters; only its essence is compared.
    pub fn accepts_content_type(&self, content_type: Option<&str>) -> bool {
        if self.content_types.is_empty() {
            return true;
        }
        match content_type {
            Some(raw) => {
                let essence = mime_essence(raw);
                self.content_types.iter().any(|t| *t == essence)
            }
            None => false,
        }
    }
}
