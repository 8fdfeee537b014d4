use std::fmt;

use serde::Deserialize;

/// Size limits of the in-memory response buffer.
///
/// Ignored when the operation streams to a [`ResponseSink`](crate::ResponseSink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BufferLimits {
    /// Initial capacity when the response does not declare a length.
    ///
    /// Default: 1 MiB
    pub capacity_hint: usize,

    /// Hard maximum. A response that would grow past it fails with
    /// [`OperationError::SizeLimit`](crate::OperationError::SizeLimit).
    ///
    /// Default: 4 MiB
    pub max_size: usize,
}

impl BufferLimits {
    pub const DEFAULT_CAPACITY_HINT: usize = 1024 * 1024;
    pub const DEFAULT_MAX_SIZE: usize = 4 * 1024 * 1024;

    #[must_use]
    pub fn capacity_hint(mut self, capacity_hint: usize) -> Self {
        self.capacity_hint = capacity_hint;
        self
    }

    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Capacity to reserve for a response declaring `declared` bytes.
    pub fn initial_capacity(&self, declared: Option<u64>) -> usize {
        let wanted = declared
            .map(|len| usize::try_from(len).unwrap_or(usize::MAX))
            .unwrap_or(self.capacity_hint);
        wanted.min(self.max_size)
    }
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            capacity_hint: Self::DEFAULT_CAPACITY_HINT,
            max_size: Self::DEFAULT_MAX_SIZE,
        }
    }
}

/// Scheduling priority on the I/O executor's ready queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    VeryLow,
    Low,
    #[default]
    Normal,
    High,
    VeryHigh,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::VeryLow => write!(f, "very-low"),
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::VeryHigh => write!(f, "very-high"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let limits = BufferLimits::default();
        assert_eq!(limits.capacity_hint, 1024 * 1024);
        assert_eq!(limits.max_size, 4 * 1024 * 1024);
    }

    #[test]
    fn initial_capacity_prefers_declared_length() {
        let limits = BufferLimits::default();
        assert_eq!(limits.initial_capacity(Some(10)), 10);
        assert_eq!(limits.initial_capacity(None), 1024 * 1024);
    }

    #[test]
    fn initial_capacity_never_exceeds_max() {
        let limits = BufferLimits::default().capacity_hint(64).max_size(32);
        assert_eq!(limits.initial_capacity(None), 32);
        assert_eq!(limits.initial_capacity(Some(u64::MAX)), 32);
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::VeryHigh > Priority::High);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
