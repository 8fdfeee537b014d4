use bytes::{Bytes, BytesMut};

use crate::data::BufferLimits;
use crate::error::OperationError;

/// In-memory body buffer with a hard size cap.
#[derive(Debug)]
pub struct BodyAccumulator {
    buffer: BytesMut,
    max_size: usize,
}

impl BodyAccumulator {
    /// Seed the buffer for a response declaring `declared` bytes.
    pub fn new(limits: &BufferLimits, declared: Option<u64>) -> Self {
        Self {
            buffer: BytesMut::with_capacity(limits.initial_capacity(declared)),
            max_size: limits.max_size,
        }
    }

    /// Append `chunk`, or reject it whole if the result would exceed the cap.
    ///
    /// On rejection the buffer is left holding only the bytes accepted so far.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), OperationError> {
        let attempted = self.buffer.len().saturating_add(chunk.len());
        if attempted > self.max_size {
            return Err(OperationError::SizeLimit {
                limit: self.max_size,
                attempted,
            });
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }
}
