use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::core::BodyAccumulator;
use crate::data::{BufferLimits, ResponseHead};
use crate::error::{OperationError, SinkError};

/// Streaming destination for response body bytes.
///
/// Called only from the I/O executor thread, in order: `open` once before
/// the first `write`, then `write` per chunk in arrival order, then `close`
/// exactly once if `open` was called, whatever the outcome of the transfer.
pub trait ResponseSink: Send + 'static {
    fn open(&mut self) -> io::Result<()>;

    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

/// Writes the body to a file, creating or truncating it on open.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "file sink is not open"))
    }
}

impl ResponseSink for FileSink {
    fn open(&mut self) -> io::Result<()> {
        let file = File::create(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(chunk)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => {
                writer.flush()?;
                writer.get_ref().sync_all()
            }
            None => Ok(()),
        }
    }
}

/// Adapts any [`Write`] into a sink. `close` flushes.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send + 'static> ResponseSink for WriterSink<W> {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk)
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Where the response body goes. Exactly one mode is active per operation.
pub enum SinkConfig {
    /// Accumulate in memory under a hard cap.
    Buffered(BufferLimits),
    /// Write each chunk to the sink as it arrives; nothing is retained.
    Streaming(Box<dyn ResponseSink>),
}

impl SinkConfig {
    pub fn streaming(sink: impl ResponseSink) -> Self {
        SinkConfig::Streaming(Box::new(sink))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, SinkConfig::Streaming(_))
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Buffered(BufferLimits::default())
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkConfig::Buffered(limits) => f.debug_tuple("Buffered").field(limits).finish(),
            SinkConfig::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// Runs once on the I/O thread after validation and before the first byte.
/// Returning a config replaces the operation's sink.
pub(crate) type SinkHook = Box<dyn FnOnce(&ResponseHead) -> Option<SinkConfig> + Send>;

enum Mode {
    Buffered {
        limits: BufferLimits,
        accumulator: Option<BodyAccumulator>,
    },
    Streaming {
        sink: Box<dyn ResponseSink>,
        opened: bool,
        closed: bool,
    },
}

/// The active sink of one operation.
///
/// Owned by the network phase on the I/O thread. Guarantees the streaming
/// sink is opened before the first byte and closed at most once; a sink
/// still open when this is dropped is closed then.
pub(crate) struct BodySink {
    mode: Mode,
    received: u64,
}

impl BodySink {
    pub(crate) fn new(config: SinkConfig) -> Self {
        Self {
            mode: Self::mode(config),
            received: 0,
        }
    }

    fn mode(config: SinkConfig) -> Mode {
        match config {
            SinkConfig::Buffered(limits) => Mode::Buffered {
                limits,
                accumulator: None,
            },
            SinkConfig::Streaming(sink) => Mode::Streaming {
                sink,
                opened: false,
                closed: false,
            },
        }
    }

    pub(crate) fn is_streaming(&self) -> bool {
        matches!(self.mode, Mode::Streaming { .. })
    }

    /// Swap the sink. Only allowed before the first byte.
    pub(crate) fn reconfigure(&mut self, config: SinkConfig) -> Result<(), SinkError> {
        if self.received > 0 {
            return Err(SinkError::Reconfigured);
        }
        self.close()?;
        self.mode = Self::mode(config);
        Ok(())
    }

    /// Allocate the buffer or open the streaming sink.
    pub(crate) fn prepare(&mut self, declared: Option<u64>) -> Result<(), SinkError> {
        match &mut self.mode {
            Mode::Buffered {
                limits,
                accumulator,
            } => {
                if accumulator.is_none() {
                    *accumulator = Some(BodyAccumulator::new(limits, declared));
                }
                Ok(())
            }
            Mode::Streaming {
                sink,
                opened,
                closed,
            } => {
                if *opened || *closed {
                    return Ok(());
                }
                *opened = true;
                sink.open().map_err(|e| {
                    // a sink that failed to open is not closed again
                    *closed = true;
                    SinkError::Open(e)
                })
            }
        }
    }

    pub(crate) fn accept(&mut self, chunk: &[u8]) -> Result<(), OperationError> {
        self.prepare(None)?;
        match &mut self.mode {
            Mode::Buffered { accumulator, .. } => {
                if let Some(accumulator) = accumulator {
                    accumulator.append(chunk)?;
                }
            }
            Mode::Streaming { sink, .. } => sink.write(chunk).map_err(SinkError::Write)?,
        }
        self.received += chunk.len() as u64;
        Ok(())
    }

    /// Close the streaming sink if it is open. Later calls do nothing.
    pub(crate) fn close(&mut self) -> Result<(), SinkError> {
        if let Mode::Streaming {
            sink,
            opened: true,
            closed,
        } = &mut self.mode
        {
            if !*closed {
                *closed = true;
                sink.close().map_err(SinkError::Close)?;
            }
        }
        Ok(())
    }

    /// The buffered body. `None` in streaming mode.
    pub(crate) fn take_body(&mut self) -> Option<Bytes> {
        match &mut self.mode {
            Mode::Buffered { accumulator, .. } => Some(
                accumulator
                    .take()
                    .map(BodyAccumulator::freeze)
                    .unwrap_or_default(),
            ),
            Mode::Streaming { .. } => None,
        }
    }
}

impl Drop for BodySink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close response sink on teardown");
        }
    }
}
