//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use pulith_operation::{
    BoxStream, Completion, ResponseHead, ResponseSink, RequestDescriptor, Transport,
    TransportError, TransportErrorKind, TransportResponse, UploadProgress,
};

pub const MIB: usize = 1024 * 1024;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// How the body stream ends after the scripted chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Complete,
    /// Never yields again.
    Hang,
    /// Yields a body error.
    Reset,
}

/// One scripted response.
#[derive(Debug, Clone)]
pub struct Script {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub chunks: Vec<Bytes>,
    pub ending: Ending,
    pub head_delay: Option<Duration>,
    pub redirect_to: Option<String>,
    pub connect_error: bool,
    /// Finish reporting the upload this long after the head is returned.
    pub late_upload: Option<Duration>,
}

impl Script {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            content_length: None,
            chunks: Vec::new(),
            ending: Ending::Complete,
            head_delay: None,
            redirect_to: None,
            connect_error: false,
            late_upload: None,
        }
    }

    pub fn ok() -> Self {
        Self::status(200)
    }

    pub fn refused() -> Self {
        Self {
            connect_error: true,
            ..Self::status(0)
        }
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Body chunks. Declares their total as `Content-Length`.
    pub fn body(mut self, chunks: Vec<Bytes>) -> Self {
        self.content_length = Some(chunks.iter().map(|c| c.len() as u64).sum());
        self.chunks = chunks;
        self
    }

    pub fn content_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }

    pub fn ending(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }

    pub fn head_delay(mut self, delay: Duration) -> Self {
        self.head_delay = Some(delay);
        self
    }

    pub fn redirect_to(mut self, path: &str) -> Self {
        self.redirect_to = Some(path.to_string());
        self
    }

    pub fn late_upload(mut self, delay: Duration) -> Self {
        self.late_upload = Some(delay);
        self
    }
}

pub fn chunk(len: usize, byte: u8) -> Bytes {
    Bytes::from(vec![byte; len])
}

/// Transport answering each URL path with its script. Unknown paths get a
/// bare 404.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    calls: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<String>>>,
    threads: Arc<Mutex<Vec<Option<String>>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, path: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(path.to_string(), script);
        self
    }

    /// Number of `send` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Paths in the order they were sent.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Names of the threads `send` ran on.
    pub fn threads(&self) -> Vec<Option<String>> {
        self.threads.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &RequestDescriptor,
        upload: UploadProgress,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = request.url.path().to_string();
        self.sent.lock().unwrap().push(path.clone());
        self.threads
            .lock()
            .unwrap()
            .push(std::thread::current().name().map(str::to_string));

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or_else(|| Script::status(404));

        if let Some(body) = &request.body {
            let total = body.len() as u64;
            upload.report(total / 2, Some(total));
            match script.late_upload {
                // like a connection task still draining the body after the head
                Some(delay) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        upload.report(total, Some(total));
                    });
                }
                None => upload.report(total, Some(total)),
            }
        }

        if let Some(delay) = script.head_delay {
            tokio::time::sleep(delay).await;
        }
        if script.connect_error {
            return Err(TransportError::new(
                TransportErrorKind::Connect,
                "connection refused",
            ));
        }

        let url = match &script.redirect_to {
            Some(target) => request.url.join(target).unwrap(),
            None => request.url.clone(),
        };
        let mut head = ResponseHead::new(url, script.status);
        if let Some(content_type) = &script.content_type {
            head = head.header("Content-Type", content_type.as_str());
        }
        head.content_length = script.content_length;

        let tail: BoxStream<'static, Result<Bytes, TransportError>> = match script.ending {
            Ending::Complete => Box::pin(stream::empty()),
            Ending::Hang => Box::pin(stream::pending()),
            Ending::Reset => Box::pin(stream::once(async {
                Err(TransportError::new(TransportErrorKind::Body, "connection reset"))
            })),
        };
        let body = stream::iter(script.chunks.into_iter().map(Ok)).chain(tail);

        Ok(TransportResponse::new(head, body))
    }
}

/// Streaming sink that records every call.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    fail_close: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SinkLog {
    pub opened: usize,
    pub closed: usize,
    pub writes: usize,
    pub bytes: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> SinkLog {
        self.log.lock().unwrap().clone()
    }
}

impl ResponseSink for RecordingSink {
    fn open(&mut self) -> io::Result<()> {
        self.log.lock().unwrap().opened += 1;
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut log = self.log.lock().unwrap();
        assert_eq!(log.opened, 1, "write before open");
        assert_eq!(log.closed, 0, "write after close");
        log.writes += 1;
        log.bytes += chunk.len();
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.log.lock().unwrap().closed += 1;
        if self.fail_close {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        Ok(())
    }
}

/// Completion callback that forwards into a channel, and its receiver.
pub fn completion_channel<T: Send + 'static>()
-> (impl FnOnce(Completion<T>) + Send + 'static, Receiver<Completion<T>>) {
    let (tx, rx) = mpsc::channel();
    (
        move |completion| {
            let _ = tx.send(completion);
        },
        rx,
    )
}

pub fn recv<T>(rx: &Receiver<Completion<T>>) -> Completion<T> {
    rx.recv_timeout(Duration::from_secs(10))
        .expect("completion was not delivered")
}

pub fn request(path: &str) -> RequestDescriptor {
    RequestDescriptor::get(&format!("http://scripted.test{path}")).unwrap()
}
