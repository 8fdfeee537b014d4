use std::fmt;
use std::io;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use super::completion::Job;
use crate::data::ProcessingConfig;

/// Concurrent pool that runs work transforms off the I/O thread.
///
/// Backed by the blocking pool of a dedicated tokio runtime, so transforms
/// may be CPU-heavy without stalling any async context.
pub struct ProcessingExecutor {
    runtime: Option<Runtime>,
    handle: ProcessingHandle,
}

impl ProcessingExecutor {
    pub fn new() -> io::Result<Self> {
        Self::from_config(&ProcessingConfig::default())
    }

    pub fn from_config(config: &ProcessingConfig) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.threads.max(1))
            .thread_name(config.thread_name.clone())
            .build()?;
        let handle = ProcessingHandle {
            handle: runtime.handle().clone(),
        };
        tracing::debug!(
            threads = config.threads,
            name = %config.thread_name,
            "processing executor started"
        );
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub fn handle(&self) -> ProcessingHandle {
        self.handle.clone()
    }

    /// Wait up to `timeout` for running transforms, then stop the pool.
    ///
    /// Transforms that never started are dropped and their operations
    /// complete as cancelled.
    pub fn shutdown(mut self, timeout: Duration) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(timeout);
        }
    }
}

impl Drop for ProcessingExecutor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for ProcessingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingExecutor")
            .field("running", &self.runtime.is_some())
            .finish()
    }
}

/// Cloneable handle for dispatching onto a [`ProcessingExecutor`].
#[derive(Debug, Clone)]
pub struct ProcessingHandle {
    handle: Handle,
}

impl ProcessingHandle {
    /// Run `job` on the pool. A job refused by a stopped pool is dropped.
    pub(crate) fn dispatch(&self, job: Job) {
        drop(self.handle.spawn_blocking(job));
    }
}
