use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::http::{DynTransport, Transport};
use crate::data::{BufferLimits, IoConfig, OperationId, Priority, RuntimeConfig};
use crate::error::StartError;

/// Network phase of one operation, run on the I/O thread.
pub(crate) type IoTask = Box<dyn FnOnce(Arc<dyn DynTransport>) -> BoxFuture<'static, ()> + Send>;

/// A started operation waiting for admission.
pub(crate) struct IoJob {
    pub(crate) id: OperationId,
    pub(crate) priority: Priority,
    pub(crate) dependencies: Vec<watch::Receiver<bool>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) task: IoTask,
}

enum IoCommand {
    Submit(IoJob),
    /// In-flight operations are cancelled once the grace period, if any, elapses.
    Shutdown(Option<Duration>),
}

struct Queued {
    seq: u64,
    job: IoJob,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // higher priority first, then FIFO
        match self.job.priority.cmp(&other.job.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

/// The persistent I/O context.
///
/// Owns the transport and a dedicated OS thread running a single-threaded
/// tokio runtime. Every network event of every operation is handled on that
/// thread, interleaved across operations. At most `max_concurrent`
/// operations are connected at once; the rest wait in a priority queue.
///
/// Dropping the executor shuts it down: queued operations are cancelled,
/// in-flight ones run to completion, then the thread exits. The drop blocks
/// until then, so an in-flight operation that never finishes blocks it
/// forever; use [`IoExecutor::shutdown_timeout`] to bound the wait.
pub struct IoExecutor {
    handle: IoHandle,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl IoExecutor {
    pub fn new(transport: impl Transport) -> io::Result<Self> {
        Self::from_config(transport, &IoConfig::default())
    }

    pub fn from_config(transport: impl Transport, config: &IoConfig) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let transport: Arc<dyn DynTransport> = Arc::new(transport);
        let max_concurrent = config.max_concurrent.max(1);

        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || runtime.block_on(run(rx, transport, max_concurrent)))?;
        let thread_id = thread.thread().id();

        tracing::debug!(
            name = %config.thread_name,
            max_concurrent,
            "io executor started"
        );

        Ok(Self {
            handle: IoHandle {
                tx,
                limits: BufferLimits::default(),
            },
            thread: Some(thread),
            thread_id,
        })
    }

    /// Build from the full runtime configuration. Operations submitted
    /// through this executor default to `config.limits`.
    pub fn from_runtime_config(transport: impl Transport, config: &RuntimeConfig) -> io::Result<Self> {
        let mut executor = Self::from_config(transport, &config.io)?;
        executor.handle.limits = config.limits;
        Ok(executor)
    }

    pub fn handle(&self) -> IoHandle {
        self.handle.clone()
    }

    /// Cancel queued operations, wait for in-flight ones, stop the thread.
    ///
    /// Waits without bound for in-flight operations.
    pub fn shutdown(self) {
        drop(self);
    }

    /// Like [`shutdown`](Self::shutdown), but in-flight operations still
    /// running after `grace` are cancelled.
    pub fn shutdown_timeout(mut self, grace: Duration) {
        self.stop(Some(grace));
    }

    fn stop(&mut self, grace: Option<Duration>) {
        let _ = self.handle.tx.send(IoCommand::Shutdown(grace));
        let Some(thread) = self.thread.take() else {
            return;
        };
        // joining from the I/O thread itself would never return
        if thread::current().id() == self.thread_id {
            return;
        }
        if thread.join().is_err() {
            tracing::warn!("io executor thread panicked");
        }
    }
}

impl Drop for IoExecutor {
    fn drop(&mut self) {
        self.stop(None);
    }
}

impl fmt::Debug for IoExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoExecutor")
            .field("thread_id", &self.thread_id)
            .field("closed", &self.handle.is_closed())
            .finish()
    }
}

/// Cloneable handle for submitting operations to an [`IoExecutor`].
#[derive(Clone)]
pub struct IoHandle {
    tx: mpsc::UnboundedSender<IoCommand>,
    limits: BufferLimits,
}

impl IoHandle {
    /// A refused job is dropped, which completes its operation as cancelled.
    pub(crate) fn submit(&self, job: IoJob) -> Result<(), StartError> {
        self.tx
            .send(IoCommand::Submit(job))
            .map_err(|_| StartError::ExecutorClosed)
    }

    /// Buffer limits for operations that do not set their own.
    pub fn default_limits(&self) -> BufferLimits {
        self.limits
    }

    /// `true` once the executor thread has stopped accepting operations.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for IoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoHandle")
            .field("closed", &self.is_closed())
            .field("limits", &self.limits)
            .finish()
    }
}

/// Releases the admission slot even if the task panics.
struct AdmissionSlot {
    id: OperationId,
    done: mpsc::UnboundedSender<OperationId>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        let _ = self.done.send(self.id);
    }
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<IoCommand>,
    transport: Arc<dyn DynTransport>,
    max_concurrent: usize,
) {
    let (ready_tx, mut ready_rx) = mpsc::unbounded_channel::<IoJob>();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<OperationId>();
    let shutdown = CancellationToken::new();

    let mut queue = BinaryHeap::new();
    let mut seq = 0u64;
    let mut active: HashMap<OperationId, CancellationToken> = HashMap::new();
    let mut waiting = 0usize;
    let mut deadline: Option<Instant> = None;

    loop {
        while active.len() < max_concurrent {
            let Some(Queued { job, .. }) = queue.pop() else {
                break;
            };
            active.insert(job.id, job.cancel.clone());
            tracing::debug!(
                id = %job.id,
                priority = %job.priority,
                active = active.len(),
                "operation admitted"
            );
            let slot = AdmissionSlot {
                id: job.id,
                done: done_tx.clone(),
            };
            let task = (job.task)(transport.clone());
            tokio::spawn(async move {
                let _slot = slot;
                task.await;
            });
        }

        if shutdown.is_cancelled() && active.is_empty() && waiting == 0 {
            break;
        }

        tokio::select! {
            command = commands.recv(), if !shutdown.is_cancelled() => {
                // every handle gone: shut down as if dropped
                match command.unwrap_or(IoCommand::Shutdown(None)) {
                    IoCommand::Submit(job) => {
                        if job.dependencies.iter().all(|dep| *dep.borrow()) {
                            tracing::trace!(id = %job.id, "operation queued");
                            seq += 1;
                            queue.push(Queued { seq, job });
                        } else {
                            tracing::trace!(id = %job.id, "operation waiting on dependencies");
                            waiting += 1;
                            tokio::spawn(await_dependencies(job, shutdown.clone(), ready_tx.clone()));
                        }
                    }
                    IoCommand::Shutdown(grace) => {
                        deadline = grace.map(|grace| Instant::now() + grace);
                        tracing::debug!(
                            queued = queue.len(),
                            active = active.len(),
                            waiting,
                            ?grace,
                            "io executor shutting down"
                        );
                        shutdown.cancel();
                        commands.close();
                        while let Ok(command) = commands.try_recv() {
                            if let IoCommand::Submit(job) = command {
                                job.cancel.cancel();
                            }
                        }
                        for Queued { job, .. } in queue.drain() {
                            job.cancel.cancel();
                        }
                    }
                }
            }
            Some(job) = ready_rx.recv() => {
                waiting -= 1;
                if shutdown.is_cancelled() {
                    job.cancel.cancel();
                } else {
                    seq += 1;
                    queue.push(Queued { seq, job });
                }
            }
            Some(id) = done_rx.recv() => {
                active.remove(&id);
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                tracing::warn!(
                    active = active.len(),
                    "shutdown grace period elapsed, cancelling in-flight operations"
                );
                deadline = None;
                for cancel in active.values() {
                    cancel.cancel();
                }
            }
        }
    }

    tracing::debug!("io executor stopped");
}

/// Hold `job` until every dependency has finished, it is cancelled, or the
/// executor shuts down.
async fn await_dependencies(
    mut job: IoJob,
    shutdown: CancellationToken,
    ready: mpsc::UnboundedSender<IoJob>,
) {
    let mut dependencies = std::mem::take(&mut job.dependencies);
    let all_finished = async {
        for dependency in &mut dependencies {
            // a dropped dependency can no longer finish; treat it as finished
            let _ = dependency.wait_for(|finished| *finished).await;
        }
    };

    tokio::select! {
        _ = job.cancel.cancelled() => {}
        _ = shutdown.cancelled() => {}
        _ = all_finished => {}
    }

    let _ = ready.send(job);
}
