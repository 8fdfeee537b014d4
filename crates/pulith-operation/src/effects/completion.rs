//! Contexts that completion callbacks are delivered on.

use std::fmt;

use tokio::sync::mpsc;

/// A unit of work posted to a completion context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The execution context a completion callback runs on.
///
/// `dispatch` must not block; it only hands the job over.
pub trait CompletionContext: Send + Sync + 'static {
    fn dispatch(&self, job: Job);
}

/// Runs the job immediately on the thread that finished the operation:
/// the I/O thread, or a processing thread when a work transform ran.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContext;

impl CompletionContext for InlineContext {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// Spawns the job onto a tokio runtime.
///
/// If the runtime has shut down, or shuts down before the job is polled, the
/// job runs inline on the thread that drops the task.
impl CompletionContext for tokio::runtime::Handle {
    fn dispatch(&self, job: Job) {
        let mut pending = Pending(Some(job));
        self.spawn(async move {
            if let Some(job) = pending.0.take() {
                job();
            }
        });
    }
}

/// A job that still runs if its task is dropped before being polled.
struct Pending(Option<Job>);

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some(job) = self.0.take() {
            tracing::warn!("completion runtime shut down; running completion inline");
            job();
        }
    }
}

/// A main-loop style queue drained by the thread that owns it.
///
/// Operations post through [`QueueContext`]; the owner runs the posted
/// completions with [`run_pending`](Self::run_pending),
/// [`run_next`](Self::run_next) or [`blocking_run_next`](Self::blocking_run_next).
///
/// # Examples
///
/// ```
/// use pulith_operation::{CompletionContext, CompletionQueue};
///
/// let mut queue = CompletionQueue::new();
/// let context = queue.context();
/// context.dispatch(Box::new(|| println!("delivered")));
///
/// assert_eq!(queue.run_pending(), 1);
/// ```
pub struct CompletionQueue {
    tx: mpsc::UnboundedSender<Job>,
    rx: mpsc::UnboundedReceiver<Job>,
}

impl CompletionQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Handle to pass to operations.
    pub fn context(&self) -> QueueContext {
        QueueContext {
            tx: self.tx.clone(),
        }
    }

    /// Run every job posted so far. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it.
    pub async fn run_next(&mut self) {
        // the queue holds a sender, so the channel never closes under us
        if let Some(job) = self.rx.recv().await {
            job();
        }
    }

    /// Blocking form of [`run_next`](Self::run_next) for plain threads.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_run_next(&mut self) {
        if let Some(job) = self.rx.blocking_recv() {
            job();
        }
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionQueue").finish_non_exhaustive()
    }
}

/// Posting side of a [`CompletionQueue`].
#[derive(Debug, Clone)]
pub struct QueueContext {
    tx: mpsc::UnboundedSender<Job>,
}

impl CompletionContext for QueueContext {
    fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("completion queue dropped; completion discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn inline_runs_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        InlineContext.dispatch(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queue_runs_on_owning_thread() {
        let mut queue = CompletionQueue::new();
        let context = queue.context();
        let owner = thread::current().id();

        let ran_on = Arc::new(std::sync::Mutex::new(None));
        let slot = ran_on.clone();
        thread::spawn(move || {
            context.dispatch(Box::new(move || {
                *slot.lock().unwrap() = Some(thread::current().id());
            }));
        })
        .join()
        .unwrap();

        queue.blocking_run_next();
        assert_eq!(*ran_on.lock().unwrap(), Some(owner));
    }

    #[test]
    fn run_pending_on_empty_queue() {
        let mut queue = CompletionQueue::default();
        assert_eq!(queue.run_pending(), 0);
    }

    #[test]
    fn stopped_runtime_still_delivers() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let handle = runtime.handle().clone();
        drop(runtime);

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        handle.dispatch(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runtime_shut_down_with_job_queued_still_delivers() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        // never driven: the current-thread runtime is not running
        runtime.handle().dispatch(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        drop(runtime);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn runtime_handle_spawns_job() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::runtime::Handle::current().dispatch(Box::new(move || {
            let _ = tx.send(7);
        }));
        assert_eq!(rx.await.unwrap(), 7);
    }
}
