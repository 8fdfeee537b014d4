//! The HTTP operation: handle, builder and scheduling contract.

mod driver;
mod record;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use url::Url;

use crate::core::OperationState;
use crate::data::{
    AcceptancePolicy, BufferLimits, OperationId, Priority, ProgressCallbacks, RequestDescriptor,
    ResponseHead, TransferProgress,
};
use crate::effects::io::IoJob;
use crate::effects::sink::{BodySink, SinkHook};
use crate::effects::{CompletionContext, IoHandle, ProcessingHandle, ResponseSink, SinkConfig};
use crate::error::{BoxError, StartError};

use driver::{Network, Work};
use record::{Delivery, Finisher, Shared};

pub use record::{Completion, Payload, ResponseData};

/// A unit of work that can be started, cancelled, observed and depended on.
pub trait Schedulable: Send + Sync {
    fn id(&self) -> OperationId;

    /// Submit to the executor. Succeeds at most once.
    fn start(&self) -> Result<(), StartError>;

    /// Request cancellation. Never blocks; repeated calls do nothing.
    fn cancel(&self);

    fn state(&self) -> OperationState;

    fn is_executing(&self) -> bool {
        self.state().is_executing()
    }

    fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// `true` once cancellation has been requested.
    fn is_cancelled(&self) -> bool;

    fn priority(&self) -> Priority;

    /// Flips to `true` when the operation reaches a terminal state.
    fn finished(&self) -> watch::Receiver<bool>;
}

/// Configuration consumed by `start`.
struct Launch<T: Send + 'static> {
    sink: SinkConfig,
    on_response: Option<SinkHook>,
    progress: ProgressCallbacks,
    dependencies: Vec<watch::Receiver<bool>>,
    work: Option<Work<T>>,
    delivery: Option<Delivery<T>>,
}

/// An asynchronous, cancellable HTTP fetch.
///
/// Built with [`HttpOperation::builder`]. Once started, the network phase
/// runs on the [`IoExecutor`](crate::IoExecutor), the optional work
/// transform on a [`ProcessingExecutor`](crate::ProcessingExecutor), and
/// the completion callback on the chosen [`CompletionContext`], exactly once.
///
/// # Examples
///
/// ```no_run
/// use pulith_operation::{
///     CompletionQueue, HttpOperation, IoExecutor, ReqwestTransport, RequestDescriptor,
///     Schedulable,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let io = IoExecutor::new(ReqwestTransport::new()?)?;
/// let mut main_loop = CompletionQueue::new();
///
/// let operation = HttpOperation::builder(RequestDescriptor::get("https://example.com/")?, &io.handle())
///     .complete_on(main_loop.context(), |completion| match completion.result {
///         Ok(payload) => println!("{} bytes", payload.body.map_or(0, |b| b.len())),
///         Err(e) => eprintln!("failed: {e}"),
///     });
///
/// operation.start()?;
/// main_loop.blocking_run_next();
/// # Ok(())
/// # }
/// ```
pub struct HttpOperation<T: Send + 'static> {
    shared: Arc<Shared>,
    io: IoHandle,
    launch: Mutex<Option<Launch<T>>>,
}

impl HttpOperation<()> {
    pub fn builder(request: RequestDescriptor, io: &IoHandle) -> OperationBuilder<()> {
        OperationBuilder {
            request,
            io: io.clone(),
            acceptance: AcceptancePolicy::default(),
            sink: SinkConfig::Buffered(io.default_limits()),
            on_response: None,
            progress: ProgressCallbacks::default(),
            priority: Priority::default(),
            dependencies: Vec::new(),
            work: None,
        }
    }
}

impl<T: Send + 'static> HttpOperation<T> {
    pub fn request(&self) -> &RequestDescriptor {
        &self.shared.request
    }

    /// The URL originally requested.
    pub fn url(&self) -> &Url {
        &self.shared.request.url
    }

    pub fn acceptance(&self) -> &AcceptancePolicy {
        &self.shared.acceptance
    }

    /// The request as finally answered, after redirects. Equal to
    /// [`request`](Self::request) until response headers arrive.
    pub fn last_request(&self) -> &RequestDescriptor {
        self.shared.last_request()
    }

    /// Response head, once committed.
    pub fn last_response(&self) -> Option<&ResponseHead> {
        self.shared.last_response.get()
    }

    /// `None` until response headers arrive.
    pub fn is_status_code_acceptable(&self) -> Option<bool> {
        self.shared
            .validation
            .get()
            .map(|report| report.status_code_acceptable)
    }

    /// `None` until response headers arrive.
    pub fn is_content_type_acceptable(&self) -> Option<bool> {
        self.shared
            .validation
            .get()
            .map(|report| report.content_type_acceptable)
    }

    /// Wait until the operation reaches a terminal state.
    pub async fn wait(&self) {
        let mut finished = self.shared.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }

    fn take_launch(&self) -> Option<Launch<T>> {
        self.launch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<T: Send + 'static> Schedulable for HttpOperation<T> {
    fn id(&self) -> OperationId {
        self.shared.id
    }

    fn start(&self) -> Result<(), StartError> {
        let launch = self.take_launch().ok_or(StartError::AlreadyStarted)?;
        let shared = self.shared.clone();

        let network = Network {
            shared: shared.clone(),
            sink: BodySink::new(launch.sink),
            on_response: launch.on_response,
            progress: launch.progress,
            work: launch.work,
            finisher: Finisher::new(shared.clone(), launch.delivery),
        };

        tracing::debug!(
            id = %shared.id,
            priority = %shared.priority,
            dependencies = launch.dependencies.len(),
            "operation started"
        );
        self.io.submit(IoJob {
            id: shared.id,
            priority: shared.priority,
            dependencies: launch.dependencies,
            cancel: shared.cancel.clone(),
            task: Box::new(move |transport| Box::pin(network.run(transport))),
        })
    }

    fn cancel(&self) {
        if !self.shared.cancel.is_cancelled() {
            tracing::debug!(id = %self.shared.id, state = %self.state(), "cancel requested");
            self.shared.cancel.cancel();
        }
    }

    fn state(&self) -> OperationState {
        self.shared.state.load()
    }

    fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    fn priority(&self) -> Priority {
        self.shared.priority
    }

    fn finished(&self) -> watch::Receiver<bool> {
        self.shared.finished.subscribe()
    }
}

impl<T: Send + 'static> fmt::Debug for HttpOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpOperation")
            .field("id", &self.shared.id)
            .field("method", &self.shared.request.method)
            .field("url", &self.shared.request.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

/// Builder for [`HttpOperation`].
///
/// All network configuration is fixed here, before the operation can reach
/// `Connecting`.
pub struct OperationBuilder<T: Send + 'static> {
    request: RequestDescriptor,
    io: IoHandle,
    acceptance: AcceptancePolicy,
    sink: SinkConfig,
    on_response: Option<SinkHook>,
    progress: ProgressCallbacks,
    priority: Priority,
    dependencies: Vec<watch::Receiver<bool>>,
    work: Option<Work<T>>,
}

impl<T: Send + 'static> OperationBuilder<T> {
    #[must_use]
    pub fn acceptance(mut self, acceptance: AcceptancePolicy) -> Self {
        self.acceptance = acceptance;
        self
    }

    /// Buffer the body in memory under `limits`.
    #[must_use]
    pub fn buffer_limits(mut self, limits: BufferLimits) -> Self {
        self.sink = SinkConfig::Buffered(limits);
        self
    }

    /// Stream the body into `sink` instead of buffering it.
    #[must_use]
    pub fn stream_to(mut self, sink: impl ResponseSink) -> Self {
        self.sink = SinkConfig::streaming(sink);
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: SinkConfig) -> Self {
        self.sink = sink;
        self
    }

    /// Inspect the response head before the first body byte and optionally
    /// choose a different sink for the body.
    #[must_use]
    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&ResponseHead) -> Option<SinkConfig> + Send + 'static,
    {
        self.on_response = Some(Box::new(hook));
        self
    }

    /// Called on the I/O thread as the request body is sent.
    #[must_use]
    pub fn on_upload_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TransferProgress) + Send + Sync + 'static,
    {
        self.progress.upload = Some(Arc::new(callback));
        self
    }

    /// Called on the I/O thread after each accepted body chunk.
    #[must_use]
    pub fn on_download_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TransferProgress) + Send + Sync + 'static,
    {
        self.progress.download = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Do not connect until `other` has finished, whatever its outcome.
    #[must_use]
    pub fn depends_on(mut self, other: &impl Schedulable) -> Self {
        self.dependencies.push(other.finished());
        self
    }

    /// Post-process the body on `pool`. The transform's value becomes
    /// [`Payload::processed`]; its error becomes
    /// [`OperationError::Transform`](crate::OperationError::Transform).
    #[must_use]
    pub fn work<U, F>(self, pool: &ProcessingHandle, transform: F) -> OperationBuilder<U>
    where
        U: Send + 'static,
        F: FnOnce(&ResponseData<'_>) -> Result<U, BoxError> + Send + 'static,
    {
        OperationBuilder {
            request: self.request,
            io: self.io,
            acceptance: self.acceptance,
            sink: self.sink,
            on_response: self.on_response,
            progress: self.progress,
            priority: self.priority,
            dependencies: self.dependencies,
            work: Some(Work {
                pool: pool.clone(),
                transform: Box::new(transform),
            }),
        }
    }

    /// Finish building with a completion callback run on `context`.
    pub fn complete_on<C, F>(self, context: C, callback: F) -> HttpOperation<T>
    where
        C: CompletionContext,
        F: FnOnce(Completion<T>) + Send + 'static,
    {
        self.finish(Some(Delivery {
            context: Arc::new(context),
            callback: Box::new(callback),
        }))
    }

    /// Finish building without a completion step. Observe the outcome
    /// through [`Schedulable::finished`] and the handle's accessors.
    pub fn build(self) -> HttpOperation<T> {
        self.finish(None)
    }

    fn finish(self, delivery: Option<Delivery<T>>) -> HttpOperation<T> {
        let shared = Arc::new(Shared::new(self.request, self.acceptance, self.priority));
        HttpOperation {
            shared,
            io: self.io,
            launch: Mutex::new(Some(Launch {
                sink: self.sink,
                on_response: self.on_response,
                progress: self.progress,
                dependencies: self.dependencies,
                work: self.work,
                delivery,
            })),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for OperationBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationBuilder")
            .field("request", &self.request)
            .field("acceptance", &self.acceptance)
            .field("sink", &self.sink)
            .field("progress", &self.progress)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies.len())
            .field("work", &self.work.is_some())
            .finish()
    }
}
