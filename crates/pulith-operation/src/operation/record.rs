use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::{AtomicState, OperationState, Transition, ValidationReport};
use crate::data::{AcceptancePolicy, OperationId, Priority, RequestDescriptor, ResponseHead};
use crate::effects::CompletionContext;
use crate::error::OperationError;

/// Body and transform result of a successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload<T> {
    /// The buffered body. `None` when the body was streamed to a sink.
    pub body: Option<Bytes>,

    /// Output of the work transform, if one was configured.
    pub processed: Option<T>,
}

/// Terminal outcome of an operation, delivered exactly once.
#[derive(Debug)]
pub struct Completion<T> {
    pub id: OperationId,

    /// `Succeeded`, `Failed` or `Cancelled`.
    pub state: OperationState,

    /// The request as finally answered: the original request with the URL
    /// reached after redirects, or the original request if no response
    /// arrived.
    pub last_request: RequestDescriptor,

    pub last_response: Option<ResponseHead>,

    pub result: Result<Payload<T>, OperationError>,
}

impl<T> Completion<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == OperationState::Cancelled
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<Payload<T>, OperationError> {
        self.result
    }
}

/// What a work transform sees: the answered request, the response head and
/// the buffered body (`None` when streamed).
#[derive(Debug, Clone, Copy)]
pub struct ResponseData<'a> {
    pub last_request: &'a RequestDescriptor,
    pub head: &'a ResponseHead,
    pub body: Option<&'a Bytes>,
}

/// Completion callback and the context to run it on.
pub(crate) struct Delivery<T> {
    pub(crate) context: Arc<dyn CompletionContext>,
    pub(crate) callback: Box<dyn FnOnce(Completion<T>) + Send>,
}

/// State shared between the handle and whichever context drives the
/// operation.
///
/// Fields other than `state` and `cancel` are written once on the I/O
/// thread and only read afterwards.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) id: OperationId,
    pub(crate) request: RequestDescriptor,
    pub(crate) acceptance: AcceptancePolicy,
    pub(crate) priority: Priority,
    pub(crate) cancel: CancellationToken,
    /// Child of `cancel`, also tripped at the terminal commit. Progress
    /// callbacks stay silent once it is cancelled.
    pub(crate) reporting: CancellationToken,
    pub(crate) state: AtomicState,
    pub(crate) finished: watch::Sender<bool>,
    pub(crate) last_request: OnceLock<RequestDescriptor>,
    pub(crate) last_response: OnceLock<ResponseHead>,
    pub(crate) validation: OnceLock<ValidationReport>,
}

impl Shared {
    pub(crate) fn new(
        request: RequestDescriptor,
        acceptance: AcceptancePolicy,
        priority: Priority,
    ) -> Self {
        let (finished, _) = watch::channel(false);
        let cancel = CancellationToken::new();
        Self {
            id: OperationId::new(),
            request,
            acceptance,
            priority,
            reporting: cancel.child_token(),
            cancel,
            state: AtomicState::new(),
            finished,
            last_request: OnceLock::new(),
            last_response: OnceLock::new(),
            validation: OnceLock::new(),
        }
    }

    pub(crate) fn last_request(&self) -> &RequestDescriptor {
        self.last_request.get().unwrap_or(&self.request)
    }

    /// Record the response head. Later calls are ignored.
    pub(crate) fn commit_response(&self, head: &ResponseHead, report: ValidationReport) {
        let _ = self.last_request.set(self.request.with_url(head.url.clone()));
        let _ = self.last_response.set(head.clone());
        let _ = self.validation.set(report);
    }
}

/// Owner of the "before invoking completion" checkpoint.
///
/// Travels with the operation from the I/O thread to the processing pool.
/// Finishing commits the terminal state, signals `finished` and dispatches
/// the completion; a finisher dropped unfinished completes as cancelled.
pub(crate) struct Finisher<T: Send + 'static> {
    shared: Arc<Shared>,
    delivery: Option<Delivery<T>>,
    done: bool,
}

impl<T: Send + 'static> Finisher<T> {
    pub(crate) fn new(shared: Arc<Shared>, delivery: Option<Delivery<T>>) -> Self {
        Self {
            shared,
            delivery,
            done: false,
        }
    }

    pub(crate) fn finish(mut self, result: Result<Payload<T>, OperationError>) {
        self.complete(result);
    }

    fn complete(&mut self, result: Result<Payload<T>, OperationError>) {
        if self.done {
            return;
        }
        self.done = true;

        let shared = &self.shared;
        shared.reporting.cancel();
        // a captured error wins over a late cancel
        let result = match result {
            Ok(_) if shared.cancel.is_cancelled() => Err(OperationError::Cancelled),
            other => other,
        };
        let event = match &result {
            Ok(_) => Transition::Succeed,
            Err(OperationError::Cancelled) => Transition::Cancel,
            Err(_) => Transition::Fail,
        };
        let state = shared.state.apply(event).unwrap_or_else(|current| current);
        shared.finished.send_replace(true);

        match &result {
            Ok(_) => tracing::debug!(id = %shared.id, %state, "operation finished"),
            Err(e) => tracing::debug!(id = %shared.id, %state, error = %e, "operation finished"),
        }

        let Some(Delivery { context, callback }) = self.delivery.take() else {
            return;
        };
        let completion = Completion {
            id: shared.id,
            state,
            last_request: shared.last_request().clone(),
            last_response: shared.last_response.get().cloned(),
            result,
        };
        context.dispatch(Box::new(move || callback(completion)));
    }
}

impl<T: Send + 'static> Drop for Finisher<T> {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!(id = %self.shared.id, "operation torn down before finishing");
            self.shared.cancel.cancel();
            self.complete(Err(OperationError::Cancelled));
        }
    }
}
