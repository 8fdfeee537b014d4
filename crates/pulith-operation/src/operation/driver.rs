use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tracing::Instrument;

use super::record::{Finisher, Payload, ResponseData, Shared};
use crate::core::{validate, ProgressGate, Transition};
use crate::data::{ProgressCallbacks, ResponseHead};
use crate::effects::http::{DynTransport, TransportResponse, UploadProgress};
use crate::effects::sink::{BodySink, SinkHook};
use crate::effects::ProcessingHandle;
use crate::error::{BoxError, OperationError};

/// A work transform with the pool it runs on.
pub(crate) struct Work<T> {
    pub(crate) pool: ProcessingHandle,
    pub(crate) transform: Box<dyn FnOnce(&ResponseData<'_>) -> Result<T, BoxError> + Send>,
}

/// Network phase of one operation.
///
/// Runs on the I/O thread. Each transport event is handled by a guarded
/// method; cancellation is observed before the transport starts and
/// between events.
pub(crate) struct Network<T: Send + 'static> {
    pub(crate) shared: Arc<Shared>,
    pub(crate) sink: BodySink,
    pub(crate) on_response: Option<SinkHook>,
    pub(crate) progress: ProgressCallbacks,
    pub(crate) work: Option<Work<T>>,
    pub(crate) finisher: Finisher<T>,
}

impl<T: Send + 'static> Network<T> {
    pub(crate) async fn run(self, transport: Arc<dyn DynTransport>) {
        let span = tracing::debug_span!(
            "http_operation",
            id = %self.shared.id,
            method = %self.shared.request.method,
            url = %self.shared.request.url,
        );
        self.drive(transport).instrument(span).await;
    }

    async fn drive(mut self, transport: Arc<dyn DynTransport>) {
        let shared = self.shared.clone();

        if shared.cancel.is_cancelled() {
            tracing::debug!("cancelled before connecting");
            self.finisher.finish(Err(OperationError::Cancelled));
            return;
        }
        if let Err(state) = shared.state.apply(Transition::Start) {
            tracing::debug!(%state, "not startable");
            self.finisher.finish(Err(OperationError::Cancelled));
            return;
        }
        tracing::debug!("connecting");

        let outcome = self.transfer(transport.as_ref(), &shared).await;

        let outcome = match (outcome, self.sink.close()) {
            (Ok(head), Ok(())) => Ok(head),
            (Ok(_), Err(e)) => {
                tracing::warn!(error = %e, "failed to close response sink");
                Err(OperationError::Sink(e))
            }
            (Err(e), Err(close)) => {
                tracing::warn!(error = %close, "failed to close response sink after error");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        };

        match outcome {
            Ok(head) => self.hand_off(head),
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::debug!(error = %e, "transfer failed");
                }
                self.finisher.finish(Err(e));
            }
        }
    }

    async fn transfer(
        &mut self,
        transport: &dyn DynTransport,
        shared: &Shared,
    ) -> Result<ResponseHead, OperationError> {
        let upload = UploadProgress::new(self.progress.upload.clone(), shared.reporting.clone());

        let response = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => return Err(OperationError::Cancelled),
            response = transport.send_boxed(&shared.request, upload) => response?,
        };
        let TransportResponse { head, mut body } = response;

        self.on_response(&head, shared)?;

        let mut gate = ProgressGate::new(head.content_length);
        loop {
            let chunk = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => return Err(OperationError::Cancelled),
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(chunk)) => self.on_data(&chunk, &mut gate, shared)?,
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        tracing::debug!(bytes = gate.transferred(), "body complete");
        Ok(head)
    }

    /// Headers arrived: commit them, validate, and get the sink ready.
    fn on_response(&mut self, head: &ResponseHead, shared: &Shared) -> Result<(), OperationError> {
        let report = validate(&shared.acceptance, head.status, head.content_type());
        tracing::debug!(
            status = head.status,
            content_type = head.content_type().unwrap_or_default(),
            content_length = head.content_length,
            "response received"
        );
        shared.commit_response(head, report.clone());

        if let Err(e) = report.verdict(&shared.acceptance) {
            tracing::warn!(error = %e, "response rejected");
            return Err(e.into());
        }
        if !report.is_acceptable() {
            tracing::debug!(
                status_code_acceptable = report.status_code_acceptable,
                content_type_acceptable = report.content_type_acceptable,
                "response outside acceptance policy, continuing"
            );
        }

        shared
            .state
            .apply(Transition::ResponseAccepted)
            .map_err(|_| OperationError::Cancelled)?;

        if let Some(hook) = self.on_response.take() {
            if let Some(config) = hook(head) {
                tracing::debug!(?config, "sink replaced by response hook");
                self.sink.reconfigure(config)?;
            }
        }
        self.sink.prepare(head.content_length)?;
        tracing::trace!(streaming = self.sink.is_streaming(), "sink ready");
        Ok(())
    }

    fn on_data(
        &mut self,
        chunk: &Bytes,
        gate: &mut ProgressGate,
        shared: &Shared,
    ) -> Result<(), OperationError> {
        tracing::trace!(len = chunk.len(), "chunk received");

        if let Err(e) = self.sink.accept(chunk) {
            tracing::warn!(error = %e, "body rejected");
            return Err(e);
        }

        if let (Some(callback), Some(progress)) =
            (&self.progress.download, gate.advance(chunk.len() as u64))
        {
            if !shared.reporting.is_cancelled() {
                callback(&progress);
            }
        }
        Ok(())
    }

    /// Body complete: finish now, or move to the processing pool.
    fn hand_off(mut self, head: ResponseHead) {
        let body = self.sink.take_body();
        let Network {
            shared,
            work,
            finisher,
            ..
        } = self;

        let Some(Work { pool, transform }) = work else {
            finisher.finish(Ok(Payload {
                body,
                processed: None,
            }));
            return;
        };

        if shared.cancel.is_cancelled() {
            tracing::debug!("cancelled before processing");
            finisher.finish(Err(OperationError::Cancelled));
            return;
        }
        if shared.state.apply(Transition::EnterProcessing).is_err() {
            finisher.finish(Err(OperationError::Cancelled));
            return;
        }
        tracing::debug!("handing off to processing pool");

        let span = tracing::Span::current();
        pool.dispatch(Box::new(move || {
            let _entered = span.enter();

            if shared.cancel.is_cancelled() {
                tracing::debug!("cancelled before transform");
                finisher.finish(Err(OperationError::Cancelled));
                return;
            }

            let last_request = shared.last_request().clone();
            let outcome = {
                let data = ResponseData {
                    last_request: &last_request,
                    head: &head,
                    body: body.as_ref(),
                };
                panic::catch_unwind(AssertUnwindSafe(|| transform(&data)))
            };

            let result = match outcome {
                Ok(Ok(processed)) => Ok(Payload {
                    body,
                    processed: Some(processed),
                }),
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "transform failed");
                    Err(OperationError::Transform(e))
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::warn!(%message, "transform panicked");
                    Err(OperationError::Transform(
                        format!("transform panicked: {message}").into(),
                    ))
                }
            };
            finisher.finish(result);
        }));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_from_str_and_string() {
        let from_str: Box<dyn Any + Send> = Box::new("boom");
        let from_string: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(from_str.as_ref()), "boom");
        assert_eq!(panic_message(from_string.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
