//! AI Response Stream Adapter
//!
//! Turns one [`ChatBackend`] call into a [`ResponseStream`]: a lazily
//! consumed, cancellable sequence of text chunks that ends with exactly one
//! terminal event.
//!
//! # Flow control
//!
//! The producer task hands chunks over a channel of capacity one, so at
//! most one chunk sits undelivered; the task does not read more from the
//! connection until the consumer has taken it.
//!
//! # Retries
//!
//! Transient failures are retried with exponential backoff, but only while
//! nothing has been delivered. Once a chunk has reached the consumer a
//! failure is terminal ([`BackendError::Interrupted`]).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::retry::RetryPolicy;
use super::traits::{ChatBackend, ChatRequest};
use crate::error::BackendError;

// ============================================================================
// Stream Events
// ============================================================================

/// What a [`ResponseStream`] yields
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next fragment of the reply, never empty
    Chunk(String),
    /// The reply ended normally
    Complete,
    /// The reply ended with a failure
    Failed(BackendError),
}

impl StreamEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk(_))
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Issues requests and wraps the replies as [`ResponseStream`]s
#[derive(Clone)]
pub struct StreamAdapter {
    backend: Arc<dyn ChatBackend>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for StreamAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAdapter")
            .field("backend", &self.backend.name())
            .field("retry", &self.retry)
            .finish()
    }
}

impl StreamAdapter {
    /// Create an adapter over `backend`
    pub fn new(backend: Arc<dyn ChatBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Name of the wrapped backend
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Start a request
    ///
    /// `request` carries the prior turns and the new user text. Must be
    /// called from within a tokio runtime.
    #[must_use]
    pub fn send(&self, request: ChatRequest) -> ResponseStream {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let backend = Arc::clone(&self.backend);
        let retry = self.retry.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = task_cancel.cancelled() => {
                    tracing::debug!("Response stream cancelled");
                }
                () = produce(backend, retry, request, tx) => {}
            }
        });

        ResponseStream {
            rx,
            cancel,
            handle,
            cancelled: false,
            finished: false,
        }
    }
}

/// Outcome of a single attempt
enum Attempt {
    Completed,
    ConsumerGone,
    Failed { error: BackendError, delivered: usize },
}

async fn produce(
    backend: Arc<dyn ChatBackend>,
    retry: RetryPolicy,
    request: ChatRequest,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let terminal = match run_attempt(backend.as_ref(), &request, &tx).await {
            Attempt::Completed => {
                tracing::debug!(backend = backend.name(), attempts, "Response complete");
                StreamEvent::Complete
            }
            Attempt::ConsumerGone => return,
            Attempt::Failed { error, delivered } if delivered > 0 => {
                tracing::warn!(
                    backend = backend.name(),
                    delivered,
                    error = %error,
                    "Stream failed after partial delivery"
                );
                let error = match error {
                    BackendError::Interrupted(_) => error,
                    other => BackendError::Interrupted(other.to_string()),
                };
                StreamEvent::Failed(error)
            }
            Attempt::Failed { error, .. } if !error.is_transient() => {
                tracing::warn!(backend = backend.name(), error = %error, "Request rejected");
                StreamEvent::Failed(error)
            }
            Attempt::Failed { error, .. } => {
                if !retry.allows_another(attempts) {
                    tracing::warn!(
                        backend = backend.name(),
                        attempts,
                        error = %error,
                        "Retries exhausted"
                    );
                    StreamEvent::Failed(BackendError::RetriesExhausted {
                        attempts,
                        last: error.to_string(),
                    })
                } else {
                    let delay = retry.backoff_for_retry(attempts - 1);
                    tracing::info!(
                        backend = backend.name(),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
        };

        // The consumer may already be gone; nothing else to do then.
        let _ = tx.send(terminal).await;
        return;
    }
}

async fn run_attempt(
    backend: &dyn ChatBackend,
    request: &ChatRequest,
    tx: &mpsc::Sender<StreamEvent>,
) -> Attempt {
    let mut chunks = match backend.open_stream(request).await {
        Ok(chunks) => chunks,
        Err(error) => return Attempt::Failed {
            error,
            delivered: 0,
        },
    };

    let mut delivered = 0;
    loop {
        // Channel slot first, connection second: a chunk is only pulled
        // once the previous one has been taken.
        let Ok(permit) = tx.reserve().await else {
            return Attempt::ConsumerGone;
        };
        loop {
            match chunks.next().await {
                None => return Attempt::Completed,
                Some(Ok(text)) if text.is_empty() => {}
                Some(Ok(text)) => {
                    permit.send(StreamEvent::Chunk(text));
                    delivered += 1;
                    break;
                }
                Some(Err(error)) => return Attempt::Failed { error, delivered },
            }
        }
    }
}

// ============================================================================
// Response Stream
// ============================================================================

/// Consumer side of one in-flight reply
///
/// Dropping it cancels the request.
#[derive(Debug)]
pub struct ResponseStream {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    cancelled: bool,
    finished: bool,
}

impl ResponseStream {
    /// Take the next event without waiting
    ///
    /// Returns `None` when nothing is ready, after the terminal event, and
    /// after [`ResponseStream::cancel`].
    pub fn try_next(&mut self) -> Option<StreamEvent> {
        if self.cancelled || self.finished {
            return None;
        }
        match self.rx.try_recv() {
            Ok(event) => {
                self.finished = event.is_terminal();
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                // Producer ended without a terminal event (it panicked).
                self.finished = true;
                Some(StreamEvent::Failed(BackendError::Interrupted(
                    "response producer stopped unexpectedly".to_string(),
                )))
            }
        }
    }

    /// Wait for the next event
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.cancelled || self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(event) => {
                self.finished = event.is_terminal();
                Some(event)
            }
            None => {
                self.finished = true;
                Some(StreamEvent::Failed(BackendError::Interrupted(
                    "response producer stopped unexpectedly".to_string(),
                )))
            }
        }
    }

    /// Stop the request; no further event is delivered
    pub fn cancel(&mut self) {
        if !self.cancelled {
            tracing::debug!("Cancelling response stream");
        }
        self.cancelled = true;
        self.cancel.cancel();
        self.rx.close();
    }

    /// Whether the terminal event has been taken or the stream cancelled
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancelled || self.finished
    }

    /// Whether the producer task has exited
    #[must_use]
    pub fn producer_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Stream for ResponseStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled || self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                self.finished = event.is_terminal();
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
