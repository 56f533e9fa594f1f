//! Scripted backend
//!
//! Replays canned replies in order. Used by the CLI's offline mode and by
//! tests that need exact control over chunking, failures and stalls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use super::traits::{ChatBackend, ChatRequest, ChunkStream};
use crate::error::BackendError;

/// One canned response to one `open_stream` call
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    /// Deliver these fragments, then complete
    Chunks(Vec<String>),
    /// Fail before any text
    Reject(BackendError),
    /// Deliver fragments, then fail
    Interrupted {
        /// Fragments delivered before the failure
        chunks: Vec<String>,
        /// Failure raised afterwards
        error: BackendError,
    },
    /// Deliver fragments, then never finish
    Stall(Vec<String>),
}

impl ScriptedReply {
    /// Reply from string slices
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chunks(chunks.into_iter().map(Into::into).collect())
    }

    /// Reply that streams `text` a word at a time
    pub fn words(text: &str) -> Self {
        Self::Chunks(split_words(text))
    }
}

/// Split after each space so the pieces concatenate back to `text`
fn split_words(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if c == ' ' {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Backend that plays back a queue of [`ScriptedReply`] values
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    /// Lines cycled through once the queue is empty
    idle_lines: Vec<String>,
    attempts: AtomicU32,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    /// Backend with a fixed queue of replies
    #[must_use]
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    /// Backend that answers every request from `lines`, round-robin
    #[must_use]
    pub fn cycling(lines: Vec<String>) -> Self {
        Self {
            idle_lines: lines,
            ..Default::default()
        }
    }

    /// Queue another reply
    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().push_back(reply);
    }

    /// Number of `open_stream` calls so far
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Every request received, in order
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    fn next_reply(&self, attempt: u32) -> ScriptedReply {
        if let Some(reply) = self.replies.lock().pop_front() {
            return reply;
        }
        if self.idle_lines.is_empty() {
            return ScriptedReply::Reject(BackendError::InvalidRequest(
                "script exhausted".to_string(),
            ));
        }
        let idx = (attempt as usize).saturating_sub(1) % self.idle_lines.len();
        ScriptedReply::words(&self.idle_lines[idx])
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, BackendError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().push(request.clone());

        let reply = self.next_reply(attempt);
        tracing::debug!(attempt, ?reply, "Scripted reply");

        match reply {
            ScriptedReply::Reject(error) => Err(error),
            ScriptedReply::Chunks(chunks) => Ok(stream::iter(chunks.into_iter().map(Ok)).boxed()),
            ScriptedReply::Interrupted { chunks, error } => Ok(stream::iter(
                chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error))),
            )
            .boxed()),
            ScriptedReply::Stall(chunks) => Ok(stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words_round_trips() {
        let text = "Oh! Hi there [happy] friend.";
        let parts = split_words(text);
        assert_eq!(parts.concat(), text);
        assert_eq!(parts[0], "Oh! ");
    }

    #[tokio::test]
    async fn test_replies_in_order_then_exhausted() {
        let backend = ScriptedBackend::new(vec![
            ScriptedReply::chunks(["a", "b"]),
            ScriptedReply::Reject(BackendError::Transient("reset".into())),
        ]);
        let request = ChatRequest::new("hi");

        let first: Vec<_> = backend.open_stream(&request).await.unwrap().collect().await;
        assert_eq!(first, vec![Ok("a".to_string()), Ok("b".to_string())]);

        assert!(backend.open_stream(&request).await.is_err());
        assert!(matches!(
            backend.open_stream(&request).await,
            Err(BackendError::InvalidRequest(_))
        ));
        assert_eq!(backend.attempts(), 3);
        assert_eq!(backend.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_cycling_lines() {
        let backend = ScriptedBackend::cycling(vec!["one".into(), "two".into()]);
        let request = ChatRequest::new("hi");

        for expected in ["one", "two", "one"] {
            let text: Vec<_> = backend.open_stream(&request).await.unwrap().collect().await;
            let text: String = text.into_iter().map(Result::unwrap).collect();
            assert_eq!(text, expected);
        }
    }
}
