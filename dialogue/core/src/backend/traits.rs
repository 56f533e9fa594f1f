//! Chat Backend Traits
//!
//! The seam between the stream adapter and a concrete text-generation
//! service. A backend opens one streaming response per call; retries,
//! backpressure and cancellation are the adapter's business, not the
//! backend's.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::conversation::{Conversation, Role};
use crate::error::BackendError;

/// Fragments of one streamed reply
///
/// Ends after the last fragment; an `Err` item ends it early.
pub type ChunkStream = BoxStream<'static, Result<String, BackendError>>;

/// One prior turn as context for the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextTurn {
    /// Speaker
    pub role: Role,
    /// Raw text, directives included
    pub text: String,
}

/// Request for one character reply
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatRequest {
    /// Earlier turns, oldest first
    pub prior_turns: Vec<ContextTurn>,
    /// The new user text
    pub user_text: String,
    /// Character instructions
    pub system: Option<String>,
    /// Model override; the backend default is used when `None`
    pub model: Option<String>,
}

impl ChatRequest {
    /// Create a request for `user_text` with no context
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            ..Default::default()
        }
    }

    /// Attach prior turns
    #[must_use]
    pub fn with_context(mut self, prior_turns: Vec<ContextTurn>) -> Self {
        self.prior_turns = prior_turns;
        self
    }

    /// Set system instructions
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Override the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Build backend context from a conversation
///
/// Fallback lines never reach the backend.
#[must_use]
pub fn context_from(conversation: &Conversation, max_turns: usize) -> Vec<ContextTurn> {
    conversation
        .context(max_turns)
        .into_iter()
        .map(|turn| ContextTurn {
            role: turn.role,
            text: turn.raw_text.clone(),
        })
        .collect()
}

/// Text-generation backend
///
/// Implement this trait to plug a different provider into the adapter.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Open a streaming reply
    ///
    /// Errors returned here happen before any text exists (connection
    /// refused, HTTP status). Errors inside the stream happen mid-reply.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Turn;

    #[test]
    fn test_request_builder() {
        let request = ChatRequest::new("Hello")
            .with_system("Be kind")
            .with_model("gemini-test");

        assert_eq!(request.user_text, "Hello");
        assert_eq!(request.system.as_deref(), Some("Be kind"));
        assert_eq!(request.model.as_deref(), Some("gemini-test"));
        assert!(request.prior_turns.is_empty());
    }

    #[test]
    fn test_context_skips_fallback_turns() {
        let mut conversation = Conversation::default();
        conversation.push(Turn::user("hi"));
        conversation.push(Turn::character("oops", Vec::new()).into_fallback());
        conversation.push(Turn::user("again"));

        let context = context_from(&conversation, 10);
        let texts: Vec<_> = context.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["hi", "again"]);
    }
}
