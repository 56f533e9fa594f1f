//! Text-Generation Backend Integration
//!
//! The controller never talks to a provider directly. It asks a
//! [`StreamAdapter`] for a [`ResponseStream`], and the adapter drives a
//! [`ChatBackend`] underneath, handling retries, flow control and
//! cancellation uniformly for every provider.
//!
//! # Available Backends
//!
//! - **Gemini**: Google Generative Language API (default)
//! - **Scripted**: canned replies for offline use and tests
//!
//! # Usage
//!
//! ```ignore
//! use dialogue_core::backend::{ChatRequest, GeminiBackend, RetryPolicy, StreamAdapter};
//!
//! let backend = GeminiBackend::from_config(&config.backend)?;
//! let adapter = StreamAdapter::new(Arc::new(backend), RetryPolicy::default());
//! let mut stream = adapter.send(ChatRequest::new("Hello!"));
//! while let Some(event) = stream.next_event().await { /* ... */ }
//! ```

mod gemini;
mod retry;
mod scripted;
mod stream;
mod traits;

pub use gemini::GeminiBackend;
pub use retry::RetryPolicy;
pub use scripted::{ScriptedBackend, ScriptedReply};
pub use stream::{ResponseStream, StreamAdapter, StreamEvent};
pub use traits::{context_from, ChatBackend, ChatRequest, ChunkStream, ContextTurn};
