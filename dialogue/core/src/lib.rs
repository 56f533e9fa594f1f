//! Dialogue Core - Character Dialogue Presentation Engine
//!
//! This crate turns a streamed, free-form reply from a text-generation
//! backend into a paced, visual-novel style presentation: text revealed one
//! character at a time, expression changes and sound cues fired at the exact
//! point they appear in the reply, and a durable transcript of every turn.
//!
//! It draws nothing and plays nothing itself. Rendering, audio and toasts are
//! collaborators that consume [`PresentationMessage`]s; input dispatch maps
//! raw key presses onto [`InputVerb`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Collaborators                              │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────────────┐  │
//! │  │ Renderer │  │  Audio   │  │  Toasts  │  │  Input Dispatch  │  │
//! │  └────▲─────┘  └────▲─────┘  └────▲─────┘  └────────┬─────────┘  │
//! │       └─────────────┴─────────────┘                 │            │
//! │              PresentationMessage (out)       InputVerb (in)      │
//! └───────────────────────────┬─────────────────────────┼────────────┘
//!                             │                         │
//! ┌───────────────────────────┼─────────────────────────┼────────────┐
//! │                     DIALOGUE CORE                   │            │
//! │  ┌────────────────────────┴─────────────────────────┴──────────┐ │
//! │  │                       Controller                            │ │
//! │  │  ┌──────────┐  ┌───────────┐  ┌──────────┐  ┌────────────┐  │ │
//! │  │  │  Stream  │─▶│ Directive │─▶│  Reveal  │  │  History   │  │ │
//! │  │  │ Adapter  │  │  Parser   │  │  Engine  │  │   Store    │  │ │
//! │  │  └────┬─────┘  └───────────┘  └──────────┘  └────────────┘  │ │
//! │  └───────┼─────────────────────────────────────────────────────┘ │
//! │          │                                                       │
//! │  ┌───────▼─────────┐                     ┌─────────────────────┐ │
//! │  │ ChatBackend     │                     │ Session Settings    │ │
//! │  │ (Gemini/Script) │                     │ (read every tick)   │ │
//! │  └─────────────────┘                     └─────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Controller`]: The state machine that owns the conversation
//! - [`StreamAdapter`]: Retrying, cancellable view over a [`ChatBackend`]
//! - [`SegmentAccumulator`]: Incremental directive parsing across chunks
//! - [`RevealEngine`]: Tick-driven typewriter with punctuation pacing
//! - [`HistoryStore`]: Append-only transcript persistence
//! - [`SessionSettings`]: Player name, text speed, volume and background
//!
//! # Quick Start
//!
//! ```ignore
//! use dialogue_core::{
//!     backend::{GeminiBackend, StreamAdapter},
//!     Controller, ControllerOptions, FileHistoryStore, SessionSettings,
//! };
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = dialogue_core::load_config()?;
//!     let backend = GeminiBackend::from_config(&config.backend)?;
//!     let adapter = StreamAdapter::new(Arc::new(backend), config.retry.clone());
//!
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let mut controller = Controller::new(
//!         adapter,
//!         Box::new(FileHistoryStore::new(&config.history_path)),
//!         config.catalog(),
//!         ControllerOptions::from_config(&config),
//!         tx,
//!     );
//!     controller.load_history()?;
//!     controller.submit("Hello!")?;
//!
//!     let mut interval = tokio::time::interval(config.tick_interval);
//!     loop {
//!         interval.tick().await;
//!         controller.tick(config.tick_interval, SessionSettings::default());
//!         while let Ok(msg) = rx.try_recv() {
//!             // Render message
//!         }
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Chat backends, retry policy and the stream adapter
//! - [`catalog`]: Known expression and cue ids
//! - [`config`]: TOML and environment configuration
//! - [`controller`]: Conversation Controller state machine
//! - [`conversation`]: Turns and the in-memory conversation
//! - [`directive`]: Inline expression and cue marker parsing
//! - [`error`]: Error types
//! - [`events`]: Input verbs
//! - [`history`]: Transcript persistence and export
//! - [`messages`]: Presentation messages and controller states
//! - [`reveal`]: Typewriter reveal engine
//! - [`settings`]: Session settings view

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod directive;
pub mod error;
pub mod events;
pub mod history;
pub mod messages;
pub mod reveal;
pub mod settings;

// Re-exports for convenience
pub use backend::{
    ChatBackend, ChatRequest, GeminiBackend, ResponseStream, RetryPolicy, ScriptedBackend,
    ScriptedReply, StreamAdapter, StreamEvent,
};
pub use catalog::{AssetCatalog, CueId, ExpressionId};
pub use controller::{Controller, ControllerOptions};
pub use conversation::{Conversation, Role, Turn, TurnId};
pub use directive::{Segment, SegmentAccumulator};
pub use error::{BackendError, ControllerError, PersistenceError};
pub use events::InputVerb;
pub use history::{FileHistoryStore, HistoryStore, MemoryHistoryStore, TranscriptRecord};
pub use messages::{ConversationState, NotifyLevel, PresentationMessage};
pub use reveal::{PacingProfile, RevealEngine, RevealEvent, TextSpeed};
pub use settings::{load_options, OptionsFile, SessionSettings, SettingsSource, SharedSettings};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, DialogueToml, EngineConfig,
};
