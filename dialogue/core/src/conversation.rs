//! Turns and Conversations
//!
//! A [`Turn`] is one finished utterance. Turns are built by the controller
//! while a reply streams in and are frozen when they join a [`Conversation`];
//! after that nothing mutates them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directive::{self, Segment};

/// Unique turn identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub Uuid);

impl TurnId {
    /// Generate a new random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "turn_{}", self.0.simple())
    }
}

/// Who is speaking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person at the keyboard
    User,
    /// The scripted character
    Character,
    /// Out-of-band note (never produced by the controller, kept on load)
    System,
}

impl Role {
    /// Stable lowercase name used in transcripts
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Character => "character",
            Self::System => "system",
        }
    }
}

/// One complete utterance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique id
    pub id: TurnId,
    /// Speaker
    pub role: Role,
    /// Text as produced, directives included
    pub raw_text: String,
    /// Parsed segments in playback order
    pub segments: Vec<Segment>,
    /// Creation time (Unix timestamp ms)
    pub timestamp: u64,
    /// Stand-in line shown after a failed request.
    /// Never persisted and never sent back to the backend.
    #[serde(default)]
    pub fallback: bool,
}

impl Turn {
    /// A user turn; user text carries no directives
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        let raw_text = text.into();
        Self {
            id: TurnId::new(),
            role: Role::User,
            segments: vec![Segment::TextRun(raw_text.clone())],
            raw_text,
            timestamp: now_ms(),
            fallback: false,
        }
    }

    /// A character turn from its raw text and already-parsed segments
    #[must_use]
    pub fn character(raw_text: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self {
            id: TurnId::new(),
            role: Role::Character,
            raw_text: raw_text.into(),
            segments,
            timestamp: now_ms(),
            fallback: false,
        }
    }

    /// Rebuild a turn from a stored record, re-parsing character text
    #[must_use]
    pub fn restore(role: Role, raw_text: String, timestamp: u64) -> Self {
        let segments = match role {
            Role::Character => directive::parse(&raw_text),
            Role::User | Role::System => vec![Segment::TextRun(raw_text.clone())],
        };
        Self {
            id: TurnId::new(),
            role,
            raw_text,
            segments,
            timestamp,
            fallback: false,
        }
    }

    /// Mark as a fallback line
    #[must_use]
    pub fn into_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    /// Visible text with directives removed
    #[must_use]
    pub fn visible_text(&self) -> String {
        directive::visible_text(&self.segments)
    }
}

/// Ordered, append-only sequence of turns
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Create an empty conversation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished turn
    pub fn push(&mut self, turn: Turn) {
        tracing::debug!(
            turn_id = %turn.id,
            role = turn.role.as_str(),
            chars = turn.raw_text.len(),
            "Turn appended to conversation"
        );
        self.turns.push(turn);
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Most recent turn
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether there are no turns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turns to send as backend context, newest `max_turns` at most
    ///
    /// Fallback lines are excluded: they were never said by the character.
    #[must_use]
    pub fn context(&self, max_turns: usize) -> Vec<&Turn> {
        let spoken: Vec<&Turn> = self.turns.iter().filter(|t| !t.fallback).collect();
        let start = spoken.len().saturating_sub(max_turns);
        spoken[start..].to_vec()
    }
}

impl From<Vec<Turn>> for Conversation {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

/// Current Unix time in milliseconds
pub(crate) fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
