//! Presentation Messages
//!
//! Everything the controller tells the outside world. The rendering layer
//! draws text and sprites, the audio layer plays cues, the notification
//! layer shows toasts; none of them make decisions. They just react to
//! these messages in order.

use serde::{Deserialize, Serialize};

use crate::catalog::{CueId, ExpressionId};
use crate::conversation::{Role, TurnId};

/// Messages from the controller to presentation collaborators
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresentationMessage {
    // ============================================
    // Turn Lifecycle
    // ============================================
    /// A turn started; clear the text box
    TurnStarted {
        /// Turn being presented
        turn_id: TurnId,
        /// Speaker
        role: Role,
    },

    /// Characters became visible
    Text {
        /// Turn the text belongs to
        turn_id: TurnId,
        /// Newly revealed characters (append to what is shown)
        delta: String,
    },

    /// The turn is fully shown and frozen
    TurnFinished {
        /// Finished turn
        turn_id: TurnId,
        /// Full visible text
        text: String,
        /// Whether this is a stand-in line after a failure
        fallback: bool,
    },

    // ============================================
    // Directives
    // ============================================
    /// Switch the expression sprite
    Expression {
        /// Expression to show
        id: ExpressionId,
    },

    /// Play a sound cue
    Cue {
        /// Cue to play
        id: CueId,
    },

    // ============================================
    // Status
    // ============================================
    /// Controller state changed
    State {
        /// New state
        state: ConversationState,
    },

    /// Out-of-band notice for the notification collaborator
    Notify {
        /// Severity
        level: NotifyLevel,
        /// Short title
        title: String,
        /// Detail
        message: String,
    },
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
}

/// Controller states as seen from outside
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationState {
    /// Waiting for user input
    Idle,
    /// Request in flight, nothing revealed yet
    Requesting,
    /// Character turn being revealed
    Revealing,
    /// Options menu open over one of the above
    MenuOpen,
}

impl ConversationState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Waiting for you",
            Self::Requesting => "Thinking...",
            Self::Revealing => "Speaking",
            Self::MenuOpen => "Menu",
        }
    }

    /// Whether user text is accepted
    #[must_use]
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_idle_accepts_input() {
        assert!(ConversationState::Idle.accepts_input());
        assert!(!ConversationState::Requesting.accepts_input());
        assert!(!ConversationState::Revealing.accepts_input());
        assert!(!ConversationState::MenuOpen.accepts_input());
    }

    #[test]
    fn test_message_serialization() {
        let msg = PresentationMessage::Expression { id: "happy".into() };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"expression","id":"happy"}"#);
    }
}
