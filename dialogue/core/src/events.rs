//! Input Verbs
//!
//! The only inputs the engine understands. Raw key presses, clicks and menu
//! actions are mapped onto these by the input-dispatch layer; the controller
//! never sees anything else.

use serde::{Deserialize, Serialize};

/// User intent delivered to the controller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum InputVerb {
    /// Send text to the character
    Submit {
        /// What the user typed
        text: String,
    },
    /// Open the options menu overlay
    OpenMenu,
    /// Close the options menu overlay
    CloseMenu,
    /// Finish the current reveal immediately
    Skip,
}

impl InputVerb {
    /// Convenience constructor for [`InputVerb::Submit`]
    pub fn submit(text: impl Into<String>) -> Self {
        Self::Submit { text: text.into() }
    }

    /// Verb name used in logs and rejections
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Submit { .. } => "submit",
            Self::OpenMenu => "open_menu",
            Self::CloseMenu => "close_menu",
            Self::Skip => "skip",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_wire_format() {
        let json = serde_json::to_string(&InputVerb::submit("hi")).unwrap();
        assert_eq!(json, r#"{"verb":"submit","text":"hi"}"#);

        let verb: InputVerb = serde_json::from_str(r#"{"verb":"close_menu"}"#).unwrap();
        assert_eq!(verb, InputVerb::CloseMenu);
    }

    #[test]
    fn test_unknown_verb_rejected() {
        assert!(serde_json::from_str::<InputVerb>(r#"{"verb":"dance"}"#).is_err());
    }
}
