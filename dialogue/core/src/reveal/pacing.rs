//! Reveal Pacing
//!
//! Named text speeds and the punctuation holds that make the typewriter read
//! like speech rather than a ticker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Named reveal speeds offered by the options menu
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSpeed {
    /// 100 ms per character
    Slow,
    /// 35 ms per character
    #[default]
    Normal,
    /// 20 ms per character
    Fast,
    /// 1 ms per character
    Instant,
}

impl TextSpeed {
    /// Time spent revealing one character
    #[must_use]
    pub fn per_char(self) -> Duration {
        Duration::from_millis(match self {
            Self::Slow => 100,
            Self::Normal => 35,
            Self::Fast => 20,
            Self::Instant => 1,
        })
    }

    /// Parse a speed name, case-insensitively
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "slow" => Some(Self::Slow),
            "normal" => Some(Self::Normal),
            "fast" => Some(Self::Fast),
            "instant" => Some(Self::Instant),
            _ => None,
        }
    }
}

/// Holds inserted after punctuation and sound cues
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacingProfile {
    /// After `...`
    pub ellipsis: Duration,
    /// After `,`
    pub comma: Duration,
    /// After `.`
    pub period: Duration,
    /// After `?`
    pub question: Duration,
    /// After `!`
    pub exclamation: Duration,
    /// After a sound cue is applied
    pub after_cue: Duration,
}

impl Default for PacingProfile {
    fn default() -> Self {
        Self {
            ellipsis: Duration::from_millis(300),
            comma: Duration::from_millis(150),
            period: Duration::from_millis(250),
            question: Duration::from_millis(300),
            exclamation: Duration::from_millis(200),
            after_cue: Duration::from_millis(500),
        }
    }
}

impl PacingProfile {
    /// Uniform pacing: every character costs exactly the per-char rate
    #[must_use]
    pub fn none() -> Self {
        Self {
            ellipsis: Duration::ZERO,
            comma: Duration::ZERO,
            period: Duration::ZERO,
            question: Duration::ZERO,
            exclamation: Duration::ZERO,
            after_cue: Duration::ZERO,
        }
    }

    /// Hold after revealing `chars[idx]`
    ///
    /// Punctuation only pauses at a word boundary, so `3.5` and the first
    /// two dots of `...` do not stall the reveal. The end of `chars` is a
    /// boundary only when `run_ended` says no more text can follow it.
    #[must_use]
    pub fn hold_after(&self, chars: &[char], idx: usize, run_ended: bool) -> Duration {
        let Some(&c) = chars.get(idx) else {
            return Duration::ZERO;
        };
        let at_boundary = chars
            .get(idx + 1)
            .map_or(run_ended, |next| next.is_whitespace());
        if !at_boundary {
            return Duration::ZERO;
        }

        match c {
            '.' if idx >= 2 && chars[idx - 1] == '.' && chars[idx - 2] == '.' => self.ellipsis,
            '.' => self.period,
            ',' => self.comma,
            '?' => self.question,
            '!' => self.exclamation,
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_speed_table() {
        assert_eq!(TextSpeed::Slow.per_char(), Duration::from_millis(100));
        assert_eq!(TextSpeed::Normal.per_char(), Duration::from_millis(35));
        assert_eq!(TextSpeed::Fast.per_char(), Duration::from_millis(20));
        assert_eq!(TextSpeed::Instant.per_char(), Duration::from_millis(1));
        assert_eq!(TextSpeed::from_name(" FAST "), Some(TextSpeed::Fast));
        assert_eq!(TextSpeed::from_name("ludicrous"), None);
    }

    #[test]
    fn test_punctuation_holds() {
        let pacing = PacingProfile::default();
        let text = chars("Oh, hi. Wait... what?! 3.5");

        assert_eq!(pacing.hold_after(&text, 2, true), pacing.comma);
        assert_eq!(pacing.hold_after(&text, 6, true), pacing.period);
        // first two dots of the ellipsis
        assert_eq!(pacing.hold_after(&text, 12, true), Duration::ZERO);
        assert_eq!(pacing.hold_after(&text, 13, true), Duration::ZERO);
        assert_eq!(pacing.hold_after(&text, 14, true), pacing.ellipsis);
        // `?` followed by `!` is not a boundary
        assert_eq!(pacing.hold_after(&text, 20, true), Duration::ZERO);
        assert_eq!(pacing.hold_after(&text, 21, true), pacing.exclamation);
        // decimal point
        assert_eq!(pacing.hold_after(&text, 24, true), Duration::ZERO);
    }

    #[test]
    fn test_open_run_end_is_not_a_boundary() {
        let pacing = PacingProfile::default();
        let text = chars("pi is 3.");

        assert_eq!(pacing.hold_after(&text, 7, false), Duration::ZERO);
        assert_eq!(pacing.hold_after(&text, 7, true), pacing.period);
    }

    #[test]
    fn test_none_profile_never_holds() {
        let pacing = PacingProfile::none();
        let text = chars("a, b. c!");
        for idx in 0..text.len() {
            assert_eq!(pacing.hold_after(&text, idx, true), Duration::ZERO);
        }
    }
}
