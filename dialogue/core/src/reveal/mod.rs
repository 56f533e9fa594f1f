//! Typewriter Reveal Engine
//!
//! Discloses a turn's text one character at a time as external ticks report
//! elapsed time. The engine never reads a clock: the caller's loop owns time,
//! which keeps reveal deterministic and lets a paused menu simply stop
//! calling [`RevealEngine::tick`].
//!
//! # Timing
//!
//! Elapsed time goes into an accumulator. Each character costs `rate_per_char`
//! and the remainder carries over, so with [`PacingProfile::none`] the number
//! of revealed characters after total time `T` is exactly `floor(T / rate)`
//! regardless of how `T` was split across ticks.
//!
//! Expression and cue segments cost nothing: they are reported and the
//! cursor moves on within the same tick.
//!
//! # Streaming
//!
//! Segments may keep arriving while the reveal runs ([`RevealEngine::extend`]).
//! A reveal that catches up with the stream waits; completion is reported
//! once, and only after [`RevealEngine::close`] says nothing more is coming.

mod pacing;

pub use pacing::{PacingProfile, TextSpeed};

use std::time::Duration;

use crate::catalog::{CueId, ExpressionId};
use crate::directive::Segment;

/// Reveal progress for one turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealState {
    /// Segments in playback order
    pub segments: Vec<Segment>,
    /// Characters revealed so far within the current text run
    pub cursor_index: usize,
    /// Segment being revealed
    pub current_segment_index: usize,
    /// Time per character, refreshed from settings on every tick
    pub rate_per_char: Duration,
    /// Time accumulation frozen
    pub paused: bool,
    /// Everything from here on reveals instantly
    pub skip_requested: bool,
}

/// Something that became visible or audible during a tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevealEvent {
    /// Newly visible characters
    Text(String),
    /// Expression change applied
    Expression(ExpressionId),
    /// Sound cue triggered
    Cue(CueId),
    /// Last segment reached; emitted exactly once per turn
    Completed,
}

/// Drives the typewriter for a single turn
#[derive(Clone, Debug)]
pub struct RevealEngine {
    state: RevealState,
    pacing: PacingProfile,
    /// Time banked but not yet spent on characters
    accumulated: Duration,
    /// Remaining punctuation or cue hold
    hold: Duration,
    /// No more segments will be added
    closed: bool,
    /// `Completed` has been emitted
    completed: bool,
    revealed_chars: usize,
}

impl RevealEngine {
    /// Empty engine waiting for segments
    #[must_use]
    pub fn new(rate_per_char: Duration, pacing: PacingProfile) -> Self {
        Self {
            state: RevealState {
                segments: Vec::new(),
                cursor_index: 0,
                current_segment_index: 0,
                rate_per_char,
                paused: false,
                skip_requested: false,
            },
            pacing,
            accumulated: Duration::ZERO,
            hold: Duration::ZERO,
            closed: false,
            completed: false,
            revealed_chars: 0,
        }
    }

    /// Engine over a complete, closed segment list
    #[must_use]
    pub fn with_segments(
        segments: Vec<Segment>,
        rate_per_char: Duration,
        pacing: PacingProfile,
    ) -> Self {
        let mut engine = Self::new(rate_per_char, pacing);
        engine.extend(segments);
        engine.close();
        engine
    }

    /// Append newly parsed segments
    ///
    /// Text adjacent to a trailing, not yet finished text run is merged into
    /// it so the reveal flows across chunk boundaries.
    pub fn extend(&mut self, segments: impl IntoIterator<Item = Segment>) {
        for segment in segments {
            if matches!(&segment, Segment::TextRun(text) if text.is_empty()) {
                continue;
            }

            // Only a run the cursor has not moved past can grow
            let mergeable = self.state.segments.len() > self.state.current_segment_index;
            if mergeable {
                if let (Some(Segment::TextRun(last)), Segment::TextRun(text)) =
                    (self.state.segments.last_mut(), &segment)
                {
                    last.push_str(text);
                    continue;
                }
            }
            self.state.segments.push(segment);
        }
    }

    /// Mark the segment list as final
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Advance by `elapsed` at the given per-character rate
    pub fn tick(&mut self, elapsed: Duration, rate_per_char: Duration) -> Vec<RevealEvent> {
        let mut events = Vec::new();
        self.state.rate_per_char = rate_per_char;

        if self.state.paused {
            return events;
        }

        if self.state.skip_requested || rate_per_char.is_zero() {
            self.advance(&mut events, true);
        } else {
            self.accumulated += elapsed;
            self.advance(&mut events, false);
        }
        events
    }

    /// Reveal everything received so far and apply pending directives in order
    ///
    /// Segments that arrive later are revealed instantly on the next tick.
    pub fn skip(&mut self) -> Vec<RevealEvent> {
        let mut events = Vec::new();
        self.state.skip_requested = true;
        self.accumulated = Duration::ZERO;
        self.hold = Duration::ZERO;
        self.advance(&mut events, true);
        events
    }

    /// Freeze time accumulation
    pub fn pause(&mut self) {
        self.state.paused = true;
    }

    /// Unfreeze time accumulation; progress is untouched
    pub fn resume(&mut self) {
        self.state.paused = false;
    }

    /// Whether ticks are currently ignored
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    /// Whether completion has been reported
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Current progress
    #[must_use]
    pub fn state(&self) -> &RevealState {
        &self.state
    }

    /// Characters revealed across all text runs
    #[must_use]
    pub fn revealed_chars(&self) -> usize {
        self.revealed_chars
    }

    /// Characters in all segments received so far
    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.state.segments.iter().map(Segment::char_len).sum()
    }

    /// Text revealed so far
    #[must_use]
    pub fn visible_text(&self) -> String {
        let mut remaining = self.revealed_chars;
        let mut out = String::new();
        for segment in &self.state.segments {
            if let Segment::TextRun(text) = segment {
                let take = remaining.min(text.chars().count());
                out.extend(text.chars().take(take));
                remaining -= take;
            }
            if remaining == 0 {
                break;
            }
        }
        out
    }

    fn next_segment(&mut self) {
        self.state.current_segment_index += 1;
        self.state.cursor_index = 0;
    }

    fn advance(&mut self, events: &mut Vec<RevealEvent>, instant: bool) {
        loop {
            if !instant && !self.hold.is_zero() {
                if self.accumulated < self.hold {
                    self.hold -= self.accumulated;
                    self.accumulated = Duration::ZERO;
                    return;
                }
                self.accumulated -= self.hold;
                self.hold = Duration::ZERO;
            }

            let Some(segment) = self
                .state
                .segments
                .get(self.state.current_segment_index)
                .cloned()
            else {
                // Caught up: don't bank time against text that hasn't arrived
                self.accumulated = Duration::ZERO;
                if self.closed && !self.completed {
                    self.completed = true;
                    events.push(RevealEvent::Completed);
                }
                return;
            };

            match segment {
                Segment::ExpressionChange(id) => {
                    events.push(RevealEvent::Expression(id));
                    self.next_segment();
                }
                Segment::AudioCue(id) => {
                    events.push(RevealEvent::Cue(id));
                    self.next_segment();
                    if !instant {
                        self.hold = self.pacing.after_cue;
                    }
                }
                Segment::TextRun(text) => {
                    let chars: Vec<char> = text.chars().collect();
                    if self.state.cursor_index >= chars.len() {
                        self.next_segment();
                        continue;
                    }

                    let revealed = if instant {
                        self.reveal_all(&chars)
                    } else {
                        self.reveal_budgeted(&chars)
                    };
                    if !revealed.is_empty() {
                        events.push(RevealEvent::Text(revealed));
                    }

                    let run_unfinished = self.state.cursor_index < chars.len();
                    if run_unfinished && self.hold.is_zero() {
                        // Out of time for this tick
                        return;
                    }
                }
            }
        }
    }

    fn reveal_all(&mut self, chars: &[char]) -> String {
        let rest: String = chars[self.state.cursor_index..].iter().collect();
        self.revealed_chars += chars.len() - self.state.cursor_index;
        self.state.cursor_index = chars.len();
        rest
    }

    fn reveal_budgeted(&mut self, chars: &[char]) -> String {
        let rate = self.state.rate_per_char;
        let run_ended =
            self.closed || self.state.current_segment_index + 1 < self.state.segments.len();
        let mut revealed = String::new();

        while self.state.cursor_index < chars.len() && self.accumulated >= rate {
            self.accumulated -= rate;
            let idx = self.state.cursor_index;
            revealed.push(chars[idx]);
            self.state.cursor_index += 1;
            self.revealed_chars += 1;

            let hold = self.pacing.hold_after(chars, idx, run_ended);
            if !hold.is_zero() {
                self.hold = hold;
                break;
            }
        }
        revealed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::parse;
    use pretty_assertions::assert_eq;

    const RATE: Duration = Duration::from_millis(35);

    fn uniform(raw: &str) -> RevealEngine {
        RevealEngine::with_segments(parse(raw), RATE, PacingProfile::none())
    }

    fn texts(events: &[RevealEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                RevealEvent::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_accumulator_is_time_accurate() {
        let mut engine = uniform("abcdefghijklmnopqrstuvwxyz0123456789");

        // 10 ticks of 16ms = 160ms -> floor(160 / 35) = 4
        for _ in 0..10 {
            engine.tick(Duration::from_millis(16), RATE);
        }
        assert_eq!(engine.revealed_chars(), 4);

        // 34ms more -> 194ms total -> still 5 (175 <= 194 < 210)
        engine.tick(Duration::from_millis(34), RATE);
        assert_eq!(engine.revealed_chars(), 5);
    }

    #[test]
    fn test_sub_rate_ticks_lose_nothing() {
        let mut engine = uniform("0123456789");
        // 35 ticks of 1ms each add up to exactly one character
        for _ in 0..34 {
            engine.tick(Duration::from_millis(1), RATE);
        }
        assert_eq!(engine.revealed_chars(), 0);
        engine.tick(Duration::from_millis(1), RATE);
        assert_eq!(engine.revealed_chars(), 1);
    }

    #[test]
    fn test_directives_take_no_time() {
        let mut engine = uniform("ab[happy][sfx:ding]cd");
        let events = engine.tick(RATE * 3, RATE);

        assert_eq!(
            events,
            vec![
                RevealEvent::Text("ab".into()),
                RevealEvent::Expression("happy".into()),
                RevealEvent::Cue("ding".into()),
                RevealEvent::Text("c".into()),
            ]
        );
    }

    #[test]
    fn test_skip_reveals_everything_in_order() {
        let mut engine = uniform("Hi[sad] there[sfx:ding][happy]!");
        engine.tick(RATE, RATE);

        let events = engine.skip();
        assert_eq!(
            events,
            vec![
                RevealEvent::Text("i".into()),
                RevealEvent::Expression("sad".into()),
                RevealEvent::Text(" there".into()),
                RevealEvent::Cue("ding".into()),
                RevealEvent::Expression("happy".into()),
                RevealEvent::Text("!".into()),
                RevealEvent::Completed,
            ]
        );
        assert_eq!(engine.revealed_chars(), engine.total_chars());
        assert_eq!(engine.visible_text(), "Hi there!");
        assert!(engine.tick(RATE, RATE).is_empty());
    }

    #[test]
    fn test_completion_signalled_once() {
        let mut engine = uniform("ok");
        let first = engine.tick(RATE * 10, RATE);
        assert_eq!(first.last(), Some(&RevealEvent::Completed));
        assert!(engine.is_complete());

        assert!(engine.tick(RATE * 10, RATE).is_empty());
        assert!(engine.skip().is_empty());
    }

    #[test]
    fn test_pause_keeps_progress() {
        let mut engine = uniform("0123456789");
        engine.tick(RATE * 5, RATE);
        assert_eq!(engine.revealed_chars(), 5);

        engine.pause();
        assert!(engine.tick(Duration::from_secs(10), RATE).is_empty());
        assert_eq!(engine.revealed_chars(), 5);

        engine.resume();
        engine.tick(RATE, RATE);
        assert_eq!(engine.revealed_chars(), 6);
        assert_eq!(engine.visible_text(), "012345");
    }

    #[test]
    fn test_waits_for_stream_then_completes_after_close() {
        let mut engine = RevealEngine::new(RATE, PacingProfile::none());
        engine.extend(parse("Hi"));
        let events = engine.tick(RATE * 10, RATE);
        assert_eq!(texts(&events), "Hi");
        assert!(!engine.is_complete());

        // Idle time while starved is not banked
        engine.tick(Duration::from_secs(5), RATE);
        engine.extend(parse(" there"));
        let events = engine.tick(RATE, RATE);
        assert_eq!(texts(&events), " ");

        engine.close();
        let events = engine.tick(RATE * 10, RATE);
        assert_eq!(texts(&events), "there");
        assert_eq!(events.last(), Some(&RevealEvent::Completed));
    }

    #[test]
    fn test_extend_after_finished_run_is_not_lost() {
        let mut engine = RevealEngine::new(RATE, PacingProfile::none());
        engine.extend(parse("ab"));
        engine.tick(RATE * 2, RATE);
        // Run is done; new text must land after the cursor
        engine.tick(Duration::ZERO, RATE);
        engine.extend(parse("cd"));
        engine.close();
        engine.tick(RATE * 2, RATE);
        assert_eq!(engine.visible_text(), "abcd");
        assert!(engine.is_complete());
    }

    #[test]
    fn test_skip_while_streaming_keeps_up_with_later_chunks() {
        let mut engine = RevealEngine::new(RATE, PacingProfile::none());
        engine.extend(parse("Hello"));
        engine.skip();
        assert_eq!(engine.visible_text(), "Hello");

        engine.extend(parse(" world"));
        engine.close();
        let events = engine.tick(Duration::ZERO, RATE);
        assert_eq!(texts(&events), " world");
        assert_eq!(events.last(), Some(&RevealEvent::Completed));
    }

    #[test]
    fn test_punctuation_hold() {
        let pacing = PacingProfile::default();
        let mut engine = RevealEngine::with_segments(parse("a, b"), RATE, pacing);

        // "a," costs two characters, then the comma holds
        engine.tick(RATE * 2 + pacing.comma - Duration::from_millis(1), RATE);
        assert_eq!(engine.visible_text(), "a,");

        engine.tick(Duration::from_millis(1) + RATE, RATE);
        assert_eq!(engine.visible_text(), "a, ");
    }

    #[test]
    fn test_no_hold_at_end_of_streaming_run() {
        let pacing = PacingProfile::default();
        let mut engine = RevealEngine::new(RATE, pacing);
        engine.extend(parse("3."));

        engine.tick(RATE * 2, RATE);
        assert_eq!(engine.visible_text(), "3.");

        // Without a period hold the next character follows at the plain rate
        engine.extend(parse("5"));
        engine.tick(RATE, RATE);
        assert_eq!(engine.visible_text(), "3.5");
    }

    #[test]
    fn test_rate_is_refreshed_each_tick() {
        let mut engine = uniform("0123456789");
        engine.tick(Duration::from_millis(100), Duration::from_millis(50));
        assert_eq!(engine.revealed_chars(), 2);
        engine.tick(Duration::from_millis(100), Duration::from_millis(10));
        assert_eq!(engine.revealed_chars(), 10);
    }
}
