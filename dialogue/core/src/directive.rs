//! Expression & Cue Directives
//!
//! The character's replies carry inline markers that request non-text effects:
//!
//! ```text
//! Oh![face:happy] You found it! [sfx:chime] [thinking]Now what...
//! ```
//!
//! # Directive Format
//!
//! - `[face:<id>]` changes the expression sprite
//! - `[sfx:<id>]` plays a sound cue
//! - `[<id>]` is shorthand for `[face:<id>]`
//!
//! Ids are one or more ASCII letters, digits or underscores. Anything else in
//! brackets (`[see above]`, `[]`, an unclosed `[`) is ordinary text and is
//! kept verbatim.
//!
//! Parsing never consults the asset catalog. A well-formed directive naming
//! an unknown id is still emitted here and dropped later by
//! [`AssetCatalog::resolve`](crate::catalog::AssetCatalog::resolve).

use serde::{Deserialize, Serialize};

use crate::catalog::{CueId, ExpressionId};

/// Longest bracketed tail held back while waiting for its closing `]`
const MAX_PENDING_MARKER: usize = 64;

/// One unit of a parsed turn, in playback order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    /// Literal text to reveal
    TextRun(String),
    /// Switch the expression sprite
    ExpressionChange(ExpressionId),
    /// Play a sound cue
    AudioCue(CueId),
}

impl Segment {
    /// Whether this segment is applied instantly rather than revealed
    #[must_use]
    pub fn is_directive(&self) -> bool {
        !matches!(self, Self::TextRun(_))
    }

    /// Number of characters this segment reveals
    #[must_use]
    pub fn char_len(&self) -> usize {
        match self {
            Self::TextRun(text) => text.chars().count(),
            _ => 0,
        }
    }
}

/// Concatenate the visible text of a segment sequence
#[must_use]
pub fn visible_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::TextRun(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Parse raw text into segments
///
/// Total: every input produces a sequence, and text without directives comes
/// back as exactly one `TextRun` equal to the input.
#[must_use]
pub fn parse(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find('[') {
        text.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        if let Some((directive, consumed)) = parse_marker(after) {
            if !text.is_empty() {
                segments.push(Segment::TextRun(std::mem::take(&mut text)));
            }
            segments.push(directive);
            rest = &after[consumed..];
        } else {
            // Not a directive, restore the bracket
            text.push('[');
            rest = after;
        }
    }

    text.push_str(rest);
    if !text.is_empty() || segments.is_empty() {
        segments.push(Segment::TextRun(text));
    }

    segments
}

/// Try to read a directive body following an opening `[`
///
/// Returns the directive and the number of bytes consumed including `]`.
fn parse_marker(after_open: &str) -> Option<(Segment, usize)> {
    let close = after_open.find(']')?;
    let body = &after_open[..close];

    let segment = if let Some(id) = body.strip_prefix("face:") {
        Segment::ExpressionChange(ExpressionId::new(valid_id(id)?))
    } else if let Some(id) = body.strip_prefix("sfx:") {
        Segment::AudioCue(CueId::new(valid_id(id)?))
    } else {
        Segment::ExpressionChange(ExpressionId::new(valid_id(body)?))
    };

    Some((segment, close + 1))
}

fn valid_id(id: &str) -> Option<&str> {
    let ok = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    ok.then_some(id)
}

/// Collapse whitespace runs to single spaces and trim the ends
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Incremental parser for streamed replies
///
/// Chunk boundaries are arbitrary: a directive may arrive as `"[hap"` then
/// `"py]"`. The accumulator holds back an unterminated marker until it is
/// closed (or proves not to be a marker), and merges adjacent text so the
/// turn's segment list is the same as parsing the whole reply at once.
#[derive(Clone, Debug, Default)]
pub struct SegmentAccumulator {
    /// Everything received so far
    raw: String,
    /// Tail not yet parsed
    pending: String,
    /// Parsed segments with adjacent text merged
    segments: Vec<Segment>,
}

impl SegmentAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the segments it completed
    pub fn push(&mut self, chunk: &str) -> Vec<Segment> {
        self.raw.push_str(chunk);
        self.pending.push_str(chunk);

        let split = held_back_from(&self.pending).unwrap_or(self.pending.len());
        if split == 0 {
            return Vec::new();
        }

        let ready: String = self.pending.drain(..split).collect();
        self.absorb(parse(&ready))
    }

    /// Flush whatever is still held back; it can no longer become a directive
    pub fn finish(&mut self) -> Vec<Segment> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.pending);
        self.absorb(parse(&rest))
    }

    /// Raw text received so far, directives included
    #[must_use]
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    /// Segments parsed so far
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether no chunk has been received
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    fn absorb(&mut self, parsed: Vec<Segment>) -> Vec<Segment> {
        for segment in &parsed {
            match (self.segments.last_mut(), segment) {
                (Some(Segment::TextRun(last)), Segment::TextRun(text)) => last.push_str(text),
                _ => self.segments.push(segment.clone()),
            }
        }
        parsed
    }
}

/// Byte offset of an unterminated marker that may still become a directive
fn held_back_from(pending: &str) -> Option<usize> {
    let open = pending.rfind('[')?;
    let tail = &pending[open + 1..];

    let could_be_marker = tail.len() < MAX_PENDING_MARKER
        && tail
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');

    could_be_marker.then_some(open)
}
