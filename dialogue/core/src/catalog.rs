//! Asset Catalog
//!
//! The set of expression and sound-cue ids the presentation layer can
//! actually render. The catalog is supplied by whoever discovered the assets;
//! the engine only consults it when resolving parsed segments, so the parser
//! stays catalog-agnostic.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::directive::Segment;

/// Expression shown when a turn starts and for fallback lines
pub const DEFAULT_EXPRESSION: &str = "normal";

/// Faces every character sheet ships with
pub const BUILTIN_EXPRESSIONS: &[&str] = &[
    "normal", "happy", "sad", "alert", "thinking", "scared", "confused", "pancake",
];

/// Identifier of an expression sprite
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionId(pub String);

impl ExpressionId {
    /// Create an id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The default expression id
    #[must_use]
    pub fn default_expression() -> Self {
        Self::new(DEFAULT_EXPRESSION)
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExpressionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of a sound cue
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CueId(pub String);

impl CueId {
    /// Create an id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CueId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Known expression and cue ids
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCatalog {
    expressions: BTreeSet<ExpressionId>,
    cues: BTreeSet<CueId>,
}

impl AssetCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog containing the builtin faces and no cues
    #[must_use]
    pub fn builtin() -> Self {
        Self::new().with_expressions(BUILTIN_EXPRESSIONS.iter().copied())
    }

    /// Add expression ids
    #[must_use]
    pub fn with_expressions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expressions
            .extend(ids.into_iter().map(ExpressionId::new));
        self
    }

    /// Add cue ids
    #[must_use]
    pub fn with_cues<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cues.extend(ids.into_iter().map(CueId::new));
        self
    }

    /// Known expression ids in sorted order
    pub fn expression_ids(&self) -> impl Iterator<Item = &str> {
        self.expressions.iter().map(ExpressionId::as_str)
    }

    /// Known cue ids in sorted order
    pub fn cue_ids(&self) -> impl Iterator<Item = &str> {
        self.cues.iter().map(CueId::as_str)
    }

    /// Whether the expression can be rendered
    #[must_use]
    pub fn has_expression(&self, id: &ExpressionId) -> bool {
        self.expressions.contains(id)
    }

    /// Whether the cue can be played
    #[must_use]
    pub fn has_cue(&self, id: &CueId) -> bool {
        self.cues.contains(id)
    }

    /// Resolve a parsed segment against the catalog
    ///
    /// Text always survives. Directives naming an unknown id are dropped so
    /// control syntax never reaches the screen.
    #[must_use]
    pub fn resolve(&self, segment: Segment) -> Option<Segment> {
        match segment {
            Segment::ExpressionChange(ref id) if !self.has_expression(id) => {
                tracing::debug!(expression = %id, "Dropping unknown expression directive");
                None
            }
            Segment::AudioCue(ref id) if !self.has_cue(id) => {
                tracing::debug!(cue = %id, "Dropping unknown cue directive");
                None
            }
            other => Some(other),
        }
    }

    /// Resolve a whole segment sequence, preserving order
    #[must_use]
    pub fn resolve_all(&self, segments: Vec<Segment>) -> Vec<Segment> {
        segments
            .into_iter()
            .filter_map(|segment| self.resolve(segment))
            .collect()
    }
}
