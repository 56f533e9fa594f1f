//! History Store
//!
//! Durable, append-only log of finished turns. `append` is the only mutator
//! and it is synchronous: when it returns `Ok` the record has been flushed to
//! the OS, when it returns `Err` nothing about the in-memory conversation
//! changes.
//!
//! # Transcript Format
//!
//! One JSON object per line:
//!
//! ```text
//! {"role":"user","text":"Hello","timestamp":1718000000000}
//! {"role":"character","text":"Hi there[happy]!","timestamp":1718000001234}
//! ```
//!
//! The same format is used by [`export`], so an exported transcript can be
//! opened with [`FileHistoryStore`] and loaded back.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, Role, Turn};
use crate::error::PersistenceError;

/// Default history file name
pub const DEFAULT_HISTORY_FILE: &str = "history.dat";

/// One line of a transcript
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// Speaker
    pub role: Role,
    /// Raw text, directives included
    pub text: String,
    /// Unix timestamp ms
    pub timestamp: u64,
}

impl From<&Turn> for TranscriptRecord {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            text: turn.raw_text.clone(),
            timestamp: turn.timestamp,
        }
    }
}

impl From<TranscriptRecord> for Turn {
    fn from(record: TranscriptRecord) -> Self {
        Turn::restore(record.role, record.text, record.timestamp)
    }
}

/// Persistent turn log
pub trait HistoryStore: Send + Sync {
    /// Durably record a finished turn
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the record could not be written.
    fn append(&self, turn: &Turn) -> Result<(), PersistenceError>;

    /// Reconstruct the conversation recorded so far
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the log exists but cannot be read.
    fn load(&self) -> Result<Conversation, PersistenceError>;
}

// ============================================================================
// File Store
// ============================================================================

/// JSON-lines history file
#[derive(Clone, Debug)]
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    /// Store backed by `path`; the file is created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl HistoryStore for FileHistoryStore {
    fn append(&self, turn: &Turn) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(&TranscriptRecord::from(turn))?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_error(e))?;
        match last_line(&mut file).map_err(|e| self.write_error(e))? {
            LastLine::Terminated => {}
            LastLine::Unterminated => line.insert(0, '\n'),
            LastLine::Torn { keep } => {
                tracing::warn!(
                    path = %self.path.display(),
                    keep,
                    "Truncating partial history record"
                );
                file.set_len(keep).map_err(|e| self.write_error(e))?;
            }
        }
        file.write_all(line.as_bytes())
            .map_err(|e| self.write_error(e))?;
        file.sync_data().map_err(|e| self.write_error(e))?;

        tracing::debug!(
            path = %self.path.display(),
            turn_id = %turn.id,
            "Turn persisted"
        );
        Ok(())
    }

    fn load(&self) -> Result<Conversation, PersistenceError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No history file, starting fresh");
            return Ok(Conversation::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| PersistenceError::Read {
            path: self.path.clone(),
            source: e,
        })?;

        let turns = parse_records(&content, &self.path)?;
        tracing::info!(
            path = %self.path.display(),
            turns = turns.len(),
            "Loaded conversation history"
        );
        Ok(Conversation::from(turns))
    }
}

/// State of the final line before an append
enum LastLine {
    /// Empty file, or the last record ends with a newline
    Terminated,
    /// A complete record missing its newline
    Unterminated,
    /// A partial record; everything from `keep` on is dropped
    Torn { keep: u64 },
}

fn last_line(file: &mut fs::File) -> std::io::Result<LastLine> {
    if file.metadata()?.len() == 0 {
        return Ok(LastLine::Terminated);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(LastLine::Terminated);
    }

    file.seek(SeekFrom::Start(0))?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    let start = content
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);

    if serde_json::from_slice::<TranscriptRecord>(&content[start..]).is_ok() {
        Ok(LastLine::Unterminated)
    } else {
        Ok(LastLine::Torn { keep: start as u64 })
    }
}

fn parse_records(content: &str, path: &Path) -> Result<Vec<Turn>, PersistenceError> {
    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();
    let unterminated = !content.is_empty() && !content.ends_with('\n');

    let mut turns = Vec::with_capacity(lines.len());
    for (pos, (idx, line)) in lines.iter().enumerate() {
        match serde_json::from_str::<TranscriptRecord>(line) {
            Ok(record) => turns.push(Turn::from(record)),
            Err(source) if unterminated && pos + 1 == lines.len() => {
                tracing::warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %source,
                    "Dropping partial history record"
                );
            }
            Err(source) => {
                return Err(PersistenceError::Corrupt {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    source,
                })
            }
        }
    }
    Ok(turns)
}

/// Write a transcript of every spoken turn
///
/// Fallback lines are left out, matching what the history store records.
///
/// # Errors
///
/// Returns [`PersistenceError`] if encoding or writing fails.
pub fn export<W: Write>(conversation: &Conversation, mut writer: W) -> Result<(), PersistenceError> {
    let unavailable = |e: std::io::Error| PersistenceError::Unavailable(e.to_string());

    for turn in conversation.turns().iter().filter(|t| !t.fallback) {
        serde_json::to_writer(&mut writer, &TranscriptRecord::from(turn))?;
        writer.write_all(b"\n").map_err(unavailable)?;
    }
    writer.flush().map_err(unavailable)
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// History kept in memory; clones share the same log
///
/// Used when persistence is disabled and in tests, where it can be switched
/// into a failing mode.
#[derive(Clone, Debug, Default)]
pub struct MemoryHistoryStore {
    records: Arc<Mutex<Vec<TranscriptRecord>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryHistoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of recorded entries
    #[must_use]
    pub fn records(&self) -> Vec<TranscriptRecord> {
        self.records.lock().clone()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, turn: &Turn) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable(
                "memory store set to fail".to_string(),
            ));
        }
        self.records.lock().push(TranscriptRecord::from(turn));
        Ok(())
    }

    fn load(&self) -> Result<Conversation, PersistenceError> {
        let turns: Vec<Turn> = self.records.lock().iter().cloned().map(Turn::from).collect();
        Ok(Conversation::from(turns))
    }
}
