/// Operation history ("timeline") for file moves and configuration changes.
///
/// The ledger is an ordered, append-only list of timeline entries persisted
/// as one JSON document. Entries are never edited after they are written;
/// the only other mutation is retention pruning, which drops the oldest
/// entries first.
use crate::config::{HistorySettings, write_atomic};
use chrono::{DateTime, Local, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while reading or writing the history.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to access history file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("history file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize history: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("timeline {0} not found")]
    NotFound(TimelineId),
}

/// Identifier of a timeline entry, displayed as `T<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimelineId(u64);

impl TimelineId {
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    pub fn number(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Returned when a string is not a valid timeline id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timeline id '{0}': expected T<number>, e.g. T12")]
pub struct ParseTimelineIdError(String);

impl FromStr for TimelineId {
    type Err = ParseTimelineIdError;

    /// Accepts `T12`, `t12` and `12`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('T')
            .or_else(|| trimmed.strip_prefix('t'))
            .unwrap_or(trimmed);
        match digits.parse::<u64>() {
            Ok(n) if n > 0 => Ok(Self(n)),
            _ => Err(ParseTimelineIdError(s.to_string())),
        }
    }
}

impl Serialize for TimelineId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimelineId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What kind of operation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Files moved by built-in category.
    OrganizeFiles,
    /// Files moved by a custom command.
    CustomOrganize,
    /// A configuration mutation.
    ConfigChange,
    /// A rollback of earlier entries.
    Rollback,
}

impl OperationKind {
    /// Only move batches can be rolled back.
    pub fn is_move_batch(&self) -> bool {
        matches!(self, Self::OrganizeFiles | Self::CustomOrganize)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrganizeFiles => "organize_files",
            Self::CustomOrganize => "custom_organize",
            Self::ConfigChange => "config_change",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file that was moved from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMove {
    pub from: PathBuf,
    pub to: PathBuf,
}

impl FileMove {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// An immutable history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: TimelineId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub description: String,
    pub reversible: bool,
    #[serde(default)]
    pub moves: Vec<FileMove>,
    /// For rollback entries: the entries this rollback reversed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rolled_back: Vec<TimelineId>,
}

impl TimelineEntry {
    /// Timestamp in local time, e.g. `2025-11-09 14:30:52`.
    pub fn formatted_time(&self) -> String {
        self.timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// The content of an entry before the ledger assigns its id and timestamp.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    kind: OperationKind,
    description: String,
    moves: Vec<FileMove>,
    rolled_back: Vec<TimelineId>,
}

impl EntryDraft {
    /// A reversible batch of file moves.
    pub fn file_moves(kind: OperationKind, description: impl Into<String>, moves: Vec<FileMove>) -> Self {
        Self {
            kind,
            description: description.into(),
            moves,
            rolled_back: Vec::new(),
        }
    }

    /// A non-reversible configuration change.
    pub fn config_change(description: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::ConfigChange,
            description: description.into(),
            moves: Vec::new(),
            rolled_back: Vec::new(),
        }
    }

    /// A non-reversible record of a rollback and the moves it performed.
    pub fn rollback(
        description: impl Into<String>,
        rolled_back: Vec<TimelineId>,
        moves: Vec<FileMove>,
    ) -> Self {
        Self {
            kind: OperationKind::Rollback,
            description: description.into(),
            moves,
            rolled_back,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    next_id: u64,
    entries: Vec<TimelineEntry>,
}

/// Accepts both the current document and a bare list of entries.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredLedger {
    Document(LedgerDocument),
    Entries(Vec<TimelineEntry>),
}

/// The ordered, append-only operation history.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    settings: HistorySettings,
    next_id: u64,
    entries: Vec<TimelineEntry>,
}

impl Ledger {
    /// Loads the history at `path` and applies retention pruning in memory.
    ///
    /// A missing file is an empty history. Pruned entries are dropped from
    /// disk on the next append.
    pub fn open(path: &Path, settings: &HistorySettings) -> Result<Self, LedgerError> {
        let document = match fs::read_to_string(path) {
            Ok(content) => {
                let stored: StoredLedger =
                    serde_json::from_str(&content).map_err(|source| LedgerError::Corrupt {
                        path: path.to_path_buf(),
                        source,
                    })?;
                match stored {
                    StoredLedger::Document(document) => document,
                    StoredLedger::Entries(entries) => LedgerDocument {
                        next_id: 0,
                        entries,
                    },
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => LedgerDocument::default(),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut entries = document.entries;
        entries.sort_by_key(|entry| entry.id);
        let max_id = entries.last().map_or(0, |entry| entry.id.number());

        let mut ledger = Self {
            path: path.to_path_buf(),
            settings: settings.clone(),
            next_id: document.next_id.max(max_id + 1),
            entries,
        };

        let pruned = ledger.prune(Utc::now());
        if pruned > 0 {
            tracing::debug!(pruned, "dropped expired history entries");
        }
        Ok(ledger)
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Appends an entry with the next sequential id and persists the ledger.
    ///
    /// Returns `None` without touching disk when history is disabled.
    pub fn append(&mut self, draft: EntryDraft) -> Result<Option<TimelineId>, LedgerError> {
        if !self.settings.enabled {
            tracing::debug!(kind = %draft.kind, "history disabled, entry not recorded");
            return Ok(None);
        }

        let id = TimelineId::new(self.next_id);
        self.next_id += 1;

        // Timestamps stay strictly increasing even when the clock does not.
        let now = Utc::now();
        let timestamp = match self.entries.last() {
            Some(last) if last.timestamp >= now => last.timestamp + TimeDelta::microseconds(1),
            _ => now,
        };

        self.entries.push(TimelineEntry {
            id,
            timestamp,
            kind: draft.kind,
            description: draft.description,
            reversible: draft.kind.is_move_batch(),
            moves: draft.moves,
            rolled_back: draft.rolled_back,
        });
        self.prune(now);
        self.save()?;

        tracing::info!(%id, kind = %draft.kind, "recorded timeline entry");
        Ok(Some(id))
    }

    /// The most recent `limit` entries, newest first.
    pub fn list(&self, limit: usize) -> Vec<&TimelineEntry> {
        self.entries.iter().rev().take(limit).collect()
    }

    pub fn get(&self, id: TimelineId) -> Result<&TimelineEntry, LedgerError> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .ok_or(LedgerError::NotFound(id))
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids reversed by any recorded rollback.
    pub fn rolled_back_ids(&self) -> HashSet<TimelineId> {
        self.entries
            .iter()
            .filter(|entry| entry.kind == OperationKind::Rollback)
            .flat_map(|entry| entry.rolled_back.iter().copied())
            .collect()
    }

    /// Drops entries older than the cleanup window, then the oldest entries
    /// beyond `max_entries`. Returns how many were dropped.
    fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();

        if self.settings.auto_cleanup_days > 0 {
            let cutoff = now - TimeDelta::days(i64::from(self.settings.auto_cleanup_days));
            let expired = self
                .entries
                .iter()
                .take_while(|entry| entry.timestamp < cutoff)
                .count();
            self.entries.drain(..expired);
        }

        let max = self.settings.max_entries;
        if max > 0 && self.entries.len() > max {
            let excess = self.entries.len() - max;
            self.entries.drain(..excess);
        }

        before - self.entries.len()
    }

    fn save(&self) -> Result<(), LedgerError> {
        let document = LedgerDocument {
            next_id: self.next_id,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&document).map_err(LedgerError::Serialize)?;
        write_atomic(&self.path, json.as_bytes()).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
