//! In-memory Raft log.
//!
//! Entries are 0-indexed by their position; an entry's identity is the
//! `(index, term)` pair. The empty log reports `last_index() == -1` and
//! `last_term() == -1`, and `prev_log_index == -1` always passes the
//! consistency check.

use crate::kv::Command;
use crate::types::{LogIndex, Term, NONE};
use serde::{Deserialize, Serialize};

/// A single entry in the Raft log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term in which the entry was created by a leader.
    pub term: Term,
    /// The command payload; opaque to the consensus core.
    pub info: Command,
}

impl LogEntry {
    pub fn new(term: Term, info: Command) -> Self {
        Self { term, info }
    }
}

/// The Raft log, an ordered sequence of entries.
#[derive(Debug, Default)]
pub struct RaftLog {
    entries: Vec<LogEntry>,
}

impl RaftLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Rebuild the log from reloaded persistent state.
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    /// Index of the last entry, or `-1` when empty.
    pub fn last_index(&self) -> LogIndex {
        self.entries.len() as LogIndex - 1
    }

    /// Term of the last entry, or `-1` when empty.
    pub fn last_term(&self) -> Term {
        self.entries.last().map(|e| e.term).unwrap_or(NONE)
    }

    /// Term of the entry at `index`; `-1` for `index == -1` or out of range.
    pub fn term_at(&self, index: LogIndex) -> Term {
        if index < 0 {
            return NONE;
        }
        self.entries.get(index as usize).map(|e| e.term).unwrap_or(NONE)
    }

    /// Get an entry by index.
    pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
        if index < 0 {
            return None;
        }
        self.entries.get(index as usize)
    }

    /// Append a single entry at the tail.
    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Entries from `start_index` through the tail, cloned for shipping.
    pub fn entries_from(&self, start_index: LogIndex) -> Vec<LogEntry> {
        if start_index < 0 {
            return self.entries.clone();
        }
        if start_index > self.last_index() {
            return Vec::new();
        }
        self.entries[start_index as usize..].to_vec()
    }

    /// Drop the entry at `index` and everything after it.
    ///
    /// Used when follower reconciliation finds a conflicting suffix.
    pub fn truncate_from(&mut self, index: LogIndex) {
        if index < 0 {
            self.entries.clear();
        } else {
            self.entries.truncate(index as usize);
        }
    }

    /// Check the append consistency point: does this log hold an entry of
    /// term `prev_log_term` at `prev_log_index`? Index `-1` always matches.
    pub fn matches(&self, prev_log_index: LogIndex, prev_log_term: Term) -> bool {
        if prev_log_index == NONE {
            return true;
        }
        if prev_log_index > self.last_index() {
            return false;
        }
        self.term_at(prev_log_index) == prev_log_term
    }

    /// Is a candidate's log at least as up-to-date as ours? Used for voting.
    pub fn is_up_to_date(&self, last_log_index: LogIndex, last_log_term: Term) -> bool {
        if last_log_term != self.last_term() {
            last_log_term > self.last_term()
        } else {
            last_log_index >= self.last_index()
        }
    }

    /// All entries, for persistence.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
