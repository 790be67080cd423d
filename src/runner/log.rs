//! Bounded in-memory event log for real-time streaming to the dashboard.
//!
//! A fixed-capacity ring buffer behind a mutex. Emissions also go to the
//! `tracing` side channel, which never blocks or fails the log write.
//! Readers get a consistent snapshot; `query(since)` is strictly
//! greater-than, so pollers can resume from the last timestamp they saw.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::types::{LogEntry, LogLevel, LOG_CAPACITY};

pub struct EventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest once at capacity.
    pub fn emit(&self, level: LogLevel, msg: impl Into<String>) {
        let msg = msg.into();
        let entry = LogEntry {
            ts: Utc::now(),
            level,
            msg: msg.clone(),
        };

        {
            let mut entries = self.entries.lock().unwrap();
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }

        match level {
            LogLevel::Info => info!(target: "vaultbot::bot", "{msg}"),
            LogLevel::Warning => warn!(target: "vaultbot::bot", "{msg}"),
            LogLevel::Error => error!(target: "vaultbot::bot", "{msg}"),
        }
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.emit(LogLevel::Info, msg);
    }

    pub fn warning(&self, msg: impl Into<String>) {
        self.emit(LogLevel::Warning, msg);
    }

    pub fn error(&self, msg: impl Into<String>) {
        self.emit(LogLevel::Error, msg);
    }

    /// Entries in insertion order. With `since`, only entries whose
    /// timestamp is strictly greater.
    pub fn query(&self, since: Option<DateTime<Utc>>) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap();
        match since {
            Some(since) => entries.iter().filter(|e| e.ts > since).cloned().collect(),
            None => entries.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
