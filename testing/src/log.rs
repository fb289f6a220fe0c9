//! Shared, ordered record of everything test doubles observed.
//!
//! Scripted applications log when each phase starts and finishes; a
//! [`RecordingSink`](crate::RecordingSink) built with the same log records
//! notifications and replays in between, so tests can assert on the global
//! interleaving of lifecycle work and notifications.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use switchyard_core::{AppName, ChangeEventKind, Phase};

/// One observed occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A lifecycle hook started
    Started {
        /// Application
        app: AppName,
        /// Phase
        phase: Phase,
    },
    /// A lifecycle hook settled
    Finished {
        /// Application
        app: AppName,
        /// Phase
        phase: Phase,
        /// Whether the hook succeeded
        ok: bool,
    },
    /// A notification was emitted
    Notified(ChangeEventKind),
    /// Deferred listeners were replayed for an event of this kind
    Replayed(String),
}

/// Cheaply cloneable, append-only call log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CallLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry.
    pub fn record(&self, entry: LogEntry) {
        self.lock().push(entry);
    }

    /// Snapshot of every entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Index of the first entry matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&LogEntry) -> bool) -> Option<usize> {
        self.lock().iter().position(predicate)
    }

    /// Index of the first time `app` started `phase`.
    #[must_use]
    pub fn started(&self, app: &str, phase: Phase) -> Option<usize> {
        self.position(|entry| matches!(entry, LogEntry::Started { app: a, phase: p } if a == app && *p == phase))
    }

    /// Index of the first time `app` finished `phase`.
    #[must_use]
    pub fn finished(&self, app: &str, phase: Phase) -> Option<usize> {
        self.position(|entry| matches!(entry, LogEntry::Finished { app: a, phase: p, .. } if a == app && *p == phase))
    }

    /// Index of the first emission of `kind`.
    #[must_use]
    pub fn notified(&self, kind: ChangeEventKind) -> Option<usize> {
        self.position(|entry| entry == &LogEntry::Notified(kind))
    }

    /// Phases `app` started, in order.
    #[must_use]
    pub fn phases_of(&self, app: &str) -> Vec<Phase> {
        self.lock()
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::Started { app: a, phase } if a == app => Some(*phase),
                _ => None,
            })
            .collect()
    }

    /// How many times any app started `phase`.
    #[must_use]
    pub fn count(&self, phase: Phase) -> usize {
        self.lock()
            .iter()
            .filter(|entry| matches!(entry, LogEntry::Started { phase: p, .. } if *p == phase))
            .count()
    }

    /// Notifications emitted, in order.
    #[must_use]
    pub fn notifications(&self) -> Vec<ChangeEventKind> {
        self.lock()
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::Notified(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }
}
