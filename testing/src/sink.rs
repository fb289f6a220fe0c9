//! Recording notification sink.

use crate::log::{CallLog, LogEntry};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use switchyard_core::{
    ChangeDetail, ChangeEventKind, EnvironmentEvent, NotificationError, NotificationSink,
};

#[derive(Debug, Default)]
struct SinkState {
    notifications: Vec<(ChangeEventKind, ChangeDetail)>,
    replayed: Vec<EnvironmentEvent>,
    failing: Vec<ChangeEventKind>,
    failing_replays: bool,
    cancellations: usize,
}

/// Sink that records every notification and replay.
///
/// Can be told to fail specific notification kinds, fail replays, or cancel
/// upcoming navigations. Failing notifications are still recorded.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
    log: Option<CallLog>,
}

impl RecordingSink {
    /// Create a sink with its own records only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that also appends to a shared [`CallLog`].
    #[must_use]
    pub fn with_log(log: CallLog) -> Self {
        Self {
            state: Arc::default(),
            log: Some(log),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Kinds emitted so far, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ChangeEventKind> {
        self.lock().notifications.iter().map(|(kind, _)| *kind).collect()
    }

    /// Every detail emitted with `kind`, in order.
    #[must_use]
    pub fn details(&self, kind: ChangeEventKind) -> Vec<ChangeDetail> {
        self.lock()
            .notifications
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, detail)| detail.clone())
            .collect()
    }

    /// The most recent detail emitted with `kind`.
    #[must_use]
    pub fn last_detail(&self, kind: ChangeEventKind) -> Option<ChangeDetail> {
        self.details(kind).pop()
    }

    /// Events replayed so far, in order.
    #[must_use]
    pub fn replayed(&self) -> Vec<EnvironmentEvent> {
        self.lock().replayed.clone()
    }

    /// Make every emission of `kind` report a subscriber failure.
    pub fn fail_on(&self, kind: ChangeEventKind) {
        self.lock().failing.push(kind);
    }

    /// Make every replay report a listener failure.
    pub fn fail_replays(&self) {
        self.lock().failing_replays = true;
    }

    /// Cancel the next `count` navigations.
    pub fn cancel_next_navigations(&self, count: usize) {
        self.lock().cancellations = count;
    }

    /// Forget recorded notifications and replays.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.notifications.clear();
        state.replayed.clear();
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, kind: ChangeEventKind, detail: &ChangeDetail) -> Result<(), NotificationError> {
        let mut state = self.lock();
        state.notifications.push((kind, detail.clone()));
        if let Some(log) = &self.log {
            log.record(LogEntry::Notified(kind));
        }

        if state.failing.contains(&kind) {
            return Err(NotificationError::SubscriberFailed {
                kind,
                reason: "scripted subscriber failure".to_string(),
            });
        }
        Ok(())
    }

    fn replay_listeners(&self, event: &EnvironmentEvent) -> Result<(), NotificationError> {
        let mut state = self.lock();
        state.replayed.push(event.clone());
        if let Some(log) = &self.log {
            log.record(LogEntry::Replayed(event.kind.clone()));
        }

        if state.failing_replays {
            return Err(NotificationError::ListenerFailed {
                event: event.kind.clone(),
                reason: "scripted listener failure".to_string(),
            });
        }
        Ok(())
    }

    fn navigation_cancel_requested(&self, _detail: &ChangeDetail) -> BoxFuture<'_, bool> {
        let cancel = {
            let mut state = self.lock();
            let cancel = state.cancellations > 0;
            state.cancellations = state.cancellations.saturating_sub(1);
            cancel
        };
        Box::pin(futures::future::ready(cancel))
    }
}
