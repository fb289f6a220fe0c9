//! Reentrancy guard and request queue.
//!
//! At most one full pass drives lifecycle calls at any instant. Requests that
//! arrive while a pass is in flight are parked here and handed, as one batch,
//! to the next pass when the current one finishes.

use crate::error::RerouteError;
use std::sync::{Mutex, MutexGuard, PoisonError};
use switchyard_core::{AppName, EnvironmentEvent};
use tokio::sync::oneshot;

/// Names of the applications mounted when a pass settled.
pub type MountedApps = Vec<AppName>;

/// Outcome delivered to every party waiting on a pass.
pub type RerouteResult = Result<MountedApps, RerouteError>;

/// A reroute request waiting for a pass to settle it.
///
/// Settled exactly once: [`resolve`](Self::resolve) and
/// [`reject`](Self::reject) consume the request.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    responder: oneshot::Sender<RerouteResult>,
    event: Option<EnvironmentEvent>,
}

impl PendingRequest {
    /// Create a request and the receiver its caller awaits.
    pub(crate) fn new(event: Option<EnvironmentEvent>) -> (Self, oneshot::Receiver<RerouteResult>) {
        let (responder, receiver) = oneshot::channel();
        (Self { responder, event }, receiver)
    }

    /// The environment event that produced this request, if any.
    pub(crate) const fn event(&self) -> Option<&EnvironmentEvent> {
        self.event.as_ref()
    }

    /// Settle the request with the mounted set.
    pub(crate) fn resolve(self, mounted: MountedApps) {
        // The caller may have stopped waiting
        let _ = self.responder.send(Ok(mounted));
    }

    /// Settle the request with an error.
    pub(crate) fn reject(self, error: RerouteError) {
        let _ = self.responder.send(Err(error));
    }
}

/// How an admitted batch must be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassMode {
    /// Runtime started: unload/unmount, then load/bootstrap/mount
    Full,
    /// Runtime not started: load only, nothing is activated
    LoadOnly,
}

/// Result of offering a batch of requests to the scheduler.
#[derive(Debug)]
pub(crate) enum Admission {
    /// A pass is in flight; the batch was appended to the queue
    Queued {
        /// Queue length after appending
        depth: usize,
    },
    /// The batch must be driven now
    Run {
        /// Requests the new pass settles
        waiters: Vec<PendingRequest>,
        /// Which pass to run
        mode: PassMode,
    },
}

#[derive(Debug, Default)]
struct SchedulerState {
    in_flight: bool,
    queue: Vec<PendingRequest>,
}

/// Owns the in-flight flag and the queue of requests that arrived mid-pass.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a batch of requests.
    ///
    /// While a pass is in flight the whole batch is queued in order. Otherwise
    /// the batch is returned to be driven; a full pass raises the in-flight
    /// flag, a load-only pass (runtime not started) does not.
    pub(crate) fn admit(&self, waiters: Vec<PendingRequest>, started: bool) -> Admission {
        let mut state = self.lock();
        if state.in_flight {
            state.queue.extend(waiters);
            return Admission::Queued {
                depth: state.queue.len(),
            };
        }

        let mode = if started {
            state.in_flight = true;
            PassMode::Full
        } else {
            PassMode::LoadOnly
        };
        Admission::Run { waiters, mode }
    }

    /// End the current pass and hand over to whatever queued behind it.
    ///
    /// With an empty queue the in-flight flag is cleared and nothing is
    /// returned. Otherwise the flag stays raised and the whole queue is
    /// returned; the caller must drive those requests as the next pass.
    /// Requests admitted afterwards start a fresh queue behind that pass.
    pub(crate) fn finish(&self) -> Vec<PendingRequest> {
        let mut state = self.lock();
        if state.queue.is_empty() {
            state.in_flight = false;
        }
        std::mem::take(&mut state.queue)
    }

    /// End a failed pass: clear the in-flight flag and take the queue so
    /// every queued request can be rejected.
    pub(crate) fn abort(&self) -> Vec<PendingRequest> {
        let mut state = self.lock();
        state.in_flight = false;
        std::mem::take(&mut state.queue)
    }

    /// Whether a full pass is in flight.
    pub(crate) fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Number of queued requests.
    pub(crate) fn queued(&self) -> usize {
        self.lock().queue.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn request(kind: &str) -> (PendingRequest, oneshot::Receiver<RerouteResult>) {
        PendingRequest::new(Some(EnvironmentEvent::new(kind)))
    }

    #[test]
    fn test_first_batch_runs_full_when_started() {
        let scheduler = Scheduler::default();
        let (req, _rx) = request("a");

        let admission = scheduler.admit(vec![req], true);
        assert!(matches!(admission, Admission::Run { mode: PassMode::Full, .. }));
        assert!(scheduler.is_in_flight());
    }

    #[test]
    fn test_load_only_does_not_raise_flag() {
        let scheduler = Scheduler::default();
        let (a, _ra) = request("a");
        let (b, _rb) = request("b");

        assert!(matches!(
            scheduler.admit(vec![a], false),
            Admission::Run { mode: PassMode::LoadOnly, .. }
        ));
        assert!(!scheduler.is_in_flight());
        assert!(matches!(
            scheduler.admit(vec![b], false),
            Admission::Run { mode: PassMode::LoadOnly, .. }
        ));
    }

    #[test]
    fn test_reentrant_batches_queue_in_order() {
        let scheduler = Scheduler::default();
        let (first, _r0) = request("first");
        let _ = scheduler.admit(vec![first], true);

        let (a, _ra) = request("a");
        let (b, _rb) = request("b");
        let (c, _rc) = request("c");
        assert!(matches!(scheduler.admit(vec![a], true), Admission::Queued { depth: 1 }));
        assert!(matches!(scheduler.admit(vec![b, c], true), Admission::Queued { depth: 3 }));

        let drained = scheduler.finish();
        let kinds: Vec<_> = drained
            .iter()
            .map(|r| r.event().map(|e| e.kind.clone()).unwrap_or_default())
            .collect();
        assert_eq!(kinds, vec!["a", "b", "c"]);
        assert!(scheduler.is_in_flight());
        assert_eq!(scheduler.queued(), 0);
    }

    #[test]
    fn test_finish_with_empty_queue_clears_flag() {
        let scheduler = Scheduler::default();
        let (first, _r0) = request("first");
        let _ = scheduler.admit(vec![first], true);

        assert!(scheduler.finish().is_empty());
        assert!(!scheduler.is_in_flight());

        let (next, _r1) = request("next");
        assert!(matches!(
            scheduler.admit(vec![next], true),
            Admission::Run { mode: PassMode::Full, .. }
        ));
    }

    #[test]
    fn test_late_request_queues_behind_drained_batch() {
        let scheduler = Scheduler::default();
        let (first, _r0) = request("first");
        let _ = scheduler.admit(vec![first], true);
        let (early, _r1) = request("queued-early");
        let _ = scheduler.admit(vec![early], true);

        let drained = scheduler.finish();
        assert_eq!(drained.len(), 1);

        let (late, _r2) = request("arrived-late");
        assert!(matches!(scheduler.admit(vec![late], true), Admission::Queued { depth: 1 }));

        let next = scheduler.finish();
        assert_eq!(next[0].event().map(|e| e.kind.as_str()), Some("arrived-late"));
        assert!(scheduler.is_in_flight());
        assert!(scheduler.finish().is_empty());
        assert!(!scheduler.is_in_flight());
    }

    #[test]
    fn test_abort_clears_flag_and_takes_queue() {
        let scheduler = Scheduler::default();
        let (first, _r0) = request("first");
        let _ = scheduler.admit(vec![first], true);
        let (a, _ra) = request("a");
        let _ = scheduler.admit(vec![a], true);

        assert_eq!(scheduler.abort().len(), 1);
        assert!(!scheduler.is_in_flight());
        assert_eq!(scheduler.queued(), 0);
    }

    #[tokio::test]
    async fn test_requests_settle_once() {
        let (ok, ok_rx) = PendingRequest::new(None);
        let (err, err_rx) = PendingRequest::new(None);

        ok.resolve(vec![AppName::new("nav")]);
        err.reject(RerouteError::Abandoned);

        assert_eq!(ok_rx.await.unwrap().unwrap(), vec![AppName::new("nav")]);
        assert_eq!(err_rx.await.unwrap().unwrap_err(), RerouteError::Abandoned);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_panic() {
        let (req, rx) = PendingRequest::new(None);
        drop(rx);
        req.resolve(Vec::new());
    }
}
