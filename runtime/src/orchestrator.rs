//! The reroute orchestrator.
//!
//! [`Orchestrator`] is the single entry point for environment changes. Every
//! call becomes a request; requests are either driven by a new pass right
//! away or, while a pass is in flight, queued and batched into the next one.
//! All waiters of a pass settle together with the same outcome.

use crate::error::RerouteError;
use crate::metrics::{NotificationMetrics, RerouteMetrics};
use crate::pass::Pass;
use crate::scheduler::{Admission, MountedApps, PassMode, PendingRequest, RerouteResult, Scheduler};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use switchyard_core::{
    AppName, EnvironmentEvent, LifecycleRunner, Location, Navigator, NotificationError,
    NotificationSink, Registry,
};
use tokio::sync::{broadcast, oneshot};

/// Capacity of the deferred-error broadcast channel.
const DEFERRED_ERROR_CAPACITY: usize = 64;

pub(crate) struct Inner {
    pub(crate) registry: Arc<dyn Registry>,
    pub(crate) runner: Arc<dyn LifecycleRunner>,
    pub(crate) sink: Arc<dyn NotificationSink>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) scheduler: Scheduler,
    started: AtomicBool,
    passes: AtomicU64,
    current_location: Mutex<Location>,
    deferred_errors: broadcast::Sender<NotificationError>,
}

/// Coordinates application lifecycles across environment changes.
///
/// Cheap to clone; clones drive the same runtime.
///
/// # Guarantees
///
/// - At most one full pass runs at a time. Requests arriving mid-pass are
///   batched into exactly one follow-up pass.
/// - Within a pass, every unmount/unload settles before any mount starts.
/// - Waiters always settle: with the mounted set, or with the pass's error.
///
/// # Example
///
/// ```ignore
/// let orchestrator = Orchestrator::new(registry.clone(), registry, sink, navigator);
/// orchestrator.start().await?;
///
/// navigator.navigate("/checkout");
/// let mounted = orchestrator
///     .on_environment_change(EnvironmentEvent::new("popstate"))
///     .await?;
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Create an orchestrator in the not-started state.
    ///
    /// # Arguments
    ///
    /// * `registry` - Owns statuses and classifies applications
    /// * `runner` - Performs lifecycle phases
    /// * `sink` - Receives lifecycle notifications and replays listeners
    /// * `navigator` - Provides and restores the current location
    #[must_use]
    pub fn new(
        registry: Arc<dyn Registry>,
        runner: Arc<dyn LifecycleRunner>,
        sink: Arc<dyn NotificationSink>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (deferred_errors, _) = broadcast::channel(DEFERRED_ERROR_CAPACITY);
        let current_location = navigator.current_location();
        Self {
            inner: Arc::new(Inner {
                registry,
                runner,
                sink,
                navigator,
                scheduler: Scheduler::default(),
                started: AtomicBool::new(false),
                passes: AtomicU64::new(0),
                current_location: Mutex::new(current_location),
                deferred_errors,
            }),
        }
    }

    /// Mark the runtime started and run the first full pass.
    ///
    /// Before `start`, requests only load applications. Calling `start` again
    /// is equivalent to [`trigger_change`](Self::trigger_change).
    ///
    /// # Errors
    ///
    /// Returns the first lifecycle error of the pass that settles this call.
    pub async fn start(&self) -> Result<MountedApps, RerouteError> {
        if !self.inner.started.swap(true, Ordering::SeqCst) {
            tracing::info!("Starting orchestrator");
        }
        self.trigger_change().await
    }

    /// Whether [`start`](Self::start) has been called.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Request a pass with no triggering event.
    ///
    /// # Errors
    ///
    /// Returns the first lifecycle error of the pass that settles this call.
    pub async fn trigger_change(&self) -> Result<MountedApps, RerouteError> {
        Self::settled(self.reroute(None)).await
    }

    /// Request a pass for an environment change.
    ///
    /// The event is handed back to the sink's deferred listeners once the
    /// pass's deactivation settled.
    ///
    /// # Errors
    ///
    /// Returns the first lifecycle error of the pass that settles this call.
    pub async fn on_environment_change(
        &self,
        event: EnvironmentEvent,
    ) -> Result<MountedApps, RerouteError> {
        Self::settled(self.reroute(Some(event))).await
    }

    /// Mark an application for unloading and request a pass.
    ///
    /// An idle application that is not desired is unloaded by that pass; a
    /// mounted one is unloaded right after its next unmount.
    ///
    /// # Errors
    ///
    /// Returns [`RerouteError::UnknownApplication`] if the registry does not
    /// know `name`, otherwise the outcome of the pass.
    pub async fn unload_application(&self, name: &AppName) -> Result<MountedApps, RerouteError> {
        if !self.inner.registry.mark_for_unload(name) {
            return Err(RerouteError::UnknownApplication(name.clone()));
        }
        tracing::debug!(app = %name, "Application marked for unload");
        self.trigger_change().await
    }

    /// Names of the currently mounted applications.
    #[must_use]
    pub fn mounted_apps(&self) -> MountedApps {
        self.inner.registry.mounted_names()
    }

    /// Whether a full pass is in flight.
    #[must_use]
    pub fn is_rerouting(&self) -> bool {
        self.inner.scheduler.is_in_flight()
    }

    /// Number of requests waiting for the next pass.
    #[must_use]
    pub fn queued_requests(&self) -> usize {
        self.inner.scheduler.queued()
    }

    /// Number of full passes started so far.
    #[must_use]
    pub fn pass_count(&self) -> u64 {
        self.inner.passes.load(Ordering::SeqCst)
    }

    /// The location the last full pass routed to.
    #[must_use]
    pub fn current_location(&self) -> Location {
        self.location().clone()
    }

    /// Subscribe to notification errors that were rescheduled outside a pass.
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<NotificationError> {
        self.inner.deferred_errors.subscribe()
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }

    pub(crate) fn location(&self) -> MutexGuard<'_, Location> {
        self.inner
            .current_location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the environment's current location as the pass target and
    /// return `(old, new)`.
    pub(crate) fn advance_location(&self) -> (Location, Location) {
        let new_location = self.inner.navigator.current_location();
        let old_location = std::mem::replace(&mut *self.location(), new_location.clone());
        (old_location, new_location)
    }

    /// Put the environment back at `location` after a canceled navigation.
    pub(crate) fn restore_location(&self, location: Location) {
        self.inner.navigator.restore_location(&location);
        *self.location() = location;
    }

    /// Create a request for a public entry point and dispatch it.
    fn reroute(&self, event: Option<EnvironmentEvent>) -> oneshot::Receiver<RerouteResult> {
        RerouteMetrics::record_request();
        let (caller, receiver) = PendingRequest::new(event.clone());
        self.dispatch(caller, event);
        receiver
    }

    /// Drive `request` with a new pass, or queue it behind the current one.
    fn dispatch(&self, request: PendingRequest, event: Option<EnvironmentEvent>) {
        match self.inner.scheduler.admit(vec![request], self.is_started()) {
            Admission::Queued { depth } => {
                tracing::debug!(depth, "Pass in flight, request queued");
                RerouteMetrics::record_queued(depth);
            }
            Admission::Run {
                waiters,
                mode: PassMode::Full,
            } => self.drive(waiters, event, false),
            Admission::Run {
                waiters,
                mode: PassMode::LoadOnly,
            } => {
                let groups = self.inner.registry.classify();
                RerouteMetrics::record_pass("load_only");
                tokio::spawn(Pass::new(self.clone(), groups, waiters, event, false).run_load_only());
            }
        }
    }

    /// Start a full pass for `waiters`.
    ///
    /// The caller must hold the in-flight flag: either freshly admitted, or
    /// handed over by the pass that just ended. Classification happens here,
    /// synchronously, so a pass acts on the registry as it was when the pass
    /// began.
    pub(crate) fn drive(
        &self,
        waiters: Vec<PendingRequest>,
        event: Option<EnvironmentEvent>,
        silent: bool,
    ) {
        let groups = self.inner.registry.classify();
        self.inner.passes.fetch_add(1, Ordering::SeqCst);
        RerouteMetrics::record_pass("full");
        tokio::spawn(Pass::new(self.clone(), groups, waiters, event, silent).run_full());
    }

    /// Surface a notification error outside the pass's control flow.
    pub(crate) fn defer_error(&self, error: NotificationError) {
        NotificationMetrics::record_deferred_error();
        let errors = self.inner.deferred_errors.clone();
        tokio::spawn(async move {
            tracing::error!(error = %error, "Notification error raised during reroute");
            // No subscribers is fine; the error was logged
            let _ = errors.send(error);
        });
    }

    async fn settled(receiver: oneshot::Receiver<RerouteResult>) -> RerouteResult {
        receiver.await.unwrap_or(Err(RerouteError::Abandoned))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("started", &self.is_started())
            .field("rerouting", &self.is_rerouting())
            .field("queued", &self.queued_requests())
            .field("passes", &self.pass_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::registry::AppRegistry;
    use switchyard_core::{ChangeDetail, ChangeEventKind};

    struct StaticNavigator(Location);

    impl Navigator for StaticNavigator {
        fn current_location(&self) -> Location {
            self.0.clone()
        }

        fn restore_location(&self, _location: &Location) {}
    }

    struct SilentSink;

    impl NotificationSink for SilentSink {
        fn emit(&self, _kind: ChangeEventKind, _detail: &ChangeDetail) -> Result<(), NotificationError> {
            Ok(())
        }

        fn replay_listeners(&self, _event: &EnvironmentEvent) -> Result<(), NotificationError> {
            Ok(())
        }
    }

    fn orchestrator() -> Orchestrator {
        let navigator = Arc::new(StaticNavigator(Location::new("/home")));
        let registry = Arc::new(AppRegistry::new(navigator.clone()));
        Orchestrator::new(registry.clone(), registry, Arc::new(SilentSink), navigator)
    }

    #[test]
    fn test_new_orchestrator_is_idle() {
        let o = orchestrator();
        assert!(!o.is_started());
        assert!(!o.is_rerouting());
        assert_eq!(o.queued_requests(), 0);
        assert_eq!(o.pass_count(), 0);
        assert_eq!(o.current_location(), Location::new("/home"));
    }

    #[test]
    fn test_start_with_no_apps_mounts_nothing() {
        let o = orchestrator();
        let mounted = tokio_test::block_on(o.start()).unwrap();

        assert!(mounted.is_empty());
        assert!(o.is_started());
        assert_eq!(o.pass_count(), 1);
    }

    #[test]
    fn test_unknown_app_cannot_be_unloaded() {
        let o = orchestrator();
        let result = tokio_test::block_on(o.unload_application(&AppName::new("ghost")));

        assert_eq!(result, Err(RerouteError::UnknownApplication(AppName::new("ghost"))));
        assert_eq!(o.pass_count(), 0);
    }

    #[test]
    fn test_dropped_request_is_abandoned() {
        let (request, receiver) = PendingRequest::new(None);
        drop(request);

        let result = tokio_test::block_on(Orchestrator::settled(receiver));
        assert_eq!(result, Err(RerouteError::Abandoned));
    }

    #[test]
    fn test_debug_reports_state() {
        let rendered = format!("{:?}", orchestrator());
        assert!(rendered.contains("started: false"));
        assert!(rendered.contains("passes: 0"));
    }
}
