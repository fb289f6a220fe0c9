//! One reroute pass.
//!
//! A full pass runs in four steps:
//!
//! 1. Announce: `before-(no-)app-change`, `before-routing-event`, then give
//!    subscribers the chance to cancel the navigation.
//! 2. Deactivate: unmount-then-unload every app leaving, unload every idle app
//!    marked for it, all concurrently. Once settled, emit
//!    `before-mount-routing-event` and replay deferred listeners.
//! 3. Activate: load-then-activate and bootstrap-then-mount streams run
//!    concurrently, but no mount starts before step 2 settled.
//! 4. Settle: resolve every waiter, emit `(no-)app-change` and
//!    `routing-event`, then hand the in-flight flag to the queued batch or
//!    clear it.
//!
//! A load-only pass (runtime not started) just loads, replays listeners, and
//! settles its waiters with an empty mounted set.

use crate::error::RerouteError;
use crate::metrics::{NotificationMetrics, RerouteMetrics};
use crate::orchestrator::Orchestrator;
use crate::scheduler::PendingRequest;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::time::Instant;
use switchyard_core::{
    AppHandle, AppStatus, ChangeDetail, ChangeEventKind, EnvironmentEvent, LifecycleError,
    LifecycleRunner, Location, NotificationSink, PhaseFuture, Registry, TransitionGroups,
};

/// Completes once deactivation settled and the mount gate opened.
type Gate<'a> = Shared<BoxFuture<'a, Result<(), LifecycleError>>>;

pub(crate) struct Pass {
    orchestrator: Orchestrator,
    groups: TransitionGroups,
    waiters: Vec<PendingRequest>,
    event: Option<EnvironmentEvent>,
    silent: bool,
}

impl Pass {
    pub(crate) const fn new(
        orchestrator: Orchestrator,
        groups: TransitionGroups,
        waiters: Vec<PendingRequest>,
        event: Option<EnvironmentEvent>,
        silent: bool,
    ) -> Self {
        Self {
            orchestrator,
            groups,
            waiters,
            event,
            silent,
        }
    }

    fn registry(&self) -> &dyn Registry {
        &*self.orchestrator.inner().registry
    }

    fn runner(&self) -> &dyn LifecycleRunner {
        &*self.orchestrator.inner().runner
    }

    fn sink(&self) -> &dyn NotificationSink {
        &*self.orchestrator.inner().sink
    }

    /// The event of the request that started the pass; none for a drain.
    fn original_event(&self) -> Option<EnvironmentEvent> {
        self.event.clone()
    }

    /// Every waiter's event, oldest first.
    fn replay_events(&self) -> Vec<EnvironmentEvent> {
        self.waiters
            .iter()
            .filter_map(|waiter| waiter.event().cloned())
            .collect()
    }

    /// Drive a full pass and settle every waiter.
    #[tracing::instrument(
        name = "reroute_pass",
        skip_all,
        fields(changes = self.groups.total_changes(), waiters = self.waiters.len(), silent = self.silent)
    )]
    pub(crate) async fn run_full(self) {
        let started = Instant::now();
        let (old_location, new_location) = self.orchestrator.advance_location();
        let before = self.announcement(old_location.clone(), new_location);

        self.emit(ChangeEventKind::before_change(self.groups.total_changes()), &before);
        self.emit(ChangeEventKind::BeforeRoutingEvent, &before);

        let canceled = self.sink().navigation_cancel_requested(&before).await;
        if canceled {
            self.cancel(old_location);
            return;
        }

        let outcome = self.transition(&before).await;
        match outcome {
            Ok(()) => self.finish(&before, started),
            Err(error) => self.fail(error),
        }
    }

    /// Drive a load-only pass and settle every waiter.
    #[tracing::instrument(name = "load_pass", skip_all, fields(loads = self.groups.to_load.len()))]
    pub(crate) async fn run_load_only(self) {
        let runner = self.runner();
        let mut loads: Vec<PhaseFuture<'_>> = Vec::with_capacity(self.groups.to_load.len());
        for app in &self.groups.to_load {
            loads.push(runner.load(app.clone()));
        }
        let outcome = settle_all(loads).await;

        if !self.silent {
            for event in self.replay_events() {
                self.replay(&event);
            }
        }

        match outcome {
            Ok(loaded) => {
                tracing::debug!(loaded = loaded.len(), "Load-only pass settled");
                for waiter in self.waiters {
                    waiter.resolve(Vec::new());
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "Load-only pass failed");
                let error = RerouteError::from(error);
                for waiter in self.waiters {
                    waiter.reject(error.clone());
                }
            }
        }
    }

    /// Deactivate, then activate, under the mount gate.
    async fn transition(&self, before: &ChangeDetail) -> Result<(), LifecycleError> {
        let runner = self.runner();
        let replay_events = self.replay_events();

        let mut deactivations: Vec<PhaseFuture<'_>> = Vec::new();
        for app in &self.groups.to_unmount {
            let app = app.clone();
            deactivations.push(Box::pin(async move {
                let app = runner.unmount(app).await?;
                runner.unload(app).await
            }));
        }
        for app in &self.groups.to_unload {
            deactivations.push(runner.unload(app.clone()));
        }

        let gate: Gate<'_> = async {
            let deactivated = settle_all(deactivations).await.map(drop);
            if deactivated.is_ok() {
                self.emit(ChangeEventKind::BeforeMountRoutingEvent, before);
            }
            if !self.silent {
                for event in &replay_events {
                    self.replay(event);
                }
            }
            deactivated
        }
        .boxed()
        .shared();

        let mut activations: Vec<PhaseFuture<'_>> = Vec::new();
        for app in &self.groups.to_load {
            let app = app.clone();
            let gate = gate.clone();
            activations.push(Box::pin(async move {
                let app = runner.load(app).await?;
                self.activate(app, gate).await
            }));
        }
        for app in self.groups.mount_only() {
            activations.push(Box::pin(self.activate(app.clone(), gate.clone())));
        }

        let (deactivated, activated) = futures::join!(gate, settle_all(activations));
        deactivated.and(activated.map(drop))
    }

    /// Bootstrap a desired app, wait for the gate, and mount it if it is
    /// still desired.
    async fn activate(&self, app: AppHandle, gate: Gate<'_>) -> Result<AppHandle, LifecycleError> {
        if !self.registry().desired_active(&app) {
            tracing::debug!(app = %app, "No longer desired, skipping activation");
            gate.await?;
            return Ok(app);
        }

        let app = self.runner().bootstrap(app).await?;
        gate.await?;

        if self.registry().desired_active(&app) {
            self.runner().mount(app).await
        } else {
            tracing::debug!(app = %app, "Deselected while bootstrapping, not mounting");
            Ok(app)
        }
    }

    fn finish(mut self, before: &ChangeDetail, started: Instant) {
        let mounted = self.registry().mounted_names();
        tracing::debug!(mounted = mounted.len(), "Pass settled");
        for waiter in std::mem::take(&mut self.waiters) {
            waiter.resolve(mounted.clone());
        }
        RerouteMetrics::record_settled(started.elapsed());

        let after = self.outcome(before);
        self.emit(ChangeEventKind::after_change(self.groups.total_changes()), &after);
        self.emit(ChangeEventKind::RoutingEvent, &after);

        // A non-empty queue keeps the in-flight flag for the drain pass
        let queued = self.orchestrator.inner().scheduler.finish();
        if !queued.is_empty() {
            tracing::debug!(batched = queued.len(), "Draining queued requests");
            self.orchestrator.drive(queued, None, false);
        }
    }

    fn fail(self, error: LifecycleError) {
        tracing::error!(error = %error, code = error.code(), app = %error.app(), "Reroute pass failed");
        RerouteMetrics::record_failure();

        let error = RerouteError::from(error);
        let queued = self.orchestrator.inner().scheduler.abort();
        for waiter in self.waiters.into_iter().chain(queued) {
            waiter.reject(error.clone());
        }
    }

    fn cancel(self, old_location: Location) {
        tracing::info!(location = %old_location, "Navigation canceled, restoring location");
        RerouteMetrics::record_canceled();

        self.orchestrator.restore_location(old_location);
        // The silent pass takes over the in-flight flag
        self.orchestrator.drive(self.waiters, self.event, true);
    }

    /// Detail for the notifications that precede any phase work.
    fn announcement(&self, old_location: Location, new_location: Location) -> ChangeDetail {
        let groups = &self.groups;
        let registry = self.registry();
        let names = |apps: &[AppHandle]| apps.iter().map(|app| registry.name(app)).collect::<Vec<_>>();

        ChangeDetail::builder(groups.total_changes())
            .apps(names(&groups.to_load), AppStatus::Mounted)
            .apps(names(&groups.to_mount), AppStatus::Mounted)
            .apps(names(&groups.to_unload), AppStatus::NotLoaded)
            .apps(names(&groups.to_unmount), AppStatus::NotMounted)
            .original_event(self.original_event())
            .locations(old_location, new_location)
            .build()
    }

    /// Detail for the notifications that follow the pass, with statuses as
    /// they actually ended up.
    fn outcome(&self, before: &ChangeDetail) -> ChangeDetail {
        let registry = self.registry();
        let statuses = self.groups.changed_apps().into_iter().filter_map(|app| {
            let name = registry.name(&app);
            registry.status(&name).map(|status| (name, status))
        });

        statuses
            .fold(
                ChangeDetail::builder(self.groups.total_changes()),
                |builder, (name, status)| builder.app(name, status),
            )
            .original_event(before.original_event.clone())
            .locations(before.old_location.clone(), before.new_location.clone())
            .build()
    }

    fn emit(&self, kind: ChangeEventKind, detail: &ChangeDetail) {
        tracing::trace!(event = kind.as_str(), "Emitting notification");
        NotificationMetrics::record_emitted(kind);
        if let Err(error) = self.sink().emit(kind, detail) {
            self.orchestrator.defer_error(error);
        }
    }

    fn replay(&self, event: &EnvironmentEvent) {
        tracing::trace!(event = %event.kind, "Replaying deferred listeners");
        if let Err(error) = self.sink().replay_listeners(event) {
            self.orchestrator.defer_error(error);
        }
    }
}

/// Await every future concurrently.
///
/// Settles only after all of them settled, then resolves with the values in
/// completion order, or with the first error in completion order.
pub(crate) async fn settle_all<I, F, T, E>(futures: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let mut pending = futures.into_iter().collect::<FuturesUnordered<_>>();
    let mut values = Vec::with_capacity(pending.len());
    let mut first_error = None;

    while let Some(result) = pending.next().await {
        match result {
            Ok(value) => values.push(value),
            Err(error) => {
                first_error.get_or_insert(error);
            }
        }
    }

    first_error.map_or(Ok(values), Err)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::time::Duration;

    async fn after(millis: u64, result: Result<u64, &'static str>) -> Result<u64, &'static str> {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        result
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_all_collects_in_completion_order() {
        let values = settle_all(vec![after(30, Ok(1)), after(10, Ok(2)), after(20, Ok(3))])
            .await
            .unwrap();
        assert_eq!(values, vec![2, 3, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_all_waits_for_everything_and_keeps_first_error() {
        let start = tokio::time::Instant::now();
        let err = settle_all(vec![
            after(50, Ok(1)),
            after(20, Err("late")),
            after(10, Err("early")),
        ])
        .await
        .unwrap_err();

        assert_eq!(err, "early");
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_settle_all_empty() {
        let values: Vec<u64> = settle_all(Vec::<futures::future::Ready<Result<u64, ()>>>::new())
            .await
            .unwrap();
        assert!(values.is_empty());
    }
}
