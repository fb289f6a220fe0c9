//! Reference application registry.
//!
//! [`AppRegistry`] keeps every registered application's record and implements
//! both collaborator ports the orchestrator needs:
//!
//! - [`Registry`]: classification into transition groups and activity checks
//! - [`LifecycleRunner`]: phase execution with status bookkeeping, per-phase
//!   time budgets, and concurrent-load deduplication
//!
//! Applications provide an [`AppLoader`] that fetches their
//! [`AppLifecycles`], plus an activity function evaluated against the
//! current [`Location`].
//!
//! # Example
//!
//! ```ignore
//! use switchyard_runtime::registry::{path_prefix, AppRegistry};
//!
//! let registry = AppRegistry::new(navigator);
//! registry.register_application("nav", nav_loader, |_| true)?;
//! registry.register_application("checkout", checkout_loader, path_prefix("/checkout"))?;
//! ```

use crate::config::{SwitchyardConfig, TimeoutConfig};
use crate::metrics::LifecycleMetrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use switchyard_core::{
    AppHandle, AppName, AppStatus, Clock, DateTime, LifecycleError, LifecycleRunner, Location,
    Navigator, Phase, PhaseFuture, Registry, SystemClock, TransitionGroups, Utc,
};
use thiserror::Error;

/// Lifecycle hooks exported by a loaded application.
///
/// `bootstrap` and `unload` default to no-ops; `mount` and `unmount` are
/// required. Hooks report failures as [`anyhow::Error`]; the registry turns
/// them into [`LifecycleError::PhaseFailed`].
pub trait AppLifecycles: Send + Sync {
    /// One-time initialization.
    fn bootstrap(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(futures::future::ready(Ok(())))
    }

    /// Activate.
    fn mount(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Deactivate.
    fn unmount(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Release resources before the code is dropped.
    fn unload(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(futures::future::ready(Ok(())))
    }
}

/// Fetches an application's code and hands back its lifecycle hooks.
pub trait AppLoader: Send + Sync {
    /// Fetch the application.
    fn load(&self) -> BoxFuture<'static, anyhow::Result<Arc<dyn AppLifecycles>>>;
}

/// Decides whether an application should be active at a location.
pub type ActivityFn = Arc<dyn Fn(&Location) -> bool + Send + Sync>;

/// Activity function matching every location that starts with `prefix`.
pub fn path_prefix(prefix: impl Into<String>) -> impl Fn(&Location) -> bool + Send + Sync + 'static {
    let prefix = prefix.into();
    move |location: &Location| location.starts_with(&prefix)
}

/// Registration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An application with this name is already registered
    #[error("an application named '{0}' is already registered")]
    DuplicateName(AppName),

    /// Application names must not be empty
    #[error("application names must not be empty")]
    EmptyName,

    /// No application with this name is registered
    #[error("application '{0}' is not registered")]
    NotRegistered(AppName),
}

type SharedLoad = Shared<BoxFuture<'static, Result<(), LifecycleError>>>;

struct AppRecord {
    name: AppName,
    status: AppStatus,
    loader: Arc<dyn AppLoader>,
    active_when: ActivityFn,
    lifecycles: Option<Arc<dyn AppLifecycles>>,
    load_error_at: Option<DateTime<Utc>>,
    marked_for_unload: bool,
    loading: Option<SharedLoad>,
}

struct RegistryInner {
    apps: RwLock<Vec<AppRecord>>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    config: SwitchyardConfig,
}

/// In-memory application registry and lifecycle runner.
///
/// Cheap to clone; clones share the same records.
#[derive(Clone)]
pub struct AppRegistry {
    inner: Arc<RegistryInner>,
}

impl AppRegistry {
    /// Create a registry with the system clock and default configuration.
    #[must_use]
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self::with_config(navigator, Arc::new(SystemClock), SwitchyardConfig::default())
    }

    /// Create a registry with an explicit clock and configuration.
    ///
    /// # Arguments
    ///
    /// * `navigator` - Source of the current location for activity checks
    /// * `clock` - Time source for the load-error retry window
    /// * `config` - Phase budgets and retry window
    #[must_use]
    pub fn with_config(
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        config: SwitchyardConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                apps: RwLock::new(Vec::new()),
                navigator,
                clock,
                config,
            }),
        }
    }

    /// Register an application in `NOT_LOADED`.
    ///
    /// Registration order is kept and determines the order of every
    /// transition group.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is taken, or
    /// [`RegistryError::EmptyName`] for an empty name.
    pub fn register_application<L, A>(
        &self,
        name: impl Into<AppName>,
        loader: L,
        active_when: A,
    ) -> Result<(), RegistryError>
    where
        L: AppLoader + 'static,
        A: Fn(&Location) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        if name.as_str().is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let mut apps = self.write();
        if apps.iter().any(|record| record.name == name) {
            return Err(RegistryError::DuplicateName(name));
        }

        tracing::debug!(app = %name, "Registering application");
        apps.push(AppRecord {
            name,
            status: AppStatus::NotLoaded,
            loader: Arc::new(loader),
            active_when: Arc::new(active_when),
            lifecycles: None,
            load_error_at: None,
            marked_for_unload: false,
            loading: None,
        });
        Ok(())
    }

    /// Names of all registered applications, in registration order.
    #[must_use]
    pub fn app_names(&self) -> Vec<AppName> {
        self.read().iter().map(|record| record.name.clone()).collect()
    }

    /// Whether the named application is marked for unloading.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] for an unknown name.
    pub fn is_marked_for_unload(&self, name: &AppName) -> Result<bool, RegistryError> {
        self.read()
            .iter()
            .find(|record| &record.name == name)
            .map(|record| record.marked_for_unload)
            .ok_or_else(|| RegistryError::NotRegistered(name.clone()))
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<AppRecord>> {
        self.inner.apps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<AppRecord>> {
        self.inner.apps.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, name: &AppName, status: AppStatus) {
        if let Some(record) = self.write().iter_mut().find(|record| &record.name == name) {
            record.status = status;
            if status == AppStatus::NotLoaded {
                record.lifecycles = None;
                record.marked_for_unload = false;
            }
        }
    }

    fn is_active_at(record: &AppRecord, location: &Location) -> bool {
        (record.active_when)(location)
    }

    async fn load_app(&self, app: AppHandle) -> Result<AppHandle, LifecycleError> {
        let name = app.name().clone();
        let load = {
            let mut apps = self.write();
            let record = apps
                .iter_mut()
                .find(|record| record.name == name)
                .ok_or_else(|| LifecycleError::NotRegistered(name.clone()))?;

            if let Some(load) = &record.loading {
                tracing::trace!(app = %name, "Joining in-flight load");
                load.clone()
            } else if let Err(transition) = Phase::Load.check(record.status) {
                tracing::trace!(app = %name, %transition, "Skipping load");
                return Ok(app);
            } else {
                record.status = AppStatus::LoadingSourceCode;
                let load = self
                    .clone()
                    .fetch(name.clone(), Arc::clone(&record.loader))
                    .boxed()
                    .shared();
                record.loading = Some(load.clone());
                load
            }
        };

        load.await?;
        Ok(app)
    }

    async fn fetch(self, name: AppName, loader: Arc<dyn AppLoader>) -> Result<(), LifecycleError> {
        let started = Instant::now();
        let outcome = loader.load().await;
        LifecycleMetrics::record_phase(Phase::Load, started.elapsed());

        let mut apps = self.write();
        let record = apps
            .iter_mut()
            .find(|record| record.name == name)
            .ok_or_else(|| LifecycleError::NotRegistered(name.clone()))?;
        record.loading = None;

        match outcome {
            Ok(lifecycles) => {
                record.lifecycles = Some(lifecycles);
                record.load_error_at = None;
                record.status = Phase::Load.success();
                tracing::debug!(app = %name, "Application loaded");
                Ok(())
            }
            Err(error) => {
                record.load_error_at = Some(self.inner.clock.now());
                record.status = Phase::Load.failure();
                LifecycleMetrics::record_failure(Phase::Load);
                tracing::warn!(app = %name, error = %format!("{error:#}"), "Application failed to load");
                Err(LifecycleError::PhaseFailed {
                    app: name,
                    phase: Phase::Load,
                    reason: format!("{error:#}"),
                })
            }
        }
    }

    async fn run_hook(&self, app: AppHandle, phase: Phase) -> Result<AppHandle, LifecycleError> {
        let name = app.name().clone();
        let lifecycles = {
            let mut apps = self.write();
            let record = apps
                .iter_mut()
                .find(|record| record.name == name)
                .ok_or_else(|| LifecycleError::NotRegistered(name.clone()))?;

            if phase == Phase::Unload {
                if !record.marked_for_unload {
                    return Ok(app);
                }
                if record.status == AppStatus::NotLoaded {
                    record.marked_for_unload = false;
                    return Ok(app);
                }
            }
            if let Err(transition) = phase.check(record.status) {
                tracing::trace!(app = %name, %transition, "Skipping phase");
                return Ok(app);
            }

            // LOAD_ERROR never received hooks; unloading it only resets the record
            if phase == Phase::Unload && record.status == AppStatus::LoadError {
                record.status = AppStatus::NotLoaded;
                record.load_error_at = None;
                record.marked_for_unload = false;
                return Ok(app);
            }

            let Some(lifecycles) = record.lifecycles.clone() else {
                record.status = AppStatus::SkipBecauseBroken;
                return Err(LifecycleError::InvalidLifecycles {
                    app: name,
                    reason: "no lifecycles were loaded".to_string(),
                });
            };
            record.status = phase.in_progress();
            lifecycles
        };

        let started = Instant::now();
        let outcome = self.call_hook(&name, phase, lifecycles.as_ref()).await;
        LifecycleMetrics::record_phase(phase, started.elapsed());

        match outcome {
            Ok(()) => {
                self.set_status(&name, phase.success());
                tracing::debug!(app = %name, %phase, "Phase complete");
                Ok(app)
            }
            Err(error) => {
                if phase == Phase::Mount {
                    // Best effort: leave nothing half-mounted behind
                    if let Err(cleanup) = lifecycles.unmount().await {
                        tracing::debug!(app = %name, error = %cleanup, "Unmount after failed mount also failed");
                    }
                }
                self.set_status(&name, phase.failure());
                LifecycleMetrics::record_failure(phase);
                tracing::warn!(app = %name, %phase, error = %error, "Phase failed, application is broken");
                Err(error)
            }
        }
    }

    async fn call_hook(
        &self,
        name: &AppName,
        phase: Phase,
        lifecycles: &dyn AppLifecycles,
    ) -> Result<(), LifecycleError> {
        let hook = match phase {
            Phase::Load => return Ok(()),
            Phase::Bootstrap => lifecycles.bootstrap(),
            Phase::Mount => lifecycles.mount(),
            Phase::Unmount => lifecycles.unmount(),
            Phase::Unload => lifecycles.unload(),
        };
        let failed = |error: anyhow::Error| LifecycleError::PhaseFailed {
            app: name.clone(),
            phase,
            reason: format!("{error:#}"),
        };

        match self.inner.config.timeouts.for_phase(phase) {
            Some(timeout) => with_budget(name, phase, timeout, hook).await.map_err(|e| match e {
                BudgetError::Hook(error) => failed(error),
                BudgetError::Expired(millis) => LifecycleError::Timeout {
                    app: name.clone(),
                    phase,
                    millis,
                },
            }),
            None => hook.await.map_err(failed),
        }
    }
}

enum BudgetError {
    Hook(anyhow::Error),
    Expired(u64),
}

/// Drive `hook` under `timeout`.
///
/// Logs a warning every `warning_millis` while the hook is pending. Once the
/// budget is spent the hook either fails (`die_on_timeout`) or is awaited
/// without further warnings.
async fn with_budget(
    name: &AppName,
    phase: Phase,
    timeout: TimeoutConfig,
    mut hook: BoxFuture<'_, anyhow::Result<()>>,
) -> Result<(), BudgetError> {
    let start = tokio::time::Instant::now();
    let deadline = start + timeout.budget();
    let period = timeout.warning().max(std::time::Duration::from_millis(1));
    let mut warnings = tokio::time::interval_at(start + period, period);
    let mut expired = false;

    loop {
        tokio::select! {
            result = &mut hook => return result.map_err(BudgetError::Hook),
            () = tokio::time::sleep_until(deadline), if !expired => {
                expired = true;
                LifecycleMetrics::record_timeout(phase);
                if timeout.die_on_timeout {
                    tracing::error!(app = %name, %phase, millis = timeout.millis, "Phase exceeded its budget");
                    return Err(BudgetError::Expired(timeout.millis));
                }
                tracing::error!(
                    app = %name,
                    %phase,
                    millis = timeout.millis,
                    "Phase exceeded its budget, still waiting"
                );
            }
            _ = warnings.tick(), if !expired => {
                tracing::warn!(
                    app = %name,
                    %phase,
                    elapsed = ?start.elapsed(),
                    "Phase still pending"
                );
            }
        }
    }
}

impl Registry for AppRegistry {
    fn classify(&self) -> TransitionGroups {
        let location = self.inner.navigator.current_location();
        let now = self.inner.clock.now();
        let retry = chrono::Duration::from_std(self.inner.config.load_error_retry())
            .unwrap_or_else(|_| chrono::Duration::zero());

        let mut groups = TransitionGroups::default();
        for record in self.read().iter() {
            let desired = !record.status.is_broken() && Self::is_active_at(record, &location);
            let handle = || AppHandle::new(record.name.clone());

            match record.status {
                AppStatus::LoadError => {
                    let retry_due = record.load_error_at.is_none_or(|at| now - at >= retry);
                    if desired && retry_due {
                        groups.to_load.push(handle());
                    }
                }
                AppStatus::NotLoaded | AppStatus::LoadingSourceCode => {
                    if desired {
                        groups.to_load.push(handle());
                    }
                }
                AppStatus::NotBootstrapped | AppStatus::NotMounted => {
                    if !desired && record.marked_for_unload {
                        groups.to_unload.push(handle());
                    } else if desired {
                        groups.to_mount.push(handle());
                    }
                }
                AppStatus::Mounted => {
                    if !desired {
                        groups.to_unmount.push(handle());
                    }
                }
                _ => {}
            }
        }

        tracing::trace!(
            location = %location,
            unload = groups.to_unload.len(),
            unmount = groups.to_unmount.len(),
            load = groups.to_load.len(),
            mount = groups.to_mount.len(),
            "Classified applications"
        );
        groups
    }

    fn status(&self, name: &AppName) -> Option<AppStatus> {
        self.read()
            .iter()
            .find(|record| &record.name == name)
            .map(|record| record.status)
    }

    fn desired_active(&self, app: &AppHandle) -> bool {
        let location = self.inner.navigator.current_location();
        self.read()
            .iter()
            .find(|record| &record.name == app.name())
            .is_some_and(|record| Self::is_active_at(record, &location))
    }

    fn mounted_names(&self) -> Vec<AppName> {
        self.read()
            .iter()
            .filter(|record| record.status.is_active())
            .map(|record| record.name.clone())
            .collect()
    }

    fn mark_for_unload(&self, name: &AppName) -> bool {
        match self.write().iter_mut().find(|record| &record.name == name) {
            Some(record) => {
                record.marked_for_unload = true;
                true
            }
            None => false,
        }
    }
}

impl LifecycleRunner for AppRegistry {
    fn load(&self, app: AppHandle) -> PhaseFuture<'_> {
        Box::pin(self.load_app(app))
    }

    fn bootstrap(&self, app: AppHandle) -> PhaseFuture<'_> {
        Box::pin(self.run_hook(app, Phase::Bootstrap))
    }

    fn mount(&self, app: AppHandle) -> PhaseFuture<'_> {
        Box::pin(self.run_hook(app, Phase::Mount))
    }

    fn unmount(&self, app: AppHandle) -> PhaseFuture<'_> {
        Box::pin(self.run_hook(app, Phase::Unmount))
    }

    fn unload(&self, app: AppHandle) -> PhaseFuture<'_> {
        Box::pin(self.run_hook(app, Phase::Unload))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::LifecycleTimeouts;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedNavigator(Mutex<Location>);

    impl FixedNavigator {
        fn at(location: &str) -> Arc<Self> {
            Arc::new(Self(Mutex::new(Location::new(location))))
        }

        fn go(&self, location: &str) {
            *self.0.lock().unwrap() = Location::new(location);
        }
    }

    impl Navigator for FixedNavigator {
        fn current_location(&self) -> Location {
            self.0.lock().unwrap().clone()
        }

        fn restore_location(&self, location: &Location) {
            *self.0.lock().unwrap() = location.clone();
        }
    }

    struct StepClock(Mutex<DateTime<Utc>>);

    impl StepClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct Hooks {
        mount_fails: bool,
        mount_delay: Option<Duration>,
        unmounts: AtomicUsize,
    }

    impl AppLifecycles for Hooks {
        fn mount(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            Box::pin(async move {
                if let Some(delay) = self.mount_delay {
                    tokio::time::sleep(delay).await;
                }
                if self.mount_fails {
                    anyhow::bail!("mount exploded");
                }
                Ok(())
            })
        }

        fn unmount(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            self.unmounts.fetch_add(1, Ordering::SeqCst);
            Box::pin(futures::future::ready(Ok(())))
        }
    }

    struct Loader {
        calls: Arc<AtomicUsize>,
        fail: bool,
        hooks: Arc<Hooks>,
    }

    impl Loader {
        fn ok() -> Self {
            Self::with_hooks(Hooks::default())
        }

        fn with_hooks(hooks: Hooks) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
                hooks: Arc::new(hooks),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::ok()
            }
        }
    }

    impl AppLoader for Loader {
        fn load(&self) -> BoxFuture<'static, anyhow::Result<Arc<dyn AppLifecycles>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            let hooks: Arc<dyn AppLifecycles> = self.hooks.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if fail {
                    anyhow::bail!("network down");
                }
                Ok(hooks)
            })
        }
    }

    fn registry(location: &str) -> (AppRegistry, Arc<FixedNavigator>, Arc<StepClock>) {
        let navigator = FixedNavigator::at(location);
        let clock = Arc::new(StepClock(Mutex::new(Utc::now())));
        let registry = AppRegistry::with_config(
            navigator.clone(),
            clock.clone(),
            SwitchyardConfig::default(),
        );
        (registry, navigator, clock)
    }

    fn names(handles: &[AppHandle]) -> Vec<&str> {
        handles.iter().map(|h| h.name().as_str()).collect()
    }

    async fn mount(registry: &AppRegistry, name: &str) {
        let app = registry.load(AppHandle::new(name)).await.unwrap();
        let app = registry.bootstrap(app).await.unwrap();
        registry.mount(app).await.unwrap();
    }

    #[test]
    fn test_register_rejects_duplicates_and_empty_names() {
        let (registry, _, _) = registry("/");
        registry.register_application("a", Loader::ok(), |_| true).unwrap();

        assert_eq!(
            registry.register_application("a", Loader::ok(), |_| true),
            Err(RegistryError::DuplicateName(AppName::new("a")))
        );
        assert_eq!(
            registry.register_application("", Loader::ok(), |_| true),
            Err(RegistryError::EmptyName)
        );
        assert_eq!(registry.status(&AppName::new("a")), Some(AppStatus::NotLoaded));
        assert_eq!(registry.app_names(), vec![AppName::new("a")]);
    }

    #[test]
    fn test_classify_follows_registration_order() {
        let (registry, _, _) = registry("/shop/cart");
        registry.register_application("nav", Loader::ok(), |_| true).unwrap();
        registry.register_application("shop", Loader::ok(), path_prefix("/shop")).unwrap();
        registry.register_application("blog", Loader::ok(), path_prefix("/blog")).unwrap();

        let groups = registry.classify();
        assert_eq!(names(&groups.to_load), vec!["nav", "shop"]);
        assert!(groups.to_mount.is_empty());
        assert!(groups.to_unmount.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle_statuses() {
        let (registry, navigator, _) = registry("/shop");
        registry.register_application("shop", Loader::ok(), path_prefix("/shop")).unwrap();
        let name = AppName::new("shop");

        mount(&registry, "shop").await;
        assert_eq!(registry.status(&name), Some(AppStatus::Mounted));
        assert_eq!(registry.mounted_names(), vec![name.clone()]);

        navigator.go("/blog");
        let groups = registry.classify();
        assert_eq!(names(&groups.to_unmount), vec!["shop"]);

        registry.unmount(AppHandle::new("shop")).await.unwrap();
        assert_eq!(registry.status(&name), Some(AppStatus::NotMounted));
        // not marked: unload is a no-op
        registry.unload(AppHandle::new("shop")).await.unwrap();
        assert_eq!(registry.status(&name), Some(AppStatus::NotMounted));

        assert!(registry.mark_for_unload(&name));
        assert_eq!(names(&registry.classify().to_unload), vec!["shop"]);
        registry.unload(AppHandle::new("shop")).await.unwrap();
        assert_eq!(registry.status(&name), Some(AppStatus::NotLoaded));
        assert!(!registry.is_marked_for_unload(&name).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_from_wrong_status_is_noop() {
        let (registry, _, _) = registry("/");
        registry.register_application("a", Loader::ok(), |_| true).unwrap();

        registry.mount(AppHandle::new("a")).await.unwrap();
        registry.bootstrap(AppHandle::new("a")).await.unwrap();
        assert_eq!(registry.status(&AppName::new("a")), Some(AppStatus::NotLoaded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_share_one_fetch() {
        let (registry, _, _) = registry("/");
        let loader = Loader::ok();
        let calls = loader.calls.clone();
        registry.register_application("a", loader, |_| true).unwrap();

        let (first, second) = tokio::join!(
            registry.load(AppHandle::new("a")),
            registry.load(AppHandle::new("a"))
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.status(&AppName::new("a")), Some(AppStatus::NotBootstrapped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_error_waits_for_retry_window() {
        let (registry, _, clock) = registry("/");
        registry.register_application("a", Loader::failing(), |_| true).unwrap();

        let err = registry.load(AppHandle::new("a")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::PhaseFailed { phase: Phase::Load, .. }));
        assert_eq!(registry.status(&AppName::new("a")), Some(AppStatus::LoadError));

        assert!(registry.classify().to_load.is_empty());
        clock.advance(Duration::from_millis(200));
        assert_eq!(names(&registry.classify().to_load), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_failure_breaks_app_after_cleanup() {
        let hooks = Hooks {
            mount_fails: true,
            ..Hooks::default()
        };
        let loader = Loader::with_hooks(hooks);
        let hooks = loader.hooks.clone();
        let (registry, _, _) = registry("/");
        registry.register_application("a", loader, |_| true).unwrap();

        let app = registry.load(AppHandle::new("a")).await.unwrap();
        let app = registry.bootstrap(app).await.unwrap();
        let err = registry.mount(app).await.unwrap_err();

        assert!(err.to_string().contains("mount exploded"));
        assert_eq!(hooks.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(registry.status(&AppName::new("a")), Some(AppStatus::SkipBecauseBroken));
        assert!(registry.classify().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_mount_times_out_when_configured() {
        let navigator = FixedNavigator::at("/");
        let timeouts = LifecycleTimeouts {
            mount: TimeoutConfig::new(100)
                .with_warning_millis(50)
                .with_die_on_timeout(true),
            ..LifecycleTimeouts::default()
        };
        let registry = AppRegistry::with_config(
            navigator,
            Arc::new(SystemClock),
            SwitchyardConfig::default().with_timeouts(timeouts),
        );
        let hooks = Hooks {
            mount_delay: Some(Duration::from_secs(10)),
            ..Hooks::default()
        };
        registry.register_application("slow", Loader::with_hooks(hooks), |_| true).unwrap();

        let app = registry.load(AppHandle::new("slow")).await.unwrap();
        let app = registry.bootstrap(app).await.unwrap();
        let err = registry.mount(app).await.unwrap_err();

        assert_eq!(
            err,
            LifecycleError::Timeout {
                app: AppName::new("slow"),
                phase: Phase::Mount,
                millis: 100,
            }
        );
        assert_eq!(registry.status(&AppName::new("slow")), Some(AppStatus::SkipBecauseBroken));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_mount_keeps_waiting_by_default() {
        let (registry, _, _) = registry("/");
        let hooks = Hooks {
            mount_delay: Some(Duration::from_secs(5)),
            ..Hooks::default()
        };
        registry.register_application("slow", Loader::with_hooks(hooks), |_| true).unwrap();

        mount(&registry, "slow").await;
        assert_eq!(registry.status(&AppName::new("slow")), Some(AppStatus::Mounted));
    }

    #[test]
    fn test_desired_active_tracks_location() {
        let (registry, navigator, _) = registry("/a");
        registry.register_application("a", Loader::ok(), path_prefix("/a")).unwrap();
        let handle = AppHandle::new("a");

        assert!(registry.desired_active(&handle));
        navigator.go("/b");
        assert!(!registry.desired_active(&handle));
        assert!(!registry.desired_active(&AppHandle::new("missing")));
        assert!(!registry.mark_for_unload(&AppName::new("missing")));
    }
}
