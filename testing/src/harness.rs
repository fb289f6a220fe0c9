//! A fully wired runtime for integration tests.

use crate::log::CallLog;
use crate::mocks::{test_clock, InMemoryNavigator, ManualClock};
use crate::scripted::ScriptedApp;
use crate::sink::RecordingSink;
use std::sync::Arc;
use switchyard_core::{AppName, AppStatus, Location, Registry};
use switchyard_runtime::{AppRegistry, Orchestrator, RegistryError, SwitchyardConfig};

/// Registry, orchestrator and test doubles sharing one [`CallLog`].
///
/// The sink logs into the same log as every app created through
/// [`app`](Self::app), so notifications and phases interleave in one record.
pub struct TestHarness {
    /// Shared record of phases, notifications and replays
    pub log: CallLog,
    /// Notification sink
    pub sink: RecordingSink,
    /// Location source
    pub navigator: InMemoryNavigator,
    /// Clock driving the load-error retry window
    pub clock: ManualClock,
    /// The registry, also acting as lifecycle runner
    pub registry: AppRegistry,
    /// The orchestrator under test
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    /// A harness at `location` with default configuration.
    #[must_use]
    pub fn new(location: &str) -> Self {
        Self::with_config(location, SwitchyardConfig::default())
    }

    /// A harness at `location` with `config`.
    #[must_use]
    pub fn with_config(location: &str, config: SwitchyardConfig) -> Self {
        let log = CallLog::new();
        let sink = RecordingSink::with_log(log.clone());
        let navigator = InMemoryNavigator::new(location);
        let clock = test_clock();
        let registry =
            AppRegistry::with_config(Arc::new(navigator.clone()), Arc::new(clock.clone()), config);
        let orchestrator = Orchestrator::new(
            Arc::new(registry.clone()),
            Arc::new(registry.clone()),
            Arc::new(sink.clone()),
            Arc::new(navigator.clone()),
        );

        Self {
            log,
            sink,
            navigator,
            clock,
            registry,
            orchestrator,
        }
    }

    /// A scripted app logging into the harness's log.
    #[must_use]
    pub fn app(&self, name: &str) -> ScriptedApp {
        ScriptedApp::new(name, self.log.clone())
    }

    /// Register `app`; returns a handle that shares its scripts.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the name is invalid or taken.
    pub fn register<A>(&self, app: ScriptedApp, active_when: A) -> Result<ScriptedApp, RegistryError>
    where
        A: Fn(&Location) -> bool + Send + Sync + 'static,
    {
        let handle = app.clone();
        self.registry
            .register_application(app.name().clone(), app, active_when)?;
        Ok(handle)
    }

    /// Move the environment to `location`.
    pub fn navigate(&self, location: &str) {
        self.navigator.navigate(location);
    }

    /// Status of the named app.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<AppStatus> {
        self.registry.status(&AppName::new(name))
    }
}
