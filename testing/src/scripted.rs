//! Scripted applications: loaders and lifecycles whose timing and failures
//! are set by the test.

use crate::log::{CallLog, LogEntry};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use switchyard_core::{AppName, Phase};
use switchyard_runtime::{AppLifecycles, AppLoader};

/// How one phase behaves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseScript {
    /// Time the hook takes before settling
    pub delay: Duration,
    /// Failure reason; `None` succeeds
    pub failure: Option<String>,
}

/// An application whose every phase is scripted.
///
/// Acts as its own [`AppLoader`] and [`AppLifecycles`]. Clones share scripts
/// and log, so a test can keep a clone and re-script phases mid-test.
///
/// # Example
///
/// ```ignore
/// let log = CallLog::new();
/// let app = ScriptedApp::new("checkout", log.clone())
///     .with_delay(Phase::Load, Duration::from_millis(50))
///     .with_failure(Phase::Mount, "boom");
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedApp {
    name: AppName,
    log: CallLog,
    scripts: Arc<Mutex<HashMap<Phase, PhaseScript>>>,
}

impl ScriptedApp {
    /// An app whose phases all succeed immediately.
    #[must_use]
    pub fn new(name: impl Into<AppName>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            log,
            scripts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The app's name.
    #[must_use]
    pub const fn name(&self) -> &AppName {
        &self.name
    }

    /// Make `phase` take `delay`.
    #[must_use]
    pub fn with_delay(self, phase: Phase, delay: Duration) -> Self {
        self.scripts().entry(phase).or_default().delay = delay;
        self
    }

    /// Make `phase` fail with `reason`.
    #[must_use]
    pub fn with_failure(self, phase: Phase, reason: impl Into<String>) -> Self {
        self.set_failure(phase, Some(reason.into()));
        self
    }

    /// Change whether `phase` fails from now on.
    pub fn set_failure(&self, phase: Phase, failure: Option<String>) {
        self.scripts().entry(phase).or_default().failure = failure;
    }

    /// The current script for `phase`.
    #[must_use]
    pub fn script(&self, phase: Phase) -> PhaseScript {
        self.scripts().get(&phase).cloned().unwrap_or_default()
    }

    fn scripts(&self) -> MutexGuard<'_, HashMap<Phase, PhaseScript>> {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn perform(&self, phase: Phase) -> anyhow::Result<()> {
        let script = self.script(phase);
        self.log.record(LogEntry::Started {
            app: self.name.clone(),
            phase,
        });

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        self.log.record(LogEntry::Finished {
            app: self.name.clone(),
            phase,
            ok: script.failure.is_none(),
        });
        match script.failure {
            Some(reason) => Err(anyhow::anyhow!(reason)),
            None => Ok(()),
        }
    }
}

impl AppLoader for ScriptedApp {
    fn load(&self) -> BoxFuture<'static, anyhow::Result<Arc<dyn AppLifecycles>>> {
        let app = self.clone();
        Box::pin(async move {
            app.perform(Phase::Load).await?;
            Ok(Arc::new(app) as Arc<dyn AppLifecycles>)
        })
    }
}

impl AppLifecycles for ScriptedApp {
    fn bootstrap(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.perform(Phase::Bootstrap))
    }

    fn mount(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.perform(Phase::Mount))
    }

    fn unmount(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.perform(Phase::Unmount))
    }

    fn unload(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.perform(Phase::Unload))
    }
}
