//! Lifecycle phase runner port.
//!
//! A [`LifecycleRunner`] performs one phase on one application and hands the
//! handle back. Runners own validation, timeouts, and status bookkeeping: when
//! a phase fails, the runner moves the application to its failure status
//! *before* returning the error. The orchestrator only sequences calls.

use crate::app::{AppHandle, AppName};
use crate::status::Phase;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Future returned by every lifecycle phase.
pub type PhaseFuture<'a> = Pin<Box<dyn Future<Output = Result<AppHandle, LifecycleError>> + Send + 'a>>;

/// Errors produced by a lifecycle phase.
///
/// `Clone` because a single failure is fanned out to every request waiting on
/// the pass that observed it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The application's hook reported a failure
    #[error("application '{app}' failed to {phase}: {reason}")]
    PhaseFailed {
        /// Application that failed
        app: AppName,
        /// Phase that failed
        phase: Phase,
        /// Failure description from the hook
        reason: String,
    },

    /// The hook did not settle within its time budget
    #[error("application '{app}' did not {phase} within {millis}ms")]
    Timeout {
        /// Application that timed out
        app: AppName,
        /// Phase that timed out
        phase: Phase,
        /// Configured budget in milliseconds
        millis: u64,
    },

    /// The loaded code did not provide usable lifecycle hooks
    #[error("application '{app}' exported invalid lifecycles: {reason}")]
    InvalidLifecycles {
        /// Application with invalid lifecycles
        app: AppName,
        /// What was wrong
        reason: String,
    },

    /// The handle refers to an application the runner does not know
    #[error("application '{0}' is not registered")]
    NotRegistered(AppName),
}

impl LifecycleError {
    /// The application the error concerns.
    #[must_use]
    pub fn app(&self) -> &AppName {
        match self {
            Self::PhaseFailed { app, .. }
            | Self::Timeout { app, .. }
            | Self::InvalidLifecycles { app, .. }
            | Self::NotRegistered(app) => app,
        }
    }

    /// Stable error code for structured logging.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PhaseFailed { .. } => "phase_failed",
            Self::Timeout { .. } => "phase_timeout",
            Self::InvalidLifecycles { .. } => "invalid_lifecycles",
            Self::NotRegistered(_) => "not_registered",
        }
    }
}

/// Performs lifecycle phases on applications.
///
/// # Contract
///
/// - Each method resolves to the (possibly status-advanced) handle, or rejects.
/// - A phase requested from a status outside its predecessors is a no-op that
///   resolves to the unchanged handle.
/// - On rejection the runner has already moved the app to the phase's failure
///   status (see [`Phase::failure`]).
/// - `unload` of an application that was not marked for unloading is a no-op.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so runners can be shared as
/// `Arc<dyn LifecycleRunner>` and driven from a spawned pass.
pub trait LifecycleRunner: Send + Sync {
    /// Fetch code and hooks (`NOT_LOADED` → `LOADING_SOURCE_CODE` → `NOT_BOOTSTRAPPED`).
    fn load(&self, app: AppHandle) -> PhaseFuture<'_>;

    /// One-time initialization (`NOT_BOOTSTRAPPED` → `BOOTSTRAPPING` → `NOT_MOUNTED`).
    fn bootstrap(&self, app: AppHandle) -> PhaseFuture<'_>;

    /// Activate (`NOT_MOUNTED` → `MOUNTING` → `MOUNTED`).
    fn mount(&self, app: AppHandle) -> PhaseFuture<'_>;

    /// Deactivate (`MOUNTED` → `UNMOUNTING` → `NOT_MOUNTED`).
    fn unmount(&self, app: AppHandle) -> PhaseFuture<'_>;

    /// Release code and hooks (`NOT_MOUNTED` → `UNLOADING` → `NOT_LOADED`).
    fn unload(&self, app: AppHandle) -> PhaseFuture<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_app() {
        let err = LifecycleError::PhaseFailed {
            app: AppName::new("checkout"),
            phase: Phase::Mount,
            reason: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "application 'checkout' failed to mount: boom");
        assert_eq!(err.app(), &"checkout");
        assert_eq!(err.code(), "phase_failed");
    }

    #[test]
    fn test_timeout_message() {
        let err = LifecycleError::Timeout {
            app: AppName::new("a"),
            phase: Phase::Unmount,
            millis: 3000,
        };
        assert_eq!(err.to_string(), "application 'a' did not unmount within 3000ms");
        assert_eq!(err.code(), "phase_timeout");
    }
}
