//! Application statuses and the lifecycle transition table.
//!
//! Every registered application is always in exactly one [`AppStatus`]. Statuses
//! only move when a lifecycle [`Phase`] runs, and each phase declares which
//! statuses it may start from, which status it holds while running, and where
//! it lands on success or failure.
//!
//! ```text
//! NOT_LOADED ──load──▶ LOADING_SOURCE_CODE ──▶ NOT_BOOTSTRAPPED ──bootstrap──▶ BOOTSTRAPPING
//!     ▲                        │                                                   │
//!     │                        ▼                                                   ▼
//!  UNLOADING ◀──unload── LOAD_ERROR            MOUNTED ◀── MOUNTING ◀──mount── NOT_MOUNTED
//!                                                 │                               ▲
//!                                                 └──unmount──▶ UNMOUNTING ───────┘
//! ```
//!
//! The table is enforced at the registry boundary. The orchestrator never writes
//! a status; it only asks a runner to perform a phase.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The closed set of statuses an application can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    /// Registered, code not fetched yet
    NotLoaded,
    /// Code fetch in progress
    LoadingSourceCode,
    /// Code fetch failed; may be retried later
    LoadError,
    /// Code loaded, bootstrap not yet run
    NotBootstrapped,
    /// Bootstrap hook running
    Bootstrapping,
    /// Bootstrap failed (reported by runners that distinguish it)
    BootstrapError,
    /// Bootstrapped and idle
    NotMounted,
    /// Mount hook running
    Mounting,
    /// Active
    Mounted,
    /// Update hook running on a mounted app
    Updating,
    /// Unmount hook running
    Unmounting,
    /// Unmount failed (reported by runners that distinguish it)
    UnmountError,
    /// Unload hook running
    Unloading,
    /// A lifecycle call failed; excluded from automatic transitions
    SkipBecauseBroken,
}

impl AppStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 14] = [
        Self::NotLoaded,
        Self::LoadingSourceCode,
        Self::LoadError,
        Self::NotBootstrapped,
        Self::Bootstrapping,
        Self::BootstrapError,
        Self::NotMounted,
        Self::Mounting,
        Self::Mounted,
        Self::Updating,
        Self::Unmounting,
        Self::UnmountError,
        Self::Unloading,
        Self::SkipBecauseBroken,
    ];

    /// The canonical upper-case name (`"NOT_MOUNTED"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotLoaded => "NOT_LOADED",
            Self::LoadingSourceCode => "LOADING_SOURCE_CODE",
            Self::LoadError => "LOAD_ERROR",
            Self::NotBootstrapped => "NOT_BOOTSTRAPPED",
            Self::Bootstrapping => "BOOTSTRAPPING",
            Self::BootstrapError => "BOOTSTRAP_ERROR",
            Self::NotMounted => "NOT_MOUNTED",
            Self::Mounting => "MOUNTING",
            Self::Mounted => "MOUNTED",
            Self::Updating => "UPDATING",
            Self::Unmounting => "UNMOUNTING",
            Self::UnmountError => "UNMOUNT_ERROR",
            Self::Unloading => "UNLOADING",
            Self::SkipBecauseBroken => "SKIP_BECAUSE_BROKEN",
        }
    }

    /// Whether the app is currently active (mounted).
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Mounted)
    }

    /// Whether a lifecycle failure has taken the app out of rotation.
    #[must_use]
    pub const fn is_broken(self) -> bool {
        matches!(
            self,
            Self::SkipBecauseBroken | Self::BootstrapError | Self::UnmountError
        )
    }

    /// Whether the app's code has been fetched and its hooks are available.
    #[must_use]
    pub const fn is_loaded(self) -> bool {
        !matches!(
            self,
            Self::NotLoaded | Self::LoadingSourceCode | Self::LoadError
        )
    }

    /// Whether a phase is currently running for the app.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::LoadingSourceCode
                | Self::Bootstrapping
                | Self::Mounting
                | Self::Updating
                | Self::Unmounting
                | Self::Unloading
        )
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle phase a runner can perform on an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Fetch the application's code and lifecycle hooks
    Load,
    /// One-time initialization
    Bootstrap,
    /// Activate
    Mount,
    /// Deactivate
    Unmount,
    /// Release the code and hooks so the next load starts fresh
    Unload,
}

impl Phase {
    /// All phases in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Load,
        Self::Bootstrap,
        Self::Mount,
        Self::Unmount,
        Self::Unload,
    ];

    /// Lower-case phase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Bootstrap => "bootstrap",
            Self::Mount => "mount",
            Self::Unmount => "unmount",
            Self::Unload => "unload",
        }
    }

    /// Statuses this phase may start from.
    #[must_use]
    pub const fn predecessors(self) -> &'static [AppStatus] {
        match self {
            Self::Load => &[AppStatus::NotLoaded, AppStatus::LoadError],
            Self::Bootstrap => &[AppStatus::NotBootstrapped],
            Self::Mount => &[AppStatus::NotMounted],
            Self::Unmount => &[AppStatus::Mounted],
            Self::Unload => &[
                AppStatus::NotBootstrapped,
                AppStatus::NotMounted,
                AppStatus::LoadError,
            ],
        }
    }

    /// Status held while the phase runs.
    #[must_use]
    pub const fn in_progress(self) -> AppStatus {
        match self {
            Self::Load => AppStatus::LoadingSourceCode,
            Self::Bootstrap => AppStatus::Bootstrapping,
            Self::Mount => AppStatus::Mounting,
            Self::Unmount => AppStatus::Unmounting,
            Self::Unload => AppStatus::Unloading,
        }
    }

    /// Status reached when the phase succeeds.
    #[must_use]
    pub const fn success(self) -> AppStatus {
        match self {
            Self::Load => AppStatus::NotBootstrapped,
            Self::Bootstrap | Self::Unmount => AppStatus::NotMounted,
            Self::Mount => AppStatus::Mounted,
            Self::Unload => AppStatus::NotLoaded,
        }
    }

    /// Status reached when the phase's hook fails.
    ///
    /// A failed fetch lands in `LOAD_ERROR` so it can be retried; every other
    /// failure is terminal until the app is re-registered.
    #[must_use]
    pub const fn failure(self) -> AppStatus {
        match self {
            Self::Load => AppStatus::LoadError,
            _ => AppStatus::SkipBecauseBroken,
        }
    }

    /// Whether the phase may start from `status`.
    #[must_use]
    pub fn accepts(self, status: AppStatus) -> bool {
        self.predecessors().contains(&status)
    }

    /// Validate that the phase may start from `status`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if `status` is not a predecessor of this phase.
    pub fn check(self, status: AppStatus) -> Result<(), TransitionError> {
        if self.accepts(status) {
            Ok(())
        } else {
            Err(TransitionError {
                phase: self,
                from: status,
            })
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase was requested from a status it cannot start from.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {phase} an application in status {from}")]
pub struct TransitionError {
    /// The requested phase
    pub phase: Phase,
    /// The status the application was in
    pub from: AppStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_names_match_serde() {
        for status in AppStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.to_string(), status.as_str());
        }
    }

    #[test]
    fn test_only_mounted_is_active() {
        let active: Vec<_> = AppStatus::ALL.into_iter().filter(|s| s.is_active()).collect();
        assert_eq!(active, vec![AppStatus::Mounted]);
    }

    #[test]
    fn test_full_cycle_follows_table() {
        let mut status = AppStatus::NotLoaded;
        for phase in [Phase::Load, Phase::Bootstrap, Phase::Mount, Phase::Unmount, Phase::Unload] {
            assert!(phase.check(status).is_ok(), "{phase} from {status}");
            status = phase.success();
        }
        assert_eq!(status, AppStatus::NotLoaded);
    }

    #[test]
    fn test_hooks_are_available_only_after_load() {
        assert!(!AppStatus::NotLoaded.is_loaded());
        assert!(!AppStatus::LoadingSourceCode.is_loaded());
        assert!(!AppStatus::LoadError.is_loaded());
        assert!(AppStatus::NotBootstrapped.is_loaded());
        assert!(AppStatus::Mounted.is_loaded());
        assert!(Phase::Load.success().is_loaded());
        assert!(!Phase::Unload.success().is_loaded());
    }

    #[test]
    fn test_load_error_is_retryable_and_unloadable() {
        assert!(Phase::Load.accepts(AppStatus::LoadError));
        assert!(Phase::Unload.accepts(AppStatus::LoadError));
        assert_eq!(Phase::Load.failure(), AppStatus::LoadError);
    }

    #[test]
    fn test_mount_from_mounted_is_rejected() {
        let err = Phase::Mount.check(AppStatus::Mounted).unwrap_err();
        assert_eq!(err.from, AppStatus::Mounted);
        assert_eq!(err.to_string(), "cannot mount an application in status MOUNTED");
    }

    fn any_status() -> impl Strategy<Value = AppStatus> {
        proptest::sample::select(AppStatus::ALL.to_vec())
    }

    fn any_phase() -> impl Strategy<Value = Phase> {
        proptest::sample::select(Phase::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_no_phase_starts_from_in_progress_or_broken(status in any_status(), phase in any_phase()) {
            if status.is_in_progress() || status == AppStatus::SkipBecauseBroken {
                prop_assert!(!phase.accepts(status));
            }
        }

        #[test]
        fn prop_in_progress_status_is_never_a_resting_point(phase in any_phase()) {
            prop_assert!(phase.in_progress().is_in_progress());
            prop_assert!(!phase.success().is_in_progress());
            prop_assert!(!phase.failure().is_in_progress());
        }
    }
}
