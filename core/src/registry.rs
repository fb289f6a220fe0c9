//! Application registry port and per-pass transition groups.

use crate::app::{AppHandle, AppName};
use crate::status::AppStatus;

/// The four ordered groups of applications that must change in a pass.
///
/// Computed fresh from the registry at the start of every pass and never
/// mutated afterwards. The groups are disjoint, except that an app may appear
/// in both `to_load` and `to_mount`; the orchestrator activates such an app
/// only once, through the loading stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionGroups {
    /// Loaded but idle apps that were marked for unloading and are not desired
    pub to_unload: Vec<AppHandle>,
    /// Mounted apps that are no longer desired
    pub to_unmount: Vec<AppHandle>,
    /// Desired apps whose code is not loaded yet
    pub to_load: Vec<AppHandle>,
    /// Desired apps that are loaded but not mounted
    pub to_mount: Vec<AppHandle>,
}

impl TransitionGroups {
    /// Whether no app needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_unload.is_empty()
            && self.to_unmount.is_empty()
            && self.to_load.is_empty()
            && self.to_mount.is_empty()
    }

    /// Every app that changes in the pass, in notification order:
    /// unload, load, unmount, mount.
    #[must_use]
    pub fn changed_apps(&self) -> Vec<AppHandle> {
        self.to_unload
            .iter()
            .chain(&self.to_load)
            .chain(&self.to_unmount)
            .chain(&self.to_mount)
            .cloned()
            .collect()
    }

    /// Number of app changes reported to listeners.
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.to_unload.len() + self.to_load.len() + self.to_unmount.len() + self.to_mount.len()
    }

    /// Apps to mount that are not already covered by the loading stream.
    pub fn mount_only(&self) -> impl Iterator<Item = &AppHandle> {
        self.to_mount
            .iter()
            .filter(move |app| !self.to_load.contains(app))
    }
}

/// Application registry port.
///
/// Holds each application's status and evaluates whether it should currently
/// be active. Reads are synchronous: the orchestrator computes a pass's groups
/// and re-validates activation without suspending.
pub trait Registry: Send + Sync {
    /// Classify all registered applications into this pass's transition groups.
    fn classify(&self) -> TransitionGroups;

    /// Current status of the named application, if registered.
    fn status(&self, name: &AppName) -> Option<AppStatus>;

    /// Whether the application should be active in the current environment.
    fn desired_active(&self, app: &AppHandle) -> bool;

    /// Names of every application currently `MOUNTED`.
    fn mounted_names(&self) -> Vec<AppName>;

    /// Mark the named application so its next unload releases its code.
    ///
    /// Returns `false` if the application is unknown. Registries that never
    /// unload keep the default.
    fn mark_for_unload(&self, _name: &AppName) -> bool {
        false
    }

    /// Resolve a handle to its name.
    fn name(&self, app: &AppHandle) -> AppName {
        app.name().clone()
    }
}
