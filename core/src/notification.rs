//! Lifecycle notifications and the sink that delivers them.
//!
//! Every full pass emits a fixed sequence of notifications:
//!
//! ```text
//! before-app-change | before-no-app-change
//!   → before-routing-event
//!   → before-mount-routing-event      (after deactivation settled)
//!   → app-change | no-app-change      (after activation settled)
//!   → routing-event
//! ```
//!
//! Each carries a [`ChangeDetail`], built once through [`ChangeDetailBuilder`]
//! and never mutated after.

use crate::app::AppName;
use crate::environment::{EnvironmentEvent, Location};
use crate::status::AppStatus;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The fixed set of notifications a pass emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEventKind {
    /// Before any phase work, when at least one app changes
    BeforeAppChange,
    /// Before any phase work, when no app changes
    BeforeNoAppChange,
    /// Before any phase work, after the app-change variant
    BeforeRoutingEvent,
    /// After deactivation settled, before any mount starts
    BeforeMountRoutingEvent,
    /// After all work settled, when at least one app changed
    AppChange,
    /// After all work settled, when no app changed
    NoAppChange,
    /// Last notification of a pass
    RoutingEvent,
}

impl ChangeEventKind {
    /// The notification's wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeAppChange => "before-app-change",
            Self::BeforeNoAppChange => "before-no-app-change",
            Self::BeforeRoutingEvent => "before-routing-event",
            Self::BeforeMountRoutingEvent => "before-mount-routing-event",
            Self::AppChange => "app-change",
            Self::NoAppChange => "no-app-change",
            Self::RoutingEvent => "routing-event",
        }
    }

    /// The first notification of a pass with `total_changes` changes.
    #[must_use]
    pub const fn before_change(total_changes: usize) -> Self {
        if total_changes == 0 {
            Self::BeforeNoAppChange
        } else {
            Self::BeforeAppChange
        }
    }

    /// The after-change notification of a pass with `total_changes` changes.
    #[must_use]
    pub const fn after_change(total_changes: usize) -> Self {
        if total_changes == 0 {
            Self::NoAppChange
        } else {
            Self::AppChange
        }
    }
}

impl fmt::Display for ChangeEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload carried by every notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDetail {
    /// Reported status per changed app
    pub new_app_statuses: BTreeMap<AppName, AppStatus>,
    /// Changed app names grouped by reported status
    pub apps_by_new_status: BTreeMap<AppStatus, Vec<AppName>>,
    /// Number of apps that changed in the pass
    pub total_app_changes: usize,
    /// The environment event that triggered the pass, if any
    pub original_event: Option<EnvironmentEvent>,
    /// Location before the pass
    pub old_location: Location,
    /// Location the pass routes to
    pub new_location: Location,
}

impl ChangeDetail {
    /// Start building a detail.
    #[must_use]
    pub fn builder(total_app_changes: usize) -> ChangeDetailBuilder {
        ChangeDetailBuilder::new(total_app_changes)
    }

    /// Names reported with `status`, in insertion order.
    #[must_use]
    pub fn apps_with_status(&self, status: AppStatus) -> &[AppName] {
        self.apps_by_new_status
            .get(&status)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Serialize the detail as the JSON object handed to host listeners.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Builds a [`ChangeDetail`] from individual app reports.
///
/// The status buckets always contain the four reported groups (activated,
/// deactivated, unloaded, broken), even when empty. Any other reported status
/// gets its own bucket.
#[derive(Debug, Clone)]
pub struct ChangeDetailBuilder {
    new_app_statuses: BTreeMap<AppName, AppStatus>,
    apps_by_new_status: BTreeMap<AppStatus, Vec<AppName>>,
    total_app_changes: usize,
    original_event: Option<EnvironmentEvent>,
    old_location: Location,
    new_location: Location,
}

impl ChangeDetailBuilder {
    /// Buckets present in every detail.
    pub const BUCKETS: [AppStatus; 4] = [
        AppStatus::Mounted,
        AppStatus::NotMounted,
        AppStatus::NotLoaded,
        AppStatus::SkipBecauseBroken,
    ];

    fn new(total_app_changes: usize) -> Self {
        Self {
            new_app_statuses: BTreeMap::new(),
            apps_by_new_status: Self::BUCKETS
                .into_iter()
                .map(|status| (status, Vec::new()))
                .collect(),
            total_app_changes,
            original_event: None,
            old_location: Location::default(),
            new_location: Location::default(),
        }
    }

    /// Report `app` with `status`.
    #[must_use]
    pub fn app(mut self, app: AppName, status: AppStatus) -> Self {
        self.new_app_statuses.insert(app.clone(), status);
        self.apps_by_new_status.entry(status).or_default().push(app);
        self
    }

    /// Report every app in `apps` with the same `status`.
    #[must_use]
    pub fn apps<I>(self, apps: I, status: AppStatus) -> Self
    where
        I: IntoIterator<Item = AppName>,
    {
        apps.into_iter().fold(self, |builder, app| builder.app(app, status))
    }

    /// Attach the triggering environment event.
    #[must_use]
    pub fn original_event(mut self, event: Option<EnvironmentEvent>) -> Self {
        self.original_event = event;
        self
    }

    /// Attach the locations the pass routes between.
    #[must_use]
    pub fn locations(mut self, old_location: Location, new_location: Location) -> Self {
        self.old_location = old_location;
        self.new_location = new_location;
        self
    }

    /// Finish the detail.
    #[must_use]
    pub fn build(self) -> ChangeDetail {
        ChangeDetail {
            new_app_statuses: self.new_app_statuses,
            apps_by_new_status: self.apps_by_new_status,
            total_app_changes: self.total_app_changes,
            original_event: self.original_event,
            old_location: self.old_location,
            new_location: self.new_location,
        }
    }
}

/// Errors raised by notification subscribers or replayed listeners.
///
/// These never interrupt a pass; the orchestrator reschedules them to surface
/// outside its own control flow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// A subscriber to a lifecycle notification failed
    #[error("subscriber to '{kind}' failed: {reason}")]
    SubscriberFailed {
        /// The notification being delivered
        kind: ChangeEventKind,
        /// Failure description
        reason: String,
    },

    /// A replayed environment listener failed
    #[error("replayed '{event}' listener failed: {reason}")]
    ListenerFailed {
        /// Kind of the environment event being replayed
        event: String,
        /// Failure description
        reason: String,
    },
}

/// Delivers lifecycle notifications to the host environment.
///
/// # Contract
///
/// - `emit` delivers synchronously and in call order.
/// - `replay_listeners` hands a captured environment event to listeners that
///   were deferred while the pass ran.
/// - `navigation_cancel_requested` is consulted once per full pass, right after
///   `before-routing-event`; returning `true` cancels the navigation.
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::SubscriberFailed`] if a subscriber failed.
    fn emit(&self, kind: ChangeEventKind, detail: &ChangeDetail) -> Result<(), NotificationError>;

    /// Replay deferred environment listeners for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::ListenerFailed`] if a listener failed.
    fn replay_listeners(&self, event: &EnvironmentEvent) -> Result<(), NotificationError>;

    /// Whether a `before-routing-event` subscriber asked to cancel the navigation.
    fn navigation_cancel_requested(&self, _detail: &ChangeDetail) -> BoxFuture<'_, bool> {
        Box::pin(futures::future::ready(false))
    }
}
