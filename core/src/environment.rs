//! Environment ports - time, location and inbound environment events.
//!
//! All environment state the orchestrator reads is abstracted behind traits and
//! injected, so hosts can back them with a browser history, a router, a test
//! double, or anything else that has a notion of "where are we now".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```ignore
/// // Production - uses system clock
/// struct SystemClock;
/// impl Clock for SystemClock {
///     fn now(&self) -> DateTime<Utc> {
///         Utc::now()
///     }
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Where the host environment currently is (a URL, a route path, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    /// Create a location.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// The location as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the location starts with `prefix`.
    ///
    /// Convenience for the common prefix-style activity predicate.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(location: &str) -> Self {
        Self::new(location)
    }
}

/// Source of the current location.
///
/// The orchestrator reads the location at the start of every full pass and
/// restores the previous one when a navigation is canceled.
pub trait Navigator: Send + Sync {
    /// The location the environment is at right now.
    fn current_location(&self) -> Location;

    /// Put the environment back at `location` without producing a new
    /// environment-change event.
    fn restore_location(&self, location: &Location);
}

/// An environment change that triggered a reroute (a navigation, a history
/// pop, a hash change, ...).
///
/// The orchestrator does not interpret the payload. It hands the event back to
/// the notification sink when deferred listeners are replayed and includes it
/// in notification payloads as `originalEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentEvent {
    /// Event type, e.g. `"popstate"` or `"hashchange"`
    pub kind: String,
    /// Arbitrary event data
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EnvironmentEvent {
    /// Create an event with an empty payload.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
