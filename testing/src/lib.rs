//! # Switchyard Testing
//!
//! Testing utilities and test doubles for Switchyard.
//!
//! This crate provides:
//! - Mock implementations of the environment ports ([`ManualClock`],
//!   [`InMemoryNavigator`])
//! - A [`RecordingSink`] and a shared [`CallLog`] for ordering assertions
//! - [`ScriptedApp`], an application whose phase timing and failures are set
//!   by the test
//! - [`TestHarness`], which wires all of the above to a real registry and
//!   orchestrator
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use switchyard_testing::TestHarness;
//! use switchyard_runtime::path_prefix;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_navigation_mounts_app() {
//!     let harness = TestHarness::new("/");
//!     harness.register(harness.app("shop"), path_prefix("/shop")).unwrap();
//!     harness.orchestrator.start().await.unwrap();
//!
//!     harness.navigate("/shop");
//!     let mounted = harness.orchestrator.trigger_change().await.unwrap();
//!     assert_eq!(mounted, vec!["shop".into()]);
//! }
//! ```

mod harness;
mod log;
mod scripted;
mod sink;

pub use harness::TestHarness;
pub use log::{CallLog, LogEntry};
pub use scripted::{PhaseScript, ScriptedApp};
pub use sink::RecordingSink;

/// Mock implementations of environment ports.
pub mod mocks {
    use chrono::{DateTime, Utc};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;
    use switchyard_core::{Clock, Location, Navigator};

    /// Clock that only moves when told to.
    ///
    /// # Example
    ///
    /// ```
    /// use switchyard_testing::mocks::test_clock;
    /// use switchyard_core::Clock;
    /// use std::time::Duration;
    ///
    /// let clock = test_clock();
    /// let before = clock.now();
    /// assert_eq!(clock.now(), before);
    ///
    /// clock.advance(Duration::from_millis(200));
    /// assert_eq!((clock.now() - before).num_milliseconds(), 200);
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
            self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let by = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
            *self.lock() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.lock()
        }
    }

    /// A manual clock stopped at 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn test_clock() -> ManualClock {
        ManualClock::new(DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }

    #[derive(Debug)]
    struct NavigatorState {
        location: Location,
        restores: Vec<Location>,
    }

    /// Navigator backed by a single mutable location.
    #[derive(Debug, Clone)]
    pub struct InMemoryNavigator {
        state: Arc<Mutex<NavigatorState>>,
    }

    impl InMemoryNavigator {
        /// Create a navigator at `location`.
        #[must_use]
        pub fn new(location: impl Into<Location>) -> Self {
            Self {
                state: Arc::new(Mutex::new(NavigatorState {
                    location: location.into(),
                    restores: Vec::new(),
                })),
            }
        }

        fn lock(&self) -> MutexGuard<'_, NavigatorState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Move to `location` (the host's side of a navigation).
        pub fn navigate(&self, location: impl Into<Location>) {
            self.lock().location = location.into();
        }

        /// Locations restored after canceled navigations, in order.
        #[must_use]
        pub fn restores(&self) -> Vec<Location> {
            self.lock().restores.clone()
        }
    }

    impl Navigator for InMemoryNavigator {
        fn current_location(&self) -> Location {
            self.lock().location.clone()
        }

        fn restore_location(&self, location: &Location) {
            let mut state = self.lock();
            state.location = location.clone();
            state.restores.push(location.clone());
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a test-friendly tracing subscriber once per process.
    ///
    /// Honors `RUST_LOG`; later calls are no-ops.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing strategies for domain types.
pub mod properties {
    use proptest::prelude::*;
    use switchyard_core::{AppName, AppStatus, Location, Phase};

    /// Any application status.
    pub fn app_status() -> impl Strategy<Value = AppStatus> {
        proptest::sample::select(AppStatus::ALL.to_vec())
    }

    /// Any lifecycle phase.
    pub fn phase() -> impl Strategy<Value = Phase> {
        proptest::sample::select(Phase::ALL.to_vec())
    }

    /// A short kebab-case application name.
    pub fn app_name() -> impl Strategy<Value = AppName> {
        "[a-z][a-z0-9-]{0,11}".prop_map(AppName::new)
    }

    /// A path-like location with up to three segments.
    pub fn location() -> impl Strategy<Value = Location> {
        prop::collection::vec("[a-z]{1,6}", 0..4)
            .prop_map(|segments| Location::new(format!("/{}", segments.join("/"))))
    }
}

pub use mocks::{test_clock, InMemoryNavigator, ManualClock};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchyard_core::{Clock, Location, Navigator};

    #[test]
    fn test_manual_clock_only_moves_when_advanced() {
        let clock = test_clock();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(1));
        assert_eq!((clock.now() - start).num_seconds(), 1);
    }

    #[test]
    fn test_navigator_records_restores() {
        let navigator = InMemoryNavigator::new("/a");
        navigator.navigate("/b");
        assert_eq!(navigator.current_location(), Location::new("/b"));

        navigator.restore_location(&Location::new("/a"));
        assert_eq!(navigator.current_location(), Location::new("/a"));
        assert_eq!(navigator.restores(), vec![Location::new("/a")]);
    }
}
