//! # Switchyard Runtime
//!
//! The reroute orchestrator and a reference application registry.
//!
//! ## Core Components
//!
//! - **Orchestrator**: serializes environment changes into passes; at most one
//!   pass drives lifecycles at a time, and requests arriving mid-pass are
//!   batched into the next one
//! - **Pass**: deactivates leaving apps, then activates arriving ones, with a
//!   gate that keeps every mount behind every unmount
//! - **`AppRegistry`**: in-memory [`Registry`](switchyard_core::Registry) and
//!   [`LifecycleRunner`](switchyard_core::LifecycleRunner) with phase budgets
//! - **Config / Metrics**: `SWITCHYARD_*` environment configuration and
//!   Prometheus recording
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use switchyard_runtime::{AppRegistry, Orchestrator};
//!
//! let registry = AppRegistry::new(navigator.clone());
//! registry.register_application("nav", nav_loader, |_| true)?;
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(registry.clone()),
//!     Arc::new(registry),
//!     sink,
//!     navigator,
//! );
//! let mounted = orchestrator.start().await?;
//! ```

/// Runtime configuration and `SWITCHYARD_*` environment loading
pub mod config;

/// Prometheus metrics for observability
pub mod metrics;

/// Reference registry and lifecycle runner
pub mod registry;

mod orchestrator;
mod pass;
mod scheduler;

/// Error types for reroute requests
pub mod error {
    use switchyard_core::{AppName, LifecycleError};
    use thiserror::Error;

    /// Why a reroute request did not settle with a mounted set.
    ///
    /// `Clone` because every waiter of a failed pass receives the same error.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum RerouteError {
        /// A lifecycle phase failed during the pass
        ///
        /// The first failure in completion order; deactivation failures take
        /// precedence over activation failures.
        #[error(transparent)]
        Lifecycle(#[from] LifecycleError),

        /// The named application is not registered
        #[error("application '{0}' is not registered")]
        UnknownApplication(AppName),

        /// The pass driving this request went away without settling it
        ///
        /// Only happens when the runtime shuts down mid-pass.
        #[error("reroute pass ended without settling the request")]
        Abandoned,
    }
}

pub use config::{ConfigError, LifecycleTimeouts, SwitchyardConfig, TimeoutConfig};
pub use error::RerouteError;
pub use orchestrator::Orchestrator;
pub use registry::{path_prefix, ActivityFn, AppLifecycles, AppLoader, AppRegistry, RegistryError};
pub use scheduler::{MountedApps, RerouteResult};
