//! # Switchyard Core
//!
//! Core types and collaborator ports for the Switchyard application lifecycle
//! orchestrator.
//!
//! Switchyard coordinates a dynamic set of independently deployed applications
//! that share one runtime surface. Each application moves through
//! load → bootstrap → mount → unmount → unload as the environment changes
//! (typically on navigation). This crate defines the vocabulary; the
//! orchestrator itself lives in `switchyard-runtime`.
//!
//! ## Core Concepts
//!
//! - **Status**: [`AppStatus`], a closed state machine with an explicit
//!   transition table per [`Phase`]
//! - **Handle**: [`AppHandle`], an opaque reference carrying the app's [`AppName`]
//! - **Registry**: [`Registry`], which owns statuses, decides which apps should
//!   be active, and classifies apps into [`TransitionGroups`]
//! - **Runner**: [`LifecycleRunner`], which performs phases and advances statuses
//! - **Sink**: [`NotificationSink`], which delivers ordered lifecycle
//!   notifications and replays deferred environment listeners
//! - **Environment**: [`Navigator`] and [`Clock`], injected environment state
//!
//! ## Example
//!
//! ```ignore
//! use switchyard_core::{Registry, TransitionGroups};
//!
//! fn log_groups(registry: &dyn Registry) {
//!     let groups: TransitionGroups = registry.classify();
//!     println!("{} apps change", groups.total_changes());
//! }
//! ```

pub mod app;
pub mod environment;
pub mod lifecycle;
pub mod notification;
pub mod registry;
pub mod status;

// Re-export commonly used types
pub use app::{AppHandle, AppName};
pub use chrono::{DateTime, Utc};
pub use environment::{Clock, EnvironmentEvent, Location, Navigator, SystemClock};
pub use lifecycle::{LifecycleError, LifecycleRunner, PhaseFuture};
pub use notification::{
    ChangeDetail, ChangeDetailBuilder, ChangeEventKind, NotificationError, NotificationSink,
};
pub use registry::{Registry, TransitionGroups};
pub use status::{AppStatus, Phase, TransitionError};
