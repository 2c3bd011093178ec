//! Cooperative, tick-driven action scheduler for gameplay sequencing.
//!
//! Actions are small units of work (play an animation, wait half a second,
//! wait for a tap) composed into graphs: chains where one action waits for its
//! parent to finish, continuations that mirror a child, and fan-in sets that
//! wait for all, any, or `n` of several children.
//!
//! - **Single-threaded**: every transition runs synchronously on the caller
//! - **Tick-driven**: leaves that need time are polled by [`Scheduler::update`]
//! - **Explicit context**: all state lives in a [`Scheduler`] value
//! - **Strict transitions**: incoherent calls return [`ActionError`]
//!
//! # Architecture
//!
//! - [`Scheduler`]: owns the action arena and performs every transition
//! - [`Leaf`]: contract for engine-specific effects
//! - [`ActionBuilder`]: configures and spawns actions
//! - [`Registry`]: running actions, used for polling and bulk cancellation
//! - [`Scene`]: liveness handle for a group of actions
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use action_graph::{ActionState, Delay, FanInSet, Manual, Scheduler};
//!
//! let mut scheduler = Scheduler::new();
//! let timeout = scheduler.leaf("timeout", Delay::new(Duration::from_millis(50))).spawn()?;
//! let tap = scheduler.leaf("tap", Manual).spawn()?;
//! let race = scheduler.wait_any("tap or timeout", FanInSet::of([timeout, tap])).spawn()?;
//!
//! scheduler.run(race)?;
//! scheduler.complete(tap)?;
//!
//! assert_eq!(scheduler.state(race)?, ActionState::Finished);
//! assert_eq!(scheduler.state(timeout)?, ActionState::Running);
//! # Ok::<(), action_graph::ActionError>(())
//! ```

pub mod action;
pub mod builder;
pub mod config;
pub mod error;
pub mod leaf;
pub mod registry;
pub mod scene;
pub mod scheduler;
pub mod status;

mod continuation;
mod fan_in;

// Re-export core types for ergonomic API
pub use action::{ActionId, ActionSnapshot, Callback, CallbackId, Event, Factory};
pub use builder::ActionBuilder;
pub use config::{SchedulerConfig, UnreachablePolicy};
pub use error::{ActionError, Result};
pub use fan_in::{FanInCounts, FanInLimit, FanInSet};
pub use leaf::{Delay, Invoke, Leaf, Manual, WaitUntil};
pub use registry::Registry;
pub use scene::{Scene, SceneId};
pub use scheduler::Scheduler;
pub use status::{ActionState, Operation, Progress};
