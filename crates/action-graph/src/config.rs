//! Scheduler configuration and loaders.
use std::env;

/// What a fan-in set does once its completion limit can no longer be reached
/// because too many children were cancelled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum UnreachablePolicy {
    /// Keep waiting. Cancelled children never count toward the limit, so the
    /// set may stay `Running` until it is cancelled from outside.
    #[default]
    Wait,

    /// Abort the set as soon as `slots - cancelled < limit`.
    Abort,
}

/// Configuration for a [`Scheduler`](crate::Scheduler).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchedulerConfig {
    /// Initial number of arena slots reserved.
    pub capacity: usize,

    /// Policy applied to fan-in sets that do not pick one explicitly.
    pub unreachable_policy: UnreachablePolicy,
}

impl SchedulerConfig {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub const fn new(capacity: usize, unreachable_policy: UnreachablePolicy) -> Self {
        Self {
            capacity,
            unreachable_policy,
        }
    }

    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `ACTION_GRAPH_CAPACITY` - Initial arena capacity (default: 64)
    /// - `ACTION_GRAPH_ABORT_UNREACHABLE` - Abort fan-in sets whose limit became
    ///   unreachable (default: false)
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads through `lookup`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(capacity) = parse::<usize>(lookup("ACTION_GRAPH_CAPACITY")) {
            config.capacity = capacity.max(1);
        }

        if let Some(raw) = lookup("ACTION_GRAPH_ABORT_UNREACHABLE") {
            // Setting the variable without a value counts as "true"
            let abort = raw.trim().is_empty() || parse::<bool>(Some(raw)).unwrap_or(false);
            if abort {
                config.unreachable_policy = UnreachablePolicy::Abort;
            }
        }

        config
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, UnreachablePolicy::Wait)
    }
}

fn parse<T>(raw: Option<String>) -> Option<T>
where
    T: std::str::FromStr,
{
    raw?.trim().parse().ok()
}
