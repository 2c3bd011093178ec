//! Demo configuration structures and loaders.
use std::env;
use std::time::Duration;

use action_graph::SchedulerConfig;

/// Configuration for the demo tick loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoConfig {
    pub scheduler: SchedulerConfig,
    pub tick: Duration,
    pub max_ticks: u32,
    /// Tick on which the simulated player taps, if any.
    pub tap_at: Option<u32>,
}

impl DemoConfig {
    pub const DEFAULT_TICK_MS: u64 = 16;
    pub const DEFAULT_MAX_TICKS: u32 = 600;

    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `DEMO_TICK_MS` - Tick length in milliseconds (default: 16)
    /// - `DEMO_MAX_TICKS` - Ticks before the loop gives up (default: 600)
    /// - `DEMO_TAP_AT` - Tick on which to simulate a tap (default: never)
    /// - `ACTION_GRAPH_*` - see [`SchedulerConfig::from_env`]
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            scheduler: SchedulerConfig::from_vars(&lookup),
            ..Self::default()
        };

        if let Some(ms) = read::<u64>(lookup("DEMO_TICK_MS")) {
            config.tick = Duration::from_millis(ms.max(1));
        }

        if let Some(ticks) = read::<u32>(lookup("DEMO_MAX_TICKS")) {
            config.max_ticks = ticks.max(1);
        }

        config.tap_at = read::<u32>(lookup("DEMO_TAP_AT"));

        config
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            tick: Duration::from_millis(Self::DEFAULT_TICK_MS),
            max_ticks: Self::DEFAULT_MAX_TICKS,
            tap_at: None,
        }
    }
}

fn read<T>(raw: Option<String>) -> Option<T>
where
    T: std::str::FromStr,
{
    raw?.trim().parse().ok()
}
