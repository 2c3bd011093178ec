//! Action graph demo binary.
//!
//! Builds a small cutscene, drives it from a fixed-rate tick loop and prints
//! the final scheduler snapshot as JSON on stdout. Logs go to stderr.
//!
//! # Examples
//!
//! ```bash
//! # Play through, simulating a tap on tick 30
//! DEMO_TAP_AT=30 RUST_LOG=action_graph=debug cargo run -p action-graph-demo
//! ```

mod config;
mod cutscene;

use action_graph::{ActionState, Scheduler};
use anyhow::Result;
use config::DemoConfig;
use cutscene::Cutscene;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (silently ignore if not found)
    dotenvy::dotenv().ok();

    setup_logging();

    let config = DemoConfig::from_env();
    info!(
        tick_ms = config.tick.as_millis() as u64,
        max_ticks = config.max_ticks,
        policy = %config.scheduler.unreachable_policy,
        "Starting demo"
    );

    let mut scheduler = Scheduler::with_config(config.scheduler.clone());
    let cutscene = Cutscene::build(&mut scheduler)?;
    scheduler.run(cutscene.ending)?;

    let mut interval = tokio::time::interval(config.tick);
    let mut ticks = 0;

    while !scheduler.state(cutscene.ending)?.is_terminal() && ticks < config.max_ticks {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, tearing down");
                break;
            }
        }
        ticks += 1;

        if config.tap_at == Some(ticks) && scheduler.state(cutscene.tap)? == ActionState::Running {
            info!(tick = ticks, "Simulated tap");
            scheduler.complete(cutscene.tap)?;
        }

        scheduler.update(config.tick);
    }

    let outcome = scheduler.state(cutscene.ending)?;
    let cancelled = scheduler.tear_down_scene(&cutscene.scene);
    info!(ticks, %outcome, cancelled, "Demo finished");

    println!("{}", serde_json::to_string_pretty(&scheduler.snapshot())?);
    Ok(())
}

/// Setup logging to stderr, filtered by `RUST_LOG`.
fn setup_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
