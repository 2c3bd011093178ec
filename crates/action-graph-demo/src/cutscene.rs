//! Sample cutscene graph.
//!
//! ```text
//! fade in ─▶ title ─▶ hold (timeout | tap) ─▶ outro (fade out)
//! ```

use std::time::Duration;

use action_graph::{ActionId, Delay, FanInSet, Invoke, Manual, Result, Scene, Scheduler};
use tracing::info;

pub struct Cutscene {
    pub scene: Scene,
    /// Player input the tick loop completes from outside.
    pub tap: ActionId,
    /// Last unit of the chain. Running it starts the whole cutscene.
    pub ending: ActionId,
}

impl Cutscene {
    pub fn build(scheduler: &mut Scheduler) -> Result<Self> {
        let scene = scheduler.open_scene("intro cutscene");

        let fade_in = scheduler
            .leaf("fade in", Delay::new(Duration::from_millis(250)))
            .in_scene(&scene)
            .skippable(true)
            .spawn()?;

        let title = scheduler
            .leaf("title", Invoke::new(|| info!("Title card shown")))
            .after(fade_in)
            .in_scene(&scene)
            .spawn()?;

        let timeout = scheduler
            .leaf("timeout", Delay::new(Duration::from_secs(2)))
            .in_scene(&scene)
            .spawn()?;
        let tap = scheduler.leaf("tap", Manual).in_scene(&scene).spawn()?;
        let hold = scheduler
            .wait_any("hold", FanInSet::of([timeout, tap]))
            .after(title)
            .in_scene(&scene)
            .skippable(true)
            .spawn()?;

        let outro_scene = scene.clone();
        let ending = scheduler
            .continuation_with("outro", move |s| {
                s.leaf("fade out", Delay::new(Duration::from_millis(250)))
                    .in_scene(&outro_scene)
                    .spawn()
                    .ok()
            })
            .after(hold)
            .in_scene(&scene)
            .spawn()?;

        Ok(Self { scene, tap, ending })
    }
}
