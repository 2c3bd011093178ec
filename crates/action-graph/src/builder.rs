//! Builder utilities for ergonomic action graph construction.
//!
//! Every action is created through an [`ActionBuilder`] obtained from one of
//! the [`Scheduler`] entry points ([`leaf`](Scheduler::leaf),
//! [`continuation`](Scheduler::continuation), [`wait_all`](Scheduler::wait_all)
//! and friends). The free functions at the bottom are shorthands for the
//! common shapes: chains and fan-in sets over existing actions.

use tracing::debug;

use crate::action::{Action, ActionKind};
use crate::continuation::Continuation;
use crate::error::{ActionError, Result};
use crate::fan_in::{FanIn, FanInLimit, FanInSet};
use crate::{ActionId, Leaf, Scene, Scheduler, UnreachablePolicy};

enum Blueprint {
    Leaf(Box<dyn Leaf>),
    Continuation(Continuation),
    FanIn(FanInSet, FanInLimit),
}

/// Configures an action before it is inserted into the scheduler.
///
/// Nothing is created until [`spawn`](Self::spawn) is called.
#[must_use = "an action is only created by calling `spawn`"]
pub struct ActionBuilder<'s> {
    scheduler: &'s mut Scheduler,
    name: String,
    blueprint: Blueprint,
    parent: Option<ActionId>,
    scene: Option<Scene>,
    skippable: bool,
    policy: Option<UnreachablePolicy>,
}

impl<'s> ActionBuilder<'s> {
    fn new(scheduler: &'s mut Scheduler, name: String, blueprint: Blueprint) -> Self {
        Self {
            scheduler,
            name,
            blueprint,
            parent: None,
            scene: None,
            skippable: false,
            policy: None,
        }
    }

    /// Runs the action only after `parent` finishes.
    pub fn after(mut self, parent: ActionId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Binds the action to `scene`.
    pub fn in_scene(mut self, scene: &Scene) -> Self {
        self.scene = Some(scene.clone());
        self
    }

    pub fn skippable(mut self, skippable: bool) -> Self {
        self.skippable = skippable;
        self
    }

    /// Overrides the scheduler's default policy for this fan-in set.
    /// Ignored for other kinds.
    pub fn unreachable_policy(mut self, policy: UnreachablePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn abort_when_unreachable(self) -> Self {
        self.unreachable_policy(UnreachablePolicy::Abort)
    }

    /// Creates the action.
    ///
    /// # Errors
    ///
    /// - `UnknownAction` if the parent or a referenced child is not live
    /// - `MissingChildren` if a fan-in set has no children source
    /// - `LimitOutOfRange` if a fan-in limit exceeds its slot count
    pub fn spawn(self) -> Result<ActionId> {
        let Self {
            scheduler,
            name,
            blueprint,
            parent,
            scene,
            skippable,
            policy,
        } = self;

        if let Some(parent) = parent {
            scheduler.get(parent)?;
        }

        let kind = match blueprint {
            Blueprint::Leaf(leaf) => ActionKind::Leaf(leaf),
            Blueprint::Continuation(continuation) => {
                if let Some(child) = continuation.child() {
                    scheduler.get(child)?;
                }
                ActionKind::Continuation(continuation)
            }
            Blueprint::FanIn(set, limit) => {
                if let Some(missing) = set.children().find(|child| !scheduler.contains(*child)) {
                    return Err(ActionError::UnknownAction(missing));
                }
                let policy = policy.unwrap_or(scheduler.config().unreachable_policy);
                ActionKind::FanIn(FanIn::new(set, limit, policy)?)
            }
        };

        let mut action = Action::new(name, kind);
        action.skippable = skippable;
        action.scene = scene;
        let id = scheduler.insert(action);

        if let Some(parent) = parent {
            scheduler.link(id, parent)?;
        }

        debug!(
            target: "action_graph::scheduler",
            action = %id,
            name = scheduler.name(id).unwrap_or_default(),
            parent = ?parent,
            "Action created"
        );
        Ok(id)
    }
}

impl Scheduler {
    /// Starts building a leaf action.
    pub fn leaf(&mut self, name: impl Into<String>, leaf: impl Leaf + 'static) -> ActionBuilder<'_> {
        ActionBuilder::new(self, name.into(), Blueprint::Leaf(Box::new(leaf)))
    }

    /// Starts building a continuation over an existing action.
    pub fn continuation(&mut self, name: impl Into<String>, child: ActionId) -> ActionBuilder<'_> {
        let continuation = Continuation::wrapping(child);
        ActionBuilder::new(self, name.into(), Blueprint::Continuation(continuation))
    }

    /// Starts building a continuation whose child is produced on first run.
    pub fn continuation_with(
        &mut self,
        name: impl Into<String>,
        factory: impl FnOnce(&mut Scheduler) -> Option<ActionId> + 'static,
    ) -> ActionBuilder<'_> {
        let continuation = Continuation::deferred(Box::new(factory));
        ActionBuilder::new(self, name.into(), Blueprint::Continuation(continuation))
    }

    /// Starts building a fan-in set with an explicit limit.
    pub fn fan_in(
        &mut self,
        name: impl Into<String>,
        set: FanInSet,
        limit: FanInLimit,
    ) -> ActionBuilder<'_> {
        ActionBuilder::new(self, name.into(), Blueprint::FanIn(set, limit))
    }

    /// Fan-in set that completes when every child has completed.
    pub fn wait_all(&mut self, name: impl Into<String>, set: FanInSet) -> ActionBuilder<'_> {
        self.fan_in(name, set, FanInLimit::All)
    }

    /// Fan-in set that completes when one child has completed.
    pub fn wait_any(&mut self, name: impl Into<String>, set: FanInSet) -> ActionBuilder<'_> {
        self.fan_in(name, set, FanInLimit::Any)
    }

    /// Fan-in set that completes when `count` distinct children have completed.
    pub fn wait_count(
        &mut self,
        name: impl Into<String>,
        count: usize,
        set: FanInSet,
    ) -> ActionBuilder<'_> {
        self.fan_in(name, set, FanInLimit::Count(count))
    }
}

/// Chains `steps` so each runs after the previous one finishes.
///
/// Returns the last step; running it starts the whole chain from the first.
pub fn sequence(scheduler: &mut Scheduler, steps: &[ActionId]) -> Result<ActionId> {
    let (first, rest) = steps.split_first().ok_or(ActionError::MissingChildren)?;

    let mut previous = *first;
    for &step in rest {
        scheduler.attach(step, previous)?;
        previous = step;
    }
    Ok(previous)
}

/// Creates a continuation that runs after `parent` and builds its child with
/// `factory` once `parent` has finished.
pub fn then(
    scheduler: &mut Scheduler,
    parent: ActionId,
    factory: impl FnOnce(&mut Scheduler) -> Option<ActionId> + 'static,
) -> Result<ActionId> {
    let name = format!("then({})", scheduler.name(parent)?);
    scheduler.continuation_with(name, factory).after(parent).spawn()
}

/// Shorthand for `scheduler.wait_all("wait_all", FanInSet::of(children)).spawn()`.
#[inline]
pub fn wait_all(
    scheduler: &mut Scheduler,
    children: impl IntoIterator<Item = ActionId>,
) -> Result<ActionId> {
    scheduler.wait_all("wait_all", FanInSet::of(children)).spawn()
}

/// Shorthand for `scheduler.wait_any("wait_any", FanInSet::of(children)).spawn()`.
#[inline]
pub fn wait_any(
    scheduler: &mut Scheduler,
    children: impl IntoIterator<Item = ActionId>,
) -> Result<ActionId> {
    scheduler.wait_any("wait_any", FanInSet::of(children)).spawn()
}

/// Shorthand for `scheduler.wait_count("wait_count", count, FanInSet::of(children)).spawn()`.
#[inline]
pub fn wait_count(
    scheduler: &mut Scheduler,
    count: usize,
    children: impl IntoIterator<Item = ActionId>,
) -> Result<ActionId> {
    scheduler
        .wait_count("wait_count", count, FanInSet::of(children))
        .spawn()
}
