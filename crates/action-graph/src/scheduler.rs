//! Action arena and lifecycle transitions.
//!
//! The [`Scheduler`] owns every action and is the only place state changes
//! happen. It is an explicit context object: there is no process-wide
//! registry, so independent schedulers (one per scene stack, one per test)
//! never interfere.
//!
//! All transitions run synchronously on the calling thread. Observer lists are
//! taken out of the arena before they are fired, so callbacks may re-enter the
//! scheduler freely while the "fire once per terminal transition" guarantee
//! still holds.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::action::{Action, ActionKind, ActionSnapshot, Callback, CallbackId, Event, Observer};
use crate::config::SchedulerConfig;
use crate::error::{ActionError, Result};
use crate::registry::Registry;
use crate::scene::{Scene, SceneId};
use crate::{ActionId, ActionState, Operation};

#[derive(Debug)]
struct Slot {
    generation: u32,
    action: Option<Action>,
}

/// Single-threaded, tick-driven action scheduler.
#[derive(Debug)]
pub struct Scheduler {
    slots: Vec<Slot>,
    free: Vec<u32>,
    registry: Registry,
    config: SchedulerConfig,
    next_callback: u64,
    next_scene: u32,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            slots: Vec::with_capacity(config.capacity),
            free: Vec::new(),
            registry: Registry::new(),
            config,
            next_callback: 0,
            next_scene: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ========================================================================
    // Arena
    // ========================================================================

    pub(crate) fn insert(&mut self, action: Action) -> ActionId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.action = Some(action);
            return ActionId::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            action: Some(action),
        });
        ActionId::new(index, 0)
    }

    pub(crate) fn get(&self, id: ActionId) -> Result<&Action> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.action.as_ref())
            .ok_or(ActionError::UnknownAction(id))
    }

    pub(crate) fn get_mut(&mut self, id: ActionId) -> Result<&mut Action> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.action.as_mut())
            .ok_or(ActionError::UnknownAction(id))
    }

    /// Returns true if `id` refers to a live action.
    pub fn contains(&self, id: ActionId) -> bool {
        self.get(id).is_ok()
    }

    /// Number of live (not released) actions.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self, id: ActionId) -> Result<ActionState> {
        Ok(self.get(id)?.state)
    }

    pub fn name(&self, id: ActionId) -> Result<&str> {
        Ok(&self.get(id)?.name)
    }

    pub fn parent(&self, id: ActionId) -> Result<Option<ActionId>> {
        Ok(self.get(id)?.parent)
    }

    pub fn is_skippable(&self, id: ActionId) -> Result<bool> {
        Ok(self.get(id)?.skippable)
    }

    pub fn set_skippable(&mut self, id: ActionId, skippable: bool) -> Result<()> {
        self.get_mut(id)?.skippable = skippable;
        Ok(())
    }

    /// Running actions, oldest first.
    pub fn running(&self) -> Vec<ActionId> {
        self.registry.running().collect()
    }

    /// Diagnostic view of every live action, in slot order.
    pub fn snapshot(&self) -> Vec<ActionSnapshot> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let action = slot.action.as_ref()?;
                Some(ActionSnapshot {
                    id: ActionId::new(index as u32, slot.generation),
                    name: action.name.clone(),
                    kind: action.kind.label(),
                    state: action.state,
                    parent: action.parent,
                })
            })
            .collect()
    }

    /// Frees a terminal action. Its handle goes stale.
    pub fn release(&mut self, id: ActionId) -> Result<()> {
        let state = self.state(id)?;
        if !state.is_terminal() {
            return Err(ActionError::StillActive { action: id, state });
        }

        let slot = &mut self.slots[id.index() as usize];
        slot.action = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        Ok(())
    }

    fn invalid(&self, id: ActionId, operation: Operation) -> ActionError {
        match self.get(id) {
            Ok(action) => ActionError::InvalidTransition {
                action: id,
                name: action.name.clone(),
                state: action.state,
                operation,
            },
            Err(error) => error,
        }
    }

    // ========================================================================
    // Parent edges
    // ========================================================================

    /// Makes `child` wait for `parent` to finish before it runs.
    ///
    /// `child` must be unstarted and unparented, and the edge must not close a
    /// cycle.
    pub fn attach(&mut self, child: ActionId, parent: ActionId) -> Result<()> {
        let action = self.get(child)?;
        if action.state != ActionState::None || action.parent.is_some() {
            return Err(self.invalid(child, Operation::Attach));
        }

        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(self.invalid(child, Operation::Attach));
            }
            cursor = self.get(ancestor)?.parent;
        }

        self.link(child, parent)
    }

    pub(crate) fn link(&mut self, child: ActionId, parent: ActionId) -> Result<()> {
        let parent_state = self.state(parent)?;

        let action = self.get_mut(child)?;
        action.parent = Some(parent);
        action.state = ActionState::Waiting;

        // A terminal parent will never fire again; `run` checks it directly.
        if !parent_state.is_terminal() {
            self.get_mut(parent)?
                .completed
                .push(Observer::Resume(child));
        }
        Ok(())
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Registers `callback` on one of the action's observer lists.
    pub fn subscribe(
        &mut self,
        id: ActionId,
        event: Event,
        callback: impl FnOnce(&mut Scheduler, ActionId) + 'static,
    ) -> Result<CallbackId> {
        let token = CallbackId(self.next_callback);
        let callback: Callback = Box::new(callback);
        self.get_mut(id)?.observers_mut(event).push(Observer::Callback {
            id: token,
            callback,
        });
        self.next_callback += 1;
        Ok(token)
    }

    pub fn on_completed(
        &mut self,
        id: ActionId,
        callback: impl FnOnce(&mut Scheduler, ActionId) + 'static,
    ) -> Result<CallbackId> {
        self.subscribe(id, Event::Completed, callback)
    }

    pub fn on_cancelled(
        &mut self,
        id: ActionId,
        callback: impl FnOnce(&mut Scheduler, ActionId) + 'static,
    ) -> Result<CallbackId> {
        self.subscribe(id, Event::Cancelled, callback)
    }

    pub fn on_skipped(
        &mut self,
        id: ActionId,
        callback: impl FnOnce(&mut Scheduler, ActionId) + 'static,
    ) -> Result<CallbackId> {
        self.subscribe(id, Event::Skipped, callback)
    }

    /// Removes a callback. Returns false if it already fired or was removed.
    pub fn unsubscribe(&mut self, id: ActionId, token: CallbackId) -> Result<bool> {
        let action = self.get_mut(id)?;
        Ok(action.completed.remove_callback(token)
            || action.cancelled.remove_callback(token)
            || action.skipped.remove_callback(token))
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Starts an action.
    ///
    /// - Running, finished or aborted actions are rejected.
    /// - An action whose scene was torn down is left untouched.
    /// - An action whose parent has not finished hands the call to its parent,
    ///   so running any unit of a chain starts the chain from its root.
    ///
    /// Every factory this call would invoke, including those of children it
    /// starts, runs before any state changes, so a failing factory leaves the
    /// whole subtree as it was. If a child still fails to start, the action
    /// is rolled back to its prior state; children already started keep
    /// running.
    pub fn run(&mut self, id: ActionId) -> Result<()> {
        let action = self.get(id)?;
        if !action.state.is_pending() {
            return Err(self.invalid(id, Operation::Run));
        }

        if action.scene_closed() {
            debug!(
                target: "action_graph::scheduler",
                action = %id,
                name = %action.name,
                "Scene torn down, ignoring run"
            );
            return Ok(());
        }

        if let Some(parent) = action.parent
            && self.state(parent)? != ActionState::Finished
        {
            trace!(
                target: "action_graph::scheduler",
                action = %id,
                parent = %parent,
                "Delegating run to parent"
            );
            return self.run(parent);
        }

        let prior = action.state;
        self.prepare(id)?;
        self.begin(id)?;

        let result = self.perform_run(id);
        if result.is_err() && self.state(id) == Ok(ActionState::Running) {
            self.roll_back(id, prior);
        }
        result
    }

    /// Signals that a running action has completed.
    pub fn complete(&mut self, id: ActionId) -> Result<()> {
        if self.state(id)? != ActionState::Running {
            return Err(self.invalid(id, Operation::Complete));
        }

        self.finish(id, false);
        Ok(())
    }

    /// Cancels an action.
    ///
    /// A running action releases its resources (combinators cancel their
    /// active children first) and becomes `Aborted`. A waiting action bubbles
    /// the cancellation to its parent; the parent's abort then cascades back
    /// down the chain.
    pub fn cancel(&mut self, id: ActionId) -> Result<()> {
        let action = self.get(id)?;
        match action.state {
            ActionState::Running => {
                self.perform_cancel(id);
                self.abort(id);
                Ok(())
            }
            ActionState::Waiting => match action.parent {
                Some(parent) if self.state(parent)?.is_active() => self.cancel(parent),
                // Parent never started: nothing upstream to stop.
                _ => {
                    self.abort(id);
                    Ok(())
                }
            },
            _ => Err(self.invalid(id, Operation::Cancel)),
        }
    }

    /// Attempts to shortcut an action to completion.
    ///
    /// Returns `Ok(false)` without side effects when the action refuses.
    /// A waiting action forwards the attempt to its parent.
    pub fn try_skip(&mut self, id: ActionId) -> Result<bool> {
        let action = self.get(id)?;
        match action.state {
            ActionState::Running => self.perform_skip(id),
            ActionState::Waiting => match action.parent {
                Some(parent) if self.state(parent)?.is_active() => self.try_skip(parent),
                _ => Ok(false),
            },
            _ => Err(self.invalid(id, Operation::Skip)),
        }
    }

    /// Polls every running leaf that asked for it.
    ///
    /// Leaves started during this call are first polled on the next tick.
    /// Returns how many actions completed from polling.
    pub fn update(&mut self, elapsed: Duration) -> usize {
        let mut completed = 0;

        for id in self.registry.polled() {
            let progress = match self.get_mut(id) {
                Ok(action) if action.state == ActionState::Running => match &mut action.kind {
                    ActionKind::Leaf(leaf) => leaf.update(elapsed),
                    _ => continue,
                },
                _ => continue,
            };

            if progress.is_done() {
                trace!(target: "action_graph::scheduler", action = %id, "Poll reported done");
                self.finish(id, false);
                completed += 1;
            }
        }

        completed
    }

    // ========================================================================
    // Bulk cancellation
    // ========================================================================

    /// Opens a new scoping context.
    pub fn open_scene(&mut self, name: impl Into<String>) -> Scene {
        let id = SceneId(self.next_scene);
        self.next_scene += 1;
        Scene::new(id, name)
    }

    /// Closes `scene` and cancels every running action bound to it.
    ///
    /// Returns how many actions were cancelled directly (descendants cancelled
    /// through a combinator are not counted).
    pub fn tear_down_scene(&mut self, scene: &Scene) -> usize {
        scene.close();
        let targets = self.registry.in_scene(scene.id());
        debug!(
            target: "action_graph::scheduler",
            scene = %scene.id(),
            name = scene.name(),
            running = targets.len(),
            "Tearing down scene"
        );
        self.cancel_each(targets)
    }

    /// Cancels every running action, newest first.
    pub fn cancel_all(&mut self) -> usize {
        let targets = self.registry.newest_first();
        self.cancel_each(targets)
    }

    fn cancel_each(&mut self, targets: Vec<ActionId>) -> usize {
        let mut cancelled = 0;
        for id in targets {
            // Earlier cancellations may already have cascaded to this one
            if !self.registry.contains(id) {
                continue;
            }
            match self.cancel(id) {
                Ok(()) => cancelled += 1,
                Err(error) => warn!(
                    target: "action_graph::scheduler",
                    action = %id,
                    code = error.code(),
                    %error,
                    "Bulk cancel failed"
                ),
            }
        }
        cancelled
    }

    // ========================================================================
    // Internal transitions
    // ========================================================================

    /// Returns true if running `id` would start something, as opposed to an
    /// action that is already running, terminal, or queued behind a parent
    /// that is already running.
    pub(crate) fn needs_start(&self, id: ActionId) -> Result<bool> {
        let mut cursor = id;
        loop {
            let action = self.get(cursor)?;
            match (action.state, action.parent) {
                (ActionState::None, _) | (ActionState::Waiting, None) => return Ok(true),
                (ActionState::Waiting, Some(parent)) => {
                    if self.state(parent)? == ActionState::Finished {
                        return Ok(true);
                    }
                    cursor = parent;
                }
                _ => return Ok(false),
            }
        }
    }

    /// Returns the action that `run(id)` actually starts: the topmost unit of
    /// its chain whose parent has not finished.
    fn start_target(&self, id: ActionId) -> Result<ActionId> {
        let mut cursor = id;
        while let Some(parent) = self.get(cursor)?.parent {
            if self.state(parent)? == ActionState::Finished {
                break;
            }
            cursor = parent;
        }
        Ok(cursor)
    }

    fn prepare(&mut self, id: ActionId) -> Result<()> {
        self.prepare_tree(id, &mut BTreeSet::new())
    }

    /// Invokes the factories of `id` and of every child its start would run.
    fn prepare_tree(&mut self, id: ActionId, visited: &mut BTreeSet<ActionId>) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }

        match &self.get(id)?.kind {
            ActionKind::Leaf(_) => return Ok(()),
            ActionKind::Continuation(_) => self.materialize_continuation(id)?,
            ActionKind::FanIn(_) => {
                self.materialize_fan_in(id)?;
                if !self.fan_in_starts_children(id)? {
                    return Ok(());
                }
            }
        }

        let children = self.get(id)?.kind.children();
        for child in children {
            if !self.needs_start(child)? {
                continue;
            }
            let target = self.start_target(child)?;
            if self.get(target)?.scene_closed() {
                continue;
            }
            self.prepare_tree(target, visited)?;
        }
        Ok(())
    }

    fn begin(&mut self, id: ActionId) -> Result<()> {
        let action = self.get_mut(id)?;
        action.state = ActionState::Running;
        let scene = action.scene.as_ref().map(Scene::id);
        let polled = matches!(&action.kind, ActionKind::Leaf(leaf) if leaf.is_polled());

        debug!(
            target: "action_graph::scheduler",
            action = %id,
            name = %action.name,
            kind = action.kind.label(),
            "Action started"
        );

        if !self.registry.register(id, scene, polled) {
            error!(target: "action_graph::scheduler", action = %id, "Action registered twice");
        }
        Ok(())
    }

    fn perform_run(&mut self, id: ActionId) -> Result<()> {
        match &mut self.get_mut(id)?.kind {
            ActionKind::Leaf(leaf) => {
                if leaf.start().is_done() {
                    self.finish(id, false);
                }
                Ok(())
            }
            ActionKind::Continuation(_) => self.start_continuation(id),
            ActionKind::FanIn(_) => self.start_fan_in(id),
        }
    }

    /// Undoes `begin` after a start that failed part way.
    fn roll_back(&mut self, id: ActionId, prior: ActionState) {
        self.detach_children(id);
        self.registry.unregister(id);

        if let Ok(action) = self.get_mut(id) {
            action.state = prior;
            if let ActionKind::FanIn(set) = &mut action.kind {
                set.reset();
            }
        }

        warn!(
            target: "action_graph::scheduler",
            action = %id,
            state = %prior,
            "Rolled back failed start"
        );
    }

    /// Unit-specific cancellation: leaves release resources, combinators stop
    /// observing and cancel their active children. Does not change `id`'s state.
    pub(crate) fn perform_cancel(&mut self, id: ActionId) {
        self.detach_children(id);

        let children = match self.get_mut(id) {
            Ok(action) => match &mut action.kind {
                ActionKind::Leaf(leaf) => {
                    leaf.cancel();
                    return;
                }
                kind => kind.children(),
            },
            Err(_) => return,
        };

        for child in children {
            // Siblings may share ancestors, so re-check each child
            if !matches!(self.state(child), Ok(state) if state.is_active()) {
                continue;
            }
            if let Err(error) = self.cancel(child) {
                warn!(
                    target: "action_graph::scheduler",
                    action = %id,
                    child = %child,
                    code = error.code(),
                    %error,
                    "Failed to cancel child"
                );
            }
        }
    }

    fn perform_skip(&mut self, id: ActionId) -> Result<bool> {
        let action = self.get_mut(id)?;
        let skippable = action.skippable;

        let accepted = match &mut action.kind {
            ActionKind::Leaf(leaf) => skippable && leaf.skip(),
            ActionKind::Continuation(node) if !skippable => {
                return match node.child() {
                    Some(child) if self.state(child)?.is_active() => self.try_skip(child),
                    _ => Ok(false),
                };
            }
            ActionKind::Continuation(_) | ActionKind::FanIn(_) => {
                if skippable {
                    self.perform_cancel(id);
                }
                skippable
            }
        };

        if accepted {
            self.finish(id, true);
        } else {
            debug!(target: "action_graph::scheduler", action = %id, "Skip refused");
        }
        Ok(accepted)
    }

    /// Running → Finished. Fires skipped (when `skipped`) then completed.
    pub(crate) fn finish(&mut self, id: ActionId, skipped: bool) {
        let Ok(action) = self.get_mut(id) else {
            return;
        };
        if action.state != ActionState::Running {
            return;
        }

        action.state = ActionState::Finished;
        let completed = action.completed.take();
        let skipped_observers = action.skipped.take();
        action.cancelled.clear();

        debug!(
            target: "action_graph::scheduler",
            action = %id,
            name = %action.name,
            skipped,
            "Action finished"
        );

        self.leave(id, true);
        if skipped {
            self.notify(id, Event::Skipped, skipped_observers);
        }
        self.notify(id, Event::Completed, completed);
    }

    /// Running/Waiting → Aborted. Fires cancelled, then aborts dependents that
    /// were waiting for this action.
    pub(crate) fn abort(&mut self, id: ActionId) {
        let Ok(action) = self.get_mut(id) else {
            return;
        };
        if !action.state.is_active() {
            return;
        }

        let was_running = action.state == ActionState::Running;
        action.state = ActionState::Aborted;
        let cancelled = action.cancelled.take();
        let dependents: Vec<ActionId> = action
            .completed
            .take()
            .into_iter()
            .filter_map(|observer| match observer {
                Observer::Resume(child) => Some(child),
                _ => None,
            })
            .collect();
        action.skipped.clear();

        debug!(
            target: "action_graph::scheduler",
            action = %id,
            name = %action.name,
            dependents = dependents.len(),
            "Action aborted"
        );

        self.leave(id, was_running);
        self.notify(id, Event::Cancelled, cancelled);

        for child in dependents {
            if self.state(child) == Ok(ActionState::Waiting) {
                self.abort(child);
            }
        }
    }

    /// Bookkeeping shared by both terminal transitions.
    fn leave(&mut self, id: ActionId, was_running: bool) {
        if was_running && !self.registry.unregister(id) {
            error!(
                target: "action_graph::scheduler",
                action = %id,
                "Running action missing from registry"
            );
        }

        if let Ok(Some(parent)) = self.parent(id)
            && let Ok(parent) = self.get_mut(parent)
        {
            parent.detach(id);
        }
        self.detach_children(id);
    }

    /// Drops every edge `id` holds on its children.
    pub(crate) fn detach_children(&mut self, id: ActionId) {
        let children = match self.get_mut(id) {
            Ok(action) => {
                if let ActionKind::FanIn(set) = &mut action.kind {
                    set.untrack_all();
                }
                action.kind.children()
            }
            Err(_) => return,
        };

        for child in children {
            self.detach_edge(child, id);
        }
    }

    pub(crate) fn detach_edge(&mut self, target: ActionId, observer: ActionId) {
        if let Ok(action) = self.get_mut(target) {
            action.detach(observer);
        }
    }

    fn notify(&mut self, id: ActionId, event: Event, observers: Vec<Observer>) {
        for observer in observers {
            match (observer, event) {
                (Observer::Callback { callback, .. }, _) => callback(self, id),
                (Observer::Resume(child), Event::Completed) => self.resume(child),
                (Observer::Continuation(node), Event::Completed) => self.forward_completed(node),
                (Observer::Continuation(node), Event::Cancelled) => self.forward_cancelled(node),
                (Observer::FanIn(set), Event::Completed) => self.count_completed(set, id),
                (Observer::FanIn(set), Event::Cancelled) => self.count_cancelled(set, id),
                (observer, event) => trace!(
                    target: "action_graph::scheduler",
                    action = %id,
                    ?observer,
                    %event,
                    "Observer ignores event"
                ),
            }
        }
    }

    fn resume(&mut self, child: ActionId) {
        if self.state(child) != Ok(ActionState::Waiting) {
            return;
        }
        if let Err(error) = self.run(child) {
            error!(
                target: "action_graph::scheduler",
                action = %child,
                code = error.code(),
                %error,
                "Failed to resume action after its parent finished"
            );
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
