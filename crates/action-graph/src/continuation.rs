//! Continuation nodes.
//!
//! A continuation wraps a single child action and completes or aborts exactly
//! when the child does. The child is either given up front or produced by a
//! factory the first time the continuation runs, which is how a chain defers
//! building its next step until the previous one is done.

use tracing::trace;

use crate::action::{ActionKind, Factory, Observer};
use crate::error::{ActionError, Result};
use crate::{ActionId, ActionState, Scheduler};

/// Node that mirrors one child's outcome.
///
/// # Semantics
///
/// - If the child completes, the continuation completes
/// - If the child is cancelled, the continuation is aborted
/// - If the continuation is cancelled, the active child is cancelled first
pub(crate) struct Continuation {
    child: Option<ActionId>,
    factory: Option<Factory>,
}

impl Continuation {
    pub fn wrapping(child: ActionId) -> Self {
        Self {
            child: Some(child),
            factory: None,
        }
    }

    pub fn deferred(factory: Factory) -> Self {
        Self {
            child: None,
            factory: Some(factory),
        }
    }

    pub fn child(&self) -> Option<ActionId> {
        self.child
    }
}

impl Scheduler {
    fn continuation_mut(&mut self, node: ActionId) -> Result<&mut Continuation> {
        match &mut self.get_mut(node)?.kind {
            ActionKind::Continuation(continuation) => Ok(continuation),
            _ => Err(ActionError::UnknownAction(node)),
        }
    }

    /// Invokes the factory on first run. The factory is spent even when it
    /// produces nothing.
    pub(crate) fn materialize_continuation(&mut self, node: ActionId) -> Result<()> {
        let continuation = self.continuation_mut(node)?;
        if continuation.child.is_some() {
            return Ok(());
        }

        let produced = continuation
            .factory
            .take()
            .and_then(|factory| factory(self));
        let child = produced.ok_or(ActionError::NullFactoryResult { action: node })?;
        self.get(child)?;

        trace!(
            target: "action_graph::scheduler",
            action = %node,
            child = %child,
            "Continuation produced its child"
        );
        self.continuation_mut(node)?.child = Some(child);
        Ok(())
    }

    pub(crate) fn start_continuation(&mut self, node: ActionId) -> Result<()> {
        let child = self
            .continuation_mut(node)?
            .child
            .ok_or(ActionError::NullFactoryResult { action: node })?;

        // A child that already settled decides the outcome right away
        match self.state(child)? {
            ActionState::Finished => {
                self.finish(node, false);
                return Ok(());
            }
            ActionState::Aborted => {
                self.abort(node);
                return Ok(());
            }
            _ => {}
        }

        let target = self.get_mut(child)?;
        target.completed.push(Observer::Continuation(node));
        target.cancelled.push(Observer::Continuation(node));

        if self.needs_start(child)? {
            self.run(child)?;
        }
        Ok(())
    }

    pub(crate) fn forward_completed(&mut self, node: ActionId) {
        if self.state(node) == Ok(ActionState::Running) {
            self.finish(node, false);
        }
    }

    pub(crate) fn forward_cancelled(&mut self, node: ActionId) {
        if matches!(self.state(node), Ok(state) if state.is_active()) {
            self.abort(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::leaf::Manual;
    use crate::{ActionError, ActionState, Scheduler};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn completes_with_child() {
        let mut scheduler = Scheduler::new();
        let child = scheduler.leaf("child", Manual).spawn().unwrap();
        let node = scheduler.continuation("node", child).spawn().unwrap();

        scheduler.run(node).unwrap();
        assert_eq!(scheduler.state(child).unwrap(), ActionState::Running);

        scheduler.complete(child).unwrap();
        assert_eq!(scheduler.state(node).unwrap(), ActionState::Finished);
    }

    #[test]
    fn aborts_with_child() {
        let mut scheduler = Scheduler::new();
        let child = scheduler.leaf("child", Manual).spawn().unwrap();
        let node = scheduler.continuation("node", child).spawn().unwrap();

        scheduler.run(node).unwrap();
        scheduler.cancel(child).unwrap();
        assert_eq!(scheduler.state(node).unwrap(), ActionState::Aborted);
        assert!(scheduler.registry().is_empty());
    }

    #[test]
    fn cancel_reaches_child() {
        let mut scheduler = Scheduler::new();
        let child = scheduler.leaf("child", Manual).spawn().unwrap();
        let node = scheduler.continuation("node", child).spawn().unwrap();

        scheduler.run(node).unwrap();
        scheduler.cancel(node).unwrap();
        assert_eq!(scheduler.state(child).unwrap(), ActionState::Aborted);
        assert_eq!(scheduler.state(node).unwrap(), ActionState::Aborted);
    }

    #[test]
    fn wrapping_finished_child_completes_immediately() {
        let mut scheduler = Scheduler::new();
        let child = scheduler.leaf("child", Manual).spawn().unwrap();
        scheduler.run(child).unwrap();
        scheduler.complete(child).unwrap();

        let node = scheduler.continuation("node", child).spawn().unwrap();
        scheduler.run(node).unwrap();
        assert_eq!(scheduler.state(node).unwrap(), ActionState::Finished);
    }

    #[test]
    fn factory_runs_once_even_when_it_fails() {
        let mut scheduler = Scheduler::new();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let node = scheduler
            .continuation_with("node", move |_| {
                counter.set(counter.get() + 1);
                None
            })
            .spawn()
            .unwrap();

        let error = scheduler.run(node).unwrap_err();
        assert_eq!(error, ActionError::NullFactoryResult { action: node });
        assert_eq!(scheduler.state(node).unwrap(), ActionState::None);

        assert!(scheduler.run(node).is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failing_inner_factory_leaves_outer_unstarted() {
        let mut scheduler = Scheduler::new();
        let inner = scheduler.continuation_with("inner", |_| None).spawn().unwrap();
        let outer = scheduler.continuation("outer", inner).spawn().unwrap();

        let error = scheduler.run(outer).unwrap_err();
        assert_eq!(error, ActionError::NullFactoryResult { action: inner });
        assert_eq!(scheduler.state(outer).unwrap(), ActionState::None);
        assert_eq!(scheduler.state(inner).unwrap(), ActionState::None);
        assert!(scheduler.running().is_empty());

        // Retrying fails the same way instead of reporting a running outer
        let error = scheduler.run(outer).unwrap_err();
        assert_eq!(error, ActionError::NullFactoryResult { action: inner });
    }

    #[test]
    fn non_skippable_forwards_skip_to_child() {
        let mut scheduler = Scheduler::new();
        let child = scheduler.leaf("child", Manual).skippable(true).spawn().unwrap();
        let node = scheduler.continuation("node", child).spawn().unwrap();

        scheduler.run(node).unwrap();
        assert!(scheduler.try_skip(node).unwrap());
        assert_eq!(scheduler.state(child).unwrap(), ActionState::Finished);
        assert_eq!(scheduler.state(node).unwrap(), ActionState::Finished);
    }

    #[test]
    fn skippable_node_cancels_child_and_finishes() {
        let mut scheduler = Scheduler::new();
        let child = scheduler.leaf("child", Manual).spawn().unwrap();
        let node = scheduler
            .continuation("node", child)
            .skippable(true)
            .spawn()
            .unwrap();

        scheduler.run(node).unwrap();
        assert!(scheduler.try_skip(node).unwrap());
        assert_eq!(scheduler.state(child).unwrap(), ActionState::Aborted);
        assert_eq!(scheduler.state(node).unwrap(), ActionState::Finished);
    }
}
