//! Action nodes stored in the scheduler arena.
//!
//! An action is addressed by an [`ActionId`] handle. Parent edges and
//! combinator children are handles too, so no node owns another: they only
//! observe each other's terminal transitions through [`ObserverList`]s.

use std::fmt;

use crate::continuation::Continuation;
use crate::fan_in::FanIn;
use crate::leaf::Leaf;
use crate::scene::Scene;
use crate::{ActionState, Scheduler};

/// Stable handle to an action.
///
/// Handles are generational: once an action is released its handle goes stale
/// and every lookup through it fails with `UnknownAction`, even if the slot is
/// reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionId {
    index: u32,
    generation: u32,
}

impl ActionId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Token returned when registering a callback, used to unsubscribe it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackId(pub(crate) u64);

/// Produces an action on first run. Returning `None` is a `NullFactoryResult`.
pub type Factory = Box<dyn FnOnce(&mut Scheduler) -> Option<ActionId>>;

/// User callback fired on a terminal transition.
pub type Callback = Box<dyn FnOnce(&mut Scheduler, ActionId)>;

/// Which observer list of an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Event {
    Completed,
    Cancelled,
    Skipped,
}

/// Something interested in an action's terminal transition.
///
/// Internal edges are plain handles so they can be detached by identity when
/// the observing node terminates. User callbacks carry their token.
pub(crate) enum Observer {
    /// A dependent waiting for this action to finish before it runs.
    Resume(ActionId),

    /// A continuation node forwarding its child's outcome.
    Continuation(ActionId),

    /// A fan-in set counting this child.
    FanIn(ActionId),

    Callback { id: CallbackId, callback: Callback },
}

impl Observer {
    fn observer(&self) -> Option<ActionId> {
        match self {
            Observer::Resume(id) | Observer::Continuation(id) | Observer::FanIn(id) => Some(*id),
            Observer::Callback { .. } => None,
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observer::Resume(id) => f.debug_tuple("Resume").field(id).finish(),
            Observer::Continuation(id) => f.debug_tuple("Continuation").field(id).finish(),
            Observer::FanIn(id) => f.debug_tuple("FanIn").field(id).finish(),
            Observer::Callback { id, .. } => f.debug_tuple("Callback").field(id).finish(),
        }
    }
}

/// Ordered observers of one event. Fired in registration order.
#[derive(Debug, Default)]
pub(crate) struct ObserverList {
    observers: Vec<Observer>,
}

impl ObserverList {
    pub fn push(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    /// Removes the callback with the given token. Returns true if it was found.
    pub fn remove_callback(&mut self, token: CallbackId) -> bool {
        let before = self.observers.len();
        self.observers
            .retain(|o| !matches!(o, Observer::Callback { id, .. } if *id == token));
        before != self.observers.len()
    }

    /// Removes every internal edge held by `observer`.
    pub fn detach(&mut self, observer: ActionId) {
        self.observers.retain(|o| o.observer() != Some(observer));
    }

    pub fn take(&mut self) -> Vec<Observer> {
        std::mem::take(&mut self.observers)
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }
}

/// Closed set of node kinds, dispatched by `match` in the scheduler.
pub(crate) enum ActionKind {
    Leaf(Box<dyn Leaf>),
    Continuation(Continuation),
    FanIn(FanIn),
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Leaf(_) => "leaf",
            ActionKind::Continuation(_) => "continuation",
            ActionKind::FanIn(_) => "fan_in",
        }
    }

    /// Children this node currently holds edges to.
    pub fn children(&self) -> Vec<ActionId> {
        match self {
            ActionKind::Leaf(_) => Vec::new(),
            ActionKind::Continuation(node) => node.child().into_iter().collect(),
            ActionKind::FanIn(set) => set.children(),
        }
    }
}

/// A schedulable unit.
pub(crate) struct Action {
    pub name: String,
    pub state: ActionState,
    pub parent: Option<ActionId>,
    pub skippable: bool,
    pub scene: Option<Scene>,
    pub kind: ActionKind,
    pub completed: ObserverList,
    pub cancelled: ObserverList,
    pub skipped: ObserverList,
}

impl Action {
    pub fn new(name: String, kind: ActionKind) -> Self {
        Self {
            name,
            state: ActionState::None,
            parent: None,
            skippable: false,
            scene: None,
            kind,
            completed: ObserverList::default(),
            cancelled: ObserverList::default(),
            skipped: ObserverList::default(),
        }
    }

    pub fn observers_mut(&mut self, event: Event) -> &mut ObserverList {
        match event {
            Event::Completed => &mut self.completed,
            Event::Cancelled => &mut self.cancelled,
            Event::Skipped => &mut self.skipped,
        }
    }

    /// Returns true if the scene this action belongs to has been torn down.
    pub fn scene_closed(&self) -> bool {
        self.scene.as_ref().is_some_and(|scene| !scene.is_alive())
    }

    /// Drops every observer edge `observer` holds on this action.
    pub fn detach(&mut self, observer: ActionId) {
        self.completed.detach(observer);
        self.cancelled.detach(observer);
        self.skipped.detach(observer);
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("skippable", &self.skippable)
            .field("completed", &self.completed.len())
            .field("cancelled", &self.cancelled.len())
            .field("skipped", &self.skipped.len())
            .finish()
    }
}

/// Point-in-time view of one action, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ActionSnapshot {
    pub id: ActionId,
    pub name: String,
    pub kind: &'static str,
    pub state: ActionState,
    pub parent: Option<ActionId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detach_removes_only_internal_edges_of_that_observer() {
        let a = ActionId::new(1, 0);
        let b = ActionId::new(2, 0);
        let mut list = ObserverList::default();
        list.push(Observer::Resume(a));
        list.push(Observer::FanIn(b));
        list.push(Observer::Continuation(a));
        list.push(Observer::Callback {
            id: CallbackId(7),
            callback: Box::new(|_, _| {}),
        });

        list.detach(a);

        let remaining: Vec<_> = list.take().iter().map(|o| format!("{o:?}")).collect();
        assert_eq!(remaining, vec!["FanIn(ActionId { index: 2, generation: 0 })", "Callback(CallbackId(7))"]);
    }

    #[test]
    fn remove_callback_by_token() {
        let mut list = ObserverList::default();
        list.push(Observer::Callback {
            id: CallbackId(1),
            callback: Box::new(|_, _| {}),
        });

        assert!(list.remove_callback(CallbackId(1)));
        assert!(!list.remove_callback(CallbackId(1)));
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn display_includes_generation() {
        assert_eq!(ActionId::new(4, 2).to_string(), "#4.2");
    }
}
