//! Bookkeeping of running actions.
//!
//! The registry holds non-owning handles to every action currently in
//! `Running`. It drives per-tick polling and bulk cancellation. It is not an
//! executor: nothing here decides what runs next.

use std::collections::{BTreeMap, HashMap};

use crate::ActionId;
use crate::scene::SceneId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Entry {
    action: ActionId,
    scene: Option<SceneId>,
    polled: bool,
}

/// Running actions in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<u64, Entry>,
    index: HashMap<ActionId, u64>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an action entering `Running`.
    ///
    /// Returns `false` if the action was already registered.
    pub fn register(&mut self, action: ActionId, scene: Option<SceneId>, polled: bool) -> bool {
        if self.index.contains_key(&action) {
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            seq,
            Entry {
                action,
                scene,
                polled,
            },
        );
        self.index.insert(action, seq);
        true
    }

    /// Records an action leaving `Running`. Returns `false` if it was not registered.
    pub fn unregister(&mut self, action: ActionId) -> bool {
        match self.index.remove(&action) {
            Some(seq) => {
                self.entries.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, action: ActionId) -> bool {
        self.index.contains_key(&action)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Running actions, oldest first.
    pub fn running(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.entries.values().map(|entry| entry.action)
    }

    /// Snapshot of running actions that asked to be polled, oldest first.
    pub fn polled(&self) -> Vec<ActionId> {
        self.entries
            .values()
            .filter(|entry| entry.polled)
            .map(|entry| entry.action)
            .collect()
    }

    /// Snapshot of every running action, newest first.
    pub fn newest_first(&self) -> Vec<ActionId> {
        self.entries.values().rev().map(|entry| entry.action).collect()
    }

    /// Snapshot of the running actions bound to `scene`, newest first.
    pub fn in_scene(&self, scene: SceneId) -> Vec<ActionId> {
        self.entries
            .values()
            .rev()
            .filter(|entry| entry.scene == Some(scene))
            .map(|entry| entry.action)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> ActionId {
        ActionId::new(index, 0)
    }

    #[test]
    fn registers_once() {
        let mut registry = Registry::new();
        assert!(registry.register(id(1), None, false));
        assert!(!registry.register(id(1), None, false));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregisters_once() {
        let mut registry = Registry::new();
        registry.register(id(1), None, false);

        assert!(registry.unregister(id(1)));
        assert!(!registry.unregister(id(1)));
        assert!(registry.is_empty());
    }

    #[test]
    fn keeps_registration_order() {
        let mut registry = Registry::new();
        registry.register(id(5), None, true);
        registry.register(id(2), None, false);
        registry.register(id(9), None, true);

        assert_eq!(registry.running().collect::<Vec<_>>(), vec![id(5), id(2), id(9)]);
        assert_eq!(registry.polled(), vec![id(5), id(9)]);
        assert_eq!(registry.newest_first(), vec![id(9), id(2), id(5)]);
    }

    #[test]
    fn filters_by_scene() {
        let mut registry = Registry::new();
        registry.register(id(1), Some(SceneId(1)), false);
        registry.register(id(2), Some(SceneId(2)), false);
        registry.register(id(3), Some(SceneId(1)), false);
        registry.register(id(4), None, false);

        assert_eq!(registry.in_scene(SceneId(1)), vec![id(3), id(1)]);
    }
}
