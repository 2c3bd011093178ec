//! Scoping context that actions check before running.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Identifier of a scene, unique within one scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SceneId(pub u32);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}

/// Lifetime handle for the gameplay context that owns a group of actions.
///
/// Cloning is cheap and all clones observe the same liveness flag. Actions
/// hold a clone but never keep the scene alive in any other sense: once closed,
/// running one of its actions is a no-op.
#[derive(Clone)]
pub struct Scene {
    inner: Rc<SceneInner>,
}

struct SceneInner {
    id: SceneId,
    name: String,
    alive: Cell<bool>,
}

impl Scene {
    pub(crate) fn new(id: SceneId, name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(SceneInner {
                id,
                name: name.into(),
                alive: Cell::new(true),
            }),
        }
    }

    pub fn id(&self) -> SceneId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns `false` once the scene has been closed.
    pub fn is_alive(&self) -> bool {
        self.inner.alive.get()
    }

    /// Marks the scene as torn down.
    ///
    /// This does not cancel anything by itself; use
    /// [`Scheduler::tear_down_scene`](crate::Scheduler::tear_down_scene) to
    /// also cancel the scene's running actions.
    pub fn close(&self) {
        self.inner.alive.set(false);
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("alive", &self.inner.alive.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_liveness() {
        let scene = Scene::new(SceneId(1), "intro");
        let observer = scene.clone();

        assert!(observer.is_alive());
        scene.close();
        assert!(!observer.is_alive());
        assert_eq!(observer.name(), "intro");
        assert_eq!(observer.id().to_string(), "scene#1");
    }
}
