//! Lifecycle states and progress reported by action nodes.

/// Lifecycle state of an action.
///
/// # Transitions
///
/// - `None` → `Running`: unparented action started with [`run`]
/// - `Waiting` → `Running`: parent reached `Finished`
/// - `Running` → `Finished`: completion signalled or skip accepted
/// - `Running` → `Aborted`: cancelled
/// - `Waiting` → `Aborted`: parent aborted
///
/// `Finished` and `Aborted` are terminal; an action never leaves them.
///
/// [`run`]: crate::Scheduler::run
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum ActionState {
    /// Created without a parent and not started yet.
    #[default]
    None,

    /// Created with a parent that has not finished yet.
    Waiting,

    /// Started and registered with the scheduler.
    Running,

    /// Completed, either naturally or through a skip.
    Finished,

    /// Cancelled before completion.
    Aborted,
}

impl ActionState {
    /// Returns `true` for `Finished` and `Aborted`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionState::Finished | ActionState::Aborted)
    }

    /// Returns `true` if the action has not been started yet.
    #[inline]
    pub fn is_pending(self) -> bool {
        matches!(self, ActionState::None | ActionState::Waiting)
    }

    /// Returns `true` if the action is waiting on a parent or running.
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, ActionState::Waiting | ActionState::Running)
    }
}

/// What a leaf reports after being started or polled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Progress {
    /// The effect is still in flight. Completion will be signalled later,
    /// either by a poll returning `Done` or through [`Scheduler::complete`].
    ///
    /// [`Scheduler::complete`]: crate::Scheduler::complete
    Pending,

    /// The effect has finished.
    Done,
}

impl Progress {
    /// Returns `true` if this progress is `Done`.
    #[inline]
    pub fn is_done(self) -> bool {
        matches!(self, Progress::Done)
    }

    /// Maps a boolean condition to progress.
    #[inline]
    pub fn from_done(done: bool) -> Self {
        if done { Progress::Done } else { Progress::Pending }
    }
}

/// Scheduler operation, used to describe rejected transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Run,
    Cancel,
    Skip,
    Complete,
    Attach,
}
