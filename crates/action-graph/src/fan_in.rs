//! Fan-in combinators.
//!
//! A fan-in set runs several children concurrently and completes once a given
//! number of them has completed. Waiting for all, for any, or for exactly `n`
//! are the same node with a different limit.
//!
//! Children are either existing actions or generators invoked on the set's
//! first run. A child that was already started elsewhere is observed but not
//! restarted; a child that already finished counts toward the limit right away.

use std::collections::BTreeSet;

use tracing::trace;

use crate::action::{ActionKind, Factory, Observer};
use crate::config::UnreachablePolicy;
use crate::error::{ActionError, Result};
use crate::{ActionId, ActionState, Scheduler};

pub(crate) enum Slot {
    Action(ActionId),
    Generator(Factory),
    /// Generator already invoked without producing an action.
    Spent,
}

/// Children of a fan-in set, given as handles, generators, or a mix of both.
///
/// A set built with [`FanInSet::new`] and nothing added has no source at all
/// and is rejected with `MissingChildren`. [`FanInSet::of`] with an empty
/// iterator is a valid, empty set.
#[derive(Default)]
pub struct FanInSet {
    slots: Option<Vec<Slot>>,
}

impl FanInSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set over existing actions.
    pub fn of(children: impl IntoIterator<Item = ActionId>) -> Self {
        Self {
            slots: Some(children.into_iter().map(Slot::Action).collect()),
        }
    }

    /// Set whose children are produced on first run, in order.
    pub fn generated<I, F>(generators: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(&mut Scheduler) -> Option<ActionId> + 'static,
    {
        Self {
            slots: Some(
                generators
                    .into_iter()
                    .map(|generator| Slot::Generator(Box::new(generator)))
                    .collect(),
            ),
        }
    }

    pub fn with_child(mut self, child: ActionId) -> Self {
        self.slots.get_or_insert_with(Vec::new).push(Slot::Action(child));
        self
    }

    pub fn with_generator(
        mut self,
        generator: impl FnOnce(&mut Scheduler) -> Option<ActionId> + 'static,
    ) -> Self {
        self.slots
            .get_or_insert_with(Vec::new)
            .push(Slot::Generator(Box::new(generator)));
        self
    }

    pub fn len(&self) -> usize {
        self.slots.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn children(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.slots.iter().flatten().filter_map(|slot| match slot {
            Slot::Action(id) => Some(*id),
            _ => None,
        })
    }
}

/// How many children of a set must complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FanInLimit {
    All,
    Any,
    Count(usize),
}

impl FanInLimit {
    pub fn resolve(self, slots: usize) -> usize {
        match self {
            FanInLimit::All => slots,
            FanInLimit::Any => 1,
            FanInLimit::Count(count) => count,
        }
    }
}

/// Progress of a fan-in set, for inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FanInCounts {
    pub completed: usize,
    pub cancelled: usize,
    pub limit: usize,
    pub slots: usize,
}

pub(crate) struct FanIn {
    slots: Vec<Slot>,
    limit: usize,
    completed: usize,
    cancelled: usize,
    policy: UnreachablePolicy,
    /// Children currently observed. Each is counted at most once.
    tracked: BTreeSet<ActionId>,
}

impl FanIn {
    pub fn new(set: FanInSet, limit: FanInLimit, policy: UnreachablePolicy) -> Result<Self> {
        let slots = set.slots.ok_or(ActionError::MissingChildren)?;
        let limit = limit.resolve(slots.len());
        if limit > slots.len() {
            return Err(ActionError::LimitOutOfRange {
                limit,
                slots: slots.len(),
            });
        }

        Ok(Self {
            slots,
            limit,
            completed: 0,
            cancelled: 0,
            policy,
            tracked: BTreeSet::new(),
        })
    }

    /// Materialized children in slot order.
    pub fn children(&self) -> Vec<ActionId> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Action(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn counts(&self) -> FanInCounts {
        FanInCounts {
            completed: self.completed,
            cancelled: self.cancelled,
            limit: self.limit,
            slots: self.slots.len(),
        }
    }

    pub fn untrack_all(&mut self) {
        self.tracked.clear();
    }

    /// Forgets progress from a start that was rolled back.
    pub fn reset(&mut self) {
        self.completed = 0;
        self.cancelled = 0;
        self.tracked.clear();
    }

    fn limit_reached(&self) -> bool {
        self.completed >= self.limit
    }

    /// Too many children were cancelled for the limit to still be met.
    fn unreachable(&self) -> bool {
        self.policy == UnreachablePolicy::Abort
            && self.slots.len().saturating_sub(self.cancelled) < self.limit
    }
}

impl Scheduler {
    fn fan_in_mut(&mut self, set: ActionId) -> Result<&mut FanIn> {
        match &mut self.get_mut(set)?.kind {
            ActionKind::FanIn(fan_in) => Ok(fan_in),
            _ => Err(ActionError::UnknownAction(set)),
        }
    }

    /// Fan-in progress of `id`, or `None` if it is not a fan-in set.
    pub fn fan_in_counts(&self, id: ActionId) -> Result<Option<FanInCounts>> {
        Ok(match &self.get(id)?.kind {
            ActionKind::FanIn(fan_in) => Some(fan_in.counts()),
            _ => None,
        })
    }

    /// False if children that already finished meet the limit, in which case
    /// the set completes on run without starting any child.
    pub(crate) fn fan_in_starts_children(&self, set: ActionId) -> Result<bool> {
        let ActionKind::FanIn(fan_in) = &self.get(set)?.kind else {
            return Ok(false);
        };
        let children: BTreeSet<ActionId> = fan_in.children().into_iter().collect();

        let mut finished = 0;
        for child in children {
            if self.state(child)? == ActionState::Finished {
                finished += 1;
            }
        }
        Ok(finished < fan_in.limit)
    }

    /// Invokes the remaining generators in order.
    ///
    /// Produced children are kept, so a failed run followed by a retry never
    /// invokes the same generator twice.
    pub(crate) fn materialize_fan_in(&mut self, set: ActionId) -> Result<()> {
        let slots = self.fan_in_mut(set)?.slots.len();

        for index in 0..slots {
            let generator = match &mut self.fan_in_mut(set)?.slots[index] {
                Slot::Action(_) => continue,
                Slot::Spent => return Err(ActionError::NullFactoryResult { action: set }),
                slot @ Slot::Generator(_) => std::mem::replace(slot, Slot::Spent),
            };
            let Slot::Generator(generator) = generator else {
                continue;
            };

            let child = generator(self).ok_or(ActionError::NullFactoryResult { action: set })?;
            self.get(child)?;
            self.fan_in_mut(set)?.slots[index] = Slot::Action(child);
        }
        Ok(())
    }

    pub(crate) fn start_fan_in(&mut self, set: ActionId) -> Result<()> {
        let mut seen = BTreeSet::new();
        let children: Vec<ActionId> = self
            .fan_in_mut(set)?
            .children()
            .into_iter()
            .filter(|child| seen.insert(*child))
            .collect();

        let mut pending = Vec::with_capacity(children.len());
        for child in children {
            let state = self.state(child)?;
            let fan_in = self.fan_in_mut(set)?;
            match state {
                ActionState::Finished => fan_in.completed += 1,
                ActionState::Aborted => fan_in.cancelled += 1,
                _ => pending.push(child),
            }
        }

        if self.settle_fan_in(set)? {
            return Ok(());
        }

        for child in pending {
            // An earlier sibling may have settled the set synchronously
            if self.state(set)? != ActionState::Running {
                break;
            }
            self.fan_in_mut(set)?.tracked.insert(child);

            // ...or settled this child as a side effect
            match self.state(child)? {
                ActionState::Finished => {
                    self.count_completed(set, child);
                    continue;
                }
                ActionState::Aborted => {
                    self.count_cancelled(set, child);
                    continue;
                }
                _ => {}
            }

            let target = self.get_mut(child)?;
            target.completed.push(Observer::FanIn(set));
            target.cancelled.push(Observer::FanIn(set));

            if self.needs_start(child)? {
                self.run(child)?;
            }
        }
        Ok(())
    }

    /// Completes or aborts the set if its counts already decide it.
    fn settle_fan_in(&mut self, set: ActionId) -> Result<bool> {
        let fan_in = self.fan_in_mut(set)?;
        if fan_in.limit_reached() {
            self.finish(set, false);
            Ok(true)
        } else if fan_in.unreachable() {
            self.perform_cancel(set);
            self.abort(set);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Returns the set if it is running and still tracking `child`, and stops
    /// tracking it.
    fn untrack(&mut self, set: ActionId, child: ActionId) -> Option<&mut FanIn> {
        if self.state(set) != Ok(ActionState::Running) {
            return None;
        }
        let fan_in = self.fan_in_mut(set).ok()?;
        fan_in.tracked.remove(&child).then_some(fan_in)
    }

    pub(crate) fn count_completed(&mut self, set: ActionId, child: ActionId) {
        let Some(fan_in) = self.untrack(set, child) else {
            return;
        };
        fan_in.completed += 1;
        let counts = fan_in.counts();

        trace!(
            target: "action_graph::scheduler",
            action = %set,
            child = %child,
            completed = counts.completed,
            limit = counts.limit,
            "Fan-in child completed"
        );

        self.detach_edge(child, set);
        if counts.completed >= counts.limit {
            self.finish(set, false);
        }
    }

    pub(crate) fn count_cancelled(&mut self, set: ActionId, child: ActionId) {
        let Some(fan_in) = self.untrack(set, child) else {
            return;
        };
        fan_in.cancelled += 1;
        let unreachable = fan_in.unreachable();

        trace!(
            target: "action_graph::scheduler",
            action = %set,
            child = %child,
            cancelled = fan_in.cancelled,
            unreachable,
            "Fan-in child cancelled"
        );

        self.detach_edge(child, set);
        if unreachable {
            self.perform_cancel(set);
            self.abort(set);
        }
    }
}
