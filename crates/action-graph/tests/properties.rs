use action_graph::builder::{sequence, wait_all};
use action_graph::{
    ActionError, ActionId, ActionState, Event, FanInSet, Leaf, Manual, Operation, Progress,
    Scheduler,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Counts how often each event fires per action.
#[derive(Clone, Default)]
struct Tally(Rc<RefCell<HashMap<(ActionId, Event), usize>>>);

impl Tally {
    fn watch(&self, scheduler: &mut Scheduler, id: ActionId) {
        for event in [Event::Completed, Event::Cancelled, Event::Skipped] {
            let tally = self.clone();
            scheduler
                .subscribe(id, event, move |_, id| {
                    *tally.0.borrow_mut().entry((id, event)).or_default() += 1;
                })
                .expect("subscribe");
        }
    }

    fn count(&self, id: ActionId, event: Event) -> usize {
        self.0.borrow().get(&(id, event)).copied().unwrap_or(0)
    }
}

/// Leaf that counts how often it was cancelled.
struct Counted {
    cancels: Rc<Cell<u32>>,
}

impl Leaf for Counted {
    fn start(&mut self) -> Progress {
        Progress::Pending
    }

    fn cancel(&mut self) {
        self.cancels.set(self.cancels.get() + 1);
    }
}

#[test]
fn test_double_run_is_invalid() {
    let mut scheduler = Scheduler::new();
    let a = scheduler.leaf("a", Manual).spawn().expect("spawn");

    scheduler.run(a).expect("first run");
    match scheduler.run(a) {
        Err(ActionError::InvalidTransition {
            action,
            state,
            operation,
            ..
        }) => {
            assert_eq!(action, a);
            assert_eq!(state, ActionState::Running);
            assert_eq!(operation, Operation::Run);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[test]
fn test_terminal_callbacks_fire_exactly_once() {
    let mut scheduler = Scheduler::new();
    let tally = Tally::default();

    let finished = scheduler.leaf("finished", Manual).spawn().expect("spawn");
    let aborted = scheduler.leaf("aborted", Manual).spawn().expect("spawn");
    tally.watch(&mut scheduler, finished);
    tally.watch(&mut scheduler, aborted);

    scheduler.run(finished).expect("run");
    scheduler.run(aborted).expect("run");
    scheduler.complete(finished).expect("complete");
    scheduler.cancel(aborted).expect("cancel");

    // Further calls are rejected and fire nothing
    assert!(scheduler.complete(finished).is_err());
    assert!(scheduler.cancel(finished).is_err());
    assert!(scheduler.cancel(aborted).is_err());
    assert!(scheduler.try_skip(aborted).is_err());

    assert_eq!(tally.count(finished, Event::Completed), 1);
    assert_eq!(tally.count(finished, Event::Cancelled), 0);
    assert_eq!(tally.count(aborted, Event::Completed), 0);
    assert_eq!(tally.count(aborted, Event::Cancelled), 1);
}

#[test]
fn test_factory_invoked_once_across_runs() {
    let mut scheduler = Scheduler::new();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let node = scheduler
        .continuation_with("node", move |s| {
            counter.set(counter.get() + 1);
            s.leaf("child", Manual).spawn().ok()
        })
        .spawn()
        .expect("spawn");

    scheduler.run(node).expect("run");
    assert!(scheduler.run(node).is_err());
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_prefinished_child_counts_immediately() {
    let mut scheduler = Scheduler::new();
    let done = scheduler.leaf("done", Manual).spawn().expect("spawn");
    let open = scheduler.leaf("open", Manual).spawn().expect("spawn");
    scheduler.run(done).expect("run");
    scheduler.complete(done).expect("complete");

    let set = scheduler
        .wait_any("any", FanInSet::of([done, open]))
        .spawn()
        .expect("spawn set");
    scheduler.run(set).expect("run set");

    assert_eq!(scheduler.state(set).unwrap(), ActionState::Finished);
    assert_eq!(scheduler.state(open).unwrap(), ActionState::None);
}

#[test]
fn test_already_running_child_is_not_restarted() {
    let mut scheduler = Scheduler::new();
    let a = scheduler.leaf("a", Manual).spawn().expect("spawn");
    let b = scheduler.leaf("b", Manual).spawn().expect("spawn");
    scheduler.run(a).expect("run a");

    let set = wait_all(&mut scheduler, [a, b]).expect("spawn set");
    scheduler.run(set).expect("run set");
    assert_eq!(scheduler.running(), vec![a, set, b]);

    scheduler.complete(a).expect("complete a");
    scheduler.complete(b).expect("complete b");
    assert_eq!(scheduler.state(set).unwrap(), ActionState::Finished);
}

#[test]
fn test_cancel_set_cancels_active_children_once() {
    let mut scheduler = Scheduler::new();
    let cancels = Rc::new(Cell::new(0));
    let tally = Tally::default();

    let first = scheduler
        .leaf("first", Counted { cancels: Rc::clone(&cancels) })
        .spawn()
        .expect("spawn");
    let second = scheduler
        .leaf("second", Counted { cancels: Rc::clone(&cancels) })
        .spawn()
        .expect("spawn");
    let settled = scheduler.leaf("settled", Manual).spawn().expect("spawn");
    let set = scheduler
        .wait_all("all", FanInSet::of([first, second, settled]))
        .spawn()
        .expect("spawn set");
    for id in [first, second, settled, set] {
        tally.watch(&mut scheduler, id);
    }

    scheduler.run(set).expect("run set");
    scheduler.complete(settled).expect("complete settled");
    scheduler.cancel(set).expect("cancel set");

    assert_eq!(cancels.get(), 2);
    assert_eq!(tally.count(first, Event::Cancelled), 1);
    assert_eq!(tally.count(second, Event::Cancelled), 1);
    assert_eq!(tally.count(settled, Event::Cancelled), 0);
    assert_eq!(tally.count(set, Event::Cancelled), 1);
    assert_eq!(scheduler.state(settled).unwrap(), ActionState::Finished);
    assert!(scheduler.registry().is_empty());
}

#[test]
fn test_non_skippable_skip_is_refused() {
    let mut scheduler = Scheduler::new();
    let tally = Tally::default();
    let a = scheduler.leaf("a", Manual).spawn().expect("spawn");
    let b = scheduler.leaf("b", Manual).spawn().expect("spawn");
    let set = wait_all(&mut scheduler, [a, b]).expect("spawn set");
    tally.watch(&mut scheduler, set);

    scheduler.run(set).expect("run");
    assert!(!scheduler.try_skip(set).expect("skip attempt"));
    assert!(!scheduler.try_skip(a).expect("skip attempt"));
    assert_eq!(scheduler.state(set).unwrap(), ActionState::Running);
    assert_eq!(scheduler.state(a).unwrap(), ActionState::Running);
    assert_eq!(tally.count(set, Event::Skipped), 0);
}

#[test]
fn test_skip_waiting_unit_skips_running_parent() {
    let mut scheduler = Scheduler::new();
    let tally = Tally::default();
    let intro = scheduler
        .leaf("intro", Manual)
        .skippable(true)
        .spawn()
        .expect("spawn");
    let outro = scheduler
        .leaf("outro", Manual)
        .after(intro)
        .spawn()
        .expect("spawn");
    tally.watch(&mut scheduler, intro);

    scheduler.run(outro).expect("run chain");
    assert!(scheduler.try_skip(outro).expect("skip"));

    assert_eq!(tally.count(intro, Event::Skipped), 1);
    assert_eq!(tally.count(intro, Event::Completed), 1);
    assert_eq!(scheduler.state(outro).unwrap(), ActionState::Running);
}

#[test]
fn test_cancel_waiting_unit_aborts_whole_chain() {
    let mut scheduler = Scheduler::new();
    let tally = Tally::default();
    let steps: Vec<ActionId> = (0..3)
        .map(|i| {
            scheduler
                .leaf(format!("step {i}"), Manual)
                .spawn()
                .expect("spawn")
        })
        .collect();
    let last = sequence(&mut scheduler, &steps).expect("chain");
    for &step in &steps {
        tally.watch(&mut scheduler, step);
    }

    scheduler.run(last).expect("run chain");
    scheduler.cancel(last).expect("cancel tail");

    for &step in &steps {
        assert_eq!(scheduler.state(step).unwrap(), ActionState::Aborted);
        assert_eq!(tally.count(step, Event::Cancelled), 1);
    }
}

#[test]
fn test_failed_resume_does_not_undo_parent_completion() {
    let mut scheduler = Scheduler::new();
    let parent = scheduler.leaf("parent", Manual).spawn().expect("spawn");
    let broken = scheduler
        .continuation_with("broken", |_| None)
        .after(parent)
        .spawn()
        .expect("spawn");

    scheduler.run(parent).expect("run");
    scheduler.complete(parent).expect("complete");

    assert_eq!(scheduler.state(parent).unwrap(), ActionState::Finished);
    assert_eq!(scheduler.state(broken).unwrap(), ActionState::Waiting);
    assert_eq!(
        scheduler.run(broken),
        Err(ActionError::NullFactoryResult { action: broken })
    );
}

#[test]
fn test_cancel_all_empties_registry() {
    let mut scheduler = Scheduler::new();
    let a = scheduler.leaf("a", Manual).spawn().expect("spawn");
    let b = scheduler.leaf("b", Manual).spawn().expect("spawn");
    let node = scheduler.continuation("node", b).spawn().expect("spawn");
    scheduler.run(a).expect("run");
    scheduler.run(node).expect("run");

    assert_eq!(scheduler.cancel_all(), 2);
    assert!(scheduler.registry().is_empty());
    for id in [a, b, node] {
        assert_eq!(scheduler.state(id).unwrap(), ActionState::Aborted);
    }
}

#[test]
fn test_released_handle_is_stale() {
    let mut scheduler = Scheduler::new();
    let a = scheduler.leaf("a", Manual).spawn().expect("spawn");
    scheduler.run(a).expect("run");
    scheduler.cancel(a).expect("cancel");
    scheduler.release(a).expect("release");

    assert_eq!(scheduler.run(a), Err(ActionError::UnknownAction(a)));
    assert_eq!(scheduler.cancel(a), Err(ActionError::UnknownAction(a)));
    assert!(scheduler.is_empty());
}
