//! Leaf action contract and a few reference leaves.
//!
//! A leaf is where an engine-specific effect lives: play a sound, drive a
//! timer, wait for a tap. The scheduler only knows the [`Leaf`] contract and
//! handles lifecycle, callbacks and propagation around it.
//!
//! Completion is either push-driven (the leaf returns [`Progress::Pending`]
//! from [`Leaf::start`] and something outside later calls
//! [`Scheduler::complete`]) or pull-driven (the leaf opts into polling via
//! [`Leaf::is_polled`] and reports [`Progress::Done`] from [`Leaf::update`]).
//!
//! [`Scheduler::complete`]: crate::Scheduler::complete

use std::time::Duration;

use crate::Progress;

/// The effect behind a leaf action.
pub trait Leaf {
    /// Begin the effect. Returning `Done` completes the action synchronously.
    fn start(&mut self) -> Progress;

    /// Release whatever [`start`](Self::start) acquired (stop a sound, drop a
    /// timer handle). Called once, right before the action becomes `Aborted`.
    fn cancel(&mut self) {}

    /// Attempt an early, ordered shutdown. Only called on skippable actions.
    ///
    /// Returns `true` if the action may be treated as completed. The default
    /// releases resources through [`cancel`](Self::cancel) and accepts.
    fn skip(&mut self) -> bool {
        self.cancel();
        true
    }

    /// Whether the scheduler should call [`update`](Self::update) every tick
    /// while the action is running.
    fn is_polled(&self) -> bool {
        false
    }

    /// Per-tick poll. Only called when [`is_polled`](Self::is_polled) is true.
    fn update(&mut self, _elapsed: Duration) -> Progress {
        Progress::Pending
    }
}

/// Blanket implementation for boxed leaves.
impl<L: Leaf + ?Sized> Leaf for Box<L> {
    #[inline]
    fn start(&mut self) -> Progress {
        (**self).start()
    }

    #[inline]
    fn cancel(&mut self) {
        (**self).cancel()
    }

    #[inline]
    fn skip(&mut self) -> bool {
        (**self).skip()
    }

    #[inline]
    fn is_polled(&self) -> bool {
        (**self).is_polled()
    }

    #[inline]
    fn update(&mut self, elapsed: Duration) -> Progress {
        (**self).update(elapsed)
    }
}

/// Waits for a fixed amount of tick time.
#[derive(Clone, Debug)]
pub struct Delay {
    duration: Duration,
    elapsed: Duration,
}

impl Delay {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            elapsed: Duration::ZERO,
        }
    }

    /// Negative and NaN input yields a zero delay; input too large for a
    /// `Duration` saturates.
    pub fn from_secs_f32(seconds: f32) -> Self {
        Self::new(Duration::try_from_secs_f32(seconds.max(0.0)).unwrap_or(Duration::MAX))
    }

    /// Time left before the delay elapses.
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed)
    }
}

impl Leaf for Delay {
    fn start(&mut self) -> Progress {
        self.elapsed = Duration::ZERO;
        Progress::from_done(self.duration.is_zero())
    }

    fn is_polled(&self) -> bool {
        true
    }

    fn update(&mut self, elapsed: Duration) -> Progress {
        self.elapsed = self.elapsed.saturating_add(elapsed);
        Progress::from_done(self.elapsed >= self.duration)
    }
}

/// Runs a closure once when started and completes immediately.
pub struct Invoke<F> {
    body: Option<F>,
}

impl<F: FnOnce()> Invoke<F> {
    pub fn new(body: F) -> Self {
        Self { body: Some(body) }
    }
}

impl<F: FnOnce()> Leaf for Invoke<F> {
    fn start(&mut self) -> Progress {
        if let Some(body) = self.body.take() {
            body();
        }
        Progress::Done
    }
}

/// Completes on the first tick where the predicate holds.
///
/// The predicate is also checked at start, so a condition that already holds
/// completes without waiting for a tick.
pub struct WaitUntil<P> {
    predicate: P,
}

impl<P: FnMut() -> bool> WaitUntil<P> {
    pub fn new(predicate: P) -> Self {
        Self { predicate }
    }
}

impl<P: FnMut() -> bool> Leaf for WaitUntil<P> {
    fn start(&mut self) -> Progress {
        Progress::from_done((self.predicate)())
    }

    fn is_polled(&self) -> bool {
        true
    }

    fn update(&mut self, _elapsed: Duration) -> Progress {
        Progress::from_done((self.predicate)())
    }
}

/// Stays running until completed from outside via `Scheduler::complete`.
///
/// Stand-in for effects whose end is reported by an engine callback (a sound
/// finishing, a gesture being recognized).
#[derive(Clone, Copy, Debug, Default)]
pub struct Manual;

impl Leaf for Manual {
    fn start(&mut self) -> Progress {
        Progress::Pending
    }
}
