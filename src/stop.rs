//! Ready-made stop conditions for [`EventScheduler::run`].
//!
//! Each factory captures its own clone of the scheduler handle, so the
//! returned closure only reads public scheduler state.

use crate::scheduler::EventScheduler;

/// Never stop: `run` returns only when the queue drains (or the configured
/// event limit is hit).
pub fn never() -> impl FnMut() -> bool {
    || false
}

/// Stop once the clock has reached `time`.
///
/// Checked before each step, so the event that moves the clock to or past
/// `time` still runs. Use
/// [`run_until_max_time`](EventScheduler::run_until_max_time) to stop
/// *before* any event later than `time`.
pub fn at_time(sched: &EventScheduler, time: f64) -> impl FnMut() -> bool {
    let sched = sched.clone();
    move || sched.current_time() >= time
}

/// Stop after `count` more events have executed, counted from the moment
/// the condition is created.
pub fn after_events(sched: &EventScheduler, count: u64) -> impl FnMut() -> bool {
    let sched = sched.clone();
    let start = sched.events_processed();
    move || sched.events_processed() - start >= count
}

/// Stop as soon as either condition holds.
pub fn either<A, B>(mut a: A, mut b: B) -> impl FnMut() -> bool
where
    A: FnMut() -> bool,
    B: FnMut() -> bool,
{
    move || a() || b()
}
