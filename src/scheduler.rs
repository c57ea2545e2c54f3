//! Scheduler execution loop.
//!
//! Drives the event queue: pops events, advances virtual time, invokes
//! actions. The loop is purely synchronous and single-threaded, so the
//! same schedule calls always give the same execution order.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::config::SchedulerConfig;
use crate::error::{ActionError, InvalidSchedule, ScheduleResult};
use crate::event::{Action, Event, EventHandle, ExecutedEvent, Label};
use crate::queue::EventQueue;
use crate::time::VirtualTime;
use crate::trace::EventTrace;

// ── Run outcome ───────────────────────────────────────────────────────

/// Why a run loop call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum StopReason {
    /// No live event was left.
    Drained,
    /// The caller's stop condition held.
    Condition,
    /// The next event lies after the requested maximum time.
    TimeLimit,
    /// `run_for` executed its step budget.
    StepLimit,
    /// The configured `event_limit` was reached.
    EventLimit,
}

/// Result of a run loop call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Events executed during this call.
    pub executed: u64,
    /// What ended the call.
    pub reason: StopReason,
}

// ── Scheduler state ───────────────────────────────────────────────────

#[derive(Debug)]
struct SchedulerCore {
    queue: EventQueue,
    current_time: VirtualTime,
    events_processed: u64,
    config: SchedulerConfig,
    trace: Option<EventTrace>,
    /// Set while an action runs; guards against nested `step`.
    dispatching: bool,
}

impl SchedulerCore {
    /// Advance the clock to a popped event and split it for dispatch.
    fn begin_dispatch(&mut self, event: Event) -> (ExecutedEvent, Box<dyn Action>) {
        // Virtual time must never go backward.
        assert!(
            event.time() >= self.current_time,
            "Time went backward! current={}, event={}",
            self.current_time,
            event.time()
        );
        self.current_time = event.time();
        self.events_processed += 1;
        self.dispatching = true;

        let (record, action) = event.into_parts();
        if let Some(trace) = self.trace.as_mut() {
            trace.record(record.clone());
        }
        (record, action)
    }
}

/// Clears `dispatching` when an action returns, errors or panics.
struct DispatchGuard<'a>(&'a RefCell<SchedulerCore>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().dispatching = false;
    }
}

// ── EventScheduler ────────────────────────────────────────────────────

/// Top-level discrete-event scheduler.
///
/// Owns the logical clock and the pending-event queue. The type is a cheap
/// handle: clones share the same scheduler, which is how an action reaches
/// back into it to schedule follow-up events.
///
/// ```
/// use chronon::EventScheduler;
///
/// let sched = EventScheduler::new();
/// let inner = sched.clone();
/// sched.schedule(10.0, move || {
///     inner.timeout(5.0, || {}).map(|_| ())
/// })?;
///
/// let summary = sched.run(|| false)?;
/// assert_eq!(summary.executed, 2);
/// assert_eq!(sched.current_time(), 15.0);
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// Not `Send`: the scheduler is single-threaded by construction.
///
/// Pending actions that capture a handle keep the scheduler alive, so a
/// model whose events reschedule themselves forms a reference cycle. Either
/// call [`clear`](Self::clear) when the run is over, or have the actions
/// capture a [`WeakScheduler`] from [`downgrade`](Self::downgrade).
#[derive(Debug, Clone)]
pub struct EventScheduler {
    inner: Rc<RefCell<SchedulerCore>>,
}

/// A non-owning handle to an [`EventScheduler`].
///
/// Pending actions holding one of these do not keep the scheduler alive.
#[derive(Debug, Clone)]
pub struct WeakScheduler {
    inner: Weak<RefCell<SchedulerCore>>,
}

impl WeakScheduler {
    /// The scheduler, if some [`EventScheduler`] handle still owns it.
    pub fn upgrade(&self) -> Option<EventScheduler> {
        self.inner.upgrade().map(|inner| EventScheduler { inner })
    }
}

impl EventScheduler {
    /// Create a scheduler with the clock at zero.
    pub fn new() -> Self {
        Self::from_parts(SchedulerConfig::default(), VirtualTime::ZERO)
    }

    /// Create a scheduler from a configuration.
    ///
    /// Fails if the configured epoch is not finite.
    pub fn with_config(config: SchedulerConfig) -> ScheduleResult<Self> {
        let epoch = config.epoch_time()?;
        Ok(Self::from_parts(config, epoch))
    }

    fn from_parts(config: SchedulerConfig, epoch: VirtualTime) -> Self {
        let trace = config.record_trace.then(EventTrace::new);
        EventScheduler {
            inner: Rc::new(RefCell::new(SchedulerCore {
                queue: EventQueue::new(),
                current_time: epoch,
                events_processed: 0,
                config,
                trace,
                dispatching: false,
            })),
        }
    }

    /// A handle that does not keep the scheduler alive.
    pub fn downgrade(&self) -> WeakScheduler {
        WeakScheduler {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    /// Current virtual time.
    pub fn current_time(&self) -> VirtualTime {
        self.inner.borrow().current_time
    }

    /// Total events executed so far, across all run calls.
    pub fn events_processed(&self) -> u64 {
        self.inner.borrow().events_processed
    }

    /// Number of pending events.
    ///
    /// Cancelled events are never counted, whether or not the queue has
    /// swept them yet.
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Returns `true` if there are no more events to execute.
    pub fn is_finished(&self) -> bool {
        self.inner.borrow().queue.is_empty()
    }

    /// Time of the earliest live pending event.
    pub fn next_event_time(&self) -> Option<VirtualTime> {
        let (next, swept) = {
            let mut core = self.inner.borrow_mut();
            let next = core.queue.peek_next().map(Event::time);
            (next, core.queue.take_swept())
        };
        // Dropped outside the borrow: actions may own scheduler handles.
        drop(swept);
        next
    }

    /// A copy of the configuration the scheduler was built with.
    pub fn config(&self) -> SchedulerConfig {
        self.inner.borrow().config.clone()
    }

    /// A copy of the recorded trace, if tracing is enabled.
    pub fn trace(&self) -> Option<EventTrace> {
        self.inner.borrow().trace.clone()
    }

    // ── Scheduling ────────────────────────────────────────────

    /// Schedule `action` at absolute time `time`.
    ///
    /// Fails if `time` is not finite or lies before the current time; the
    /// time is never clamped.
    pub fn schedule<A: Action>(&self, time: f64, action: A) -> ScheduleResult<EventHandle> {
        self.schedule_labeled(time, None, Box::new(action))
    }

    /// Like [`schedule`](Self::schedule), with a label for traces and logs.
    pub fn schedule_named<A: Action>(
        &self,
        time: f64,
        label: impl Into<Label>,
        action: A,
    ) -> ScheduleResult<EventHandle> {
        self.schedule_labeled(time, Some(label.into()), Box::new(action))
    }

    /// Schedule `action` `delay` units after the current time.
    ///
    /// A zero delay runs the action at the current time, after every event
    /// already pending for that time.
    pub fn timeout<A: Action>(&self, delay: f64, action: A) -> ScheduleResult<EventHandle> {
        self.timeout_labeled(delay, None, Box::new(action))
    }

    /// Like [`timeout`](Self::timeout), with a label for traces and logs.
    pub fn timeout_named<A: Action>(
        &self,
        delay: f64,
        label: impl Into<Label>,
        action: A,
    ) -> ScheduleResult<EventHandle> {
        self.timeout_labeled(delay, Some(label.into()), Box::new(action))
    }

    fn schedule_labeled(
        &self,
        time: f64,
        label: Option<Label>,
        action: Box<dyn Action>,
    ) -> ScheduleResult<EventHandle> {
        let at = VirtualTime::new(time).inspect_err(|err| {
            tracing::warn!(%err, "rejected schedule");
        })?;
        self.enqueue(at, label, action)
    }

    fn timeout_labeled(
        &self,
        delay: f64,
        label: Option<Label>,
        action: Box<dyn Action>,
    ) -> ScheduleResult<EventHandle> {
        let current = self.current_time();
        let at = if !delay.is_finite() {
            Err(InvalidSchedule::NonFinite(delay))
        } else if delay < 0.0 {
            Err(InvalidSchedule::NegativeDelay(delay))
        } else {
            current
                .plus(delay)
                .ok_or(InvalidSchedule::Overflow { current, delay })
        };
        let at = at.inspect_err(|err| {
            tracing::warn!(%err, "rejected timeout");
        })?;
        self.enqueue(at, label, action)
    }

    fn enqueue(
        &self,
        at: VirtualTime,
        label: Option<Label>,
        action: Box<dyn Action>,
    ) -> ScheduleResult<EventHandle> {
        let mut core = self.inner.borrow_mut();
        if at < core.current_time {
            let err = InvalidSchedule::InPast {
                requested: at,
                current: core.current_time,
            };
            tracing::warn!(%err, "rejected schedule");
            return Err(err);
        }
        let handle = core.queue.schedule(at, label, action);
        tracing::debug!(id = %handle.id(), time = %at, "scheduled event");
        Ok(handle)
    }

    /// Discard every pending event without running it.
    ///
    /// Returns the number of live events dropped. The clock and the
    /// sequence counter are left untouched.
    pub fn clear(&self) -> usize {
        let (count, discarded) = {
            let mut core = self.inner.borrow_mut();
            (core.queue.len(), core.queue.drain())
        };
        // Dropped outside the borrow: actions may own scheduler handles.
        drop(discarded);
        tracing::debug!(count, "cleared pending events");
        count
    }

    // ── Execution ─────────────────────────────────────────────

    /// Execute a single step: pop one live event, advance time, invoke it.
    ///
    /// Returns `Ok(None)` without touching the clock if no live event is
    /// pending. An error from the action is returned unchanged; by then the
    /// event has been removed and the clock advanced, so a later `step` or
    /// `run` resumes with the next event.
    ///
    /// # Panics
    /// Panics if called from inside an executing action.
    pub fn step(&self) -> Result<Option<ExecutedEvent>, ActionError> {
        let (next, swept) = {
            let mut core = self.inner.borrow_mut();
            assert!(
                !core.dispatching,
                "step() called from inside an executing action"
            );
            let next = core.queue.pop_next().map(|event| core.begin_dispatch(event));
            (next, core.queue.take_swept())
        };

        // Cancelled actions are dropped only once the borrow is released.
        let Some((record, action)) = next else {
            drop(swept);
            return Ok(None);
        };
        let _guard = DispatchGuard(&self.inner);
        drop(swept);
        tracing::debug!(id = %record.id, time = %record.time, label = ?record.label, "executing event");
        action.invoke()?;

        Ok(Some(record))
    }

    /// Step until `stop_condition` holds or no live event remains.
    ///
    /// The condition is checked before every step, so a condition that is
    /// already true executes nothing. It usually captures a clone of the
    /// scheduler; see [`crate::stop`] for ready-made ones.
    pub fn run<F>(&self, mut stop_condition: F) -> Result<RunSummary, ActionError>
    where
        F: FnMut() -> bool,
    {
        self.run_loop(|_| stop_condition().then_some(StopReason::Condition))
    }

    /// Execute every event with `time <= max_time`, and nothing later.
    ///
    /// Peeks before popping, so an event due after `max_time` stays
    /// pending. The clock is left at the last executed event's time. A NaN
    /// bound executes nothing.
    ///
    /// Events that stay pending past `max_time` still own their actions.
    /// If those actions capture an [`EventScheduler`] clone, the scheduler
    /// is not freed until [`clear`](Self::clear) runs; actions that capture
    /// a [`WeakScheduler`] avoid the cycle.
    pub fn run_until_max_time(&self, max_time: f64) -> Result<RunSummary, ActionError> {
        if max_time.is_nan() {
            tracing::warn!("run_until_max_time called with NaN bound");
            return Ok(RunSummary {
                executed: 0,
                reason: StopReason::TimeLimit,
            });
        }
        self.run_loop(|sched| match sched.next_event_time() {
            Some(next) if next > max_time => Some(StopReason::TimeLimit),
            _ => None,
        })
    }

    /// Run until the queue is empty **or** `max_steps` events have been
    /// executed, whichever comes first.
    ///
    /// An empty queue is reported as [`StopReason::Drained`], even when
    /// `max_steps` is zero.
    pub fn run_for(&self, max_steps: u64) -> Result<RunSummary, ActionError> {
        let start = self.events_processed();
        self.run_loop(|sched| {
            (sched.events_processed() - start >= max_steps).then_some(StopReason::StepLimit)
        })
    }

    fn run_loop<F>(&self, mut should_stop: F) -> Result<RunSummary, ActionError>
    where
        F: FnMut(&Self) -> Option<StopReason>,
    {
        let limit = self.inner.borrow().config.event_limit;
        let mut executed = 0u64;

        let reason = loop {
            if self.is_finished() {
                break StopReason::Drained;
            }
            if let Some(reason) = should_stop(self) {
                break reason;
            }
            if limit.is_some_and(|limit| executed >= limit) {
                tracing::warn!(executed, "event limit reached, stopping run");
                break StopReason::EventLimit;
            }
            match self.step()? {
                Some(_) => executed += 1,
                None => break StopReason::Drained,
            }
        };

        tracing::debug!(executed, ?reason, time = %self.current_time(), "run finished");
        Ok(RunSummary { executed, reason })
    }
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}
