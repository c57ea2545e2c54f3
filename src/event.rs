//! Event records for the discrete-event scheduler.
//!
//! An `Event` says "run this action at this virtual time". Once created it
//! never changes, except for its cancellation status, which is shared with
//! every `EventHandle` minted for it.

use std::borrow::Cow;
use std::cell::{Cell, OnceCell};
use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::{ActionError, ActionResult};
use crate::time::VirtualTime;

/// Optional human-readable name carried by an event into traces and logs.
pub type Label = Cow<'static, str>;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly-increasing event sequence number.
///
/// Breaks ties in the queue: two events scheduled at the same
/// `VirtualTime` run in the order their `EventId`s were minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(u64);

impl EventId {
    /// Wrap a raw u64 into an `EventId`.
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    /// Return the raw value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic, strictly-increasing event-ID generator.
///
/// Each scheduler owns exactly one of these.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    /// Create a generator starting at 0.
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }
}

impl Default for EventIdGen {
    fn default() -> Self {
        Self::new()
    }
}

// ── Action ────────────────────────────────────────────────────────────

/// The work an event performs when it fires.
///
/// Implemented for every `FnOnce()` closure returning `()` or
/// `Result<(), E>` with `E: Into<anyhow::Error>`, so callers normally just
/// pass a closure that captures whatever state it needs (including a clone
/// of the scheduler).
pub trait Action: 'static {
    /// Run the action, consuming it.
    fn invoke(self: Box<Self>) -> ActionResult;
}

/// Return types an action closure may have.
pub trait IntoActionResult {
    fn into_action_result(self) -> ActionResult;
}

impl IntoActionResult for () {
    fn into_action_result(self) -> ActionResult {
        Ok(())
    }
}

impl<E> IntoActionResult for Result<(), E>
where
    E: Into<ActionError>,
{
    fn into_action_result(self) -> ActionResult {
        self.map_err(Into::into)
    }
}

impl<F, R> Action for F
where
    F: FnOnce() -> R + 'static,
    R: IntoActionResult,
{
    fn invoke(self: Box<Self>) -> ActionResult {
        (*self)().into_action_result()
    }
}

// ── Cancellation state ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventStatus {
    Pending,
    Cancelled,
    Fired,
}

/// Status shared between an `Event` and its handles.
///
/// `live` is attached when the event enters a queue; it is the queue's
/// count of pending, non-cancelled entries.
#[derive(Debug)]
pub(crate) struct EventState {
    status: Cell<EventStatus>,
    live: OnceCell<Rc<Cell<usize>>>,
}

impl EventState {
    fn new() -> Self {
        EventState {
            status: Cell::new(EventStatus::Pending),
            live: OnceCell::new(),
        }
    }

    pub(crate) fn status(&self) -> EventStatus {
        self.status.get()
    }

    /// Attach the queue's live counter and count this event in it.
    pub(crate) fn attach(&self, live: &Rc<Cell<usize>>) {
        if self.live.set(Rc::clone(live)).is_ok() && self.status() == EventStatus::Pending {
            live.set(live.get() + 1);
        }
    }

    fn release(&self) {
        if let Some(live) = self.live.get() {
            live.set(live.get().saturating_sub(1));
        }
    }

    fn cancel(&self) {
        if self.status() == EventStatus::Pending {
            self.status.set(EventStatus::Cancelled);
            self.release();
        }
    }

    pub(crate) fn mark_fired(&self) {
        if self.status() == EventStatus::Pending {
            self.status.set(EventStatus::Fired);
            self.release();
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single scheduled event.
///
/// Ordered by `(time, id)`. Since ids are unique, two distinct events
/// never compare equal, even if their time and action are identical.
pub struct Event {
    id: EventId,
    time: VirtualTime,
    label: Option<Label>,
    action: Box<dyn Action>,
    state: Rc<EventState>,
}

impl Event {
    /// Create an event that runs `action` at `time`.
    ///
    /// Only the queue builds events, so `id` always comes from its
    /// generator. `VirtualTime` is finite by construction; whether `time`
    /// lies in the past is checked by the scheduler before it gets here.
    pub(crate) fn new(
        id: EventId,
        time: VirtualTime,
        label: Option<Label>,
        action: Box<dyn Action>,
    ) -> Self {
        Event {
            id,
            time,
            label,
            action,
            state: Rc::new(EventState::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> EventId {
        self.id
    }

    #[inline]
    pub fn time(&self) -> VirtualTime {
        self.time
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Mark the event cancelled. Idempotent; a no-op once it has fired.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.status() == EventStatus::Cancelled
    }

    /// A cancellation handle sharing this event's status.
    pub(crate) fn handle(&self) -> EventHandle {
        EventHandle {
            id: self.id,
            time: self.time,
            state: Rc::clone(&self.state),
        }
    }

    pub(crate) fn state(&self) -> &EventState {
        &self.state
    }

    /// Split the event into its record and its action, ready to fire.
    pub(crate) fn into_parts(self) -> (ExecutedEvent, Box<dyn Action>) {
        let record = ExecutedEvent {
            id: self.id,
            time: self.time,
            label: self.label,
        };
        (record, self.action)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("time", &self.time)
            .field("label", &self.label)
            .field("status", &self.state.status())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

/// Ordering: smallest `(time, id)` first.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Event Handle ──────────────────────────────────────────────────────

/// Caller-side token for a scheduled event.
///
/// Cloning a handle is cheap; all clones observe and control the same
/// event.
#[derive(Debug, Clone)]
pub struct EventHandle {
    id: EventId,
    time: VirtualTime,
    state: Rc<EventState>,
}

impl EventHandle {
    #[inline]
    pub fn id(&self) -> EventId {
        self.id
    }

    /// The time the event is (or was) due.
    #[inline]
    pub fn time(&self) -> VirtualTime {
        self.time
    }

    /// Cancel the event if it has not been popped yet.
    ///
    /// Idempotent. Calling this from within the event's own action does
    /// nothing: the action is already running.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.status() == EventStatus::Cancelled
    }

    /// `true` while the event is still waiting in the queue.
    pub fn is_pending(&self) -> bool {
        self.state.status() == EventStatus::Pending
    }
}

// ── Executed Event ────────────────────────────────────────────────────

/// Record of an event that `step` popped and executed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ExecutedEvent {
    pub id: EventId,
    pub time: VirtualTime,
    pub label: Option<Label>,
}

impl std::fmt::Display for ExecutedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.id, self.time)?;
        if let Some(label) = &self.label {
            write!(f, " ({})", label)?;
        }
        Ok(())
    }
}
