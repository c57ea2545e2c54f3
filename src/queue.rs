//! Deterministic pending-event queue.
//!
//! A `BinaryHeap` of `Reverse<Event>` acts as a min-heap keyed by
//! `(time, id)`. Because event IDs are strictly increasing and the heap is
//! deterministic, the same sequence of inserts always yields the same pop
//! order.
//!
//! Cancellation is lazy: a cancelled event stays in the heap until it
//! reaches the top, where `pop_next`/`peek_next` move it to a swept list.
//! The owner takes that list with `take_swept` and decides when the
//! cancelled actions get dropped.

use std::cell::Cell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::event::{Action, Event, EventHandle, EventIdGen, Label};
use crate::time::VirtualTime;

/// Ordered collection of pending events.
///
/// Owns the ID generator, and is the only place events are built, so that
/// every event gets a unique, monotonically increasing sequence number.
#[derive(Debug)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Event>>,

    id_gen: EventIdGen,

    /// Pending, non-cancelled entries. Shared with every queued event so
    /// that `cancel()` through any handle keeps it exact.
    live: Rc<Cell<usize>>,

    /// Cancelled entries removed from the heap but not yet dropped.
    swept: Vec<Event>,
}

impl EventQueue {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            id_gen: EventIdGen::new(),
            live: Rc::new(Cell::new(0)),
            swept: Vec::new(),
        }
    }

    /// Queue a new event at `at` and return its handle.
    pub fn schedule(
        &mut self,
        at: VirtualTime,
        label: Option<Label>,
        action: Box<dyn Action>,
    ) -> EventHandle {
        let event = Event::new(self.id_gen.next_id(), at, label, action);
        let handle = event.handle();
        event.state().attach(&self.live);
        self.heap.push(Reverse(event));
        handle
    }

    /// Pop the earliest live event (earliest time, lowest ID).
    ///
    /// Cancelled entries met on the way are moved to the swept list. The
    /// returned event is marked fired, so cancelling it afterwards has no
    /// effect. Returns `None` when no live event remains.
    pub fn pop_next(&mut self) -> Option<Event> {
        while let Some(Reverse(event)) = self.heap.pop() {
            if event.is_cancelled() {
                tracing::trace!(id = %event.id(), time = %event.time(), "skipping cancelled event");
                self.swept.push(event);
                continue;
            }
            event.state().mark_fired();
            return Some(event);
        }
        None
    }

    /// Peek at the earliest live event without firing it.
    ///
    /// Takes `&mut self` because cancelled entries at the top are swept.
    pub fn peek_next(&mut self) -> Option<&Event> {
        loop {
            let top_cancelled = self
                .heap
                .peek()
                .is_some_and(|Reverse(event)| event.is_cancelled());
            if !top_cancelled {
                break;
            }
            if let Some(Reverse(event)) = self.heap.pop() {
                tracing::trace!(id = %event.id(), time = %event.time(), "sweeping cancelled event");
                self.swept.push(event);
            }
        }
        self.heap.peek().map(|Reverse(event)| event)
    }

    /// Hand over the cancelled events swept so far.
    ///
    /// The caller owns their actions from here on; dropping the returned
    /// `Vec` drops them.
    pub fn take_swept(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.swept)
    }

    /// Remove every entry, marking the live ones cancelled.
    ///
    /// Returns all removed events, swept ones included, in queue order
    /// after the swept ones, so the caller decides where their actions
    /// get dropped.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut removed = self.take_swept();
        removed.reserve(self.heap.len());
        for Reverse(event) in std::mem::take(&mut self.heap).into_sorted_vec().into_iter().rev() {
            event.cancel();
            removed.push(event);
        }
        removed
    }

    /// Returns `true` if no live event is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pending events, not counting cancelled ones.
    pub fn len(&self) -> usize {
        self.live.get()
    }

    /// Number of heap entries, including cancelled ones not yet swept.
    pub fn raw_len(&self) -> usize {
        self.heap.len()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(t: f64) -> VirtualTime {
        VirtualTime::new(t).unwrap()
    }

    fn labeled(queue: &mut EventQueue, t: f64, label: &'static str) -> EventHandle {
        queue.schedule(at(t), Some(label.into()), Box::new(|| {}))
    }

    fn pop_label(queue: &mut EventQueue) -> Option<String> {
        queue
            .pop_next()
            .map(|e| e.label().unwrap_or_default().to_owned())
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut queue = EventQueue::new();

        labeled(&mut queue, 10.0, "first");
        labeled(&mut queue, 10.0, "second");
        labeled(&mut queue, 10.0, "third");

        let e1 = queue.pop_next().unwrap();
        let e2 = queue.pop_next().unwrap();
        let e3 = queue.pop_next().unwrap();

        // Same time → ordered by ascending event ID (creation order).
        assert!(e1.id() < e2.id());
        assert!(e2.id() < e3.id());
        assert_eq!(e1.label(), Some("first"));
        assert_eq!(e2.label(), Some("second"));
        assert_eq!(e3.label(), Some("third"));
    }

    #[test]
    fn test_time_ordering() {
        let mut queue = EventQueue::new();

        labeled(&mut queue, 30.0, "late");
        labeled(&mut queue, 10.0, "early");
        labeled(&mut queue, 20.5, "mid");

        assert_eq!(queue.pop_next().unwrap().time(), 10.0);
        assert_eq!(queue.pop_next().unwrap().time(), 20.5);
        assert_eq!(queue.pop_next().unwrap().time(), 30.0);
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn test_cancelled_entries_are_skipped() {
        let mut queue = EventQueue::new();

        let a = labeled(&mut queue, 1.0, "a");
        labeled(&mut queue, 2.0, "b");
        let c = labeled(&mut queue, 3.0, "c");

        a.cancel();
        c.cancel();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.raw_len(), 3);
        assert_eq!(pop_label(&mut queue).as_deref(), Some("b"));
        assert!(queue.pop_next().is_none());
        assert_eq!(queue.raw_len(), 0);
    }

    #[test]
    fn test_peek_sweeps_cancelled_top() {
        let mut queue = EventQueue::new();

        let a = labeled(&mut queue, 1.0, "a");
        labeled(&mut queue, 5.0, "b");
        a.cancel();

        let next = queue.peek_next().unwrap();
        assert_eq!(next.time(), 5.0);
        assert_eq!(queue.raw_len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_popped_event_cannot_be_cancelled() {
        let mut queue = EventQueue::new();
        let h = labeled(&mut queue, 1.0, "a");

        let _event = queue.pop_next().unwrap();
        h.cancel();

        assert!(!h.is_cancelled());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_swept_events_are_held_until_taken() {
        let mut queue = EventQueue::new();
        let a = labeled(&mut queue, 1.0, "a");
        let b = labeled(&mut queue, 2.0, "b");
        labeled(&mut queue, 3.0, "c");
        a.cancel();
        b.cancel();

        assert_eq!(queue.peek_next().unwrap().label(), Some("c"));
        assert_eq!(queue.raw_len(), 1);

        let swept = queue.take_swept();
        let labels: Vec<_> = swept.iter().map(|e| e.label().unwrap_or("")).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert!(queue.take_swept().is_empty());
    }

    #[test]
    fn test_pop_moves_cancelled_entries_to_swept() {
        let mut queue = EventQueue::new();
        let a = labeled(&mut queue, 1.0, "a");
        labeled(&mut queue, 2.0, "b");
        a.cancel();

        assert_eq!(pop_label(&mut queue).as_deref(), Some("b"));
        assert_eq!(queue.take_swept().len(), 1);
    }

    #[test]
    fn test_drain_cancels_live_events() {
        let mut queue = EventQueue::new();
        let a = labeled(&mut queue, 2.0, "a");
        let b = labeled(&mut queue, 1.0, "b");
        let c = labeled(&mut queue, 3.0, "c");
        c.cancel();

        let drained = queue.drain();
        let labels: Vec<_> = drained.iter().map(|e| e.label().unwrap_or("")).collect();
        assert_eq!(labels, vec!["b", "a", "c"]);
        assert!(drained.iter().all(Event::is_cancelled));
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(queue.is_empty());
        assert_eq!(queue.raw_len(), 0);
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = EventQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.peek_next().is_none());
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn test_determinism_across_runs() {
        // Two independent queues with the same insertion order must
        // produce the same output order.
        fn build() -> Vec<(u64, f64, String)> {
            let mut queue = EventQueue::new();
            labeled(&mut queue, 5.0, "a");
            labeled(&mut queue, 3.0, "b");
            labeled(&mut queue, 5.0, "c");
            labeled(&mut queue, 1.0, "d");
            labeled(&mut queue, 3.0, "e");

            let mut out = Vec::new();
            while let Some(e) = queue.pop_next() {
                out.push((e.id().raw(), e.time().as_f64(), e.label().unwrap_or("").to_owned()));
            }
            out
        }

        let run1 = build();
        let run2 = build();
        assert_eq!(run1, run2);
        let labels: Vec<&str> = run1.iter().map(|(_, _, l)| l.as_str()).collect();
        assert_eq!(labels, vec!["d", "b", "e", "a", "c"]);
    }
}
