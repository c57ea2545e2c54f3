//! # Chronon: Deterministic Discrete-Event Scheduling
//!
//! A scheduling core for discrete-event simulation. A logical clock
//! advances by repeatedly executing the earliest pending event; executing
//! an event may schedule more. No async, no threads, no wall-clock time.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────┐
//! │      EventScheduler        │ ← clock + run loop (step / run)
//! │  ┌─────────────────────┐  │
//! │  │     EventQueue       │  │ ← min-heap on (time, sequence)
//! │  │  ┌───────────────┐  │  │
//! │  │  │    Events      │  │  │ ← action + lazy cancellation
//! │  │  └───────────────┘  │  │
//! │  └─────────────────────┘  │
//! │  ┌─────────────────────┐  │
//! │  │    VirtualTime       │  │ ← finite logical timestamp
//! │  └─────────────────────┘  │
//! └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use chronon::{stop, EventScheduler};
//!
//! let sched = EventScheduler::new();
//! let a = sched.schedule(5.0, || println!("A"))?;
//! sched.schedule(2.0, || println!("B"))?;
//! a.cancel();
//!
//! sched.run(stop::never())?;
//! assert_eq!(sched.current_time(), 2.0);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod queue;
pub mod scheduler;
pub mod stop;
pub mod time;
pub mod trace;

// Re-exports for convenience.
pub use config::SchedulerConfig;
pub use error::{ActionError, ActionResult, InvalidSchedule, ScheduleResult};
pub use event::{Action, Event, EventHandle, EventId, EventIdGen, ExecutedEvent, Label};
pub use queue::EventQueue;
pub use scheduler::{EventScheduler, RunSummary, StopReason, WeakScheduler};
pub use time::VirtualTime;
pub use trace::EventTrace;
