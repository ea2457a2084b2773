//! In-process stand-in for the durable entity runtime.
//!
//! The transfer protocols only rely on a small runtime surface:
//! - a `Clock` for every time-dependent rule
//! - durable timers that outlive activations (`TimerService`)
//! - cross-entity calls that may time out or fail (`CallDispatcher`)
//! - one activation per identity, reloaded from storage (`ActivationTable`)
//! - per-entity serialized writes (`WriteQueue`)

pub mod activation;
pub mod call;
pub mod clock;
pub mod timer;
pub mod write_queue;

pub use activation::ActivationTable;
pub use call::{CallDispatcher, CallError, DispatcherConfig};
pub use clock::{Clock, ManualClock, SystemClock, to_time_delta};
pub use timer::{InMemoryTimerService, TickInfo, TimerError, TimerHandle, TimerService};
pub use write_queue::WriteQueue;
