// Timing - Scheduler, drift-corrected clock and tempo conversion

pub mod clock;
pub mod scheduler;
pub mod tempo;

pub use clock::{Clock, STOPPED_TICK, SubscriberId, Tick, TickHandler};
pub use scheduler::{ManualTime, MonotonicTime, Scheduler, TimeSource, TimerId};
pub use tempo::Tempo;
