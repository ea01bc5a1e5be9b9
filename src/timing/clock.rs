// Clock - Drift-corrected tick generator
// The clock is the only time source of the sequencer. Each fire re-targets the
// next absolute deadline instead of waiting a fixed interval, so callback
// jitter never accumulates over long sessions.

use crate::timing::scheduler::{Scheduler, TimerId};
use crate::context::ScheduledTask;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

/// Value published on each clock fire
pub type Tick = i64;

/// Tick published when the clock stops ("not running")
pub const STOPPED_TICK: Tick = -1;

/// Maximum swing amount accepted by [`Clock::set_swing`]
pub const MAX_SWING: f64 = 0.9;

/// Tick listener
pub type TickHandler = Box<dyn FnMut(Tick)>;

/// Identifies a subscription for [`Clock::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

pub struct Clock {
    interval_ms: f64,
    swing: f64,
    tick: Tick,
    next_fire_ms: f64,
    timer: Option<TimerId>,
    subscribers: Vec<(SubscriberId, TickHandler)>,
    next_subscriber: u64,
}

impl Clock {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms: interval_ms.max(f64::EPSILON),
            swing: 0.0,
            tick: STOPPED_TICK,
            next_fire_ms: 0.0,
            timer: None,
            subscribers: Vec::new(),
            next_subscriber: 0,
        }
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Change the interval used for all future scheduling
    ///
    /// A timer already in flight keeps its deadline; only the delay computed at
    /// the next fire uses the new value.
    pub fn set_interval(&mut self, interval_ms: f64) {
        if interval_ms > 0.0 && interval_ms.is_finite() {
            self.interval_ms = interval_ms;
        } else {
            debug!(interval_ms, "ignoring invalid clock interval");
        }
    }

    pub fn swing(&self) -> f64 {
        self.swing
    }

    /// Set the swing amount (0 = straight)
    ///
    /// Even ticks are followed by a longer period, odd ticks by a shorter one,
    /// keeping the average period equal to the interval.
    pub fn set_swing(&mut self, swing: f64) {
        self.swing = if swing.is_finite() {
            swing.clamp(0.0, MAX_SWING)
        } else {
            0.0
        };
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Last published tick (or [`STOPPED_TICK`])
    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    /// Start a fresh run; the first fire happens immediately and publishes 0
    pub fn start(&mut self, scheduler: &mut Scheduler<ScheduledTask>) {
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }

        let now = scheduler.now_ms();
        self.tick = STOPPED_TICK;
        self.next_fire_ms = now;
        self.timer = Some(scheduler.schedule_at(now, ScheduledTask::ClockFire));
    }

    /// Cancel the pending fire and publish [`STOPPED_TICK`]
    ///
    /// Returns `None` when the clock was not running (nothing is published).
    pub fn stop(&mut self, scheduler: &mut Scheduler<ScheduledTask>) -> Option<Tick> {
        let timer = self.timer.take()?;
        scheduler.cancel(timer);

        self.tick = STOPPED_TICK;
        self.publish(STOPPED_TICK);
        Some(STOPPED_TICK)
    }

    /// Handle a due [`ScheduledTask::ClockFire`]
    ///
    /// Schedules the following fire before notifying subscribers, then
    /// returns the published tick. Returns `None` for a stale fire.
    pub fn fire(&mut self, scheduler: &mut Scheduler<ScheduledTask>) -> Option<Tick> {
        self.timer.take()?;

        let scheduled = self.next_fire_ms;
        self.tick += 1;
        self.next_fire_ms = scheduled + self.period_after(self.tick);

        let delay = self.next_fire_ms - scheduler.now_ms();
        self.timer = Some(scheduler.schedule_in(delay, ScheduledTask::ClockFire));

        self.publish(self.tick);
        Some(self.tick)
    }

    pub fn subscribe(&mut self, handler: TickHandler) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers.push((id, handler));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(subscriber, _)| *subscriber != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn period_after(&self, tick: Tick) -> f64 {
        if self.swing == 0.0 {
            self.interval_ms
        } else if tick.rem_euclid(2) == 0 {
            self.interval_ms * (1.0 + self.swing)
        } else {
            self.interval_ms * (1.0 - self.swing)
        }
    }

    fn publish(&mut self, tick: Tick) {
        for (id, handler) in self.subscribers.iter_mut() {
            // A failing subscriber must not take the clock down with it
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(tick)));
            if result.is_err() {
                error!(subscriber = ?id, tick, "clock subscriber panicked");
            }
        }
    }
}
