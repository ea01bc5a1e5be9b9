// MIDI output queue - Per-device serialization of outbound messages
//
// Every device gets a pending list drained on the event loop at a fixed
// cadence. The most recently queued message goes out first, and sending a
// note purges older messages for the same (channel, note) so rapid
// re-triggers collapse into one. Notes with a duration get a deferred
// note-off that goes back through `send`.

use crate::connection::DeviceStatus;
use crate::context::ScheduledTask;
use crate::midi::message::{DEFAULT_VELOCITY, OutboundMessage};
use crate::midi::transport::MidiTransport;
use crate::timing::{Scheduler, TimerId};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Default drain cadence in milliseconds
pub const DEFAULT_DRAIN_INTERVAL_MS: f64 = 10.0;

/// A note that was started with a duration and still waits for its note-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundingNote {
    pub channel: u8,
    pub note: u8,
    note_off_timer: TimerId,
}

struct DeviceQueue<H> {
    pending: Vec<OutboundMessage>,
    sounding: Vec<SoundingNote>,
    drain_timer: Option<TimerId>,
    handle: Option<H>,
    status: DeviceStatus,
}

impl<H> DeviceQueue<H> {
    fn new(handle: Option<H>, status: DeviceStatus) -> Self {
        Self {
            pending: Vec::new(),
            sounding: Vec::new(),
            drain_timer: None,
            handle,
            status,
        }
    }

    fn is_draining(&self) -> bool {
        self.drain_timer.is_some()
    }
}

/// Routes outbound messages to one queue per device name
pub struct MidiOutputRouter<T: MidiTransport> {
    transport: T,
    queues: HashMap<String, DeviceQueue<T::Handle>>,
    drain_interval_ms: f64,
}

impl<T: MidiTransport> MidiOutputRouter<T> {
    pub fn new(transport: T) -> Self {
        Self::with_drain_interval(transport, DEFAULT_DRAIN_INTERVAL_MS)
    }

    pub fn with_drain_interval(transport: T, drain_interval_ms: f64) -> Self {
        Self {
            transport,
            queues: HashMap::new(),
            drain_interval_ms: drain_interval_ms.max(0.0),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn drain_interval_ms(&self) -> f64 {
        self.drain_interval_ms
    }

    /// Names of the devices that currently own a queue
    pub fn devices(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.queues.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn device_status(&self, device: &str) -> Option<DeviceStatus> {
        self.queues.get(device).map(|queue| queue.status)
    }

    pub fn pending_len(&self, device: &str) -> usize {
        self.queues.get(device).map_or(0, |queue| queue.pending.len())
    }

    /// Notes waiting for their deferred note-off
    pub fn sounding_notes(&self, device: &str) -> Vec<SoundingNote> {
        self.queues
            .get(device)
            .map(|queue| queue.sounding.clone())
            .unwrap_or_default()
    }

    pub fn is_draining(&self, device: &str) -> bool {
        self.queues.get(device).is_some_and(DeviceQueue::is_draining)
    }

    /// Queue a message for `device`, creating its queue on first use
    pub fn send(
        &mut self,
        scheduler: &mut Scheduler<ScheduledTask>,
        device: &str,
        message: OutboundMessage,
    ) {
        if !self.queues.contains_key(device) {
            self.register(device);
        }

        let interval = self.drain_interval_ms;
        if let Some(queue) = self.queues.get_mut(device) {
            queue.pending.push(message);
            if !queue.is_draining() {
                queue.drain_timer = Some(
                    scheduler.schedule_in(interval, ScheduledTask::DrainMidi(device.to_string())),
                );
            }
        }
    }

    /// A deferred note-off came due. Devices unregistered in the meantime
    /// are ignored.
    pub fn deferred_send(
        &mut self,
        scheduler: &mut Scheduler<ScheduledTask>,
        device: &str,
        message: OutboundMessage,
    ) {
        if self.queues.contains_key(device) {
            self.send(scheduler, device, message);
        } else {
            debug!(device, "Deferred message for a missing device dropped");
        }
    }

    /// One drain step for `device`
    pub fn drain(&mut self, scheduler: &mut Scheduler<ScheduledTask>, device: &str) {
        let interval = self.drain_interval_ms;
        let transport = &mut self.transport;
        let Some(queue) = self.queues.get_mut(device) else {
            return;
        };
        queue.drain_timer = None;

        if queue.handle.is_none() && transport.is_ready() {
            queue.handle = transport.resolve_output(device);
        }
        let Some(handle) = queue.handle.clone() else {
            queue.status = DeviceStatus::resolve(transport.is_ready(), false);
            debug!(
                device,
                pending = queue.pending.len(),
                "MIDI output not resolved, drain paused"
            );
            return;
        };

        if let Some(message) = queue.pending.pop() {
            dispatch(transport, scheduler, device, queue, &handle, message);
        }

        if !queue.pending.is_empty() {
            queue.drain_timer =
                Some(scheduler.schedule_in(interval, ScheduledTask::DrainMidi(device.to_string())));
        }
    }

    /// Drop a device queue with everything it holds
    ///
    /// Deferred note-offs that are still scheduled become no-ops.
    pub fn unregister(&mut self, scheduler: &mut Scheduler<ScheduledTask>, device: &str) -> bool {
        let Some(queue) = self.queues.remove(device) else {
            return false;
        };
        if let Some(timer) = queue.drain_timer {
            scheduler.cancel(timer);
        }
        if let Some(handle) = &queue.handle {
            self.transport.release_output(handle);
        }
        info!(
            device,
            dropped = queue.pending.len(),
            sounding = queue.sounding.len(),
            "MIDI device unregistered"
        );
        true
    }

    pub fn unregister_all(&mut self, scheduler: &mut Scheduler<ScheduledTask>) {
        let names: Vec<String> = self.queues.keys().cloned().collect();
        for name in names {
            self.unregister(scheduler, &name);
        }
    }

    /// The platform finished access negotiation: resolve every queue and
    /// restart the drains that were waiting
    pub fn on_access_granted(&mut self, scheduler: &mut Scheduler<ScheduledTask>) {
        info!(devices = self.queues.len(), "MIDI access granted");
        self.resolve_waiting(scheduler);
    }

    /// Re-read the device list. Devices that vanished are torn down, queues
    /// waiting for a device that just appeared start draining.
    pub fn refresh_devices(&mut self, scheduler: &mut Scheduler<ScheduledTask>) {
        if !self.transport.is_ready() {
            return;
        }

        let available = self.transport.output_device_names();
        let vanished: Vec<String> = self
            .queues
            .iter()
            .filter(|(name, queue)| queue.handle.is_some() && !available.contains(name))
            .map(|(name, _)| name.clone())
            .collect();
        for name in vanished {
            self.unregister(scheduler, &name);
        }

        self.resolve_waiting(scheduler);
    }

    fn register(&mut self, device: &str) {
        let ready = self.transport.is_ready();
        let handle = if ready {
            self.transport.resolve_output(device)
        } else {
            None
        };
        let status = DeviceStatus::resolve(ready, handle.is_some());
        info!(device, %status, "MIDI device registered");
        self.queues
            .insert(device.to_string(), DeviceQueue::new(handle, status));
    }

    fn resolve_waiting(&mut self, scheduler: &mut Scheduler<ScheduledTask>) {
        let ready = self.transport.is_ready();
        let interval = self.drain_interval_ms;
        for (name, queue) in self.queues.iter_mut() {
            if queue.handle.is_none() && ready {
                queue.handle = self.transport.resolve_output(name);
                queue.status = DeviceStatus::resolve(ready, queue.handle.is_some());
            }
            if queue.handle.is_some() && !queue.pending.is_empty() && !queue.is_draining() {
                queue.drain_timer =
                    Some(scheduler.schedule_in(interval, ScheduledTask::DrainMidi(name.clone())));
            }
        }
    }
}

fn dispatch<T: MidiTransport>(
    transport: &mut T,
    scheduler: &mut Scheduler<ScheduledTask>,
    device: &str,
    queue: &mut DeviceQueue<T::Handle>,
    handle: &T::Handle,
    message: OutboundMessage,
) {
    let result = match message {
        OutboundMessage::Note {
            channel,
            note,
            velocity,
            duration_ms,
            is_note_off,
            is_monophonic,
        } => {
            if is_monophonic {
                for sounding in queue.sounding.drain(..) {
                    scheduler.cancel(sounding.note_off_timer);
                }
            } else {
                queue.sounding.retain(|sounding| {
                    let same = sounding.channel == channel && sounding.note == note;
                    if same {
                        scheduler.cancel(sounding.note_off_timer);
                    }
                    !same
                });
            }

            let before = queue.pending.len();
            queue.pending.retain(|pending| !pending.targets(channel, note));
            let purged = before - queue.pending.len();
            if purged > 0 {
                debug!(device, channel, note, purged, "Coalesced pending notes");
            }

            if is_note_off {
                transport.send_note_off(handle, note, 0, channel)
            } else {
                let velocity = velocity.unwrap_or(DEFAULT_VELOCITY);
                transport
                    .send_note_on(handle, note, velocity, channel)
                    .map(|()| {
                        if let Some(duration) = duration_ms {
                            let note_off_timer = scheduler.schedule_in(
                                duration,
                                ScheduledTask::DeferredSend {
                                    device: device.to_string(),
                                    message: OutboundMessage::note_off(channel, note),
                                },
                            );
                            queue.sounding.push(SoundingNote {
                                channel,
                                note,
                                note_off_timer,
                            });
                        }
                    })
            }
        }
        OutboundMessage::ControlChange { channel, cc, value } => match value {
            Some(value) if value > 0 => transport.send_control_change(handle, cc, value, channel),
            _ => {
                debug!(device, channel, cc, "Control change without value dropped");
                Ok(())
            }
        },
    };

    match result {
        Ok(()) => queue.status = DeviceStatus::Connected,
        Err(e) => {
            queue.status = DeviceStatus::Error;
            warn!(device, error = %e, "MIDI message dropped");
        }
    }
}
