//! The CAN listener thread: the one place that reads raw frames off the
//! bus for streamed telemetry, demultiplexing `Mag` samples and on-device
//! `Event` frames per device into bounded per-device queues the engine tick
//! drains. Which queue a given device actually fills depends on its
//! `event_source` config — only the stream the engine enabled for that
//! device ever arrives, but the listener doesn't need to know that in
//! advance, since it dispatches on the frame's own subtype byte.
//!
//! Request/reply traffic (status polls, calibration, LED commands) still
//! goes through [`canto_transport::DeviceClient`] on the same shared bus; a
//! frame this listener doesn't claim is left for `CanBus`'s own deferred
//! queue to hand back to whichever `wait_for` call is actually waiting on
//! it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use canto_detect::Event;
use canto_proto::{DeviceId, FrameSubtype, TypedFrame};
use canto_transport::CanBus;
use tracing::{trace, warn};

/// Per-device backlog bound; a device producing samples faster than the
/// engine drains them only ever loses the stalest ones.
const PER_DEVICE_QUEUE_DEPTH: usize = 8;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct MagSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

struct DeviceQueue {
    samples: Mutex<VecDeque<MagSample>>,
    events: Mutex<VecDeque<Event>>,
}

impl DeviceQueue {
    fn new() -> Self {
        Self { samples: Mutex::new(VecDeque::new()), events: Mutex::new(VecDeque::new()) }
    }

    fn push_sample(&self, sample: MagSample) {
        let mut q = self.samples.lock().unwrap();
        if q.len() >= PER_DEVICE_QUEUE_DEPTH {
            q.pop_front();
        }
        q.push_back(sample);
    }

    fn push_event(&self, event: Event) {
        let mut q = self.events.lock().unwrap();
        if q.len() >= PER_DEVICE_QUEUE_DEPTH {
            q.pop_front();
        }
        q.push_back(event);
    }

    fn drain_samples(&self) -> Vec<MagSample> {
        self.samples.lock().unwrap().drain(..).collect()
    }

    fn drain_events(&self) -> Vec<Event> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

/// A handle shared between the listener thread (producer) and the engine
/// tick (consumer, via [`MagFeed::drain`]/[`MagFeed::drain_events`]).
#[derive(Clone)]
pub struct MagFeed {
    queues: Arc<HashMap<u8, DeviceQueue>>,
}

impl MagFeed {
    /// Take every mag sample queued for `device_id` since the last call,
    /// oldest first.
    pub fn drain(&self, device_id: u8) -> Vec<MagSample> {
        match self.queues.get(&device_id) {
            Some(q) => q.drain_samples(),
            None => Vec::new(),
        }
    }

    /// Take every hardware-detected event queued for `device_id` since the
    /// last call, oldest first.
    pub fn drain_events(&self, device_id: u8) -> Vec<Event> {
        match self.queues.get(&device_id) {
            Some(q) => q.drain_events(),
            None => Vec::new(),
        }
    }
}

pub struct MagListener {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl MagListener {
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawn the listener and return it plus a [`MagFeed`] the engine tick can
/// drain, one queue pair per id in `device_ids`.
pub fn spawn(bus: Arc<Mutex<CanBus>>, device_ids: &[u8]) -> (MagListener, MagFeed) {
    let queues: HashMap<u8, DeviceQueue> = device_ids.iter().map(|&id| (id, DeviceQueue::new())).collect();
    let queues = Arc::new(queues);
    let feed = MagFeed { queues: Arc::clone(&queues) };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = Arc::clone(&stop);
    let join = std::thread::Builder::new()
        .name("can-listener".to_string())
        .spawn(move || run(bus, queues, stop_clone))
        .expect("spawn CAN listener thread");

    (MagListener { stop, join: Some(join) }, feed)
}

fn run(bus: Arc<Mutex<CanBus>>, queues: Arc<HashMap<u8, DeviceQueue>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        let result = {
            let mut bus = bus.lock().unwrap();
            bus.wait_for(POLL_INTERVAL, |frame| {
                frame.payload[0] == 0
                    && (frame.payload[1] == FrameSubtype::Mag as u8
                        || frame.payload[1] == FrameSubtype::Event as u8)
            })
        };

        let frame = match result {
            Ok(frame) => frame,
            Err(canto_transport::TransportError::Timeout) => continue,
            Err(e) => {
                warn!(error = %e, "CAN listener read error");
                continue;
            }
        };

        let device_id = match DeviceId::from_status_id(frame.arbitration_id) {
            Some(id) => id.get(),
            None => continue,
        };
        let queue = match queues.get(&device_id) {
            Some(q) => q,
            None => {
                trace!(device = device_id, "telemetry frame for unregistered device, dropping");
                continue;
            }
        };

        match TypedFrame::decode(&frame.payload) {
            Ok(TypedFrame::Mag { x, y, z }) => queue.push_sample(MagSample { x, y, z }),
            Ok(TypedFrame::Event { event_type, p0, p1, p2, p3 }) => {
                match Event::from_wire(event_type, p0, p1, p2, p3) {
                    Some(event) => queue.push_event(event),
                    None => trace!(device = device_id, event_type, "unrecognized hardware event type"),
                }
            }
            _ => {}
        }
    }
}
