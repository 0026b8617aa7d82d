//! Blocking SocketCAN transport: the raw send/receive layer, plus a small
//! deferred-frame queue for replies that arrive out of order relative to
//! whatever the caller is currently waiting for.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use canto_proto::{Frame, STATUS_ID_BASE};
use socketcan::{CanFilter, CanFrame, EmbeddedFrame, Id, Socket, SocketOptions, StandardId};
use tracing::{trace, warn};

use crate::error::TransportError;

/// Bound on how many out-of-order frames we'll hold before dropping the
/// oldest. A flood of unrelated telemetry shouldn't grow this without limit.
const MAX_DEFERRED: usize = 32;

/// A SocketCAN interface opened for canto traffic.
///
/// Frames that don't match a pending [`CanBus::wait_for`] predicate are
/// stashed in a deferred queue and replayed to later calls, so an
/// interleaved status/telemetry frame for a different request never gets
/// silently dropped.
pub struct CanBus {
    socket: socketcan::CanSocket,
    deferred: VecDeque<Frame>,
}

impl CanBus {
    /// Open the named SocketCAN interface (e.g. `"can0"`, `"vcan0"`).
    pub fn open(interface: &str) -> Result<Self, TransportError> {
        let socket = socketcan::CanSocket::open(interface)
            .map_err(|e| TransportError::Open { interface: interface.to_string(), source: e })?;
        socket.set_read_timeout(Duration::from_millis(50))?;
        Ok(Self { socket, deferred: VecDeque::new() })
    }

    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let id = StandardId::new(frame.arbitration_id)
            .ok_or(TransportError::BadArbitrationId(frame.arbitration_id))?;
        let can_frame = CanFrame::new(id, &frame.payload).ok_or(TransportError::BadPayload)?;
        self.socket.write_frame(&can_frame)?;
        trace!(arbitration_id = frame.arbitration_id, "sent frame");
        Ok(())
    }

    fn take_deferred(&mut self, pred: &mut dyn FnMut(&Frame) -> bool) -> Option<Frame> {
        let pos = self.deferred.iter().position(|f| pred(f))?;
        self.deferred.remove(pos)
    }

    fn defer(&mut self, frame: Frame) {
        if self.deferred.len() >= MAX_DEFERRED {
            self.deferred.pop_front();
            warn!("deferred frame queue full, dropping oldest");
        }
        self.deferred.push_back(frame);
    }

    /// Block up to `timeout` for a frame satisfying `pred`. Non-matching
    /// frames observed along the way are queued, not discarded.
    pub fn wait_for(
        &mut self,
        timeout: Duration,
        mut pred: impl FnMut(&Frame) -> bool,
    ) -> Result<Frame, TransportError> {
        if let Some(frame) = self.take_deferred(&mut pred) {
            return Ok(frame);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout);
            }
            match self.socket.read_frame() {
                Ok(CanFrame::Data(data)) => {
                    let arbitration_id = match data.id() {
                        Id::Standard(id) => id.as_raw(),
                        Id::Extended(id) => (id.as_raw() & 0x7FF) as u16,
                    };
                    let mut payload = [0u8; 8];
                    let bytes = data.data();
                    payload[..bytes.len()].copy_from_slice(bytes);
                    let frame = Frame::new(arbitration_id, payload);
                    if pred(&frame) {
                        return Ok(frame);
                    }
                    self.defer(frame);
                }
                Ok(_) => continue,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Drain and discard up to `max_frames` pending frames — first from the
    /// deferred queue, then straight off the socket — stopping once either
    /// the frame budget or `max_ms` wall-clock elapses. Returns how many
    /// frames were dropped. Used before a bulk reconfiguration (e.g.
    /// reassigning a device id) so stale replies don't get matched against
    /// the new identity.
    pub fn flush_pending(&mut self, max_frames: usize, max_ms: u64) -> usize {
        let mut dropped = 0;
        while dropped < max_frames {
            if self.deferred.pop_front().is_none() {
                break;
            }
            dropped += 1;
        }

        let deadline = Instant::now() + Duration::from_millis(max_ms);
        while dropped < max_frames && Instant::now() < deadline {
            match self.socket.read_frame() {
                Ok(CanFrame::Data(_)) => dropped += 1,
                Ok(_) => continue,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(_) => break,
            }
        }
        dropped
    }

    /// Restrict the socket to frames matching `id` exactly (11-bit standard
    /// id, full mask) — used by single-device clients such as one-off CLI
    /// commands.
    pub fn set_exact_filter(&self, id: u16) -> Result<(), TransportError> {
        self.socket.set_filters(&[CanFilter::new(id as u32, 0x7FF)])?;
        Ok(())
    }

    /// Restrict the socket to frames matching `base` under `mask` — used by
    /// the shared engine bus to admit the whole status-id range at once.
    pub fn set_range_filter(&self, base: u16, mask: u16) -> Result<(), TransportError> {
        self.socket.set_filters(&[CanFilter::new(base as u32, mask as u32)])?;
        Ok(())
    }

    /// Drop any configured filter and accept every frame on the bus again.
    pub fn clear_filters(&self) -> Result<(), TransportError> {
        self.socket.set_filters_accept_all()?;
        Ok(())
    }

    /// Reconfigure this bus to talk exclusively to one device by id: an
    /// exact filter on its status id, with any stale buffered frames
    /// flushed first. Meant for a bus dedicated to a single
    /// [`crate::client::DeviceClient`] (the shared multi-device engine bus
    /// filters by range instead, via [`CanBus::set_range_filter`]).
    pub fn set_device_id(&mut self, device_id: u16) -> Result<(), TransportError> {
        self.flush_pending(MAX_DEFERRED, 0);
        self.set_exact_filter(STATUS_ID_BASE + device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The deferred queue's drop-oldest overflow policy, exercised directly
    /// against a `VecDeque` since `CanBus` itself needs a real socket.
    #[test]
    fn deferred_queue_drops_oldest_when_full() {
        let mut deferred: VecDeque<Frame> = VecDeque::new();
        for i in 0..(MAX_DEFERRED as u16 + 5) {
            if deferred.len() >= MAX_DEFERRED {
                deferred.pop_front();
            }
            deferred.push_back(Frame::new(i, [0; 8]));
        }
        assert_eq!(deferred.len(), MAX_DEFERRED);
        assert_eq!(deferred.front().unwrap().arbitration_id, 5);
    }
}
