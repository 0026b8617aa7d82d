//! Request/reply device client: one command round-trip per call, with
//! retry-on-timeout and a remembered last error so a flapping device
//! doesn't spam identical warnings up the stack.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use canto_proto::{CodecError, CommandOpcode, DeviceId, Frame, FrameSubtype, HostCommand, PongInfo, StatusReply, TypedFrame};
use tracing::{debug, warn};

use crate::bus::CanBus;
use crate::error::TransportError;

/// Default per-attempt reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Default number of attempts before giving up on a device.
pub const DEFAULT_RETRIES: u32 = 3;

/// How long a chunked multi-frame collection (`calib_get(0)`,
/// `get_intervals(0)`) will wait for the *next* frame in the burst before
/// concluding the device has finished sending.
const CHUNK_QUIESCENCE: Duration = Duration::from_millis(800);

/// Number of calibration fields a full `calib_get(0)` sweep returns.
const CALIB_FIELD_COUNT: usize = 19;

/// Number of streams a full `get_intervals(0)` sweep returns.
const INTERVAL_STREAM_COUNT: usize = 4;

/// A joined AHT20 reading: the scaled measurement plus the raw ADC counts
/// it was derived from, reported by the device as two separate frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aht20Reading {
    pub temp_centi: i16,
    pub rh_centi: u16,
    pub status: u8,
    pub crc_ok: u8,
    pub raw_h: u32,
    pub raw_t: u32,
}

/// A parsed `HMC_CFG` reply, with the derived milligauss-per-digit scale
/// factor the device doesn't send directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HmcConfig {
    pub range: u8,
    pub rate: u8,
    pub samples: u8,
    pub mode: u8,
    pub mg_centi: u16,
    pub mg_per_digit: f64,
}

impl HmcConfig {
    fn from_frame(range: u8, rate: u8, samples: u8, mode: u8, mg_centi: u16) -> Self {
        Self { range, rate, samples, mode, mg_centi, mg_per_digit: mg_centi as f64 / 100.0 }
    }
}

/// A request/reply client for one device on the bus.
///
/// The bus is shared (`Arc<Mutex<_>>`) across every device's client, since
/// every device's traffic multiplexes over the same SocketCAN socket.
pub struct DeviceClient {
    bus: Arc<Mutex<CanBus>>,
    id: DeviceId,
    timeout: Duration,
    retries: u32,
    last_error: Mutex<Option<String>>,
}

impl DeviceClient {
    pub fn new(bus: Arc<Mutex<CanBus>>, id: DeviceId) -> Self {
        Self {
            bus,
            id,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            last_error: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Send `cmd` and wait for the status reply tagged with its own opcode,
    /// retrying the whole round trip up to `self.retries` times on timeout.
    fn request_status(&self, cmd: HostCommand) -> Result<StatusReply, TransportError> {
        let opcode_tag = cmd.opcode as u8;
        let frame = Frame::new(self.id.command_id(), cmd.encode());
        let status_id = self.id.status_id();
        let mut last_err = TransportError::Timeout;

        for attempt in 0..self.retries.max(1) {
            {
                let bus = self.bus.lock().unwrap();
                if let Err(e) = bus.send(frame) {
                    last_err = e;
                    continue;
                }
            }
            let result = {
                let mut bus = self.bus.lock().unwrap();
                bus.wait_for(self.timeout, |f| f.arbitration_id == status_id)
            };
            match result {
                Ok(reply_frame) => match StatusReply::decode(&reply_frame.payload) {
                    Ok(reply) if reply.tag == opcode_tag => {
                        *self.last_error.lock().unwrap() = None;
                        return Ok(reply);
                    }
                    Ok(reply) => {
                        debug!(
                            device = %self.id,
                            expected = opcode_tag,
                            got = reply.tag,
                            "status reply tag mismatch, treating as stray"
                        );
                        continue;
                    }
                    Err(e) => {
                        last_err = e.into();
                        continue;
                    }
                },
                Err(e) => {
                    warn!(device = %self.id, attempt, "no reply, retrying");
                    last_err = e;
                }
            }
        }

        let message = last_err.to_string();
        *self.last_error.lock().unwrap() = Some(message);
        Err(TransportError::NoResponse(self.id))
    }

    /// Wait for the next typed telemetry/reply frame addressed to this
    /// device, regardless of subtype.
    fn wait_typed(&self) -> Result<TypedFrame, TransportError> {
        let status_id = self.id.status_id();
        let frame = {
            let mut bus = self.bus.lock().unwrap();
            bus.wait_for(self.timeout, |f| f.arbitration_id == status_id)?
        };
        Ok(TypedFrame::decode(&frame.payload)?)
    }

    /// Wait for a typed reply of exactly `subtype`, deferring anything else
    /// (another in-flight reply, stray telemetry) for a later waiter.
    fn wait_typed_subtype(&self, subtype: FrameSubtype) -> Result<TypedFrame, TransportError> {
        let status_id = self.id.status_id();
        let frame = {
            let mut bus = self.bus.lock().unwrap();
            bus.wait_for(self.timeout, |f| {
                f.arbitration_id == status_id && f.payload[0] == 0 && f.payload[1] == subtype as u8
            })?
        };
        Ok(TypedFrame::decode(&frame.payload)?)
    }

    /// Collect a burst of same-subtype frames until `expected_count` is
    /// reached or the burst goes quiet for [`CHUNK_QUIESCENCE`], whichever
    /// comes first. Used for the `field_id`/`stream_id` `0` "all of them"
    /// bulk-read convention.
    fn collect_chunked(&self, subtype: FrameSubtype, expected_count: usize) -> Vec<TypedFrame> {
        let status_id = self.id.status_id();
        let mut frames = Vec::with_capacity(expected_count);
        while frames.len() < expected_count {
            let result = {
                let mut bus = self.bus.lock().unwrap();
                bus.wait_for(CHUNK_QUIESCENCE, |f| {
                    f.arbitration_id == status_id && f.payload[0] == 0 && f.payload[1] == subtype as u8
                })
            };
            match result {
                Ok(frame) => match TypedFrame::decode(&frame.payload) {
                    Ok(typed) => frames.push(typed),
                    Err(e) => debug!(device = %self.id, error = %e, "dropping malformed chunk frame"),
                },
                Err(_) => break,
            }
        }
        frames
    }

    fn require_ok(&self, reply: StatusReply) -> Result<(), TransportError> {
        if reply.code.is_ok() {
            Ok(())
        } else {
            Err(TransportError::DeviceError { device: self.id, status: reply.code, tag: reply.tag })
        }
    }

    pub fn ping(&self) -> Result<PongInfo, TransportError> {
        let frame = Frame::new(self.id.command_id(), HostCommand::new(CommandOpcode::Ping).encode());
        let status_id = self.id.status_id();
        let mut last_err = TransportError::Timeout;
        for _ in 0..self.retries.max(1) {
            {
                let bus = self.bus.lock().unwrap();
                bus.send(frame)?;
            }
            let result = {
                let mut bus = self.bus.lock().unwrap();
                bus.wait_for(self.timeout, |f| f.arbitration_id == status_id)
            };
            match result.and_then(|f| canto_proto::decode_pong(&f.payload).ok_or(TransportError::Timeout)) {
                Ok(pong) => return Ok(pong),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    pub fn get_status(&self) -> Result<TypedFrame, TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::GetStatus))?;
        self.require_ok(reply)?;
        self.wait_typed()
    }

    pub fn set_interval(&self, stream_id: u8, ms: u16) -> Result<TypedFrame, TransportError> {
        if stream_id == 0 || stream_id > 4 {
            return Err(CodecError::StreamIdOutOfRange(stream_id).into());
        }
        let [lo, hi] = ms.to_le_bytes();
        let cmd = HostCommand::with_args(CommandOpcode::SetInterval, [stream_id, lo, hi, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::Interval)
    }

    /// Read back one stream's interval.
    pub fn get_interval(&self, stream_id: u8) -> Result<TypedFrame, TransportError> {
        if stream_id == 0 || stream_id > 4 {
            return Err(CodecError::StreamIdOutOfRange(stream_id).into());
        }
        Ok(self.get_intervals(stream_id)?.remove(0))
    }

    /// Read back stream intervals. `stream_id == 0` collects all four
    /// streams' INTERVAL frames in one bulk read; any other id returns a
    /// single-element vec for that stream.
    pub fn get_intervals(&self, stream_id: u8) -> Result<Vec<TypedFrame>, TransportError> {
        if stream_id > 4 {
            return Err(CodecError::StreamIdOutOfRange(stream_id).into());
        }
        let cmd = HostCommand::with_args(CommandOpcode::GetInterval, [stream_id, 0, 0, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        if stream_id == 0 {
            Ok(self.collect_chunked(FrameSubtype::Interval, INTERVAL_STREAM_COUNT))
        } else {
            Ok(vec![self.wait_typed_subtype(FrameSubtype::Interval)?])
        }
    }

    pub fn set_stream_enable(&self, stream_id: u8, enabled: bool) -> Result<(), TransportError> {
        if stream_id == 0 || stream_id > 4 {
            return Err(CodecError::StreamIdOutOfRange(stream_id).into());
        }
        let cmd = HostCommand::with_args(
            CommandOpcode::SetStreamEnable,
            [stream_id, enabled as u8, 0, 0, 0, 0, 0],
        );
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)
    }

    pub fn hmc_get_config(&self) -> Result<HmcConfig, TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::HmcGetCfg))?;
        self.require_ok(reply)?;
        match self.wait_typed_subtype(FrameSubtype::HmcCfg)? {
            TypedFrame::HmcCfg { range, rate, samples, mode, mg_centi } => {
                Ok(HmcConfig::from_frame(range, rate, samples, mode, mg_centi))
            }
            other => Err(unexpected_subtype(FrameSubtype::HmcCfg, other)),
        }
    }

    pub fn hmc_set_config(&self, range: u8, rate: u8, samples: u8, mode: u8) -> Result<HmcConfig, TransportError> {
        if range > 7 {
            return Err(TransportError::Validation(format!("hmc range {range} out of range [0,7]")));
        }
        if rate > 6 {
            return Err(TransportError::Validation(format!("hmc rate {rate} out of range [0,6]")));
        }
        if samples > 3 {
            return Err(TransportError::Validation(format!("hmc samples {samples} out of range [0,3]")));
        }
        if mode > 2 {
            return Err(TransportError::Validation(format!("hmc mode {mode} out of range [0,2]")));
        }
        let cmd = HostCommand::with_args(CommandOpcode::HmcSetCfg, [range, rate, samples, mode, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        match self.wait_typed_subtype(FrameSubtype::HmcCfg)? {
            TypedFrame::HmcCfg { range, rate, samples, mode, mg_centi } => {
                Ok(HmcConfig::from_frame(range, rate, samples, mode, mg_centi))
            }
            other => Err(unexpected_subtype(FrameSubtype::HmcCfg, other)),
        }
    }

    /// Read the AHT20 temperature/humidity sensor. The device answers with
    /// two frames — a scaled measurement and the raw ADC counts it came
    /// from — which may arrive in either order; this joins both.
    pub fn aht20_read(&self) -> Result<Aht20Reading, TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::Aht20Read))?;
        self.require_ok(reply)?;
        let meas = self.wait_typed_subtype(FrameSubtype::Aht20Meas)?;
        let raw = self.wait_typed_subtype(FrameSubtype::Aht20Raw)?;
        let (temp_centi, rh_centi, status, crc_ok) = match meas {
            TypedFrame::Aht20Meas { temp_centi, rh_centi, status, crc_ok } => (temp_centi, rh_centi, status, crc_ok),
            other => return Err(unexpected_subtype(FrameSubtype::Aht20Meas, other)),
        };
        let (raw_h, raw_t) = match raw {
            TypedFrame::Aht20Raw { raw_h, raw_t } => (raw_h, raw_t),
            other => return Err(unexpected_subtype(FrameSubtype::Aht20Raw, other)),
        };
        Ok(Aht20Reading { temp_centi, rh_centi, status, crc_ok, raw_h, raw_t })
    }

    /// Read back calibration fields. `field_id == 0` collects every known
    /// field (a bulk sweep of up to [`CALIB_FIELD_COUNT`] CALIB_VALUE
    /// frames); any other id returns a single-element vec for that field.
    pub fn calib_get(&self, field_id: u8) -> Result<Vec<TypedFrame>, TransportError> {
        if field_id > 19 {
            return Err(CodecError::FieldIdOutOfRange(field_id).into());
        }
        let cmd = HostCommand::with_args(CommandOpcode::CalibGet, [field_id, 0, 0, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        if field_id == 0 {
            Ok(self.collect_chunked(FrameSubtype::CalibValue, CALIB_FIELD_COUNT))
        } else {
            Ok(vec![self.wait_typed_subtype(FrameSubtype::CalibValue)?])
        }
    }

    pub fn calib_set(&self, field_id: u8, value: i16) -> Result<(), TransportError> {
        if field_id == 0 || field_id > 19 {
            return Err(CodecError::FieldIdOutOfRange(field_id).into());
        }
        let [lo, hi] = value.to_le_bytes();
        let cmd = HostCommand::with_args(CommandOpcode::CalibSet, [field_id, lo, hi, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)
    }

    pub fn calib_save(&self) -> Result<(), TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::CalibSave))?;
        self.require_ok(reply)
    }

    pub fn calib_load(&self) -> Result<(), TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::CalibLoad))?;
        self.require_ok(reply)
    }

    pub fn calib_reset(&self) -> Result<(), TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::CalibReset))?;
        self.require_ok(reply)
    }

    pub fn calib_capture_earth(&self) -> Result<(), TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::CalibCaptureEarth))?;
        self.require_ok(reply)
    }

    pub fn enter_bootloader(&self) -> Result<(), TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::EnterBootloader))?;
        self.require_ok(reply)
    }

    /// `force` re-applies `on`/`mode` even if the device believes it's
    /// already in that state — used by the keepalive path to win back
    /// color state the device may have reset on its own.
    pub fn ws_set_state(&self, on: bool, mode: u8, force: bool) -> Result<TypedFrame, TransportError> {
        let cmd =
            HostCommand::with_args(CommandOpcode::WsSetState, [on as u8, mode, force as u8, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsState)
    }

    pub fn ws_get_state(&self) -> Result<TypedFrame, TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::WsGetState))?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsState)
    }

    pub fn ws_set_anim(&self, anim_id: u8, speed: u8, param: u8) -> Result<TypedFrame, TransportError> {
        let cmd = HostCommand::with_args(CommandOpcode::WsSetAnim, [anim_id, speed, param, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsAnim)
    }

    pub fn ws_get_anim(&self) -> Result<TypedFrame, TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::WsGetAnim))?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsAnim)
    }

    pub fn ws_set_sector_color(&self, sector: u8, r: u8, g: u8, b: u8) -> Result<TypedFrame, TransportError> {
        let cmd = HostCommand::with_args(CommandOpcode::WsSetSectorColor, [sector, r, g, b, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsSectorColor)
    }

    pub fn ws_get_sector_color(&self, sector: u8) -> Result<TypedFrame, TransportError> {
        let cmd = HostCommand::with_args(CommandOpcode::WsGetSectorColor, [sector, 0, 0, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsSectorColor)
    }

    pub fn ws_set_sector_mode(&self, sector: u8, mode: u8) -> Result<TypedFrame, TransportError> {
        let cmd = HostCommand::with_args(CommandOpcode::WsSetSectorMode, [sector, mode, 0, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsSectorMode)
    }

    pub fn ws_get_sector_mode(&self, sector: u8) -> Result<TypedFrame, TransportError> {
        let cmd = HostCommand::with_args(CommandOpcode::WsGetSectorMode, [sector, 0, 0, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsSectorMode)
    }

    pub fn ws_set_sector_zone(&self, sector: u8, start: u8, end: u8) -> Result<TypedFrame, TransportError> {
        let cmd = HostCommand::with_args(CommandOpcode::WsSetSectorZone, [sector, start, end, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsSectorZone)
    }

    pub fn ws_get_sector_zone(&self, sector: u8) -> Result<TypedFrame, TransportError> {
        let cmd = HostCommand::with_args(CommandOpcode::WsGetSectorZone, [sector, 0, 0, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsSectorZone)
    }

    pub fn ws_set_gradient_stop(
        &self,
        stop_index: u8,
        r: u8,
        g: u8,
        b: u8,
        position: u8,
    ) -> Result<TypedFrame, TransportError> {
        let cmd =
            HostCommand::with_args(CommandOpcode::WsSetGradient, [stop_index, r, g, b, position, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsGradient)
    }

    pub fn ws_set_brightness(&self, brightness: u8) -> Result<TypedFrame, TransportError> {
        let cmd = HostCommand::with_args(CommandOpcode::WsSetBrightness, [brightness, 0, 0, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsState)
    }

    pub fn ws_clear(&self) -> Result<TypedFrame, TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::WsClear))?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsState)
    }

    pub fn ws_set_length(&self, count: u16) -> Result<TypedFrame, TransportError> {
        let [lo, hi] = count.to_le_bytes();
        let cmd = HostCommand::with_args(CommandOpcode::WsSetLength, [lo, hi, 0, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsLength)
    }

    pub fn ws_get_length(&self) -> Result<TypedFrame, TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::WsGetLength))?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsLength)
    }

    pub fn ws_set_active_sector(&self, sector: u8) -> Result<TypedFrame, TransportError> {
        let cmd = HostCommand::with_args(CommandOpcode::WsSetActiveSector, [sector, 0, 0, 0, 0, 0, 0]);
        let reply = self.request_status(cmd)?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsActiveSector)
    }

    pub fn ws_get_active_sector(&self) -> Result<TypedFrame, TransportError> {
        let reply = self.request_status(HostCommand::new(CommandOpcode::WsGetActiveSector))?;
        self.require_ok(reply)?;
        self.wait_typed_subtype(FrameSubtype::WsActiveSector)
    }

    /// The most recent transport-level failure for this device, if the last
    /// attempted request didn't succeed. Cleared on the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }
}

fn unexpected_subtype(expected: FrameSubtype, got: TypedFrame) -> TransportError {
    TransportError::Validation(format!("expected a {expected:?} reply, got {:?}", got.subtype()))
}
