//! One worker thread per device, draining a bounded command queue onto the
//! bus at a fixed pace. A slow or wedged device shouldn't let its queue back
//! up the whole fleet, so the queue drops its oldest entry rather than block
//! the caller when full, and a run of consecutive failures trips a "simple
//! mode" fallback (a flat color plus a single anim command) instead of
//! continuing to chase per-zone writes the device can't keep up with.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use canto_config::LedConfig;
use canto_transport::DeviceClient;
use tracing::{debug, warn};

use crate::command::{AnimMode, LedCommand};
use crate::gradient::diff_stops;
use crate::queue::BoundedDropOldest;

/// How often the worker wakes to check the stop flag and keepalive timer,
/// independent of whether a command is queued.
const POLL_TICK: Duration = Duration::from_millis(10);

/// How many synchronous attempts the verified-initial-apply probe makes
/// before giving up and starting the device in simple mode.
const INITIAL_APPLY_ATTEMPTS: u32 = 2;

/// A handle to a running per-device LED worker. Dropping the handle stops
/// the worker after it drains whatever's queued (call [`shutdown`](Self::shutdown)
/// for a prompt, joined stop instead).
pub struct LedWorkerHandle {
    device_id: u8,
    queue: Arc<BoundedDropOldest<LedCommand>>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl LedWorkerHandle {
    /// Queue `cmd` for this device, dropping the oldest queued command if
    /// the queue is full rather than blocking the caller.
    pub fn push(&self, cmd: LedCommand) {
        if self.queue.push(cmd) {
            debug!(device = self.device_id, "led queue full, dropped oldest command");
        }
    }

    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.queue.wake_all();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Synchronously probes the device before the async worker starts: clears
/// the strip, turns it on, and enters the idle animation, awaiting each
/// reply. A device that can't complete this starts directly in simple
/// mode instead of discovering the same failure one queued command at a
/// time.
fn verified_initial_apply(client: &DeviceClient, config: &LedConfig) -> bool {
    for attempt in 0..INITIAL_APPLY_ATTEMPTS {
        let result = (|| -> Result<(), canto_transport::TransportError> {
            client.ws_clear()?;
            client.ws_set_length(config.strip_length)?;
            client.ws_set_state(true, 0, false)?;
            client.ws_set_anim(AnimMode::SectorFollow as u8, config.base_speed, 0)?;
            Ok(())
        })();
        match result {
            Ok(()) => return true,
            Err(e) => {
                warn!(device = client.id().get(), attempt, error = %e, "verified initial apply failed");
            }
        }
    }
    warn!(device = client.id().get(), "starting in simple mode after failed initial apply");
    false
}

/// Spawn a worker thread for `client`, returning a handle the scheduler and
/// CLI can push [`LedCommand`]s through. Runs [`verified_initial_apply`]
/// synchronously first, so the returned handle's worker already knows
/// whether to start in simple mode.
pub fn spawn(client: Arc<DeviceClient>, config: LedConfig) -> LedWorkerHandle {
    let device_id = client.id().get();
    let queue = Arc::new(BoundedDropOldest::new(config.queue_depth));
    let stop = Arc::new(AtomicBool::new(false));
    let start_in_simple_mode = !verified_initial_apply(&client, &config);

    let worker_queue = Arc::clone(&queue);
    let worker_stop = Arc::clone(&stop);
    let join = std::thread::Builder::new()
        .name(format!("led-worker-{device_id}"))
        .spawn(move || run(client, config, worker_queue, worker_stop, start_in_simple_mode))
        .expect("spawn led worker thread");

    LedWorkerHandle { device_id, queue, stop, join: Some(join) }
}

struct WorkerState {
    consecutive_failures: u32,
    simple_mode: bool,
    last_gradient: Vec<crate::command::GradientStop>,
    last_state: (bool, u8),
    last_sent: Instant,
}

fn run(
    client: Arc<DeviceClient>,
    config: LedConfig,
    queue: Arc<BoundedDropOldest<LedCommand>>,
    stop: Arc<AtomicBool>,
    start_in_simple_mode: bool,
) {
    let spacing = Duration::from_millis(config.command_spacing_ms);
    let keepalive = Duration::from_millis(config.keepalive_interval_ms);
    let mut state = WorkerState {
        consecutive_failures: 0,
        simple_mode: start_in_simple_mode,
        last_gradient: Vec::new(),
        last_state: (true, 0),
        last_sent: Instant::now(),
    };
    if start_in_simple_mode {
        enter_simple_mode(&client, &config, &state);
    }

    while !stop.load(Ordering::Relaxed) {
        match queue.pop_timeout(POLL_TICK) {
            Some(cmd) => {
                pace(&mut state, spacing);
                apply(&client, &config, &mut state, cmd);
            }
            None if state.last_sent.elapsed() >= keepalive => {
                pace(&mut state, spacing);
                send_keepalive(&client, &mut state);
            }
            None => {}
        }
    }
    debug!(device = client.id().get(), "led worker shutting down");
}

fn pace(state: &mut WorkerState, spacing: Duration) {
    let elapsed = state.last_sent.elapsed();
    if elapsed < spacing {
        std::thread::sleep(spacing - elapsed);
    }
    state.last_sent = Instant::now();
}

/// Re-sends the last known on/off + mode state with `force=true`, winning
/// back color state a device reset may have clobbered. A plain GET would
/// only confirm liveness, not repair state.
fn send_keepalive(client: &DeviceClient, state: &mut WorkerState) {
    let (on, mode) = state.last_state;
    if let Err(e) = client.ws_set_state(on, mode, true) {
        warn!(device = client.id().get(), error = %e, "led keepalive failed");
        note_failure(state);
    } else {
        note_success(state);
    }
}

fn note_failure(state: &mut WorkerState) {
    state.consecutive_failures += 1;
}

fn note_success(state: &mut WorkerState) {
    state.consecutive_failures = 0;
    state.simple_mode = false;
}

/// Zone-level writes a simple-mode device can't keep up with: everything
/// except the handful of whole-strip commands `enter_simple_mode` itself
/// issues.
fn is_zone_write(cmd: &LedCommand) -> bool {
    matches!(
        cmd,
        LedCommand::SetGradient(_)
            | LedCommand::SetSectorColor { .. }
            | LedCommand::SetSectorMode { .. }
            | LedCommand::SetSectorZone { .. }
            | LedCommand::SetActiveSector(_)
    )
}

fn apply(client: &DeviceClient, config: &LedConfig, state: &mut WorkerState, cmd: LedCommand) {
    if state.simple_mode {
        if is_zone_write(&cmd) {
            debug!(device = client.id().get(), ?cmd, "dropping zone write, device is in simple mode");
            return;
        }
        if let LedCommand::SetState { on: true, .. } = cmd {
            enter_simple_mode(client, config, state);
            return;
        }
    }

    let result = send_with_retry(client, config, state, &cmd);
    match result {
        Ok(()) => note_success(state),
        Err(e) => {
            warn!(device = client.id().get(), error = %e, ?cmd, "led command failed after retries");
            note_failure(state);
            if !state.simple_mode && state.consecutive_failures >= config.simple_mode_after_failures {
                warn!(device = client.id().get(), "falling back to simple mode after repeated failures");
                state.simple_mode = true;
                enter_simple_mode(client, config, state);
            }
        }
    }
}

/// Degraded path for older firmware: skip per-zone writes entirely, set
/// the strip length, push one flat color across the whole strip, then a
/// single gradient animation command at `play_speed`.
fn enter_simple_mode(client: &DeviceClient, config: &LedConfig, state: &WorkerState) {
    let (r, g, b) = state.last_gradient.first().map(|s| (s.r, s.g, s.b)).unwrap_or((255, 255, 255));
    let _ = client.ws_set_length(config.strip_length);
    let _ = client.ws_set_sector_color(0, r, g, b);
    let _ = client.ws_set_anim(AnimMode::Gradient as u8, config.play_speed, 0);
}

fn send_with_retry(
    client: &DeviceClient,
    config: &LedConfig,
    state: &mut WorkerState,
    cmd: &LedCommand,
) -> Result<(), canto_transport::TransportError> {
    let mut last = Ok(());
    for _ in 0..config.max_retries.max(1) {
        last = send_once(client, state, cmd);
        if last.is_ok() {
            return Ok(());
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8 scenario 6: once a device is in simple mode, zone-level writes are
    /// suppressed at the classification level the worker loop consults —
    /// only the whole-strip commands `enter_simple_mode` itself issues pass.
    #[test]
    fn zone_writes_are_classified_for_simple_mode_suppression() {
        assert!(is_zone_write(&LedCommand::SetSectorColor { sector: 3, r: 1, g: 2, b: 3 }));
        assert!(is_zone_write(&LedCommand::SetSectorMode { sector: 3, mode: 1 }));
        assert!(is_zone_write(&LedCommand::SetSectorZone { sector: 3, start: 0, end: 10 }));
        assert!(is_zone_write(&LedCommand::SetGradient(Vec::new())));
        assert!(is_zone_write(&LedCommand::SetActiveSector(2)));

        assert!(!is_zone_write(&LedCommand::SetState { on: true, mode: 0 }));
        assert!(!is_zone_write(&LedCommand::SetAnim { mode: AnimMode::Gradient, speed: 5 }));
        assert!(!is_zone_write(&LedCommand::SetLength(120)));
        assert!(!is_zone_write(&LedCommand::SetBrightness(200)));
        assert!(!is_zone_write(&LedCommand::Clear));
    }
}

fn send_once(
    client: &DeviceClient,
    state: &mut WorkerState,
    cmd: &LedCommand,
) -> Result<(), canto_transport::TransportError> {
    match cmd {
        LedCommand::SetState { on, mode } => {
            client.ws_set_state(*on, *mode, false).map(|_| ())?;
            state.last_state = (*on, *mode);
            Ok(())
        }
        LedCommand::SetAnim { mode, speed } => client.ws_set_anim(*mode as u8, *speed, 0).map(|_| ()),
        LedCommand::SetGradient(stops) => {
            let changed = diff_stops(&state.last_gradient, stops);
            for (idx, stop) in changed.iter().enumerate() {
                client.ws_set_gradient_stop(idx as u8, stop.r, stop.g, stop.b, stop.position)?;
            }
            state.last_gradient = stops.clone();
            Ok(())
        }
        LedCommand::SetSectorColor { sector, r, g, b } => {
            client.ws_set_sector_color(*sector, *r, *g, *b).map(|_| ())
        }
        LedCommand::SetSectorMode { sector, mode } => client.ws_set_sector_mode(*sector, *mode).map(|_| ()),
        LedCommand::SetSectorZone { sector, start, end } => {
            client.ws_set_sector_zone(*sector, *start, *end).map(|_| ())
        }
        LedCommand::SetActiveSector(sector) => client.ws_set_active_sector(*sector).map(|_| ()),
        LedCommand::SetLength(count) => client.ws_set_length(*count).map(|_| ()),
        LedCommand::SetBrightness(level) => client.ws_set_brightness(*level).map(|_| ()),
        LedCommand::Clear => {
            state.last_gradient.clear();
            client.ws_clear().map(|_| ())
        }
    }
}
