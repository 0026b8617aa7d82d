//! Fleet supervisor entry point: parse arguments, load configuration, then
//! either run a one-off device command or hand off to the main engine loop.

mod cli;
mod commands;
mod engine;
mod listener;
mod roster;
mod stats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TICK_INTERVAL: Duration = Duration::from_millis(20);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("canto_host=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (mut config, sources) = canto_config::load(cli.config.as_deref(), cli.compat_ignore_unknown_keys)
        .context("failed to load configuration")?;
    if let Some(interface) = &cli.interface {
        config.bus.interface = interface.clone();
    }

    info!(files = ?sources.files, "configuration loaded");

    if matches!(cli.command, Commands::ShowConfig) {
        println!("{config:#?}");
        return Ok(());
    }

    if let Some(device) = one_off_device(&cli.command) {
        let client = commands::open_client(&config.bus.interface, device, config.bus.timeout_ms)?;
        return dispatch_one_off(&client, cli.command);
    }

    run_session(&config, &cli.midi_port)
}

/// Extracts the target device id from any one-off subcommand, or `None` for
/// `Run`/`ShowConfig` which don't operate on a single device.
fn one_off_device(command: &Commands) -> Option<u8> {
    match command {
        Commands::Run | Commands::ShowConfig => None,
        Commands::Ping { device }
        | Commands::Status { device }
        | Commands::SetInterval { device, .. }
        | Commands::GetInterval { device, .. }
        | Commands::StreamEnable { device, .. }
        | Commands::HmcGet { device }
        | Commands::HmcSet { device, .. }
        | Commands::Aht20Read { device }
        | Commands::Calib { device, .. }
        | Commands::Led { device, .. }
        | Commands::EnterBootloader { device } => Some(*device),
    }
}

fn dispatch_one_off(client: &canto_transport::DeviceClient, command: Commands) -> Result<()> {
    match command {
        Commands::Ping { .. } => commands::ping(client),
        Commands::Status { .. } => commands::status(client),
        Commands::SetInterval { stream_id, ms, .. } => commands::set_interval(client, stream_id, ms),
        Commands::GetInterval { stream_id, .. } => commands::get_interval(client, stream_id),
        Commands::StreamEnable { stream_id, enabled, .. } => commands::stream_enable(client, stream_id, enabled),
        Commands::HmcGet { .. } => commands::hmc_get(client),
        Commands::HmcSet { range, rate, samples, mode, .. } => commands::hmc_set(client, range, rate, samples, mode),
        Commands::Aht20Read { .. } => commands::aht20_read(client),
        Commands::EnterBootloader { .. } => commands::enter_bootloader(client),
        Commands::Calib { command, .. } => commands::calib(client, command),
        Commands::Led { command, .. } => commands::led(client, command),
        Commands::Run | Commands::ShowConfig => unreachable!("handled before dispatch"),
    }
}

fn run_session(config: &canto_config::GlobalConfig, midi_port: &str) -> Result<()> {
    let bus = canto_transport::CanBus::open(&config.bus.interface)
        .with_context(|| format!("opening {}", config.bus.interface))?;
    bus.set_range_filter(canto_proto::STATUS_ID_BASE, canto_proto::STATUS_ID_MASK)
        .context("filtering bus to the device status-id range")?;
    let bus = Arc::new(Mutex::new(bus));

    let mut engine = engine::Engine::new(config, bus, midi_port)?;
    let device_ids = engine.device_ids();
    info!(devices = ?device_ids, "fleet supervisor starting");
    engine.start_devices()?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::Relaxed);
    })
    .context("failed to install Ctrl-C handler")?;

    let start = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        if let Err(e) = engine.tick(start) {
            warn!(error = %e, "engine tick failed");
        }
        std::thread::sleep(TICK_INTERVAL);
    }

    info!("shutting down");
    for (id, stats) in engine.stats().iter() {
        info!(device = id, samples = stats.samples_ok, events = stats.events_emitted, "final stats");
    }
    engine.stop_devices();
    Ok(())
}
