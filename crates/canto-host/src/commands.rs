//! One-off device commands for the CLI: each opens the bus, issues a single
//! request/reply, prints the result, and exits. These bypass the LED
//! worker/scheduler entirely since there's no session to run.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use canto_proto::DeviceId;
use canto_transport::{CanBus, DeviceClient};

use crate::cli::{CalibCommand, LedCommand as LedCliCommand};

pub fn open_client(interface: &str, device_id: u8, timeout_ms: u64) -> Result<DeviceClient> {
    let mut bus = CanBus::open(interface).with_context(|| format!("opening {interface}"))?;
    let id = DeviceId::new(device_id).with_context(|| format!("device id {device_id} out of range"))?;
    bus.set_device_id(device_id as u16)
        .with_context(|| format!("filtering bus to device {device_id}"))?;
    let bus = Arc::new(Mutex::new(bus));
    Ok(DeviceClient::new(bus, id).with_timeout(Duration::from_millis(timeout_ms)))
}

pub fn ping(client: &DeviceClient) -> Result<()> {
    let pong = client.ping()?;
    println!("device {} responded: proto={} flags={:#04b}", pong.device_id, pong.proto, pong.flags);
    Ok(())
}

pub fn status(client: &DeviceClient) -> Result<()> {
    let frame = client.get_status()?;
    println!("{frame:?}");
    Ok(())
}

pub fn set_interval(client: &DeviceClient, stream_id: u8, ms: u16) -> Result<()> {
    client.set_interval(stream_id, ms)?;
    println!("stream {stream_id} interval set to {ms}ms");
    Ok(())
}

pub fn get_interval(client: &DeviceClient, stream_id: u8) -> Result<()> {
    let frames = client.get_intervals(stream_id)?;
    for frame in frames {
        println!("{frame:?}");
    }
    Ok(())
}

pub fn stream_enable(client: &DeviceClient, stream_id: u8, enabled: bool) -> Result<()> {
    client.set_stream_enable(stream_id, enabled)?;
    println!("stream {stream_id} {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub fn hmc_get(client: &DeviceClient) -> Result<()> {
    let frame = client.hmc_get_config()?;
    println!("{frame:?}");
    Ok(())
}

pub fn hmc_set(client: &DeviceClient, range: u8, rate: u8, samples: u8, mode: u8) -> Result<()> {
    client.hmc_set_config(range, rate, samples, mode)?;
    println!("HMC config updated");
    Ok(())
}

pub fn aht20_read(client: &DeviceClient) -> Result<()> {
    let frame = client.aht20_read()?;
    println!("{frame:?}");
    Ok(())
}

pub fn enter_bootloader(client: &DeviceClient) -> Result<()> {
    client.enter_bootloader()?;
    println!("device entering bootloader");
    Ok(())
}

pub fn calib(client: &DeviceClient, cmd: CalibCommand) -> Result<()> {
    match cmd {
        CalibCommand::Get { field } => {
            for frame in client.calib_get(field)? {
                println!("{frame:?}");
            }
        }
        CalibCommand::Set { field, value } => {
            client.calib_set(field, value)?;
            println!("field {field} set to {value}");
        }
        CalibCommand::Save => {
            client.calib_save()?;
            println!("calibration saved");
        }
        CalibCommand::Load => {
            client.calib_load()?;
            println!("calibration loaded");
        }
        CalibCommand::Reset => {
            client.calib_reset()?;
            println!("calibration reset to defaults");
        }
        CalibCommand::CaptureEarth => {
            client.calib_capture_earth()?;
            println!("earth field captured");
        }
    }
    Ok(())
}

pub fn led(client: &DeviceClient, cmd: LedCliCommand) -> Result<()> {
    match cmd {
        LedCliCommand::On => client.ws_set_state(true, 0, false)?,
        LedCliCommand::Off => client.ws_set_state(false, 0, false)?,
        LedCliCommand::Clear => client.ws_clear()?,
        LedCliCommand::Color { sector, r, g, b } => client.ws_set_sector_color(sector, r, g, b)?,
        LedCliCommand::Brightness { level } => client.ws_set_brightness(level)?,
    }
    println!("ok");
    Ok(())
}
