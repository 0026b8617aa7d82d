//! Command-line surface.
//!
//! `run` is the fleet supervisor; every other subcommand is a one-off
//! request/reply against a single device, useful for bench testing without
//! the rest of the session running.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "canto-host", version, about = "Magnet-sensor fleet supervisor", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides ./canto.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Tolerate unknown config keys instead of failing to load
    #[arg(long)]
    pub compat_ignore_unknown_keys: bool,

    /// SocketCAN interface, overriding the config file's `bus.interface`
    #[arg(long)]
    pub interface: Option<String>,

    /// MIDI output port name (substring match)
    #[arg(long, default_value = "canto")]
    pub midi_port: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the fleet supervisor: discover devices, detect events, schedule
    /// notes, and drive LEDs until interrupted.
    Run,

    /// Print loaded configuration and exit.
    ShowConfig,

    /// Ping one device.
    Ping { device: u8 },

    /// Fetch one device's status frame.
    Status { device: u8 },

    /// Set a telemetry stream's interval.
    SetInterval { device: u8, stream_id: u8, ms: u16 },

    /// Read a telemetry stream's interval. `stream_id` 0 reads all four.
    GetInterval { device: u8, stream_id: u8 },

    /// Enable or disable a telemetry stream.
    StreamEnable { device: u8, stream_id: u8, enabled: bool },

    /// Read the magnetometer (HMC) configuration.
    HmcGet { device: u8 },

    /// Write the magnetometer (HMC) configuration.
    HmcSet { device: u8, range: u8, rate: u8, samples: u8, mode: u8 },

    /// Read the AHT20 temperature/humidity sensor.
    Aht20Read { device: u8 },

    /// Calibration field access.
    Calib {
        device: u8,
        #[command(subcommand)]
        command: CalibCommand,
    },

    /// Direct single-shot LED control, bypassing the worker pipeline.
    Led {
        device: u8,
        #[command(subcommand)]
        command: LedCommand,
    },

    /// Put a device into its bootloader.
    EnterBootloader { device: u8 },
}

#[derive(Subcommand, Debug)]
pub enum CalibCommand {
    /// `field` 0 reads every known calibration field.
    Get { field: u8 },
    Set { field: u8, value: i16 },
    Save,
    Load,
    Reset,
    CaptureEarth,
}

#[derive(Subcommand, Debug)]
pub enum LedCommand {
    On,
    Off,
    Clear,
    Color { sector: u8, r: u8, g: u8, b: u8 },
    Brightness { level: u8 },
}
