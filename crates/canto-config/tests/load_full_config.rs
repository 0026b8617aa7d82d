//! Loading a complete multi-section config file end to end, and the
//! later-file-wins merge behavior across two overlay files.

use std::io::Write;

use canto_config::{load_from_file, merge_configs, EventSource};

fn write_toml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_every_section_with_devices() {
    let file = write_toml(
        r#"
        [bus]
        interface = "vcan0"
        timeout_ms = 150
        retries = 5

        [instrument]
        bpm = 96.0
        fadein_ms = 15
        fadeout_ms = 300
        device_gain = 0.8

        [led]
        strip_length = 60
        base_speed = 10

        [[devices]]
        id = 1
        name = "bow"
        voice_channel = 2
        event_source = "hardware"

        [[devices]]
        id = 2
        note_map = [60, 64, 67]
        "#,
    );

    let config = load_from_file(file.path(), false).unwrap();

    assert_eq!(config.bus.interface, "vcan0");
    assert_eq!(config.bus.timeout_ms, 150);
    assert_eq!(config.instrument.bpm, 96.0);
    assert_eq!(config.instrument.fadein_ms, 15);
    assert_eq!(config.instrument.device_gain, 0.8);
    assert_eq!(config.led.strip_length, 60);

    assert_eq!(config.devices.len(), 2);
    let bow = &config.devices[0];
    assert_eq!(bow.display_name(), "bow");
    assert_eq!(bow.voice_channel, Some(2));
    assert_eq!(bow.voice_channel_b, None);
    assert_eq!(bow.event_source, EventSource::Hardware);

    let second = &config.devices[1];
    assert_eq!(second.display_name(), "device-2");
    assert_eq!(second.note_for_sector(2), 64);
}

#[test]
fn overlay_file_replaces_instrument_section_wholesale() {
    let base = write_toml("[instrument]\nbpm = 100.0\nfadein_ms = 25\n");
    let overlay = write_toml("[instrument]\nbpm = 140.0\n");

    let base_config = load_from_file(base.path(), false).unwrap();
    let overlay_config = load_from_file(overlay.path(), false).unwrap();
    let merged = merge_configs(base_config, overlay_config);

    assert_eq!(merged.instrument.bpm, 140.0);
    // The overlay didn't set fadein_ms, so the whole section falls back to
    // its own defaults rather than inheriting the base file's value.
    assert_eq!(merged.instrument.fadein_ms, canto_config::InstrumentConfig::default().fadein_ms);
}

#[test]
fn unknown_top_level_key_is_rejected_even_with_valid_devices() {
    let file = write_toml("[[devices]]\nid = 1\n\n[nonsense]\nfoo = 1\n");
    let err = load_from_file(file.path(), false);
    assert!(err.is_err());
}
