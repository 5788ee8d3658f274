//! Driver configuration — TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::Timing;
use crate::protocol::{DEFAULT_BIT_DELAY_US, DEFAULT_CMD_DELAY_US, REFRESH_INTERVAL};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# padtap configuration — delays are in microseconds.\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Parallel port device node. Default: "/dev/parport0".
    #[serde(default = "default_port_device")]
    pub port_device: String,

    /// Settle delay around each clock transition, in microseconds. Default: 5.
    #[serde(default = "default_bit_delay_us")]
    pub bit_delay_us: u16,

    /// Turnaround delay after each 8-bit command, in microseconds. Default: 10.
    #[serde(default = "default_cmd_delay_us")]
    pub cmd_delay_us: u16,
}

fn default_port_device() -> String {
    "/dev/parport0".into()
}
fn default_bit_delay_us() -> u16 {
    DEFAULT_BIT_DELAY_US
}
fn default_cmd_delay_us() -> u16 {
    DEFAULT_CMD_DELAY_US
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port_device: default_port_device(),
            bit_delay_us: default_bit_delay_us(),
            cmd_delay_us: default_cmd_delay_us(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A delay field is zero; the bus needs non-zero settle time.
    ZeroDelay(&'static str),
    /// One full cluster poll would not fit inside the 10 ms refresh period.
    ClusterTooSlow { cost_us: u64, budget_us: u64 },
    /// The `port_device` field is empty or whitespace-only.
    EmptyPortDevice,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroDelay(field) => write!(f, "{field} must be non-zero"),
            ValidationError::ClusterTooSlow { cost_us, budget_us } => write!(
                f,
                "one cluster poll takes {cost_us} us of delays, over the {budget_us} us refresh period"
            ),
            ValidationError::EmptyPortDevice => write!(f, "port_device cannot be empty"),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("padtap"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from the default path, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Load config from the default path, returning the config and any parse
    /// warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Load config from an arbitrary path, returning the config and any
    /// parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Save config to an arbitrary path atomically (write to temp file, then
    /// rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Protocol timing derived from the configured delays.
    pub fn timing(&self) -> Timing {
        Timing::from_micros(self.bit_delay_us, self.cmd_delay_us)
    }

    /// Worst-case busy-wait cost of one full cluster poll, in microseconds.
    ///
    /// Select is two settle delays; each of the five commands is sixteen
    /// settle delays plus one turnaround.
    pub fn cluster_cost_us(&self) -> u64 {
        let bit = self.bit_delay_us as u64;
        let cmd = self.cmd_delay_us as u64;
        2 * bit + 5 * (16 * bit + cmd)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.port_device.trim().is_empty() {
            errors.push(ValidationError::EmptyPortDevice);
        }
        if self.bit_delay_us == 0 {
            errors.push(ValidationError::ZeroDelay("bit_delay_us"));
        }
        if self.cmd_delay_us == 0 {
            errors.push(ValidationError::ZeroDelay("cmd_delay_us"));
        }

        let budget_us = REFRESH_INTERVAL.as_micros() as u64;
        let cost_us = self.cluster_cost_us();
        if cost_us >= budget_us {
            errors.push(ValidationError::ClusterTooSlow { cost_us, budget_us });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // ── defaults ──

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.port_device, "/dev/parport0");
        assert_eq!(c.bit_delay_us, 5);
        assert_eq!(c.cmd_delay_us, 10);
    }

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn timing_matches_fields() {
        let c = Config {
            bit_delay_us: 7,
            cmd_delay_us: 21,
            ..Config::default()
        };
        let t = c.timing();
        assert_eq!(t.bit_delay, Duration::from_micros(7));
        assert_eq!(t.cmd_delay, Duration::from_micros(21));
    }

    // ── validate ──

    #[test]
    fn zero_delays_rejected() {
        let c = Config {
            bit_delay_us: 0,
            cmd_delay_us: 0,
            ..Config::default()
        };
        let errors = c.validate();
        assert!(errors.contains(&ValidationError::ZeroDelay("bit_delay_us")));
        assert!(errors.contains(&ValidationError::ZeroDelay("cmd_delay_us")));
    }

    #[test]
    fn empty_port_device_rejected() {
        let c = Config {
            port_device: "  ".into(),
            ..Config::default()
        };
        assert!(c.validate().contains(&ValidationError::EmptyPortDevice));
    }

    #[test]
    fn oversized_delays_break_refresh_budget() {
        // 82 * 120 us + 5 * 10 us is just under 10 ms; 123 us tips it over.
        let c = Config {
            bit_delay_us: 123,
            cmd_delay_us: 10,
            ..Config::default()
        };
        let errors = c.validate();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::ClusterTooSlow { .. })),
            "got {errors:?}"
        );
    }

    #[test]
    fn cluster_cost_formula() {
        let c = Config {
            bit_delay_us: 5,
            cmd_delay_us: 10,
            ..Config::default()
        };
        // 2*5 + 5*(16*5 + 10) = 10 + 450
        assert_eq!(c.cluster_cost_us(), 460);
    }

    #[test]
    fn validation_error_display() {
        let e = ValidationError::ClusterTooSlow {
            cost_us: 12_000,
            budget_us: 10_000,
        };
        assert!(e.to_string().contains("12000"));
        assert_eq!(
            ValidationError::ZeroDelay("bit_delay_us").to_string(),
            "bit_delay_us must be non-zero"
        );
    }

    // ── load / save ──

    #[test]
    fn load_from_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (c, warnings) = Config::load_from(&dir.path().join("nope.toml"));
        assert_eq!(c, Config::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn load_from_garbage_warns_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "bit_delay_us = \"not a number\"").unwrap();
        let (c, warnings) = Config::load_from(&path);
        assert_eq!(c, Config::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "bit_delay_us = 8\n").unwrap();
        let (c, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(c.bit_delay_us, 8);
        assert_eq!(c.cmd_delay_us, default_cmd_delay_us());
        assert_eq!(c.port_device, default_port_device());
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let c = Config {
            port_device: "/dev/parport1".into(),
            bit_delay_us: 6,
            cmd_delay_us: 12,
        };
        c.save_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# padtap configuration"));

        let (reloaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(reloaded, c);
    }
}
