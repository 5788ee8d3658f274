//! CLI subcommands — bus probing, live monitoring, configuration.

mod config_cmd;
mod monitor;
mod probe;

use std::path::Path;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use padtap_lib::config::Config;
pub(super) use padtap_lib::error::Result;

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{key:<width$}{value}", width = w);
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Load the effective config: the custom path if given, the platform
/// default otherwise. Parse and validation problems are warnings, not
/// errors; the driver runs with defaults in their place.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    let (config, warnings) = match custom_path {
        Some(path) => Config::load_from(path),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("{w}");
    }
    for e in config.validate() {
        log::warn!("config: {e}");
    }
    config
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub valid: bool,
    pub validation_errors: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct ProbeOutput {
    pub port: String,
    pub slots: Vec<SlotJson>,
}

#[derive(Serialize)]
pub(super) struct SlotJson {
    pub slot: usize,
    pub present: bool,
    pub buttons: Vec<String>,
    pub x: i32,
    pub y: i32,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll the bus once and report what answers on each slot
    Probe,

    /// Poll continuously and print pad events until Ctrl+C
    Monitor,

    /// Show current configuration and file paths
    Config,
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Probe => probe::cmd_probe(json, config_path),
        Command::Monitor => {
            if json {
                warn_json_unsupported("monitor");
            }
            monitor::cmd_monitor(config_path)
        }
        Command::Config => config_cmd::cmd_config(json, config_path),
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn kv_width_top_only() {
        let w = kv_width(&["Port:", "Longer key:"], &[]);
        // "Longer key:" = 11 + PADDING = 13
        assert_eq!(w, 13);
    }

    #[test]
    fn kv_width_indent_drives_width() {
        // Indent key needs +2 for the prefix
        let w = kv_width(&["A:"], &["Very long indent key:"]);
        // "Very long indent key:" = 21 + PADDING + 2 = 25
        assert_eq!(w, 25);
    }

    #[test]
    fn kv_width_top_drives_width() {
        let w = kv_width(&["Very long top key:"], &["Short:"]);
        // top: 18+2=20, indent: 6+2+2=10 → 20
        assert_eq!(w, 20);
    }

    #[test]
    fn kv_width_empty_both() {
        assert_eq!(kv_width(&[], &[]), 0);
    }

    #[test]
    fn probe_width_is_compact() {
        let w = kv_width(&["Port:"], &["Buttons:", "X axis:", "Y axis:"]);
        // "Buttons:" = 8 → 8 + 2 + 2 = 12
        assert_eq!(w, 12);
    }
}
