//! `config` subcommand — show current configuration and file paths.

use std::path::Path;

use super::{Config, ConfigOutput, Result, kv, kv_indent, kv_width, load_config};

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    let config_exists = config_path.as_ref().map(|p| p.exists()).unwrap_or(false);
    let validation_errors: Vec<String> =
        config.validate().iter().map(|e| e.to_string()).collect();

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            valid: validation_errors.is_empty(),
            validation_errors,
            settings: config,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:"],
        &["port_device:", "bit_delay_us:", "cmd_delay_us:"],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    kv_indent("port_device:", &config.port_device, w);
    kv_indent("bit_delay_us:", config.bit_delay_us, w);
    kv_indent("cmd_delay_us:", config.cmd_delay_us, w);
    println!();

    if validation_errors.is_empty() {
        println!(
            "Validation: ok (one poll costs {} us of delays)",
            config.cluster_cost_us()
        );
    } else {
        println!("Validation:");
        for e in &validation_errors {
            println!("  {e}");
        }
    }
    Ok(())
}
