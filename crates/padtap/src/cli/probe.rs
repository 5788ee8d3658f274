//! `probe` subcommand — poll the bus once and report each slot.

use std::path::Path;

use padtap_lib::TapError;
use padtap_lib::engine::ProtocolEngine;
use padtap_lib::pad::{self, Button, PadReply};
use padtap_lib::port::{ParallelPort, open_port};
use padtap_lib::protocol::MAX_PADS;

use super::{ProbeOutput, Result, SlotJson, kv, kv_indent, kv_width, load_config};

/// Names of the held buttons, in emission order.
fn pressed_buttons(reply: &PadReply) -> Vec<String> {
    let word = reply.button_word();
    Button::ALL
        .iter()
        .filter(|b| word & b.mask() == 0) // active low
        .map(|b| b.to_string())
        .collect()
}

fn slot_json(slot: usize, reply: &PadReply) -> SlotJson {
    let word = reply.button_word();
    SlotJson {
        slot,
        present: reply.present(),
        buttons: pressed_buttons(reply),
        x: pad::axis_x(word),
        y: pad::axis_y(word),
    }
}

pub(super) fn cmd_probe(json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);

    let mut port = open_port(&config.port_device)?;
    if !port.claim() {
        return Err(TapError::Busy);
    }
    let result = ProtocolEngine::new(config.timing()).read_cluster(&mut port);
    port.release();
    let replies = result?;

    if json {
        let output = ProbeOutput {
            port: config.port_device.clone(),
            slots: (0..MAX_PADS)
                .map(|slot| slot_json(slot, &replies[slot]))
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    let w = kv_width(&["Port:"], &["Buttons:", "X axis:", "Y axis:"]);
    kv("Port:", &config.port_device, w);
    println!();

    for (slot, reply) in replies.iter().enumerate() {
        if !reply.present() {
            println!("Slot {slot}: no pad");
            continue;
        }
        println!("Slot {slot}: normal pad");
        let pressed = pressed_buttons(reply);
        if pressed.is_empty() {
            kv_indent("Buttons:", "(none held)", w);
        } else {
            kv_indent("Buttons:", pressed.join(", "), w);
        }
        let word = reply.button_word();
        kv_indent("X axis:", pad::axis_x(word), w);
        kv_indent("Y axis:", pad::axis_y(word), w);
    }
    Ok(())
}
