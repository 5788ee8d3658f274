//! Protocol bit-bang engine — the select/command/capture sequence.
//!
//! The engine is stateless apart from its [`Timing`]. One clock and one
//! command line are shared by all four slots; each slot answers on its own
//! status line, so every command cycle captures four reply bits in parallel.
//! Delay placement mirrors the wire protocol exactly: settle after every
//! line transition, turnaround after every 8th bit.

use std::time::{Duration, Instant};

use crate::pad::PadReply;
use crate::port::{ParallelPort, Result};
use crate::protocol::*;

/// Read-only-after-start protocol delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Settle delay around each clock transition.
    pub bit_delay: Duration,
    /// Turnaround delay after each 8-bit command.
    pub cmd_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing::from_micros(DEFAULT_BIT_DELAY_US, DEFAULT_CMD_DELAY_US)
    }
}

impl Timing {
    pub fn from_micros(bit_delay_us: u16, cmd_delay_us: u16) -> Self {
        Timing {
            bit_delay: Duration::from_micros(bit_delay_us as u64),
            cmd_delay: Duration::from_micros(cmd_delay_us as u64),
        }
    }
}

/// Spin until `d` has elapsed. The protocol delays sit far below OS sleep
/// resolution, so a calibrated busy-wait is the only faithful option.
fn spin_delay(d: Duration) {
    let start = Instant::now();
    while start.elapsed() < d {
        std::hint::spin_loop();
    }
}

/// Bit-bangs the multitap protocol over a [`ParallelPort`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolEngine {
    timing: Timing,
}

impl ProtocolEngine {
    pub fn new(timing: Timing) -> Self {
        ProtocolEngine { timing }
    }

    /// Begin the addressing phase shared by all four slots: select-all with
    /// the clock high, then drop a falling select edge latched low.
    pub fn select<P: ParallelPort>(&self, port: &mut P) -> Result<()> {
        port.write_data(LINE_CLOCK | LINE_SELECT_ALL)?;
        spin_delay(self.timing.bit_delay);
        port.write_data(LINE_CLOCK)?;
        spin_delay(self.timing.bit_delay);
        Ok(())
    }

    /// Raise the select line, releasing all slots. Idempotent: repeated
    /// calls leave the bus lines unchanged.
    pub fn deselect<P: ParallelPort>(&self, port: &mut P) -> Result<()> {
        port.write_data(LINE_CLOCK | LINE_SELECT_ALL)
    }

    /// Transmit one command byte least-significant-bit first, one clock
    /// cycle per bit, sampling all four slot reply lines each cycle.
    pub fn send_command<P: ParallelPort>(
        &self,
        port: &mut P,
        mut command: u8,
    ) -> Result<[u8; MAX_PADS]> {
        let mut captured = [0u8; MAX_PADS];

        for bit in 0..8 {
            let cmd_bit = command & LINE_COMMAND;
            // Command bit on the wire with the clock low.
            port.write_data(cmd_bit)?;
            spin_delay(self.timing.bit_delay);

            // One sample feeds all four shift accumulators in parallel.
            let lines = port.read_status()?;
            for (slot, mask) in SLOT_DATA_MASKS.iter().enumerate() {
                if lines & mask != 0 {
                    captured[slot] |= 1 << bit;
                }
            }

            // Rising clock edge ends the cycle.
            port.write_data(cmd_bit | LINE_CLOCK)?;
            spin_delay(self.timing.bit_delay);
            command >>= 1;
        }

        spin_delay(self.timing.cmd_delay);
        Ok(captured)
    }

    /// Full poll of one adapter: attention, id, status, two button bytes,
    /// for all four slots at once. Presence is re-evaluated on every call;
    /// there is no cached "connected" flag, so hot-plugging just works.
    pub fn read_cluster<P: ParallelPort>(&self, port: &mut P) -> Result<[PadReply; MAX_PADS]> {
        self.select(port)?;

        self.send_command(port, CMD_ATTENTION)?; // reply discarded
        let ids = self.send_command(port, CMD_TRANSFER)?;
        let statuses = self.send_command(port, 0)?;
        let buttons_lo = self.send_command(port, 0)?;
        let buttons_hi = self.send_command(port, 0)?;

        self.deselect(port)?;

        let mut replies = [PadReply::default(); MAX_PADS];
        for slot in 0..MAX_PADS {
            replies[slot] = PadReply::from_wire(
                ids[slot],
                statuses[slot],
                buttons_lo[slot],
                buttons_hi[slot],
            );
        }
        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::MockPort;

    fn engine() -> ProtocolEngine {
        // Zero delays keep the tests fast; delay placement is positional,
        // not observable through the mock.
        ProtocolEngine::new(Timing::from_micros(0, 0))
    }

    /// Build the 8 status samples for one command reply, per slot.
    fn script_replies(port: &MockPort, replies: [u8; MAX_PADS]) {
        let mut st = port.state();
        for bit in 0..8 {
            let mut sample = 0u8;
            for (slot, mask) in SLOT_DATA_MASKS.iter().enumerate() {
                if replies[slot] >> bit & 1 != 0 {
                    sample |= mask;
                }
            }
            st.status_script.push_back(sample);
        }
    }

    // ── send_command wire order ──

    #[test]
    fn send_command_puts_bits_on_wire_lsb_first() {
        for command in [0x01u8, 0x42, 0xB5, 0x00, 0xFF] {
            let mut port = MockPort::new();
            engine().send_command(&mut port, command).unwrap();

            let writes = port.state().writes.clone();
            assert_eq!(writes.len(), 16, "two writes per bit cycle");
            for bit in 0..8 {
                let expected = command >> bit & LINE_COMMAND;
                assert_eq!(
                    writes[2 * bit as usize],
                    expected,
                    "command {command:#04x} bit {bit}: clock-low write"
                );
                assert_eq!(
                    writes[2 * bit as usize + 1],
                    expected | LINE_CLOCK,
                    "command {command:#04x} bit {bit}: clock-high write"
                );
            }
        }
    }

    #[test]
    fn send_command_never_drives_select() {
        let mut port = MockPort::new();
        engine().send_command(&mut port, 0xFF).unwrap();
        for write in &port.state().writes {
            assert_eq!(write & LINE_SELECT_ALL, 0, "select must stay low");
        }
    }

    #[test]
    fn send_command_captures_independent_slot_replies() {
        let mut port = MockPort::new();
        script_replies(&port, [0x41, 0x00, 0xFF, 0xA5]);
        let captured = engine().send_command(&mut port, CMD_TRANSFER).unwrap();
        assert_eq!(captured, [0x41, 0x00, 0xFF, 0xA5]);
    }

    #[test]
    fn send_command_samples_once_per_cycle() {
        let mut port = MockPort::new();
        port.state().status_script.extend([0u8; 40]);
        engine().send_command(&mut port, 0x00).unwrap();
        assert_eq!(port.state().status_script.len(), 32, "8 samples consumed");
    }

    // ── select / deselect ──

    #[test]
    fn select_drops_falling_select_edge() {
        let mut port = MockPort::new();
        engine().select(&mut port).unwrap();
        assert_eq!(
            port.state().writes,
            vec![LINE_CLOCK | LINE_SELECT_ALL, LINE_CLOCK]
        );
    }

    #[test]
    fn deselect_is_idempotent() {
        let mut single = MockPort::new();
        engine().deselect(&mut single).unwrap();
        let single_final = *single.state().writes.last().unwrap();

        let mut repeated = MockPort::new();
        let eng = engine();
        eng.deselect(&mut repeated).unwrap();
        eng.select(&mut repeated).unwrap();
        eng.deselect(&mut repeated).unwrap();
        let repeated_final = *repeated.state().writes.last().unwrap();

        assert_eq!(repeated_final, single_final);
        assert_eq!(single_final, LINE_CLOCK | LINE_SELECT_ALL);
    }

    // ── read_cluster ──

    #[test]
    fn read_cluster_accepts_normal_pad_reply() {
        let mut port = MockPort::new();
        port.script_cluster([
            [NORMAL_PAD_ID, NORMAL_STATUS, 0xDF, 0xBF],
            [0x00, 0x00, 0x00, 0x00],
            [NORMAL_PAD_ID, 0x00, 0x12, 0x34],
            [0x73, NORMAL_STATUS, 0x56, 0x78],
        ]);

        let replies = engine().read_cluster(&mut port).unwrap();

        assert_eq!(replies[0].buttons, [0xDF, 0xBF], "normal pad accepted");
        assert!(replies[0].present());
        for slot in 1..MAX_PADS {
            assert_eq!(
                replies[slot].buttons,
                [0xFF, 0xFF],
                "slot {slot}: wrong id/status forces all-ones"
            );
            assert!(!replies[slot].present());
        }
    }

    #[test]
    fn read_cluster_empty_bus_reads_as_no_pads() {
        let mut port = MockPort::new();
        let replies = engine().read_cluster(&mut port).unwrap();
        for reply in replies {
            assert!(!reply.present());
            assert_eq!(reply.buttons, [0xFF, 0xFF]);
        }
    }

    #[test]
    fn read_cluster_write_sequence_shape() {
        let mut port = MockPort::new();
        engine().read_cluster(&mut port).unwrap();
        let st = port.state();
        // select (2) + 5 commands x 16 + deselect (1)
        assert_eq!(st.writes.len(), 83);
        assert_eq!(st.writes[0], LINE_CLOCK | LINE_SELECT_ALL);
        assert_eq!(st.writes[1], LINE_CLOCK);
        assert_eq!(*st.writes.last().unwrap(), LINE_CLOCK | LINE_SELECT_ALL);
    }

    #[test]
    fn read_cluster_reevaluates_presence_every_poll() {
        let mut port = MockPort::new();
        port.script_cluster([
            [NORMAL_PAD_ID, NORMAL_STATUS, 0xFF, 0xFE],
            [0x00; 4],
            [0x00; 4],
            [0x00; 4],
        ]);

        let first = engine().read_cluster(&mut port).unwrap();
        assert!(first[0].present());

        // Script dry: the pad is gone on the very next poll.
        let second = engine().read_cluster(&mut port).unwrap();
        assert!(!second[0].present());
        assert_eq!(second[0].buttons, [0xFF, 0xFF]);
    }

    #[test]
    fn timing_default_matches_protocol_constants() {
        let t = Timing::default();
        assert_eq!(t.bit_delay, Duration::from_micros(DEFAULT_BIT_DELAY_US as u64));
        assert_eq!(t.cmd_delay, Duration::from_micros(DEFAULT_CMD_DELAY_US as u64));
    }
}
