//! Protocol constants for PSX-style pads behind a parallel-port multitap.
//!
//! The multitap wiring multiplexes one command line and one clock line across
//! up to four pads, with one status input line per slot. There is no hardware
//! framing: bit timing around each clock edge is the only correctness
//! mechanism, so the delay constants here are protocol requirements, not
//! performance knobs.

use std::time::Duration;

// ── Data register output lines ──

/// Command bit, shared by all slots (data register bit 0).
pub const LINE_COMMAND: u8 = 0x01;

/// Select line for all slots (data register bit 1). Active low at the pad.
pub const LINE_SELECT_ALL: u8 = 0x02;

/// Clock line, shared by all slots (data register bit 2).
pub const LINE_CLOCK: u8 = 0x04;

// ── Status register input lines, one per slot ──

pub const LINE_DATA_0: u8 = 0x08;
pub const LINE_DATA_1: u8 = 0x10;
pub const LINE_DATA_2: u8 = 0x20;
pub const LINE_DATA_3: u8 = 0x40;

/// Acknowledge line (status register bit 7). Wired but not sampled; the
/// fixed delays stand in for ack-based pacing.
pub const LINE_ACK: u8 = 0x80;

/// Status line mask per slot, indexed by slot number.
pub const SLOT_DATA_MASKS: [u8; MAX_PADS] = [LINE_DATA_0, LINE_DATA_1, LINE_DATA_2, LINE_DATA_3];

// ── Command bytes ──

/// Attention command opening every exchange.
pub const CMD_ATTENTION: u8 = 0x01;

/// Status transfer request sent after attention.
pub const CMD_TRANSFER: u8 = 0x42;

// ── Expected replies ──

/// Type-id byte a normal pad returns to the transfer request.
/// Bits 7-4 encode the controller type, bits 3-0 the payload word count.
pub const NORMAL_PAD_ID: u8 = 0x41;

/// Status byte a ready pad returns (0x5A, 'Z').
pub const NORMAL_STATUS: u8 = 0x5A;

// ── Geometry ──

/// Number of addressable slots on one multitap.
pub const MAX_PADS: usize = 4;

/// Number of digital buttons on a normal pad (directions excluded; those
/// become the two pseudo-axes).
pub const MAX_BUTTONS: usize = 10;

// ── Timing ──

/// Default settle delay around each clock transition (microseconds).
pub const DEFAULT_BIT_DELAY_US: u16 = 5;

/// Default turnaround delay after each 8-bit command (microseconds).
pub const DEFAULT_CMD_DELAY_US: u16 = 10;

/// Fixed polling interval of the shared scheduler.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(10);

// ── Button word ──
//
// The two button bytes pack little-endian into one 16-bit word. All bits are
// active low: 0 = pressed / direction held.

pub const BTN_SELECT: u16 = 0x0001;
pub const BTN_START: u16 = 0x0008;
pub const BTN_UP: u16 = 0x0010;
pub const BTN_RIGHT: u16 = 0x0020;
pub const BTN_DOWN: u16 = 0x0040;
pub const BTN_LEFT: u16 = 0x0080;
pub const BTN_L2: u16 = 0x0100;
pub const BTN_R2: u16 = 0x0200;
pub const BTN_L1: u16 = 0x0400;
pub const BTN_R1: u16 = 0x0800;
pub const BTN_TRIANGLE: u16 = 0x1000;
pub const BTN_CIRCLE: u16 = 0x2000;
pub const BTN_CROSS: u16 = 0x4000;
pub const BTN_SQUARE: u16 = 0x8000;

/// Full-scale deflection of the derived pseudo-axes.
pub const AXIS_RANGE: i32 = 255;
