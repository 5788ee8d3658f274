//! Pad snapshots and translation to generic input events.
//!
//! Button bits are active low, so the all-ones "no pad" reply is
//! indistinguishable from "nothing pressed": an absent controller degrades
//! gracefully to an idle one instead of an error state. The four direction
//! bits never reach consumers directly; they derive the two pseudo-axes.

use std::fmt;

use crate::protocol::*;

// ── Snapshot ──

/// Per-slot result of one cluster poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadReply {
    /// Raw type-id byte as captured.
    pub id: u8,
    /// Raw status byte as captured.
    pub status: u8,
    /// Button bytes, normalized: all-ones unless the reply was accepted.
    pub buttons: [u8; 2],
}

impl Default for PadReply {
    fn default() -> Self {
        PadReply {
            id: 0,
            status: 0,
            buttons: [0xFF, 0xFF],
        }
    }
}

impl PadReply {
    /// Apply the acceptance rule to raw captured bytes: only a normal pad
    /// answering with the ready status gets its button bytes through;
    /// anything else is canonicalized to the idle all-ones pattern.
    pub fn from_wire(id: u8, status: u8, buttons_lo: u8, buttons_hi: u8) -> Self {
        let buttons = if id == NORMAL_PAD_ID && status == NORMAL_STATUS {
            [buttons_lo, buttons_hi]
        } else {
            [0xFF, 0xFF]
        };
        PadReply { id, status, buttons }
    }

    /// Whether a normal pad answered this poll.
    pub fn present(&self) -> bool {
        self.id == NORMAL_PAD_ID && self.status == NORMAL_STATUS
    }

    /// The two button bytes packed little-endian into one word.
    pub fn button_word(&self) -> u16 {
        u16::from_le_bytes(self.buttons)
    }
}

// ── Controls ──

/// Pseudo-axes derived from the direction bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
        }
    }
}

/// The ten digital buttons of a normal pad.
///
/// Declaration order is emission order: shoulder pairs, face buttons,
/// then start/select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    L2,
    R2,
    L1,
    R1,
    Triangle,
    Circle,
    Cross,
    Square,
    Start,
    Select,
}

impl Button {
    pub const ALL: [Button; MAX_BUTTONS] = [
        Button::L2,
        Button::R2,
        Button::L1,
        Button::R1,
        Button::Triangle,
        Button::Circle,
        Button::Cross,
        Button::Square,
        Button::Start,
        Button::Select,
    ];

    /// Bit mask of this button in the packed button word.
    pub fn mask(self) -> u16 {
        match self {
            Button::L2 => BTN_L2,
            Button::R2 => BTN_R2,
            Button::L1 => BTN_L1,
            Button::R1 => BTN_R1,
            Button::Triangle => BTN_TRIANGLE,
            Button::Circle => BTN_CIRCLE,
            Button::Cross => BTN_CROSS,
            Button::Square => BTN_SQUARE,
            Button::Start => BTN_START,
            Button::Select => BTN_SELECT,
        }
    }

    /// Stable index into [`Button::ALL`].
    pub fn idx(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Button::L2 => "L2",
            Button::R2 => "R2",
            Button::L1 => "L1",
            Button::R1 => "R1",
            Button::Triangle => "Triangle",
            Button::Circle => "Circle",
            Button::Cross => "Cross",
            Button::Square => "Square",
            Button::Start => "Start",
            Button::Select => "Select",
        };
        write!(f, "{name}")
    }
}

// ── Event sink ──

/// Per-pad consumer of translated input reports.
///
/// The scheduler calls this from its polling thread, once per pad per fire:
/// two axis reports, ten button reports, one sync marker.
pub trait EventSink: Send {
    fn axis(&self, axis: Axis, value: i32);
    fn button(&self, button: Button, pressed: bool);
    fn sync(&self);
}

// ── Translation ──

fn axis_value(word: u16, negative: u16, positive: u16) -> i32 {
    // Active low: a cleared bit means the direction is held. Both-or-neither
    // cancels to center.
    let pos = if word & positive == 0 { AXIS_RANGE } else { 0 };
    let neg = if word & negative == 0 { AXIS_RANGE } else { 0 };
    pos - neg
}

/// Horizontal pseudo-axis: left is negative, right is positive.
pub fn axis_x(word: u16) -> i32 {
    axis_value(word, BTN_LEFT, BTN_RIGHT)
}

/// Vertical pseudo-axis: up is negative, down is positive.
pub fn axis_y(word: u16) -> i32 {
    axis_value(word, BTN_UP, BTN_DOWN)
}

/// Translate one snapshot into events on `sink`.
pub fn report(reply: &PadReply, sink: &dyn EventSink) {
    let word = reply.button_word();
    sink.axis(Axis::X, axis_x(word));
    sink.axis(Axis::Y, axis_y(word));
    for button in Button::ALL {
        sink.button(button, word & button.mask() == 0);
    }
    sink.sync();
}

// ── Recording sink for testing ──

/// In-memory sink for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex, MutexGuard};

    /// One recorded event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Event {
        Axis(Axis, i32),
        Button(Button, bool),
        Sync,
    }

    /// Sink that records every report. Clones share the event log, so a
    /// test can hand one clone to the driver and inspect another.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSink {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> MutexGuard<'_, Vec<Event>> {
            self.events.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Number of sync markers seen, i.e. completed per-pad reports.
        pub fn sync_count(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| matches!(e, Event::Sync))
                .count()
        }
    }

    impl EventSink for RecordingSink {
        fn axis(&self, axis: Axis, value: i32) {
            self.events().push(Event::Axis(axis, value));
        }

        fn button(&self, button: Button, pressed: bool) {
            self.events().push(Event::Button(button, pressed));
        }

        fn sync(&self) {
            self.events().push(Event::Sync);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{Event, RecordingSink};
    use super::*;

    // ── Acceptance ──

    #[test]
    fn from_wire_accepts_normal_pad() {
        let reply = PadReply::from_wire(NORMAL_PAD_ID, NORMAL_STATUS, 0x12, 0x34);
        assert!(reply.present());
        assert_eq!(reply.buttons, [0x12, 0x34]);
        assert_eq!(reply.button_word(), 0x3412);
    }

    #[test]
    fn from_wire_rejects_wrong_id() {
        let reply = PadReply::from_wire(0x12, NORMAL_STATUS, 0x00, 0x00);
        assert!(!reply.present());
        assert_eq!(reply.buttons, [0xFF, 0xFF]);
    }

    #[test]
    fn from_wire_rejects_wrong_status() {
        let reply = PadReply::from_wire(NORMAL_PAD_ID, 0x00, 0x00, 0x00);
        assert!(!reply.present());
        assert_eq!(reply.buttons, [0xFF, 0xFF]);
    }

    #[test]
    fn default_reply_is_idle() {
        let reply = PadReply::default();
        assert!(!reply.present());
        assert_eq!(reply.button_word(), 0xFFFF);
    }

    // ── Axis derivation ──

    #[test]
    fn axis_x_truth_table() {
        let idle = 0xFFFFu16;
        assert_eq!(axis_x(idle), 0, "neither direction held");
        assert_eq!(axis_x(idle & !BTN_RIGHT), AXIS_RANGE, "only right held");
        assert_eq!(axis_x(idle & !BTN_LEFT), -AXIS_RANGE, "only left held");
        assert_eq!(axis_x(idle & !(BTN_LEFT | BTN_RIGHT)), 0, "both held");
    }

    #[test]
    fn axis_y_truth_table() {
        let idle = 0xFFFFu16;
        assert_eq!(axis_y(idle), 0);
        assert_eq!(axis_y(idle & !BTN_DOWN), AXIS_RANGE, "only down held");
        assert_eq!(axis_y(idle & !BTN_UP), -AXIS_RANGE, "only up held");
        assert_eq!(axis_y(idle & !(BTN_UP | BTN_DOWN)), 0, "both held");
    }

    #[test]
    fn axes_ignore_button_bits() {
        // All buttons pressed, no directions held.
        let word = BTN_UP | BTN_DOWN | BTN_LEFT | BTN_RIGHT;
        assert_eq!(axis_x(word), 0);
        assert_eq!(axis_y(word), 0);
    }

    // ── Button mapping ──

    #[test]
    fn buttons_are_active_low() {
        let idle = 0xFFFFu16;
        for button in Button::ALL {
            assert_eq!(idle & button.mask() == 0, false, "{button} idle");
            let held = idle & !button.mask();
            assert!(held & button.mask() == 0, "{button} held");
        }
    }

    #[test]
    fn button_masks_match_protocol() {
        assert_eq!(Button::L2.mask(), BTN_L2);
        assert_eq!(Button::Square.mask(), BTN_SQUARE);
        assert_eq!(Button::Start.mask(), BTN_START);
        assert_eq!(Button::Select.mask(), BTN_SELECT);
    }

    #[test]
    fn button_idx_matches_all_order() {
        for (i, button) in Button::ALL.iter().enumerate() {
            assert_eq!(button.idx(), i);
        }
    }

    // ── Report emission ──

    #[test]
    fn report_emits_axes_buttons_and_sync() {
        let sink = RecordingSink::new();
        let reply = PadReply::from_wire(NORMAL_PAD_ID, NORMAL_STATUS, 0xFF, 0xFF);
        report(&reply, &sink);

        let events = sink.events().clone();
        assert_eq!(events.len(), 2 + MAX_BUTTONS + 1);
        assert_eq!(events[0], Event::Axis(Axis::X, 0));
        assert_eq!(events[1], Event::Axis(Axis::Y, 0));
        assert_eq!(*events.last().unwrap(), Event::Sync);
        for event in &events[2..2 + MAX_BUTTONS] {
            assert!(matches!(event, Event::Button(_, false)));
        }
    }

    #[test]
    fn report_translates_held_controls() {
        let word = 0xFFFFu16 & !(BTN_CROSS | BTN_RIGHT);
        let reply = PadReply::from_wire(
            NORMAL_PAD_ID,
            NORMAL_STATUS,
            (word & 0xFF) as u8,
            (word >> 8) as u8,
        );
        let sink = RecordingSink::new();
        report(&reply, &sink);

        let events = sink.events().clone();
        assert!(events.contains(&Event::Axis(Axis::X, AXIS_RANGE)));
        assert!(events.contains(&Event::Button(Button::Cross, true)));
        assert!(events.contains(&Event::Button(Button::Square, false)));
    }

    #[test]
    fn absent_pad_reports_idle_not_error() {
        let reply = PadReply::from_wire(0x00, 0x00, 0xA5, 0x5A);
        let sink = RecordingSink::new();
        report(&reply, &sink);

        let events = sink.events().clone();
        assert!(events.contains(&Event::Axis(Axis::X, 0)));
        assert!(events.contains(&Event::Axis(Axis::Y, 0)));
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, Event::Button(_, true))),
            "no pad must read as no buttons pressed"
        );
    }
}
