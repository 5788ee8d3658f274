//! `monitor` subcommand — poll continuously and print pad events.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use padtap_lib::pad::{Axis, Button, EventSink};
use padtap_lib::port::{PlatformPort, open_port};
use padtap_lib::protocol::MAX_PADS;
use padtap_lib::tap::{AdapterId, PadHandle, TapContext};

use super::{RUNNING, Result, load_config};

/// Last emitted state of one pad, for change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct PadState {
    x: i32,
    y: i32,
    buttons: [bool; Button::ALL.len()],
}

/// Sink that prints state changes. The scheduler reports the full pad
/// state on every fire; this sink swallows everything that matches the
/// previous report and prints only the edges.
struct PrintSink {
    slot: usize,
    last: Mutex<Option<PadState>>,
    pending: Mutex<PadState>,
}

impl PrintSink {
    fn new(slot: usize) -> Self {
        PrintSink {
            slot,
            last: Mutex::new(None),
            pending: Mutex::new(PadState::default()),
        }
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for PrintSink {
    fn axis(&self, axis: Axis, value: i32) {
        let mut pending = Self::lock(&self.pending);
        match axis {
            Axis::X => pending.x = value,
            Axis::Y => pending.y = value,
        }
    }

    fn button(&self, button: Button, pressed: bool) {
        Self::lock(&self.pending).buttons[button.idx()] = pressed;
    }

    fn sync(&self) {
        let current = *Self::lock(&self.pending);
        let mut last = Self::lock(&self.last);
        let previous = last.replace(current);

        // The very first report is baseline only; an idle pad at startup
        // should not print anything.
        let Some(previous) = previous else {
            if current != PadState::default() {
                self.print_diff(&PadState::default(), &current);
            }
            return;
        };
        if current != previous {
            self.print_diff(&previous, &current);
        }
    }
}

impl PrintSink {
    fn print_diff(&self, from: &PadState, to: &PadState) {
        for button in Button::ALL {
            let was = from.buttons[button.idx()];
            let is = to.buttons[button.idx()];
            if was != is {
                let edge = if is { "down" } else { "up" };
                println!("pad {}: {button} {edge}", self.slot);
            }
        }
        if from.x != to.x {
            println!("pad {}: X {}", self.slot, to.x);
        }
        if from.y != to.y {
            println!("pad {}: Y {}", self.slot, to.y);
        }
    }
}

/// State for the `monitor` command, created during setup.
struct MonitorCtx {
    ctx: TapContext<PlatformPort>,
    id: AdapterId,
    handles: Vec<PadHandle<PlatformPort>>,
}

/// Open the port, register the adapter, and open all four pad slots.
fn monitor_setup(config_path: Option<&Path>) -> Result<MonitorCtx> {
    let config = load_config(config_path);

    let port = open_port(&config.port_device)?;
    println!("[port] {}", config.port_device);

    let ctx = TapContext::new(config.timing());
    let sinks: [Box<dyn EventSink>; MAX_PADS] = [
        Box::new(PrintSink::new(0)),
        Box::new(PrintSink::new(1)),
        Box::new(PrintSink::new(2)),
        Box::new(PrintSink::new(3)),
    ];
    let id = ctx.attach(port, sinks);

    let mut handles: Vec<PadHandle<PlatformPort>> = Vec::with_capacity(MAX_PADS);
    for slot in 0..MAX_PADS {
        let handle = ctx.handle(id, slot);
        if let Err(e) = handle.open() {
            for opened in &handles {
                let _ = opened.close();
            }
            return Err(e);
        }
        handles.push(handle);
    }

    Ok(MonitorCtx { ctx, id, handles })
}

pub(super) fn cmd_monitor(config_path: Option<&Path>) -> Result<()> {
    let mctx = monitor_setup(config_path)?;
    println!("Monitoring {MAX_PADS} slots. Press Ctrl+C to stop.");

    // Events are printed from the polling thread; this loop only waits
    // for the shutdown flag.
    while RUNNING.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(250));
    }

    println!("Stopping.");
    for handle in &mctx.handles {
        let _ = handle.close();
    }
    let _ = mctx.ctx.detach(mctx.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(sink: &PrintSink, x: i32, y: i32, pressed: &[Button]) {
        sink.axis(Axis::X, x);
        sink.axis(Axis::Y, y);
        for button in Button::ALL {
            sink.button(button, pressed.contains(&button));
        }
        sink.sync();
    }

    fn last_state(sink: &PrintSink) -> Option<PadState> {
        *PrintSink::lock(&sink.last)
    }

    #[test]
    fn first_sync_establishes_baseline() {
        let sink = PrintSink::new(0);
        assert_eq!(last_state(&sink), None);
        feed(&sink, 0, 0, &[]);
        assert_eq!(last_state(&sink), Some(PadState::default()));
    }

    #[test]
    fn sync_latches_the_full_report() {
        let sink = PrintSink::new(1);
        feed(&sink, -255, 0, &[Button::Cross, Button::R1]);

        let state = last_state(&sink).unwrap();
        assert_eq!(state.x, -255);
        assert_eq!(state.y, 0);
        assert!(state.buttons[Button::Cross.idx()]);
        assert!(state.buttons[Button::R1.idx()]);
        assert!(!state.buttons[Button::Start.idx()]);
    }

    #[test]
    fn repeated_reports_keep_state_stable() {
        let sink = PrintSink::new(2);
        feed(&sink, 255, -255, &[Button::Select]);
        let first = last_state(&sink);
        feed(&sink, 255, -255, &[Button::Select]);
        assert_eq!(last_state(&sink), first);
    }
}
