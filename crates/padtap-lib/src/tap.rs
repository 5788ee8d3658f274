//! Adapter registry, pad lifecycle, and the shared polling scheduler.
//!
//! [`TapContext`] owns everything with real concurrency in it: a
//! mutex-guarded registry of adapters (each with its four pad slots) and the
//! single polling thread shared by all of them. Lifecycle rules follow the
//! port-claim discipline of the bus:
//!
//! - the first open on an adapter claims its parallel port; a failed claim
//!   rolls the open back and surfaces as [`TapError::Busy`],
//! - the first open anywhere arms the scheduler,
//! - the last close on an adapter stops the scheduler (when no other adapter
//!   needs polling) strictly before the claim is released,
//! - the scheduler fires every 10 ms and never fires concurrently with
//!   itself or with a lifecycle operation; both sides take the registry lock.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use crate::engine::{ProtocolEngine, Timing};
use crate::error::{Result, TapError};
use crate::pad::{self, EventSink, PadReply};
use crate::port::ParallelPort;
use crate::protocol::{MAX_PADS, REFRESH_INTERVAL};

/// Stable identifier for a registered adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AdapterId(u64);

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tap{}", self.0)
    }
}

/// One of the four fixed slots on an adapter. Slots always exist
/// structurally; a missing physical controller is a polling result.
struct PadSlot {
    reply: PadReply,
    use_count: u32,
    sink: Box<dyn EventSink>,
}

struct Adapter<P> {
    port: P,
    /// True iff this adapter currently holds exclusive port ownership.
    claimed: bool,
    pads: [PadSlot; MAX_PADS],
}

impl<P: ParallelPort> Adapter<P> {
    /// True while any slot on this adapter is held open.
    fn port_required(&self) -> bool {
        self.pads.iter().any(|pad| pad.use_count > 0)
    }
}

struct SchedulerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

struct State<P> {
    adapters: BTreeMap<AdapterId, Adapter<P>>,
    next_id: u64,
    /// Some while the polling thread is armed.
    scheduler: Option<SchedulerHandle>,
}

impl<P: ParallelPort> State<P> {
    /// True while any adapter still has an open pad.
    fn polling_required(&self) -> bool {
        self.adapters.values().any(Adapter::port_required)
    }
}

struct Shared<P> {
    engine: ProtocolEngine,
    state: Mutex<State<P>>,
}

fn lock_state<P>(state: &Mutex<State<P>>) -> MutexGuard<'_, State<P>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Flag the scheduler to stop and take its handle for reaping.
///
/// Called with the registry lock held: no fire can be mid-flight here, and
/// any fire that wakes later re-checks the flag under the lock before it
/// touches a bus. Joining the returned handle after unlocking only reaps
/// the exited thread.
fn begin_disarm<P>(st: &mut State<P>) -> Option<SchedulerHandle> {
    let handle = st.scheduler.take()?;
    handle.stop.store(true, Ordering::SeqCst);
    log::debug!("scheduler disarmed");
    Some(handle)
}

fn arm<P: ParallelPort + 'static>(
    shared: &Arc<Shared<P>>,
    st: &mut State<P>,
) -> std::io::Result<()> {
    if st.scheduler.is_some() {
        return Ok(());
    }
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = stop.clone();
    let weak = Arc::downgrade(shared);
    let thread = thread::Builder::new()
        .name("padtap-poll".into())
        .spawn(move || poll_loop(weak, thread_stop))?;
    st.scheduler = Some(SchedulerHandle { stop, thread });
    log::debug!("scheduler armed");
    Ok(())
}

/// The shared periodic driver. Sleeps first, so a freshly claimed bus is
/// first touched on the next scheduled fire, never the current one.
fn poll_loop<P: ParallelPort + 'static>(shared: Weak<Shared<P>>, stop: Arc<AtomicBool>) {
    loop {
        thread::sleep(REFRESH_INTERVAL);
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let mut st = lock_state(&shared.state);
        // A disarm may have won the race for the lock while we slept and the
        // bus may already be released. Re-check under the lock.
        if stop.load(Ordering::SeqCst) {
            return;
        }
        for (id, adapter) in st.adapters.iter_mut() {
            if !adapter.claimed {
                continue;
            }
            match shared.engine.read_cluster(&mut adapter.port) {
                Ok(replies) => {
                    for (slot, reply) in replies.iter().enumerate() {
                        let pad = &mut adapter.pads[slot];
                        pad.reply = *reply;
                        pad::report(reply, pad.sink.as_ref());
                    }
                }
                Err(e) => log::warn!("poll failed on {id}: {e}"),
            }
        }
    }
}

/// Process context: the adapter registry plus the shared scheduler.
///
/// Create one per process, attach adapters as their ports become available,
/// and hand out [`PadHandle`]s as the open/close entry points of each pad's
/// published input device.
pub struct TapContext<P: ParallelPort + 'static> {
    shared: Arc<Shared<P>>,
}

impl<P: ParallelPort + 'static> TapContext<P> {
    pub fn new(timing: Timing) -> Self {
        TapContext {
            shared: Arc::new(Shared {
                engine: ProtocolEngine::new(timing),
                state: Mutex::new(State {
                    adapters: BTreeMap::new(),
                    next_id: 0,
                    scheduler: None,
                }),
            }),
        }
    }

    /// Register an adapter with its four pad slots, all initially unopened
    /// and of unknown type. The port must be open but unclaimed; the claim
    /// happens lazily on the first pad open.
    pub fn attach(&self, port: P, sinks: [Box<dyn EventSink>; MAX_PADS]) -> AdapterId {
        let mut st = lock_state(&self.shared.state);
        let id = AdapterId(st.next_id);
        st.next_id += 1;
        let pads = sinks.map(|sink| PadSlot {
            reply: PadReply::default(),
            use_count: 0,
            sink,
        });
        st.adapters.insert(
            id,
            Adapter {
                port,
                claimed: false,
                pads,
            },
        );
        log::info!("{id} attached with {MAX_PADS} pad slots");
        id
    }

    /// Unregister an adapter. Releases its claim if held; stops the
    /// scheduler first when nothing else needs polling. Outstanding
    /// handles for this adapter report [`TapError::Detached`] afterwards.
    pub fn detach(&self, id: AdapterId) -> Result<()> {
        let reaper;
        {
            let mut st = lock_state(&self.shared.state);
            let mut adapter = st.adapters.remove(&id).ok_or(TapError::Detached)?;
            reaper = if st.polling_required() {
                None
            } else {
                begin_disarm(&mut st)
            };
            if adapter.claimed {
                adapter.port.release();
                adapter.claimed = false;
            }
            log::info!("{id} detached");
        }
        if let Some(handle) = reaper {
            let _ = handle.thread.join();
        }
        Ok(())
    }

    /// Open/close entry point for one pad slot.
    pub fn handle(&self, adapter: AdapterId, slot: usize) -> PadHandle<P> {
        assert!(slot < MAX_PADS, "slot index out of range");
        PadHandle {
            shared: Arc::downgrade(&self.shared),
            adapter,
            slot,
        }
    }

    /// Whether the polling scheduler is currently armed.
    pub fn is_armed(&self) -> bool {
        lock_state(&self.shared.state).scheduler.is_some()
    }

    /// Whether the adapter currently holds its port claim.
    pub fn is_claimed(&self, id: AdapterId) -> Result<bool> {
        let st = lock_state(&self.shared.state);
        Ok(st.adapters.get(&id).ok_or(TapError::Detached)?.claimed)
    }

    /// Open-reference count of one pad slot.
    pub fn use_count(&self, id: AdapterId, slot: usize) -> Result<u32> {
        assert!(slot < MAX_PADS, "slot index out of range");
        let st = lock_state(&self.shared.state);
        let adapter = st.adapters.get(&id).ok_or(TapError::Detached)?;
        Ok(adapter.pads[slot].use_count)
    }

    /// Last-observed snapshot of one pad slot.
    pub fn snapshot(&self, id: AdapterId, slot: usize) -> Result<PadReply> {
        assert!(slot < MAX_PADS, "slot index out of range");
        let st = lock_state(&self.shared.state);
        let adapter = st.adapters.get(&id).ok_or(TapError::Detached)?;
        Ok(adapter.pads[slot].reply)
    }

    /// Tear everything down: scheduler first, then every held claim, then
    /// the registry itself.
    pub fn shutdown(&self) {
        let reaper;
        {
            let mut st = lock_state(&self.shared.state);
            reaper = begin_disarm(&mut st);
            for adapter in st.adapters.values_mut() {
                if adapter.claimed {
                    adapter.port.release();
                    adapter.claimed = false;
                }
            }
            st.adapters.clear();
        }
        if let Some(handle) = reaper {
            let _ = handle.thread.join();
        }
        log::debug!("context shut down");
    }
}

impl<P: ParallelPort + 'static> Drop for TapContext<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Opaque per-pad device handle routing open/close into the lifecycle
/// manager. Holds only a weak reference: a handle outliving its context
/// reports [`TapError::Detached`].
pub struct PadHandle<P: ParallelPort + 'static> {
    shared: Weak<Shared<P>>,
    adapter: AdapterId,
    slot: usize,
}

impl<P: ParallelPort + 'static> Clone for PadHandle<P> {
    fn clone(&self) -> Self {
        PadHandle {
            shared: self.shared.clone(),
            adapter: self.adapter,
            slot: self.slot,
        }
    }
}

impl<P: ParallelPort + 'static> PadHandle<P> {
    pub fn adapter(&self) -> AdapterId {
        self.adapter
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Open this pad. The use count is incremented before the claim is
    /// attempted and rolled back to zero if the claim fails; later
    /// invariants depend on exactly this ordering.
    pub fn open(&self) -> Result<()> {
        let shared = self.shared.upgrade().ok_or(TapError::Detached)?;
        let mut st = lock_state(&shared.state);

        {
            let adapter = st.adapters.get_mut(&self.adapter).ok_or(TapError::Detached)?;
            adapter.pads[self.slot].use_count += 1;
            let first_open = adapter.pads[self.slot].use_count == 1;
            log::debug!(
                "open {}/{}: use count {}",
                self.adapter,
                self.slot,
                adapter.pads[self.slot].use_count
            );
            if first_open && !adapter.claimed {
                if adapter.port.claim() {
                    adapter.claimed = true;
                } else {
                    adapter.pads[self.slot].use_count = 0;
                    return Err(TapError::Busy);
                }
            }
        }

        // First open anywhere arms the shared scheduler. The fresh claim is
        // not polled until the next scheduled fire.
        if st.scheduler.is_none()
            && let Err(e) = arm(&shared, &mut st)
        {
            // No scheduler means this open cannot be served; undo it fully.
            if let Some(adapter) = st.adapters.get_mut(&self.adapter) {
                adapter.pads[self.slot].use_count -= 1;
                if !adapter.port_required() {
                    adapter.port.release();
                    adapter.claimed = false;
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Close this pad. When the last open slot of the adapter goes away,
    /// the scheduler is stopped (if no other adapter needs polling) before
    /// the port claim is released; a scheduled poll can therefore never run
    /// against a bus mid-release.
    pub fn close(&self) -> Result<()> {
        let shared = self.shared.upgrade().ok_or(TapError::Detached)?;
        let reaper;
        {
            let mut st = lock_state(&shared.state);
            let release_due = {
                let adapter =
                    st.adapters.get_mut(&self.adapter).ok_or(TapError::Detached)?;
                let pad = &mut adapter.pads[self.slot];
                debug_assert!(pad.use_count > 0, "close without matching open");
                pad.use_count = pad.use_count.saturating_sub(1);
                log::debug!(
                    "close {}/{}: use count {}",
                    self.adapter,
                    self.slot,
                    pad.use_count
                );
                pad.use_count == 0 && adapter.claimed && !adapter.port_required()
            };
            reaper = if release_due {
                let handle = if st.polling_required() {
                    None
                } else {
                    begin_disarm(&mut st)
                };
                if let Some(adapter) = st.adapters.get_mut(&self.adapter) {
                    adapter.port.release();
                    adapter.claimed = false;
                }
                handle
            } else {
                None
            };
        }
        if let Some(handle) = reaper {
            let _ = handle.thread.join();
        }
        Ok(())
    }
}
