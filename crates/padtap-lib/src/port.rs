//! Parallel-port access — trait + Linux ppdev backend.
//!
//! [`ParallelPort`] is the seam between the protocol engine and the OS.
//! `write_data` drives the data register output lines, `read_status` samples
//! the status register input lines; both are synchronous and add no latency
//! of their own. `claim`/`release` wrap the exclusive-ownership primitive of
//! the underlying port subsystem.

use std::fmt;

// ── Error type ──

/// Port access errors.
///
/// String payloads follow the convention **"context: details"** where
/// *context* identifies the operation (e.g. `"PPWDATA"`, `"/dev/parport0"`)
/// and *details* describes what went wrong.
#[derive(Debug)]
pub enum PortError {
    OpenFailed(String),
    IoFailed(String),
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortError::OpenFailed(e) => write!(f, "Failed to open parallel port: {e}"),
            PortError::IoFailed(e) => write!(f, "Port I/O failed: {e}"),
        }
    }
}

impl std::error::Error for PortError {}

pub type Result<T> = std::result::Result<T, PortError>;

// ── Trait ──

/// Raw bus I/O plus exclusive-ownership control for one parallel port.
///
/// Implementations must be `Send`: the polling scheduler drives ports from
/// its own thread.
pub trait ParallelPort: Send {
    /// Try to take exclusive ownership of the port. Bounded; returns `false`
    /// when another driver holds the port.
    fn claim(&mut self) -> bool;

    /// Give up exclusive ownership. No-op when the port is not claimed.
    fn release(&mut self);

    /// Drive the data register output lines to `bits`.
    fn write_data(&mut self, bits: u8) -> Result<()>;

    /// Sample the current status register input-line levels.
    fn read_status(&mut self) -> Result<u8>;
}

// ── Linux implementation (ppdev) ──

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::os::fd::AsRawFd;
    use std::os::unix::fs::OpenOptionsExt;

    // ioctl request numbers from linux/ppdev.h: _IO('p', nr) for the
    // claim/release pair, _IOW/_IOR('p', nr, unsigned char) for register I/O.
    const PPCLAIM: libc::c_ulong = 0x0000_708B;
    const PPRELEASE: libc::c_ulong = 0x0000_708C;
    const PPWDATA: libc::c_ulong = 0x4001_7086;
    const PPRSTATUS: libc::c_ulong = 0x8001_7081;

    /// Parallel port behind the `ppdev` character device (`/dev/parportN`).
    pub struct PpdevPort {
        file: File,
        path: String,
        claimed: bool,
    }

    impl PpdevPort {
        /// Open the given `/dev/parportN` device without claiming it.
        ///
        /// The device is opened non-blocking so a contended `PPCLAIM` fails
        /// fast instead of parking the caller behind another driver.
        pub fn open(path: &str) -> Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
                .map_err(|e| PortError::OpenFailed(format!("{path}: {e}")))?;
            log::debug!("opened parallel port {path}");
            Ok(PpdevPort {
                file,
                path: path.to_string(),
                claimed: false,
            })
        }

        /// Device path this port was opened from.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl ParallelPort for PpdevPort {
        fn claim(&mut self) -> bool {
            // SAFETY: PPCLAIM takes no argument; fd is valid for self's lifetime.
            let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), PPCLAIM) };
            if rc == 0 {
                self.claimed = true;
                log::debug!("claimed {}", self.path);
                true
            } else {
                log::debug!(
                    "PPCLAIM on {} failed: {}",
                    self.path,
                    std::io::Error::last_os_error()
                );
                false
            }
        }

        fn release(&mut self) {
            if !self.claimed {
                return;
            }
            // SAFETY: PPRELEASE takes no argument; the port is claimed.
            let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), PPRELEASE) };
            if rc != 0 {
                log::warn!(
                    "PPRELEASE on {} failed: {}",
                    self.path,
                    std::io::Error::last_os_error()
                );
            }
            self.claimed = false;
            log::debug!("released {}", self.path);
        }

        fn write_data(&mut self, bits: u8) -> Result<()> {
            // SAFETY: PPWDATA reads one byte from the pointer argument.
            let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), PPWDATA, &bits) };
            if rc == 0 {
                Ok(())
            } else {
                Err(PortError::IoFailed(format!(
                    "PPWDATA on {}: {}",
                    self.path,
                    std::io::Error::last_os_error()
                )))
            }
        }

        fn read_status(&mut self) -> Result<u8> {
            let mut bits: u8 = 0;
            // SAFETY: PPRSTATUS writes one byte through the pointer argument.
            let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), PPRSTATUS, &mut bits) };
            if rc == 0 {
                Ok(bits)
            } else {
                Err(PortError::IoFailed(format!(
                    "PPRSTATUS on {}: {}",
                    self.path,
                    std::io::Error::last_os_error()
                )))
            }
        }
    }

    impl Drop for PpdevPort {
        fn drop(&mut self) {
            self.release();
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux_impl::PpdevPort;

// ── Stub for unsupported platforms ──

#[cfg(not(target_os = "linux"))]
mod stub_impl {
    use super::*;

    /// Placeholder backend for platforms without ppdev.
    pub struct StubPort;

    impl StubPort {
        pub fn open(_path: &str) -> Result<Self> {
            Err(PortError::OpenFailed(
                "parallel-port access is only supported on Linux (ppdev)".into(),
            ))
        }
    }

    impl ParallelPort for StubPort {
        fn claim(&mut self) -> bool {
            false
        }

        fn release(&mut self) {}

        fn write_data(&mut self, _bits: u8) -> Result<()> {
            Err(PortError::IoFailed("no parallel port on this platform".into()))
        }

        fn read_status(&mut self) -> Result<u8> {
            Err(PortError::IoFailed("no parallel port on this platform".into()))
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use stub_impl::StubPort;

/// Concrete port type for the current platform.
#[cfg(target_os = "linux")]
pub type PlatformPort = PpdevPort;
#[cfg(not(target_os = "linux"))]
pub type PlatformPort = StubPort;

/// Open the platform-appropriate parallel port device.
pub fn open_port(path: &str) -> Result<PlatformPort> {
    PlatformPort::open(path)
}

// ── Mock port for testing ──

/// In-memory mock port for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use crate::protocol::SLOT_DATA_MASKS;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard};

    /// Shared recording state behind a [`MockPort`].
    #[derive(Debug, Default)]
    pub struct MockPortState {
        /// Every byte driven onto the data register, in order.
        pub writes: Vec<u8>,
        /// Scripted status-register samples, consumed one per `read_status`.
        pub status_script: VecDeque<u8>,
        /// Returned when the script runs dry (all lines low: no pad replies).
        pub default_status: u8,
        /// If true, `claim` reports the port as busy.
        pub fail_claim: bool,
        /// Whether the port is currently claimed.
        pub claimed: bool,
        /// Number of successful claims.
        pub claims: u32,
        /// Number of releases.
        pub releases: u32,
    }

    /// Mock port with interior shared state.
    ///
    /// Clones share state, so a test can keep one clone for inspection while
    /// the adapter (and the scheduler thread behind it) owns another.
    #[derive(Debug, Clone, Default)]
    pub struct MockPort {
        state: Arc<Mutex<MockPortState>>,
    }

    impl MockPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Lock the shared state for inspection or scripting.
        pub fn state(&self) -> MutexGuard<'_, MockPortState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Make the next claim attempts fail (port held by another driver).
        pub fn set_fail_claim(&self, fail: bool) {
            self.state().fail_claim = fail;
        }

        /// Script one full cluster exchange: per slot `[id, status, buttons
        /// lo, buttons hi]`. Pushes the 40 status samples one `read_cluster`
        /// consumes (8 per command, attention reply included).
        pub fn script_cluster(&self, replies: [[u8; 4]; SLOT_DATA_MASKS.len()]) {
            let mut st = self.state();
            // Attention replies are discarded by the engine; idle-high is
            // what real pads put on the wire.
            let idle_high = SLOT_DATA_MASKS.iter().fold(0u8, |acc, m| acc | m);
            for _ in 0..8 {
                st.status_script.push_back(idle_high);
            }
            for byte_idx in 0..4 {
                for bit in 0..8 {
                    let mut sample = 0u8;
                    for (slot, mask) in SLOT_DATA_MASKS.iter().enumerate() {
                        if replies[slot][byte_idx] >> bit & 1 != 0 {
                            sample |= mask;
                        }
                    }
                    st.status_script.push_back(sample);
                }
            }
        }
    }

    impl ParallelPort for MockPort {
        fn claim(&mut self) -> bool {
            let mut st = self.state();
            if st.fail_claim {
                return false;
            }
            st.claimed = true;
            st.claims += 1;
            true
        }

        fn release(&mut self) {
            let mut st = self.state();
            if st.claimed {
                st.claimed = false;
                st.releases += 1;
            }
        }

        fn write_data(&mut self, bits: u8) -> Result<()> {
            self.state().writes.push(bits);
            Ok(())
        }

        fn read_status(&mut self) -> Result<u8> {
            let mut st = self.state();
            let sample = st.status_script.pop_front().unwrap_or(st.default_status);
            Ok(sample)
        }
    }
}
