//! padtap — polling driver for PSX pad multitap adapters on the parallel port.

pub mod config;
pub mod engine;
pub mod error;
pub mod pad;
pub mod port;
pub mod protocol;
pub mod tap;

pub use error::TapError;
