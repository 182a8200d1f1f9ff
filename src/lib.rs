//! Workspace façade crate.
//!
//! Host applications can depend on `playback-engine-workspace` and enable the
//! documented features instead of wiring `core-service` and `core-playback`
//! individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;

#[cfg(feature = "offline-downloads")]
pub use core_playback::download;
