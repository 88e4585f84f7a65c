//! Updater Core - hardware-independent firmware update logic
//!
//! Decides whether a newer image exists for this device and drives the
//! download-and-flash sequence. Everything here runs on the host for tests;
//! the firmware crate supplies ESP-IDF implementations of the seams in
//! [`platform`], [`transport`] and [`flasher`].

pub mod config;
pub mod decision;
pub mod events;
pub mod flasher;
pub mod identity;
pub mod manifest;
pub mod memory;
pub mod platform;
pub mod schedule;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::UpdatePolicy;
pub use decision::{decide, Decision};
pub use events::{EventSink, Phase, UpdateEvent};
pub use flasher::{FlashError, FlashOutcome, FlashState, FlashUpdate, FlashWriter, ImageFlasher};
pub use identity::FirmwareIdentity;
pub use manifest::{FetchError, ManifestFetcher, UpdateManifest};
pub use memory::ResourceGuard;
pub use platform::{Clock, Device, HeapProbe, MemorySnapshot, Restarter, StatusLed, Watchdog};
pub use schedule::CheckSchedule;
pub use session::{CycleOutcome, SessionStats, UpdateError, UpdateSession};
pub use transport::{ConnectionProfile, HttpClient, HttpResponse, TransportError};
