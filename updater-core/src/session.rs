//! Update session controller.
//!
//! One externally triggered operation, [`UpdateSession::check_and_update`],
//! runs resource guard -> manifest fetch -> decision -> flash, stopping at the
//! first failure or skip. A busy flag, held through a scoped guard, refuses
//! overlapping cycles and is cleared on every exit path.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::{Mutex, PoisonError};

use log::{debug, info, warn};

use crate::config::UpdatePolicy;
use crate::decision::{decide, Decision};
use crate::events::{EventSink, Phase, UpdateEvent};
use crate::flasher::{FlashOutcome, FlashWriter, ImageFlasher};
use crate::identity::FirmwareIdentity;
use crate::manifest::{FetchError, ManifestFetcher};
use crate::memory::{ResourceGuard, Shortfall};
use crate::platform::Device;
use crate::transport::{HttpClient, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    ResourceExhausted { free: u32, required: u32 },
    Transport(TransportError),
    HttpStatus(u16),
    MalformedManifest(String),
    InvalidManifest(&'static str),
    ModelMismatch { offered: String },
    AlreadyCurrent(String),
    UrlTooLong { len: usize, max: usize },
    FlashFailed { code: i32, text: String },
    NoUpdateAvailable,
}

impl UpdateError {
    /// Expected outcomes that are not faults
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::ModelMismatch { .. } | Self::AlreadyCurrent(_) | Self::NoUpdateAvailable
        )
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted { free, required } => {
                write!(f, "not enough heap: {} bytes free, {} required", free, required)
            }
            Self::Transport(e) => write!(f, "{}", e),
            Self::HttpStatus(code) => write!(f, "manifest request returned HTTP {}", code),
            Self::MalformedManifest(reason) => write!(f, "malformed manifest: {}", reason),
            Self::InvalidManifest(field) => write!(f, "manifest field '{}' missing or empty", field),
            Self::ModelMismatch { offered } => write!(f, "manifest is for model '{}'", offered),
            Self::AlreadyCurrent(version) => write!(f, "already running {}", version),
            Self::UrlTooLong { len, max } => {
                write!(f, "download URL is {} characters, limit is {}", len, max)
            }
            Self::FlashFailed { code, text } => write!(f, "flash failed ({}): {}", code, text),
            Self::NoUpdateAvailable => write!(f, "server reports no update available"),
        }
    }
}

impl std::error::Error for UpdateError {}

impl From<FetchError> for UpdateError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Transport(e) => Self::Transport(e),
            FetchError::HttpStatus(code) => Self::HttpStatus(code),
            FetchError::Malformed(reason) => Self::MalformedManifest(reason),
            FetchError::InvalidManifest(field) => Self::InvalidManifest(field),
            FetchError::UrlTooLong { len, max } => Self::UrlTooLong { len, max },
        }
    }
}

impl From<Shortfall> for UpdateError {
    fn from(s: Shortfall) -> Self {
        Self::ResourceExhausted {
            free: s.snapshot.free_heap_bytes,
            required: s.required,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was already running; nothing was touched
    Busy,
    /// New image is bootable and a restart was requested
    Restarting { version: String },
    Stopped(UpdateError),
}

impl CycleOutcome {
    pub fn restarted(&self) -> bool {
        matches!(self, Self::Restarting { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub checks: u32,
    pub last_check: Option<Duration>,
    pub last_outcome: Option<CycleOutcome>,
}

/// Set while a cycle runs; cleared on drop.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Parts<C, F, D> {
    client: C,
    flash: F,
    device: D,
    sink: Box<dyn EventSink + Send>,
}

pub struct UpdateSession<C, F, D> {
    identity: FirmwareIdentity,
    policy: UpdatePolicy,
    busy: AtomicBool,
    stats: Mutex<SessionStats>,
    parts: Mutex<Parts<C, F, D>>,
}

impl<C, F, D> UpdateSession<C, F, D>
where
    C: HttpClient,
    F: FlashWriter,
    D: Device,
{
    pub fn new(identity: FirmwareIdentity, policy: UpdatePolicy, client: C, flash: F, device: D) -> Self {
        Self {
            identity,
            policy,
            busy: AtomicBool::new(false),
            stats: Mutex::new(SessionStats::default()),
            parts: Mutex::new(Parts {
                client,
                flash,
                device,
                sink: Box::new(()),
            }),
        }
    }

    pub fn with_sink(self, sink: impl EventSink + Send + 'static) -> Self {
        self.parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sink = Box::new(sink);
        self
    }

    pub fn identity(&self) -> &FirmwareIdentity {
        &self.identity
    }

    pub fn policy(&self) -> &UpdatePolicy {
        &self.policy
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Run one cycle. True only when a new image was flashed and a restart
    /// was initiated.
    pub fn check_and_update(&self) -> bool {
        let outcome = self.run_cycle();
        match &outcome {
            CycleOutcome::Busy => debug!("Update cycle already running"),
            CycleOutcome::Restarting { version } => info!("Restarting into {}", version),
            CycleOutcome::Stopped(e) if e.is_skip() => info!("No update: {}", e),
            CycleOutcome::Stopped(e) => warn!("Update check failed: {}", e),
        }
        outcome.restarted()
    }

    /// Same as [`check_and_update`](Self::check_and_update), returning the detailed outcome.
    pub fn run_cycle(&self) -> CycleOutcome {
        let Some(guard) = BusyGuard::acquire(&self.busy) else {
            return CycleOutcome::Busy;
        };

        let mut parts = self.parts.lock().unwrap_or_else(PoisonError::into_inner);
        let parts = &mut *parts;

        let started = parts.device.uptime();
        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.checks += 1;
            stats.last_check = Some(started);
        }
        parts.sink.notify(UpdateEvent::Phase(Phase::Checking));
        info!("Checking for updates ({})", self.identity);

        let outcome = match self.check_and_flash(parts) {
            Ok(version) => CycleOutcome::Restarting { version },
            Err(e) => CycleOutcome::Stopped(e),
        };
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).last_outcome = Some(outcome.clone());

        // Idle again before the restart delay starts.
        drop(guard);

        if outcome.restarted() {
            parts.device.restart(self.policy.restart_delay());
        } else {
            parts.sink.notify(UpdateEvent::Phase(Phase::Online));
        }

        outcome
    }

    fn check_and_flash(&self, parts: &mut Parts<C, F, D>) -> Result<String, UpdateError> {
        ResourceGuard::new(&parts.device).require(self.policy.manifest_min_free_heap)?;

        let fetcher = ManifestFetcher::new(self.policy.manifest_profile(), self.policy.max_url_len);
        parts.device.feed();
        let fetched = fetcher.fetch(&mut parts.client, &self.policy.manifest_url);
        parts.device.feed();
        let manifest = fetched?;

        let url = match decide(&manifest, &self.identity) {
            Decision::Proceed(url) => url,
            Decision::SkipModelMismatch => {
                return Err(UpdateError::ModelMismatch { offered: manifest.model })
            }
            Decision::SkipAlreadyCurrent => return Err(UpdateError::AlreadyCurrent(manifest.version)),
            Decision::SkipInvalid => return Err(UpdateError::InvalidManifest("manifest")),
        };
        info!("Update available: {} -> {}", self.identity.version(), manifest.version);

        let version = manifest.version;
        let sha256 = manifest.sha256;

        ResourceGuard::new(&parts.device).require(self.policy.update_min_free_heap)?;

        parts.sink.notify(UpdateEvent::Phase(Phase::Updating));
        let mut flasher = ImageFlasher::new(
            self.policy.image_profile(),
            self.policy.max_silence(),
            parts.sink.as_mut(),
        );
        match flasher.run(
            &url,
            &self.identity,
            sha256.as_deref(),
            &mut parts.client,
            &mut parts.flash,
            &mut parts.device,
        ) {
            FlashOutcome::Ok => Ok(version),
            FlashOutcome::NoUpdateAvailable => Err(UpdateError::NoUpdateAvailable),
            FlashOutcome::Failed { code, text } => Err(UpdateError::FlashFailed { code, text }),
        }
    }
}
