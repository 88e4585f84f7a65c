//! Image downloader/flasher.
//!
//! Streams a firmware image from an HTTPS URL straight into the inactive flash
//! slot, never holding more than one receive buffer of it in RAM.
//!
//! States: `Idle -> Preparing -> Flashing -> Verifying -> Success | Failed`.
//! The watchdog is disabled only while the slot is erased, which can exceed
//! its deadline, and re-armed as soon as the erase returns. The indicator LED
//! shows "update in progress" for the whole write, and while streaming the
//! flasher yields to the network stack and feeds the watchdog at least every
//! `max_silence`.

use core::fmt;
use core::time::Duration;
use log::{error, info, warn};
use sha2::{Digest, Sha256};

use crate::events::{EventSink, UpdateEvent};
use crate::identity::FirmwareIdentity;
use crate::platform::{Clock, StatusLed, Watchdog};
use crate::transport::{ConnectionProfile, HttpClient, HttpResponse};

/// First byte of every ESP application image
pub const ESP_IMAGE_MAGIC: u8 = 0xE9;

/// Failure codes reported in `FlashOutcome::Failed`. HTTP failures carry the
/// (positive) status code instead.
pub mod codes {
    pub const TRANSPORT: i32 = -1;
    pub const SERVER_NO_SIZE: i32 = -100;
    pub const INSUFFICIENT_SPACE: i32 = -101;
    pub const BEGIN_FAILED: i32 = -102;
    pub const WRITE_FAILED: i32 = -103;
    pub const TRUNCATED: i32 = -104;
    pub const OVERFLOW: i32 = -105;
    pub const BAD_IMAGE_HEADER: i32 = -106;
    pub const DIGEST_MISMATCH: i32 = -107;
    pub const FINALIZE_FAILED: i32 = -108;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashError(pub String);

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FlashError {}

/// An open write session on the inactive slot
pub trait FlashUpdate {
    fn write(&mut self, chunk: &[u8]) -> Result<(), FlashError>;
    /// Validate the written image and mark the slot bootable.
    fn complete(self) -> Result<(), FlashError>;
    fn abort(self);
}

pub trait FlashWriter {
    type Update<'a>: FlashUpdate
    where
        Self: 'a;

    /// Size of the inactive slot in bytes
    fn capacity(&self) -> u64;
    /// Erase and open the inactive slot for an image of `image_size` bytes.
    fn begin(&mut self, image_size: u64) -> Result<Self::Update<'_>, FlashError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    Idle,
    Preparing,
    Flashing,
    Verifying,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashOutcome {
    /// Image written and marked bootable
    Ok,
    /// Server answered 304: nothing to flash
    NoUpdateAvailable,
    Failed { code: i32, text: String },
}

/// LED on for as long as this lives; watchdog off until `rearm`.
struct WatchdogSection<'d, D: Watchdog + StatusLed + Clock> {
    device: &'d mut D,
    max_silence: Duration,
    last_yield: Duration,
    armed: bool,
}

impl<'d, D: Watchdog + StatusLed + Clock> WatchdogSection<'d, D> {
    fn enter(device: &'d mut D, max_silence: Duration) -> Self {
        device.disable();
        device.set_updating(true);
        let last_yield = device.uptime();
        Self {
            device,
            max_silence,
            last_yield,
            armed: false,
        }
    }

    /// Erase is done: watch the task again for the rest of the write.
    fn rearm(&mut self) {
        if !self.armed {
            self.device.enable();
            self.device.feed();
            self.armed = true;
        }
    }

    /// Yield (and feed, once re-armed) when `max_silence` has passed since
    /// the last yield.
    fn pace(&mut self) {
        let now = self.device.uptime();
        if now.saturating_sub(self.last_yield) >= self.max_silence {
            self.device.yield_now();
            if self.armed {
                self.device.feed();
            }
            self.last_yield = self.device.uptime();
        }
    }
}

impl<D: Watchdog + StatusLed + Clock> Drop for WatchdogSection<'_, D> {
    fn drop(&mut self) {
        self.rearm();
        self.device.set_updating(false);
    }
}

type Failure = (i32, String);

pub struct ImageFlasher<'s> {
    profile: ConnectionProfile,
    max_silence: Duration,
    state: FlashState,
    sink: &'s mut dyn EventSink,
}

impl<'s> ImageFlasher<'s> {
    pub fn new(profile: ConnectionProfile, max_silence: Duration, sink: &'s mut dyn EventSink) -> Self {
        Self {
            profile,
            max_silence,
            state: FlashState::Idle,
            sink,
        }
    }

    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Download `url` into flash. Never restarts the device; the caller
    /// decides what to do with the outcome.
    pub fn run<C, F, D>(
        &mut self,
        url: &str,
        identity: &FirmwareIdentity,
        expected_sha256: Option<&str>,
        client: &mut C,
        flash: &mut F,
        device: &mut D,
    ) -> FlashOutcome
    where
        C: HttpClient,
        F: FlashWriter,
        D: Watchdog + StatusLed + Clock,
    {
        self.transition(FlashState::Preparing);
        info!("Downloading firmware: {}", url);

        let capacity = flash.capacity();
        let free_space = capacity.to_string();
        let headers = [
            ("x-firmware-model", identity.model()),
            ("x-firmware-version", identity.version()),
            ("x-free-space", free_space.as_str()),
        ];

        // The TLS handshake blocks; start it with a fresh watchdog period
        device.feed();
        let opened = client.get(url, &headers, &self.profile);
        device.feed();
        let mut response = match opened {
            Ok(response) => response,
            Err(e) => return self.fail((codes::TRANSPORT, e.to_string())),
        };

        match response.status() {
            200 => {}
            304 => {
                info!("Server reports no update for {}", identity);
                self.transition(FlashState::Idle);
                return FlashOutcome::NoUpdateAvailable;
            }
            status => return self.fail((status as i32, format!("HTTP {}", status))),
        }

        let total = match response.content_length() {
            Some(len) if len > 0 => len,
            _ => return self.fail((codes::SERVER_NO_SIZE, "server did not report image size".into())),
        };
        if total > capacity {
            return self.fail((
                codes::INSUFFICIENT_SPACE,
                format!("image is {} bytes, slot holds {}", total, capacity),
            ));
        }

        let result = {
            let mut section = WatchdogSection::enter(device, self.max_silence);
            self.transition(FlashState::Flashing);
            self.flash_image(&mut response, total, expected_sha256, flash, &mut section)
        };
        drop(response);

        match result {
            Ok(()) => {
                info!("Firmware written ({} bytes) and marked bootable", total);
                self.transition(FlashState::Success);
                FlashOutcome::Ok
            }
            Err(failure) => self.fail(failure),
        }
    }

    fn flash_image<R, F, D>(
        &mut self,
        response: &mut R,
        total: u64,
        expected_sha256: Option<&str>,
        flash: &mut F,
        section: &mut WatchdogSection<'_, D>,
    ) -> Result<(), Failure>
    where
        R: HttpResponse,
        F: FlashWriter,
        D: Watchdog + StatusLed + Clock,
    {
        section.pace();
        let mut update = flash
            .begin(total)
            .map_err(|e| (codes::BEGIN_FAILED, e.to_string()))?;
        section.rearm();

        let mut hasher = expected_sha256.map(|_| Sha256::new());
        if let Err(failure) = self.stream(response, total, &mut update, hasher.as_mut(), section) {
            update.abort();
            return Err(failure);
        }

        self.transition(FlashState::Verifying);
        if let (Some(expected), Some(hasher)) = (expected_sha256, hasher) {
            let actual = to_hex(&hasher.finalize());
            if actual != expected {
                update.abort();
                return Err((
                    codes::DIGEST_MISMATCH,
                    format!("sha256 {} does not match manifest {}", actual, expected),
                ));
            }
        }

        update
            .complete()
            .map_err(|e| (codes::FINALIZE_FAILED, e.to_string()))
    }

    fn stream<R, U, D>(
        &mut self,
        response: &mut R,
        total: u64,
        update: &mut U,
        mut hasher: Option<&mut Sha256>,
        section: &mut WatchdogSection<'_, D>,
    ) -> Result<(), Failure>
    where
        R: HttpResponse,
        U: FlashUpdate,
        D: Watchdog + StatusLed + Clock,
    {
        let mut buf = vec![0u8; self.profile.rx_buffer];
        let mut written = 0u64;
        let mut last_percent = None;

        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| (codes::TRANSPORT, e.to_string()))?;
            if n == 0 {
                break;
            }
            let chunk = &buf[..n];

            if written == 0 && chunk[0] != ESP_IMAGE_MAGIC {
                return Err((
                    codes::BAD_IMAGE_HEADER,
                    format!("image starts with 0x{:02X}, expected 0x{:02X}", chunk[0], ESP_IMAGE_MAGIC),
                ));
            }
            if written + n as u64 > total {
                return Err((codes::OVERFLOW, format!("more than the announced {} bytes", total)));
            }

            update
                .write(chunk)
                .map_err(|e| (codes::WRITE_FAILED, e.to_string()))?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(chunk);
            }
            written += n as u64;

            let percent = written * 100 / total;
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                self.sink.notify(UpdateEvent::Progress { written, total });
                if percent % 10 == 0 {
                    info!("OTA progress: {}% ({}/{})", percent, written, total);
                }
            }

            section.pace();
        }

        if written < total {
            return Err((
                codes::TRUNCATED,
                format!("stream ended after {} of {} bytes", written, total),
            ));
        }

        Ok(())
    }

    fn transition(&mut self, next: FlashState) {
        if self.state != next {
            self.state = next;
            self.sink.notify(UpdateEvent::Flash(next));
        }
    }

    fn fail(&mut self, (code, text): Failure) -> FlashOutcome {
        if code == codes::TRANSPORT {
            warn!("Firmware download interrupted: {}", text);
        }
        error!("Update failed ({}): {}", code, text);
        self.transition(FlashState::Failed);
        FlashOutcome::Failed { code, text }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
