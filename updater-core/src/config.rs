/// Update policy that can be tested independently
use core::fmt;
use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::transport::ConnectionProfile;

pub const DEFAULT_MANIFEST_URL: &str = "https://yvsimm01.github.io/esp8266_OAT/manifest.json";

/// Longest download URL the HTTP client buffers are sized for
pub const MAX_URL_LEN: usize = 230;

pub const MIN_CHECK_INTERVAL_SECS: u32 = 30;
pub const MAX_CHECK_INTERVAL_SECS: u32 = 600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdatePolicy {
    pub manifest_url: String,
    pub check_interval_secs: u32,

    // Timeouts
    pub manifest_timeout_ms: u32,
    pub download_timeout_ms: u32,

    // Heap thresholds, escalating per phase
    pub manifest_min_free_heap: u32,
    pub update_min_free_heap: u32,

    // Transport buffers
    pub manifest_rx_buffer: usize,
    pub manifest_tx_buffer: usize,
    pub image_rx_buffer: usize,
    pub image_tx_buffer: usize,

    pub max_url_len: usize,
    /// Longest the flasher may go without yielding to the network stack
    pub watchdog_max_silence_ms: u32,
    pub restart_delay_ms: u32,
    pub verify_tls: bool,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            check_interval_secs: 30,
            manifest_timeout_ms: 10_000,
            download_timeout_ms: 60_000,
            manifest_min_free_heap: 40_000,
            update_min_free_heap: 60_000,
            manifest_rx_buffer: 1024,
            manifest_tx_buffer: 512,
            image_rx_buffer: 4096,
            image_tx_buffer: 1024,
            max_url_len: MAX_URL_LEN,
            watchdog_max_silence_ms: 100,
            restart_delay_ms: 1000,
            verify_tls: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ManifestUrl(String),
    CheckInterval(u32),
    ThresholdOrder { manifest: u32, update: u32 },
    ZeroBuffer(&'static str),
    ZeroSilence,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManifestUrl(url) => write!(f, "manifest URL must be https: '{}'", url),
            Self::CheckInterval(secs) => write!(
                f,
                "check interval {}s outside {}..={}s",
                secs, MIN_CHECK_INTERVAL_SECS, MAX_CHECK_INTERVAL_SECS
            ),
            Self::ThresholdOrder { manifest, update } => write!(
                f,
                "update heap threshold {} must not be below manifest threshold {}",
                update, manifest
            ),
            Self::ZeroBuffer(name) => write!(f, "{} must be non-zero", name),
            Self::ZeroSilence => write!(f, "watchdog silence interval must be non-zero"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl UpdatePolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.manifest_url.starts_with("https://") || self.manifest_url.len() <= "https://".len() {
            return Err(ConfigError::ManifestUrl(self.manifest_url.clone()));
        }

        if !(MIN_CHECK_INTERVAL_SECS..=MAX_CHECK_INTERVAL_SECS).contains(&self.check_interval_secs) {
            return Err(ConfigError::CheckInterval(self.check_interval_secs));
        }

        if self.update_min_free_heap < self.manifest_min_free_heap {
            return Err(ConfigError::ThresholdOrder {
                manifest: self.manifest_min_free_heap,
                update: self.update_min_free_heap,
            });
        }

        for (name, size) in [
            ("manifest_rx_buffer", self.manifest_rx_buffer),
            ("manifest_tx_buffer", self.manifest_tx_buffer),
            ("image_rx_buffer", self.image_rx_buffer),
            ("image_tx_buffer", self.image_tx_buffer),
            ("max_url_len", self.max_url_len),
        ] {
            if size == 0 {
                return Err(ConfigError::ZeroBuffer(name));
            }
        }

        if self.watchdog_max_silence_ms == 0 {
            return Err(ConfigError::ZeroSilence);
        }

        Ok(())
    }

    pub fn manifest_profile(&self) -> ConnectionProfile {
        ConnectionProfile {
            rx_buffer: self.manifest_rx_buffer,
            tx_buffer: self.manifest_tx_buffer,
            timeout: Duration::from_millis(self.manifest_timeout_ms as u64),
            follow_redirects: true,
            verify_tls: self.verify_tls,
        }
    }

    pub fn image_profile(&self) -> ConnectionProfile {
        ConnectionProfile {
            rx_buffer: self.image_rx_buffer,
            tx_buffer: self.image_tx_buffer,
            timeout: Duration::from_millis(self.download_timeout_ms as u64),
            follow_redirects: true,
            verify_tls: self.verify_tls,
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs as u64)
    }

    pub fn max_silence(&self) -> Duration {
        Duration::from_millis(self.watchdog_max_silence_ms as u64)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms as u64)
    }
}
