//! Update manifest: the small JSON descriptor published next to each firmware build.
//!
//! ```json
//! { "model": "esp8266-power", "version": "v1.1.0", "url": "https://host/fw.bin" }
//! ```
//!
//! An optional `"sha256"` field (64 hex characters) enables an image digest
//! check before the new slot is marked bootable.

use core::fmt;
use log::{debug, info};
use serde::Deserialize;

use crate::transport::{ConnectionProfile, HttpClient, HttpResponse, TransportError};

/// Largest manifest body accepted; anything longer is rejected unparsed.
pub const MANIFEST_MAX_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateManifest {
    pub model: String,
    pub version: String,
    pub download_url: String,
    pub sha256: Option<String>,
}

impl UpdateManifest {
    /// All required fields present and non-empty
    pub fn is_complete(&self) -> bool {
        !self.model.is_empty() && !self.version.is_empty() && !self.download_url.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Transport(TransportError),
    HttpStatus(u16),
    Malformed(String),
    /// Names the first required field that was missing, empty or unusable
    InvalidManifest(&'static str),
    UrlTooLong { len: usize, max: usize },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "manifest transport error: {}", e),
            Self::HttpStatus(code) => write!(f, "manifest request returned HTTP {}", code),
            Self::Malformed(reason) => write!(f, "malformed manifest: {}", reason),
            Self::InvalidManifest(field) => write!(f, "manifest field '{}' missing or empty", field),
            Self::UrlTooLong { len, max } => {
                write!(f, "download URL is {} characters, limit is {}", len, max)
            }
        }
    }
}

impl std::error::Error for FetchError {}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

#[derive(Deserialize)]
struct RawManifest {
    model: Option<String>,
    version: Option<String>,
    url: Option<String>,
    sha256: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, FetchError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(FetchError::InvalidManifest(field)),
    }
}

/// Parse and validate a manifest body.
pub fn parse_manifest(body: &[u8], max_url_len: usize) -> Result<UpdateManifest, FetchError> {
    let raw: RawManifest =
        serde_json::from_slice(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let model = required(raw.model, "model")?;
    let version = required(raw.version, "version")?;
    let download_url = required(raw.url, "url")?;

    // Images travel over the same encrypted transport as the manifest
    match download_url.strip_prefix("https://") {
        Some(rest) if !rest.is_empty() => {}
        _ => return Err(FetchError::InvalidManifest("url")),
    }

    // Limit is in bytes: it protects the HTTP client's fixed buffers
    let len = download_url.len();
    if len > max_url_len {
        return Err(FetchError::UrlTooLong { len, max: max_url_len });
    }

    let sha256 = match raw.sha256 {
        Some(digest) if digest.is_empty() => None,
        Some(digest) if digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit()) => {
            Some(digest.to_ascii_lowercase())
        }
        Some(_) => return Err(FetchError::InvalidManifest("sha256")),
        None => None,
    };

    Ok(UpdateManifest {
        model,
        version,
        download_url,
        sha256,
    })
}

pub struct ManifestFetcher {
    profile: ConnectionProfile,
    max_url_len: usize,
}

impl ManifestFetcher {
    pub fn new(profile: ConnectionProfile, max_url_len: usize) -> Self {
        Self { profile, max_url_len }
    }

    /// GET `url` and return a validated manifest.
    ///
    /// The connection is closed before parsing starts, so its buffers are
    /// gone by the time the caller moves on to the download.
    pub fn fetch<C: HttpClient>(&self, client: &mut C, url: &str) -> Result<UpdateManifest, FetchError> {
        info!("Fetching manifest: {}", url);

        let mut response = client.get(url, &[], &self.profile)?;
        let status = response.status();
        if status != 200 {
            return Err(FetchError::HttpStatus(status));
        }

        let body = read_bounded(&mut response)?;
        drop(response);
        debug!("Manifest body: {} bytes", body.len());

        let manifest = parse_manifest(&body, self.max_url_len)?;
        info!(
            "Manifest: model={} version={} url={}",
            manifest.model, manifest.version, manifest.download_url
        );
        Ok(manifest)
    }
}

fn read_bounded<R: HttpResponse>(
    response: &mut R,
) -> Result<heapless::Vec<u8, MANIFEST_MAX_BYTES>, FetchError> {
    let mut body = heapless::Vec::new();
    let mut chunk = [0u8; 128];

    loop {
        let n = response.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]).map_err(|_| {
            FetchError::Malformed(format!("body exceeds {} bytes", MANIFEST_MAX_BYTES))
        })?;
    }

    Ok(body)
}
