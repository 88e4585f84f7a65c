/// HTTP(S) seam used by the manifest fetcher and the image flasher
use core::fmt;
use core::time::Duration;

/// Connection settings for one request.
///
/// Each phase opens its own connection with its own profile: manifest checks
/// use small buffers, firmware streaming uses larger ones. A live connection is
/// never resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub rx_buffer: usize,
    pub tx_buffer: usize,
    pub timeout: Duration,
    pub follow_redirects: bool,
    /// `false` skips server certificate validation (trust on first use).
    pub verify_tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Connect(String),
    Timeout,
    Read(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(detail) => write!(f, "connection failed: {}", detail),
            Self::Timeout => write!(f, "connection timed out"),
            Self::Read(detail) => write!(f, "read failed: {}", detail),
        }
    }
}

impl std::error::Error for TransportError {}

/// An open response. Dropping it closes the connection and releases its buffers.
pub trait HttpResponse {
    fn status(&self) -> u16;
    fn content_length(&self) -> Option<u64>;
    /// Read body bytes into `buf`; `Ok(0)` means end of body.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

pub trait HttpClient {
    type Response: HttpResponse;

    /// Open a fresh connection and issue a GET.
    fn get(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        profile: &ConnectionProfile,
    ) -> Result<Self::Response, TransportError>;
}
