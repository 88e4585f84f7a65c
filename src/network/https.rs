//! HTTPS client backed by `esp_http_client`.
//!
//! Every request gets its own `EspHttpConnection` sized from the caller's
//! profile. Dropping the response runs `esp_http_client_cleanup`, which frees
//! the TLS session and both buffers.

use embedded_svc::http::Method;
use esp_idf_svc::http::client::{Configuration, EspHttpConnection, FollowRedirectsPolicy};
use esp_idf_sys::{esp_err_t, EspError, ESP_ERR_HTTP_EAGAIN, ESP_ERR_TIMEOUT};
use updater_core::{ConnectionProfile, HttpClient, HttpResponse, TransportError};

#[derive(Default)]
pub struct EspHttpsClient;

pub struct EspHttpsResponse {
    connection: EspHttpConnection,
}

fn is_timeout(e: &EspError) -> bool {
    e.code() == ESP_ERR_TIMEOUT as esp_err_t || e.code() == ESP_ERR_HTTP_EAGAIN as esp_err_t
}

fn connect_error(e: EspError) -> TransportError {
    if is_timeout(&e) {
        TransportError::Timeout
    } else {
        TransportError::Connect(format!("{:?}", e))
    }
}

impl HttpClient for EspHttpsClient {
    type Response = EspHttpsResponse;

    fn get(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        profile: &ConnectionProfile,
    ) -> Result<EspHttpsResponse, TransportError> {
        let config = Configuration {
            buffer_size: Some(profile.rx_buffer),
            buffer_size_tx: Some(profile.tx_buffer),
            timeout: Some(profile.timeout),
            follow_redirects_policy: if profile.follow_redirects {
                FollowRedirectsPolicy::FollowAll
            } else {
                FollowRedirectsPolicy::FollowNone
            },
            // Without a bundle the TLS layer runs in skip-verify mode (see sdkconfig.defaults)
            crt_bundle_attach: if profile.verify_tls {
                Some(esp_idf_sys::esp_crt_bundle_attach)
            } else {
                None
            },
            ..Default::default()
        };

        let mut connection = EspHttpConnection::new(&config).map_err(connect_error)?;
        connection
            .initiate_request(Method::Get, url, headers)
            .map_err(connect_error)?;
        connection.initiate_response().map_err(connect_error)?;

        log::debug!("GET {} -> {}", url, connection.status());
        Ok(EspHttpsResponse { connection })
    }
}

impl HttpResponse for EspHttpsResponse {
    fn status(&self) -> u16 {
        self.connection.status()
    }

    fn content_length(&self) -> Option<u64> {
        self.connection
            .header("Content-Length")
            .and_then(|len| len.trim().parse().ok())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.connection.read(buf).map_err(|e| {
            if is_timeout(&e) {
                TransportError::Timeout
            } else {
                TransportError::Read(format!("{:?}", e))
            }
        })
    }
}
