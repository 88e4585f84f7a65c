// Network layer: Wi-Fi station and the HTTPS client used by the updater

pub mod https;
pub mod wifi;

pub use https::EspHttpsClient;
pub use wifi::WifiManager;
