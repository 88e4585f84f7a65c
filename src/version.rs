// Build-time identity of this image, injected by build.rs

use updater_core::identity::{FirmwareIdentity, IdentityError};

pub const FW_MODEL: &str = env!("FW_MODEL");
pub const FW_VERSION: &str = env!("FW_VERSION");
pub const FW_MANIFEST_URL: &str = env!("FW_MANIFEST_URL");

// Cargo package version from Cargo.toml
pub const CARGO_VERSION: &str = env!("CARGO_PKG_VERSION");

// Full version string for the boot banner
pub fn full_version() -> String {
    format!("{} {} (cargo {})", FW_MODEL, FW_VERSION, CARGO_VERSION)
}

pub fn identity() -> Result<FirmwareIdentity, IdentityError> {
    FirmwareIdentity::new(FW_MODEL, FW_VERSION)
}
