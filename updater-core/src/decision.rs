/// Decide whether a manifest describes an update for this device
use crate::identity::FirmwareIdentity;
use crate::manifest::UpdateManifest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed(String),
    SkipModelMismatch,
    SkipAlreadyCurrent,
    SkipInvalid,
}

/// Model must match exactly; any version string other than the running one
/// counts as an update, with no ordering between versions.
pub fn decide(manifest: &UpdateManifest, identity: &FirmwareIdentity) -> Decision {
    if !manifest.is_complete() {
        return Decision::SkipInvalid;
    }

    if manifest.model != identity.model() {
        return Decision::SkipModelMismatch;
    }

    if manifest.version == identity.version() {
        return Decision::SkipAlreadyCurrent;
    }

    Decision::Proceed(manifest.download_url.clone())
}
