/// Identity of the running firmware image
use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareIdentity {
    model: String,
    version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    EmptyModel,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyModel => write!(f, "firmware model must not be empty"),
        }
    }
}

impl std::error::Error for IdentityError {}

impl FirmwareIdentity {
    pub fn new(model: impl Into<String>, version: impl Into<String>) -> Result<Self, IdentityError> {
        let model = model.into();
        if model.is_empty() {
            return Err(IdentityError::EmptyModel);
        }

        Ok(Self {
            model,
            version: version.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Opaque version token, only ever compared for equality
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for FirmwareIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.model, self.version)
    }
}
