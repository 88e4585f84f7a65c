/// Observer hooks for phase changes and flashing progress
use crate::flasher::FlashState;

/// Coarse device phase, suitable for a status topic or display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Boot,
    Checking,
    Updating,
    Online,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Boot => "boot",
            Phase::Checking => "checking",
            Phase::Updating => "updating",
            Phase::Online => "online",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    Phase(Phase),
    Flash(FlashState),
    Progress { written: u64, total: u64 },
}

pub trait EventSink {
    fn notify(&mut self, event: UpdateEvent);
}

/// Discards every event
impl EventSink for () {
    fn notify(&mut self, _event: UpdateEvent) {}
}
