use updater_core::{EventSink, FlashState, UpdateEvent};

/// Reports updater phases on the serial log
#[derive(Default)]
pub struct LogStatusSink {
    last_percent: Option<u64>,
}

impl EventSink for LogStatusSink {
    fn notify(&mut self, event: UpdateEvent) {
        match event {
            UpdateEvent::Phase(phase) => {
                log::info!("Status: {}", phase.as_str());
            }
            UpdateEvent::Flash(state) => {
                match state {
                    FlashState::Failed => log::warn!("Flash state: {:?}", state),
                    FlashState::Preparing => self.last_percent = None,
                    _ => {}
                }
                log::debug!("Flash state: {:?}", state);
            }
            UpdateEvent::Progress { written, total } => {
                let percent = if total == 0 { 0 } else { written * 100 / total };
                if self.last_percent != Some(percent) {
                    self.last_percent = Some(percent);
                    log::debug!("Progress: {}% ({}/{} bytes)", percent, written, total);
                }
            }
        }
    }
}
