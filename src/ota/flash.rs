use esp_idf_svc::ota::{EspOta, EspOtaUpdate};
use esp_idf_sys::{esp_ota_get_next_update_partition, EspError};
use updater_core::{FlashError, FlashUpdate, FlashWriter};

/// Inactive OTA slot of the running partition table
pub struct EspFlash {
    ota: EspOta,
}

impl EspFlash {
    pub fn new() -> anyhow::Result<Self> {
        let ota = EspOta::new()?;
        Ok(Self { ota })
    }
}

fn flash_err(context: &str, e: EspError) -> FlashError {
    FlashError(format!("{}: {}", context, e))
}

impl FlashWriter for EspFlash {
    type Update<'a> = EspFlashUpdate<'a> where Self: 'a;

    fn capacity(&self) -> u64 {
        let partition = unsafe { esp_ota_get_next_update_partition(core::ptr::null()) };
        if partition.is_null() {
            log::error!("No OTA update partition found");
            return 0;
        }
        unsafe { (*partition).size as u64 }
    }

    fn begin(&mut self, image_size: u64) -> Result<Self::Update<'_>, FlashError> {
        log::info!("Erasing update slot for {} byte image", image_size);
        let update = self
            .ota
            .initiate_update()
            .map_err(|e| flash_err("ota begin", e))?;
        Ok(EspFlashUpdate { update })
    }
}

pub struct EspFlashUpdate<'a> {
    update: EspOtaUpdate<'a>,
}

impl FlashUpdate for EspFlashUpdate<'_> {
    fn write(&mut self, chunk: &[u8]) -> Result<(), FlashError> {
        self.update
            .write(chunk)
            .map_err(|e| flash_err("ota write", e))
    }

    fn complete(self) -> Result<(), FlashError> {
        // Validates the image and switches the boot partition
        self.update
            .complete()
            .map_err(|e| flash_err("ota end", e))
    }

    fn abort(self) {
        if let Err(e) = self.update.abort() {
            log::warn!("Failed to abort OTA update: {}", e);
        }
    }
}
