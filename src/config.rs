use anyhow::Result;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
use serde::{Deserialize, Serialize};
use updater_core::UpdatePolicy;

const CONFIG_NAMESPACE: &str = "ota";
const CONFIG_KEY: &str = "config";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // WiFi settings
    pub wifi_ssid: String,
    pub wifi_password: String,

    // Update policy
    #[serde(default)]
    pub update: UpdatePolicy,
}

impl Default for Config {
    fn default() -> Self {
        // Credentials and manifest URL come from ota_config.h via build.rs;
        // that file should NOT be committed to git
        let wifi_ssid = env!("WIFI_SSID");
        let wifi_password = env!("WIFI_PASSWORD");

        Self {
            wifi_ssid: wifi_ssid.to_string(),
            wifi_password: wifi_password.to_string(),
            update: UpdatePolicy {
                manifest_url: crate::version::FW_MANIFEST_URL.to_string(),
                ..Default::default()
            },
        }
    }
}

impl Config {
    pub fn save(&self, nvs_partition: &EspDefaultNvsPartition) -> Result<()> {
        let mut nvs = EspNvs::new(nvs_partition.clone(), CONFIG_NAMESPACE, true)?;
        let json = serde_json::to_vec(self)?;
        nvs.set_blob(CONFIG_KEY, &json)?;
        log::info!("Configuration saved to NVS");
        Ok(())
    }
}

pub fn load_or_default(nvs_partition: &EspDefaultNvsPartition) -> Result<Config> {
    let defaults = Config::default();

    let mut config = match load_from_nvs(nvs_partition) {
        Ok(config) => {
            log::info!("Loaded configuration from NVS");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config from NVS: {:?}, using defaults", e);
            if let Err(save_err) = defaults.save(nvs_partition) {
                log::warn!("Failed to save default config to NVS: {:?}", save_err);
            }
            return Ok(defaults);
        }
    };

    let mut changed = false;

    // If NVS has empty WiFi credentials, use the compiled-in ones
    if config.wifi_ssid.is_empty() {
        log::warn!("NVS WiFi credentials empty, using compiled defaults: SSID='{}'", defaults.wifi_ssid);
        config.wifi_ssid = defaults.wifi_ssid.clone();
        config.wifi_password = defaults.wifi_password.clone();
        changed = true;
    }

    if let Err(e) = config.update.validate() {
        log::warn!("Stored update policy invalid ({}), using compiled defaults", e);
        config.update = defaults.update;
        changed = true;
    }

    if changed {
        if let Err(e) = config.save(nvs_partition) {
            log::warn!("Failed to save repaired config: {:?}", e);
        }
    }

    Ok(config)
}

fn load_from_nvs(nvs_partition: &EspDefaultNvsPartition) -> Result<Config> {
    let nvs = EspNvs::new(nvs_partition.clone(), CONFIG_NAMESPACE, true)?;

    let mut buf = vec![0u8; 2048]; // Max config size
    let data = nvs
        .get_blob(CONFIG_KEY, &mut buf)?
        .ok_or_else(|| anyhow::anyhow!("Config not found in NVS"))?;

    let config: Config = serde_json::from_slice(data)?;

    Ok(config)
}
