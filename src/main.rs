use anyhow::{anyhow, Result};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{OutputPin, PinDriver};
use esp_idf_hal::prelude::*;
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};
use esp_idf_sys as _; // Binstart
use std::time::Instant;

use log::info;
use updater_core::{CheckSchedule, EventSink, Phase, UpdateEvent, UpdateSession};

// Generate ESP-IDF app descriptor
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_sys::esp_app_desc!();
}

mod config;
mod logging;
mod memory_diagnostics;
mod network;
mod ota;
mod status;
mod system;
mod version;

use crate::network::{EspHttpsClient, WifiManager};
use crate::ota::EspFlash;
use crate::status::LogStatusSink;
use crate::system::EspDevice;

const WATCHDOG_TIMEOUT_MS: u32 = 5000;
const WIFI_RETRY_DELAY_MS: u32 = 3000;
const MAIN_LOOP_DELAY_MS: u32 = 10;

fn main() -> Result<()> {
    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();

    let level = option_env!("OTA_LOG_LEVEL").unwrap_or("info");
    logging::init_logger(level).map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    info!("Pull-OTA firmware {}", version::full_version());
    info!("Boot reason: {}", system::reset::get_reset_reason());
    if system::reset::was_software_reset() {
        info!("Software reset detected, possibly after an update");
    }
    memory_diagnostics::log_memory_state("boot");

    let wdt_subscribed = system::init_task_watchdog(WATCHDOG_TIMEOUT_MS);

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let config = config::load_or_default(&nvs)?;
    let identity = version::identity().map_err(|e| anyhow!("Bad firmware identity: {}", e))?;
    info!("Firmware identity: {}", identity);
    info!("Manifest URL: {}", config.update.manifest_url);

    let mut sink = LogStatusSink::default();
    sink.notify(UpdateEvent::Phase(Phase::Boot));

    let mut wifi = WifiManager::new(
        peripherals.modem,
        sys_loop,
        nvs.clone(),
        config.wifi_ssid.clone(),
        config.wifi_password.clone(),
    )?;
    connect_wifi(&mut wifi);
    sink.notify(UpdateEvent::Phase(Phase::Online));
    memory_diagnostics::log_memory_state("wifi up");

    let led = PinDriver::output(peripherals.pins.gpio2.downgrade_output())?;
    let device = EspDevice::new(led, wdt_subscribed);
    let flash = EspFlash::new()?;

    let session = UpdateSession::new(
        identity,
        config.update.clone(),
        EspHttpsClient::default(),
        flash,
        device,
    )
    .with_sink(sink);

    let boot = Instant::now();
    let mut schedule = CheckSchedule::new(session.policy().check_interval());
    info!(
        "Checking for updates every {} s",
        session.policy().check_interval().as_secs()
    );

    loop {
        if !wifi.is_connected() {
            log::warn!("WiFi connection lost, reconnecting...");
            connect_wifi(&mut wifi);
            // Check again as soon as we are back online
            schedule.reset();
        }

        if schedule.poll(boot.elapsed()) {
            // Returns only when no restart is pending
            session.check_and_update();
            let stats = session.stats();
            log::debug!(
                "Update checks: {}, last outcome: {:?}",
                stats.checks,
                stats.last_outcome
            );
        }

        unsafe { esp_idf_sys::esp_task_wdt_reset(); }
        FreeRtos::delay_ms(MAIN_LOOP_DELAY_MS);
    }
}

/// Block until the station has an address, retrying forever
fn connect_wifi(wifi: &mut WifiManager) {
    loop {
        match wifi.connect() {
            Ok(()) => return,
            Err(e) => {
                log::error!("WiFi connection failed: {:?}", e);
                unsafe { esp_idf_sys::esp_task_wdt_reset(); }
                FreeRtos::delay_ms(WIFI_RETRY_DELAY_MS);
            }
        }
    }
}
