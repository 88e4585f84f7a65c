use core::time::Duration;
use std::time::Instant;

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_sys::{self as sys, ESP_OK};
use updater_core::{Clock, HeapProbe, MemorySnapshot, Restarter, StatusLed, Watchdog};

use crate::memory_diagnostics;

/// Set the task watchdog timeout and subscribe the calling task.
/// Returns whether the task ended up subscribed.
pub fn init_task_watchdog(timeout_ms: u32) -> bool {
    unsafe {
        // First deinit if already initialized
        let _ = sys::esp_task_wdt_deinit();

        let wdt_config = sys::esp_task_wdt_config_t {
            timeout_ms,
            idle_core_mask: 0,
            trigger_panic: false,
        };
        let result = sys::esp_task_wdt_init(&wdt_config as *const _);
        if result != ESP_OK {
            log::warn!("Watchdog reconfiguration failed: {:?}", result);
            return false;
        }
        log::info!("Watchdog timeout set to {} ms", timeout_ms);

        let add_result = sys::esp_task_wdt_add(core::ptr::null_mut());
        if add_result == ESP_OK {
            log::info!("Current task added to watchdog monitoring");
            true
        } else {
            log::warn!("Failed to add task to watchdog: {:?}", add_result);
            false
        }
    }
}

/// Board services the updater needs: uptime, heap, task watchdog, the
/// status LED and restart.
pub struct EspDevice {
    boot: Instant,
    led: PinDriver<'static, AnyOutputPin, Output>,
    led_was_high: bool,
    // Task was subscribed at boot; only then may `enable` re-add it
    wdt_managed: bool,
    wdt_subscribed: bool,
}

impl EspDevice {
    pub fn new(led: PinDriver<'static, AnyOutputPin, Output>, wdt_subscribed: bool) -> Self {
        Self {
            boot: Instant::now(),
            led,
            led_was_high: false,
            wdt_managed: wdt_subscribed,
            wdt_subscribed,
        }
    }
}

impl Clock for EspDevice {
    fn uptime(&self) -> Duration {
        self.boot.elapsed()
    }
}

impl HeapProbe for EspDevice {
    fn memory(&self) -> MemorySnapshot {
        memory_diagnostics::snapshot()
    }
}

impl Watchdog for EspDevice {
    fn disable(&mut self) {
        if !self.wdt_subscribed {
            return;
        }
        let result = unsafe { sys::esp_task_wdt_delete(core::ptr::null_mut()) };
        if result == ESP_OK {
            self.wdt_subscribed = false;
            log::debug!("Task watchdog suspended");
        } else {
            log::warn!("Failed to remove task from watchdog: {:?}", result);
        }
    }

    fn enable(&mut self) {
        if !self.wdt_managed || self.wdt_subscribed {
            return;
        }
        let result = unsafe { sys::esp_task_wdt_add(core::ptr::null_mut()) };
        if result == ESP_OK {
            self.wdt_subscribed = true;
            log::debug!("Task watchdog resumed");
        } else {
            log::warn!("Failed to re-add task to watchdog: {:?}", result);
        }
    }

    fn feed(&mut self) {
        if self.wdt_subscribed {
            unsafe { sys::esp_task_wdt_reset(); }
        }
    }

    fn yield_now(&mut self) {
        // One tick lets the IDLE and lwIP tasks run
        FreeRtos::delay_ms(1);
    }
}

impl StatusLed for EspDevice {
    fn set_updating(&mut self, active: bool) {
        let result = if active {
            self.led_was_high = self.led.is_set_high();
            self.led.set_high()
        } else if self.led_was_high {
            self.led.set_high()
        } else {
            self.led.set_low()
        };
        if let Err(e) = result {
            log::warn!("Status LED write failed: {}", e);
        }
    }
}

impl Restarter for EspDevice {
    fn restart(&mut self, delay: Duration) {
        log::info!("Restarting in {} ms...", delay.as_millis());
        FreeRtos::delay_ms(delay.as_millis() as u32);
        log::logger().flush();
        unsafe { sys::esp_restart(); }
    }
}
