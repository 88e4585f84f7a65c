/// Device capabilities the update cycle depends on.
///
/// The firmware implements these on top of ESP-IDF; tests use in-memory fakes.
use core::time::Duration;

/// Heap sample taken before a network-heavy phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemorySnapshot {
    pub free_heap_bytes: u32,
    pub fragmentation_percent: u8,
    pub max_free_block_bytes: u32,
}

impl MemorySnapshot {
    /// Build a snapshot, deriving fragmentation from the largest free block.
    pub fn from_heap(free_heap_bytes: u32, max_free_block_bytes: u32) -> Self {
        let fragmentation_percent = if free_heap_bytes == 0 {
            100
        } else {
            let largest = max_free_block_bytes.min(free_heap_bytes) as u64;
            (100 - (largest * 100 / free_heap_bytes as u64)) as u8
        };

        Self {
            free_heap_bytes,
            fragmentation_percent,
            max_free_block_bytes,
        }
    }
}

/// Monotonic time since boot
pub trait Clock {
    fn uptime(&self) -> Duration;
}

pub trait HeapProbe {
    fn memory(&self) -> MemorySnapshot;
}

/// Hardware watchdog and cooperative scheduling hooks.
///
/// `disable`/`enable` bracket flash erase only, which can outlast the
/// watchdog deadline. Streaming runs with the watchdog armed, and `feed` plus
/// `yield_now` keep the radio stack and the idle task alive. `feed` on a
/// disabled watchdog does nothing. A connection open that blocks longer than
/// the watchdog period is reported by the watchdog but not fatal, since the
/// firmware configures it without panic.
pub trait Watchdog {
    fn disable(&mut self);
    fn enable(&mut self);
    fn feed(&mut self);
    fn yield_now(&mut self);
}

/// Indicator LED
pub trait StatusLed {
    /// `true` shows "update in progress", `false` restores whatever was shown before.
    fn set_updating(&mut self, active: bool);
}

pub trait Restarter {
    /// Wait `delay` so pending log output can drain, then reset the device.
    fn restart(&mut self, delay: Duration);
}

/// Everything the session needs from the board, in one bound.
pub trait Device: Clock + HeapProbe + Watchdog + StatusLed + Restarter {}

impl<T> Device for T where T: Clock + HeapProbe + Watchdog + StatusLed + Restarter {}
