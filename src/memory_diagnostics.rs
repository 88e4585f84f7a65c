/// Heap sampling on top of the ESP-IDF heap capabilities API
use esp_idf_sys::*;
use updater_core::MemorySnapshot;

/// Free heap and largest free block across the default-capable heaps
pub fn snapshot() -> MemorySnapshot {
    unsafe {
        let free = esp_get_free_heap_size();
        let largest = heap_caps_get_largest_free_block(MALLOC_CAP_DEFAULT) as u32;
        MemorySnapshot::from_heap(free, largest)
    }
}

/// Log current memory state with detailed breakdown
pub fn log_memory_state(label: &str) {
    unsafe {
        let internal_free = heap_caps_get_free_size(MALLOC_CAP_INTERNAL);
        let internal_largest = heap_caps_get_largest_free_block(MALLOC_CAP_INTERNAL);
        let internal_min = heap_caps_get_minimum_free_size(MALLOC_CAP_INTERNAL);

        // Get current task stack watermark
        let stack_watermark = uxTaskGetStackHighWaterMark(std::ptr::null_mut());

        log::info!("📊 Memory [{}]:", label);
        log::info!(
            "  Internal DRAM: free={} KB, largest={} KB, min={} KB",
            internal_free / 1024,
            internal_largest / 1024,
            internal_min / 1024
        );
        log::info!("  Stack remaining: {} bytes", stack_watermark);

        if internal_largest < 4096 {
            log::error!("⚠️  CRITICAL: Internal DRAM largest block < 4KB!");
        }
        if stack_watermark < 1024 {
            log::error!("⚠️  CRITICAL: Stack watermark < 1KB!");
        }
    }
}
