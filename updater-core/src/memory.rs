/// Heap checks run before each network-heavy phase
use log::{error, warn};

use crate::platform::{HeapProbe, MemorySnapshot};

/// Outcome of a failed heap check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub snapshot: MemorySnapshot,
    pub required: u32,
}

pub struct ResourceGuard<'a, H: HeapProbe + ?Sized> {
    probe: &'a H,
}

impl<'a, H: HeapProbe + ?Sized> ResourceGuard<'a, H> {
    pub fn new(probe: &'a H) -> Self {
        Self { probe }
    }

    /// True when free heap is at least `threshold_bytes`. No retry: a shortfall
    /// ends the current cycle.
    pub fn check_sufficient_memory(&self, threshold_bytes: u32) -> bool {
        self.require(threshold_bytes).is_ok()
    }

    pub fn require(&self, threshold_bytes: u32) -> Result<MemorySnapshot, Shortfall> {
        let snapshot = self.probe.memory();
        log_snapshot(&snapshot, threshold_bytes);

        if snapshot.free_heap_bytes < threshold_bytes {
            error!(
                "Insufficient heap: {} bytes free, {} required",
                snapshot.free_heap_bytes, threshold_bytes
            );
            return Err(Shortfall {
                snapshot,
                required: threshold_bytes,
            });
        }

        Ok(snapshot)
    }
}

fn log_snapshot(snapshot: &MemorySnapshot, threshold_bytes: u32) {
    warn!(
        "📊 Heap: free={} KB, largest={} KB, frag={}% (need {} KB)",
        snapshot.free_heap_bytes / 1024,
        snapshot.max_free_block_bytes / 1024,
        snapshot.fragmentation_percent,
        threshold_bytes / 1024
    );

    if snapshot.max_free_block_bytes < 4096 {
        error!("⚠️  CRITICAL: largest free block < 4KB!");
    }
}
