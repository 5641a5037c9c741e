//! Allocation Fault Injection
//!
//! Each superblock carries a [`FaultInjector`]. Allocation sites that the
//! kernel allocator could refuse (`kzalloc`, dentry allocation, page cache
//! pages) consult it, so tests can make exactly one of them fail.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Allocation sites that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultPoint {
    /// Filesystem private superblock data
    SuperInfo = 0,
    /// Dentry allocation (including the root dentry)
    Dentry = 1,
    /// Page cache page allocation
    Page = 2,
}

const FAULT_POINTS: usize = 3;

/// Per-mount fault injection state
///
/// `fail_nth(point, n)` arms the n-th (1-based) upcoming allocation at
/// `point` to fail once.
#[derive(Debug, Default)]
pub struct FaultInjector {
    armed: [AtomicU32; FAULT_POINTS],
    injected: AtomicU64,
}

impl FaultInjector {
    pub const fn new() -> Self {
        Self {
            armed: [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)],
            injected: AtomicU64::new(0),
        }
    }

    /// Make the next allocation at `point` fail
    pub fn fail_next(&self, point: FaultPoint) {
        self.fail_nth(point, 1);
    }

    /// Make the n-th upcoming allocation at `point` fail
    pub fn fail_nth(&self, point: FaultPoint, n: u32) {
        self.armed[point as usize].store(n, Ordering::SeqCst);
    }

    /// Disarm every point
    pub fn clear(&self) {
        for slot in &self.armed {
            slot.store(0, Ordering::SeqCst);
        }
    }

    /// Number of failures injected so far
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    /// Called by allocation sites; true means "pretend the allocator failed"
    pub fn should_fail(&self, point: FaultPoint) -> bool {
        let slot = &self.armed[point as usize];
        let hit = slot
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                n => Some(n - 1),
            })
            .map(|prev| prev == 1)
            .unwrap_or(false);
        if hit {
            self.injected.fetch_add(1, Ordering::Relaxed);
            log::debug!("[VFS] Injected allocation failure at {:?}", point);
        }
        hit
    }
}
