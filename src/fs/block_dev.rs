//! Block Device Management for Filesystem Integration
//!
//! This module provides the interface between the VFS layer and block devices.
//! Filesystems flagged `REQUIRES_DEV` are mounted against one of these.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use spin::{Mutex, RwLock};

/// Block device interface for filesystems
pub trait BlockDevice: Send + Sync {
    /// Get device sector size (usually 512 bytes)
    fn sector_size(&self) -> u32;

    /// Get total device size in sectors
    fn sector_count(&self) -> u64;

    /// Read sectors from device
    fn read_sectors(&self, sector: u64, count: u32, buffer: &mut [u8]) -> Result<(), BlockError>;

    /// Write sectors to device
    fn write_sectors(&self, sector: u64, count: u32, buffer: &[u8]) -> Result<(), BlockError>;

    /// Flush any pending writes
    fn flush(&self) -> Result<(), BlockError>;

    /// Get device name/identifier
    fn name(&self) -> &str;
}

/// Block device errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// I/O error
    IoError,
    /// Invalid sector number
    InvalidSector,
    /// Buffer too small
    BufferTooSmall,
    /// Device not ready
    NotReady,
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError => write!(f, "I/O error"),
            Self::InvalidSector => write!(f, "Invalid sector"),
            Self::BufferTooSmall => write!(f, "Buffer too small"),
            Self::NotReady => write!(f, "Device not ready"),
        }
    }
}

/// Block device manager
///
/// Maps device names to devices so a mount can be requested by name.
pub struct BlockDeviceManager {
    devices: RwLock<Vec<Arc<dyn BlockDevice>>>,
}

impl BlockDeviceManager {
    pub const fn new() -> Self {
        Self {
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Register a block device
    ///
    /// Returns false if a device with the same name is already registered.
    pub fn register_device(&self, device: Arc<dyn BlockDevice>) -> bool {
        let mut devices = self.devices.write();
        if devices.iter().any(|dev| dev.name() == device.name()) {
            log::warn!("[BLOCK] Device '{}' already registered", device.name());
            return false;
        }
        log::info!(
            "[BLOCK] Registered block device '{}' with {} sectors",
            device.name(),
            device.sector_count()
        );
        devices.push(device);
        true
    }

    /// Remove a block device by name
    pub fn unregister_device(&self, name: &str) -> Option<Arc<dyn BlockDevice>> {
        let mut devices = self.devices.write();
        let idx = devices.iter().position(|dev| dev.name() == name)?;
        Some(devices.remove(idx))
    }

    /// Get device by name
    pub fn get_device_by_name(&self, name: &str) -> Option<Arc<dyn BlockDevice>> {
        let devices = self.devices.read();
        devices.iter().find(|dev| dev.name() == name).cloned()
    }

    /// Get device count
    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }
}

impl Default for BlockDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Global block device manager
static BLOCK_DEVICE_MANAGER: BlockDeviceManager = BlockDeviceManager::new();

/// Get the global block device manager
pub fn block_device_manager() -> &'static BlockDeviceManager {
    &BLOCK_DEVICE_MANAGER
}

/// Memory-backed block device
pub struct RamDisk {
    name: &'static str,
    sector_size: u32,
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    /// Create a zero-filled disk of `sector_count` 512-byte sectors
    pub fn new(name: &'static str, sector_count: u64) -> Self {
        let sector_size = 512;
        Self {
            name,
            sector_size,
            data: Mutex::new(vec![0u8; sector_count as usize * sector_size as usize]),
        }
    }

    fn range(&self, sector: u64, count: u32, buf_len: usize) -> Result<(usize, usize), BlockError> {
        if sector + count as u64 > self.sector_count() {
            return Err(BlockError::InvalidSector);
        }
        let len = count as usize * self.sector_size as usize;
        if buf_len < len {
            return Err(BlockError::BufferTooSmall);
        }
        let start = sector as usize * self.sector_size as usize;
        Ok((start, start + len))
    }
}

impl BlockDevice for RamDisk {
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        (self.data.lock().len() / self.sector_size as usize) as u64
    }

    fn read_sectors(&self, sector: u64, count: u32, buffer: &mut [u8]) -> Result<(), BlockError> {
        let (start, end) = self.range(sector, count, buffer.len())?;
        let data = self.data.lock();
        buffer[..end - start].copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_sectors(&self, sector: u64, count: u32, buffer: &[u8]) -> Result<(), BlockError> {
        let (start, end) = self.range(sector, count, buffer.len())?;
        let mut data = self.data.lock();
        data[start..end].copy_from_slice(&buffer[..end - start]);
        Ok(())
    }

    fn flush(&self) -> Result<(), BlockError> {
        Ok(())
    }

    fn name(&self) -> &str {
        self.name
    }
}
