//! Mount Table
//!
//! This module implements the mount point table and mount/umount operations.
//! It tracks all mounted instances and provides mount point lookup by path.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::{Once, RwLock};

use super::dentry::Dentry;
use super::inode::{FsError, FsResult};
use super::registry::lookup_filesystem;
use super::superblock::{sync_filesystem, FsType, MountFlags, MountOpts, SuperBlock};
use crate::fs::block_dev::{block_device_manager, BlockDevice};

/// Mount point entry
#[derive(Clone)]
pub struct MountPoint {
    /// Mount path (e.g., "/", "/mnt/disk")
    pub path: String,
    /// Filesystem type that produced the superblock
    pub fs_type: Arc<dyn FsType>,
    /// Superblock of the mounted filesystem
    pub sb: Arc<SuperBlock>,
    /// Mount flags
    pub flags: MountFlags,
    /// Mount ID (unique identifier)
    pub mount_id: u64,
}

impl MountPoint {
    pub fn root(&self) -> FsResult<Arc<Dentry>> {
        self.sb.root()
    }

    /// Options column of the mount listing
    pub fn options(&self) -> FsResult<String> {
        Ok(self.sb.s_op()?.show_options(&self.sb))
    }
}

/// Mount table
pub struct MountTable {
    /// Map from mount path to mount point
    mounts: RwLock<BTreeMap<String, MountPoint>>,
    /// Next mount ID
    next_mount_id: AtomicU64,
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
            next_mount_id: AtomicU64::new(1),
        }
    }

    /// Mount a filesystem
    ///
    /// # Arguments
    /// * `fs_type` - Filesystem type to mount
    /// * `dev` - Block device for filesystems that need one
    /// * `path` - Mount point path
    /// * `opts` - Mount options
    pub fn mount(
        &self,
        fs_type: Arc<dyn FsType>,
        dev: Option<Arc<dyn BlockDevice>>,
        path: &str,
        opts: MountOpts,
    ) -> FsResult<u64> {
        if self.mounts.read().contains_key(path) {
            return Err(FsError::Busy);
        }

        let flags = opts.flags;
        let sb = fs_type.mount(dev, opts)?;
        let mount_id = self.next_mount_id.fetch_add(1, Ordering::Relaxed);

        let mut mounts = self.mounts.write();
        if mounts.contains_key(path) {
            // Lost a race for the same path
            drop(mounts);
            if let Err(e) = fs_type.kill_sb(&sb) {
                log::error!("[VFS] Teardown of duplicate mount on {} failed: {}", path, e);
            }
            return Err(FsError::Busy);
        }
        mounts.insert(
            String::from(path),
            MountPoint {
                path: String::from(path),
                fs_type,
                sb,
                flags,
                mount_id,
            },
        );
        Ok(mount_id)
    }

    /// Mount a registered filesystem type on a registered block device
    pub fn mount_by_name(
        &self,
        fs_type_name: &str,
        dev_name: Option<&str>,
        path: &str,
        opts: MountOpts,
    ) -> FsResult<u64> {
        let fs_type = lookup_filesystem(fs_type_name).ok_or(FsError::NoDevice)?;
        let dev = match dev_name {
            Some(name) => Some(
                block_device_manager()
                    .get_device_by_name(name)
                    .ok_or(FsError::NotFound)?,
            ),
            None => None,
        };
        self.mount(fs_type, dev, path, opts)
    }

    /// Unmount a filesystem
    ///
    /// The instance is synced first; a failed sync is logged and the instance
    /// is torn down anyway.
    pub fn umount(&self, path: &str) -> FsResult<()> {
        let mount_point = self.mounts.write().remove(path).ok_or(FsError::NotFound)?;

        if let Err(e) = sync_filesystem(&mount_point.sb) {
            log::warn!("[VFS] Sync of {} before unmount failed: {}", path, e);
        }
        mount_point.fs_type.kill_sb(&mount_point.sb)
    }

    /// Get a mount point by path
    pub fn get_mount(&self, path: &str) -> Option<MountPoint> {
        self.mounts.read().get(path).cloned()
    }

    /// Find the mount point for a given path
    ///
    /// Returns the mount point with the longest matching prefix.
    pub fn find_mount(&self, path: &str) -> Option<MountPoint> {
        let mounts = self.mounts.read();
        mounts
            .iter()
            .filter(|(mount_path, _)| is_path_prefix(mount_path, path))
            .max_by_key(|(mount_path, _)| mount_path.len())
            .map(|(_, mount_point)| mount_point.clone())
    }

    /// List all mount points
    pub fn list_mounts(&self) -> Vec<MountPoint> {
        self.mounts.read().values().cloned().collect()
    }

    /// Check if a path is a mount point
    pub fn is_mount_point(&self, path: &str) -> bool {
        self.mounts.read().contains_key(path)
    }

    /// Sync all filesystems
    pub fn sync_all(&self) -> FsResult<()> {
        let mounts = self.list_mounts();
        for mount_point in mounts {
            sync_filesystem(&mount_point.sb)?;
        }
        Ok(())
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

/// `prefix` names `path` or one of its ancestors
fn is_path_prefix(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Global mount table instance
static MOUNT_TABLE: Once<MountTable> = Once::new();

/// Get the global mount table
pub fn mount_table() -> &'static MountTable {
    MOUNT_TABLE.call_once(MountTable::new)
}
