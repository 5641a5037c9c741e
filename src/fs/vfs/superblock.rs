//! Superblock and Filesystem Types
//!
//! This module defines the generic superblock (one per mounted instance), the
//! [`FsType`] and [`SuperOperations`] traits a filesystem implements, the
//! mount lifecycle state machine, and the generic block-device mount and
//! teardown paths filesystems build on.

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use spin::{Mutex, MutexGuard, RwLock};

use super::dentry::{self, Dentry};
use super::fault::FaultInjector;
use super::filemap::{write_inode_pages, WritebackControl};
use super::inode::{FsError, FsInode, FsResult, InodeRef};
use crate::fs::block_dev::BlockDevice;

/// Filesystem type trait for registration and mounting
pub trait FsType: Send + Sync {
    /// Returns the filesystem type name (e.g., "cfs")
    fn name(&self) -> &'static str;

    /// Filesystem type flags
    fn fs_flags(&self) -> FsTypeFlags {
        FsTypeFlags::empty()
    }

    /// Mount a filesystem instance
    ///
    /// On success the returned superblock is in [`SuperState::Mounted`]. On
    /// failure nothing of the attempt remains.
    fn mount(
        &self,
        dev: Option<Arc<dyn BlockDevice>>,
        opts: MountOpts,
    ) -> FsResult<Arc<SuperBlock>>;

    /// Tear a mounted instance down
    fn kill_sb(&self, sb: &Arc<SuperBlock>) -> FsResult<()>;
}

/// Superblock operations supplied by the filesystem
pub trait SuperOperations: Send + Sync {
    /// Allocate the filesystem's node structure for a new inode
    fn alloc_inode(&self, sb: &Arc<SuperBlock>) -> FsResult<Arc<dyn FsInode>>;

    /// Return a node whose last reference was dropped
    fn destroy_inode(&self, inode: InodeRef);

    /// Release filesystem private state at unmount
    fn put_super(&self, _sb: &SuperBlock) {}

    /// Write back superblock metadata
    fn write_super(&self, sb: &SuperBlock) {
        sb.clear_dirty();
    }

    /// Filesystem statistics
    fn statfs(&self, sb: &SuperBlock) -> FsResult<StatFs>;

    /// Mount options as shown in the mount table
    fn show_options(&self, sb: &SuperBlock) -> String {
        generic_show_options(sb)
    }
}

bitflags::bitflags! {
    /// Filesystem type flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FsTypeFlags: u32 {
        /// Mounts need a backing block device
        const REQUIRES_DEV = 1 << 0;
    }
}

/// Mount options
#[derive(Debug, Clone, Default)]
pub struct MountOpts {
    pub flags: MountFlags,
    pub data: Option<String>,
}

bitflags::bitflags! {
    /// Mount flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MountFlags: u64 {
        const MS_RDONLY = 1 << 0;
        const MS_NOSUID = 1 << 1;
        const MS_NODEV = 1 << 2;
        const MS_NOEXEC = 1 << 3;
        const MS_SYNCHRONOUS = 1 << 4;
        const MS_REMOUNT = 1 << 5;
        const MS_SILENT = 1 << 15;
    }
}

/// Filesystem statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFs {
    /// Filesystem type
    pub f_type: u64,
    /// Optimal transfer block size
    pub f_bsize: u64,
    /// Total data blocks in filesystem
    pub f_blocks: u64,
    /// Free blocks in filesystem
    pub f_bfree: u64,
    /// Free blocks available to unprivileged user
    pub f_bavail: u64,
    /// Total file nodes in filesystem
    pub f_files: u64,
    /// Free file nodes in filesystem
    pub f_ffree: u64,
    /// Maximum length of filenames
    pub f_namelen: u64,
}

/// Lifecycle of a mounted instance
///
/// `Unmounted -> Filling -> Mounted -> Unmounting -> Unmounted`, with
/// `Filling -> Unmounted` when the fill fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperState {
    Unmounted,
    Filling,
    Mounted,
    Unmounting,
}

impl SuperState {
    const fn can_become(self, next: SuperState) -> bool {
        matches!(
            (self, next),
            (Self::Unmounted, Self::Filling)
                | (Self::Filling, Self::Mounted)
                | (Self::Filling, Self::Unmounted)
                | (Self::Mounted, Self::Unmounting)
                | (Self::Unmounting, Self::Unmounted)
        )
    }
}

impl fmt::Display for SuperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmounted => write!(f, "unmounted"),
            Self::Filling => write!(f, "filling"),
            Self::Mounted => write!(f, "mounted"),
            Self::Unmounting => write!(f, "unmounting"),
        }
    }
}

/// Generic superblock - the live representation of one mounted instance
pub struct SuperBlock {
    s_type: &'static str,
    s_flags: MountFlags,
    s_bdev: Option<Arc<dyn BlockDevice>>,
    s_options: Option<String>,
    s_faults: Arc<FaultInjector>,
    s_blocksize: AtomicU32,
    s_blocksize_bits: AtomicU32,
    s_magic: AtomicU64,
    s_dirt: AtomicBool,
    s_op: RwLock<Option<Arc<dyn SuperOperations>>>,
    s_root: RwLock<Option<Arc<Dentry>>>,
    s_fs_info: Mutex<Option<Box<dyn Any + Send + Sync>>>,
    s_state: Mutex<SuperState>,
    s_vfs_rename_mutex: Mutex<()>,
    next_ino: AtomicU64,
}

impl SuperBlock {
    /// Create an empty, unmounted superblock
    pub fn new(
        s_type: &'static str,
        dev: Option<Arc<dyn BlockDevice>>,
        opts: MountOpts,
        faults: Arc<FaultInjector>,
    ) -> Self {
        Self {
            s_type,
            s_flags: opts.flags,
            s_bdev: dev,
            s_options: opts.data,
            s_faults: faults,
            s_blocksize: AtomicU32::new(0),
            s_blocksize_bits: AtomicU32::new(0),
            s_magic: AtomicU64::new(0),
            s_dirt: AtomicBool::new(false),
            s_op: RwLock::new(None),
            s_root: RwLock::new(None),
            s_fs_info: Mutex::new(None),
            s_state: Mutex::new(SuperState::Unmounted),
            s_vfs_rename_mutex: Mutex::new(()),
            // ino 1 is the first inode handed out, normally the root
            next_ino: AtomicU64::new(1),
        }
    }

    pub fn fs_type_name(&self) -> &'static str {
        self.s_type
    }

    pub fn flags(&self) -> MountFlags {
        self.s_flags
    }

    pub fn bdev(&self) -> Option<&Arc<dyn BlockDevice>> {
        self.s_bdev.as_ref()
    }

    /// Mount data string as given at mount time
    pub fn options(&self) -> Option<&str> {
        self.s_options.as_deref()
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.s_faults
    }

    pub fn blocksize(&self) -> u32 {
        self.s_blocksize.load(Ordering::Acquire)
    }

    pub fn blocksize_bits(&self) -> u32 {
        self.s_blocksize_bits.load(Ordering::Acquire)
    }

    /// Set block size and shift; `bits` must be log2(`size`)
    pub fn set_blocksize(&self, size: u32, bits: u32) -> FsResult<()> {
        if size == 0 || 1u32.checked_shl(bits) != Some(size) {
            return Err(FsError::InvalidArgument);
        }
        self.s_blocksize.store(size, Ordering::Release);
        self.s_blocksize_bits.store(bits, Ordering::Release);
        Ok(())
    }

    pub fn magic(&self) -> u64 {
        self.s_magic.load(Ordering::Acquire)
    }

    pub fn set_magic(&self, magic: u64) {
        self.s_magic.store(magic, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.s_dirt.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.s_dirt.store(true, Ordering::Release);
    }

    pub fn clear_dirty(&self) {
        self.s_dirt.store(false, Ordering::Release);
    }

    /// Install the superblock operation table
    pub fn set_s_op(&self, s_op: Arc<dyn SuperOperations>) {
        *self.s_op.write() = Some(s_op);
    }

    pub fn s_op(&self) -> FsResult<Arc<dyn SuperOperations>> {
        self.s_op.read().clone().ok_or(FsError::StaleHandle)
    }

    pub fn set_root(&self, root: Arc<Dentry>) {
        *self.s_root.write() = Some(root);
    }

    /// Root dentry, `StaleHandle` once unmounted
    pub fn root(&self) -> FsResult<Arc<Dentry>> {
        self.s_root.read().clone().ok_or(FsError::StaleHandle)
    }

    pub fn take_root(&self) -> Option<Arc<Dentry>> {
        self.s_root.write().take()
    }

    /// Attach filesystem private data
    pub fn set_fs_info(&self, info: Box<dyn Any + Send + Sync>) {
        *self.s_fs_info.lock() = Some(info);
    }

    /// Detach filesystem private data
    pub fn take_fs_info(&self) -> Option<Box<dyn Any + Send + Sync>> {
        self.s_fs_info.lock().take()
    }

    pub fn has_fs_info(&self) -> bool {
        self.s_fs_info.lock().is_some()
    }

    /// Run `f` on the private data if it is a `T`
    pub fn with_fs_info<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> FsResult<R> {
        let info = self.s_fs_info.lock();
        let info = info.as_ref().ok_or(FsError::StaleHandle)?;
        info.downcast_ref::<T>().map(f).ok_or(FsError::InvalidArgument)
    }

    pub fn state(&self) -> SuperState {
        *self.s_state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SuperState::Mounted
    }

    /// Move from `from` to `to`, rejecting anything the lifecycle forbids
    pub fn transition(&self, from: SuperState, to: SuperState) -> FsResult<()> {
        let mut state = self.s_state.lock();
        if *state != from || !from.can_become(to) {
            log::warn!(
                "[VFS] {}: refusing state change {} -> {} (currently {})",
                self.s_type,
                from,
                to,
                *state
            );
            return Err(FsError::Busy);
        }
        *state = to;
        Ok(())
    }

    /// Serializes cross-directory renames
    pub fn lock_rename(&self) -> MutexGuard<'_, ()> {
        self.s_vfs_rename_mutex.lock()
    }

    /// Next inode number
    pub fn next_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::Relaxed)
    }

    /// Filesystem statistics of a mounted instance
    pub fn statfs(&self) -> FsResult<StatFs> {
        if !self.is_active() {
            return Err(FsError::StaleHandle);
        }
        self.s_op()?.statfs(self)
    }
}

impl fmt::Debug for SuperBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuperBlock")
            .field("type", &self.s_type)
            .field("state", &self.state())
            .field("magic", &self.magic())
            .field("blocksize", &self.blocksize())
            .finish()
    }
}

/// Mount options exactly as they were passed in
pub fn generic_show_options(sb: &SuperBlock) -> String {
    sb.options().unwrap_or("").to_owned()
}

/// Mount a block-device filesystem
///
/// Builds a fresh superblock, runs `fill_super` on it in the `Filling` state
/// and publishes it as `Mounted` on success. A failed fill leaves the
/// superblock `Unmounted`; `fill_super` is responsible for freeing whatever
/// it allocated.
pub fn get_sb_bdev<E, F>(
    fs_type: &dyn FsType,
    dev: Option<Arc<dyn BlockDevice>>,
    opts: MountOpts,
    faults: Arc<FaultInjector>,
    fill_super: F,
) -> Result<Arc<SuperBlock>, E>
where
    E: From<FsError>,
    F: FnOnce(&Arc<SuperBlock>, Option<&str>, bool) -> Result<(), E>,
{
    if fs_type.fs_flags().contains(FsTypeFlags::REQUIRES_DEV) && dev.is_none() {
        log::warn!("[VFS] {}: mount requires a block device", fs_type.name());
        return Err(FsError::NoDevice.into());
    }

    let silent = opts.flags.contains(MountFlags::MS_SILENT);
    let sb = Arc::new(SuperBlock::new(fs_type.name(), dev, opts, faults));
    sb.transition(SuperState::Unmounted, SuperState::Filling)?;

    match fill_super(&sb, sb.options(), silent) {
        Ok(()) => {
            sb.transition(SuperState::Filling, SuperState::Mounted)?;
            log::info!(
                "[VFS] Mounted {} on {}",
                fs_type.name(),
                sb.bdev().map(|d| d.name()).unwrap_or("none")
            );
            Ok(sb)
        }
        Err(e) => {
            if sb.transition(SuperState::Filling, SuperState::Unmounted).is_err() {
                log::error!("[VFS] {}: superblock left filling state", fs_type.name());
            }
            Err(e)
        }
    }
}

/// Generic teardown: drop the dentry tree, then let the filesystem release
/// its private state
pub fn generic_shutdown_super(sb: &SuperBlock) {
    if let Some(root) = sb.take_root() {
        dentry::shrink_dcache_for_umount(root);
    }
    match sb.s_op() {
        Ok(s_op) => s_op.put_super(sb),
        Err(_) => log::warn!("[VFS] {}: no superblock operations at shutdown", sb.s_type),
    }
}

/// Unmount path for block-device filesystems
pub fn kill_block_super(sb: &Arc<SuperBlock>) -> FsResult<()> {
    sb.transition(SuperState::Mounted, SuperState::Unmounting)?;
    generic_shutdown_super(sb);
    if let Some(dev) = sb.bdev() {
        if let Err(e) = dev.flush() {
            log::warn!("[VFS] Flush of {} failed at unmount: {}", dev.name(), e);
        }
    }
    sb.transition(SuperState::Unmounting, SuperState::Unmounted)?;
    log::info!("[VFS] Unmounted {}", sb.s_type);
    Ok(())
}

/// Write back every dirty page and the superblock itself
pub fn sync_filesystem(sb: &SuperBlock) -> FsResult<()> {
    let root = sb.root()?;
    let wbc = WritebackControl::sync_all();
    let mut first_err = None;

    dentry::for_each_inode(&root, &mut |inode| {
        if let Err(e) = write_inode_pages(inode, &wbc) {
            first_err.get_or_insert(e);
        }
    });

    if sb.is_dirty() {
        sb.s_op()?.write_super(sb);
    }
    if let Some(dev) = sb.bdev() {
        dev.flush().map_err(|_| FsError::IoError)?;
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
