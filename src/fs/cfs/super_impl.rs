//! CFS Superblock Implementation
//!
//! Mount, statfs and teardown of CFS instances. A mount builds the private
//! extension, sets the block geometry and magic, installs the superblock
//! operations and creates the root directory; each step undoes the earlier
//! ones when it fails.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::error::{CfsError, FillStage};
use super::inode::{cfs_make_inode, CfsInode, CfsInodePool};
use crate::config::{
    CFS_BLOCK_SHIFT, CFS_BLOCK_SIZE, CFS_FS_NAME, CFS_ROOT_PERMS, CFS_SUPER_MAGIC,
    STATFS_AVAIL_BLOCKS, STATFS_FREE_BLOCKS, STATFS_TOTAL_BLOCKS,
};
use crate::fs::block_dev::BlockDevice;
use crate::fs::vfs::dentry::d_alloc_root;
use crate::fs::vfs::fault::{FaultInjector, FaultPoint};
use crate::fs::vfs::inode::{iput, DevId, FileMode, FsError, FsInode, FsResult, InodeRef};
use crate::fs::vfs::superblock::{
    get_sb_bdev, kill_block_super, FsType, FsTypeFlags, MountOpts, StatFs, SuperBlock,
    SuperOperations,
};

/// Private per-mount extension
///
/// Holds no on-disk metadata yet; space management will keep its state here.
/// Counts itself in the owning filesystem type's live mount counter.
pub struct CfsSbInfo {
    mounts: Arc<AtomicUsize>,
}

impl CfsSbInfo {
    fn new(mounts: Arc<AtomicUsize>) -> Self {
        mounts.fetch_add(1, Ordering::AcqRel);
        Self { mounts }
    }
}

impl Drop for CfsSbInfo {
    fn drop(&mut self) {
        self.mounts.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Superblock operations of one CFS instance
pub struct CfsSuperOps {
    pool: Arc<CfsInodePool>,
}

impl SuperOperations for CfsSuperOps {
    fn alloc_inode(&self, _sb: &Arc<SuperBlock>) -> FsResult<Arc<dyn FsInode>> {
        let (slot, node) = self.pool.acquire().map_err(|e| {
            log::debug!("[CFS] Inode pool: {}", e);
            FsError::NoSpace
        })?;
        node.bind_slot(slot);
        Ok(node)
    }

    fn destroy_inode(&self, inode: InodeRef) {
        let Some(node) = inode.fs_node::<CfsInode>() else {
            log::error!("[CFS] destroy_inode: inode {} is not a CFS inode", inode.ino());
            return;
        };
        // The pool's handle plus the one being destroyed
        if inode.handle_count() > 2 {
            log::warn!(
                "[CFS] Inode {} released with {} handles still live",
                inode.ino(),
                inode.handle_count() - 2
            );
        }
        if let Err(e) = self.pool.release(node.slot()) {
            log::error!("[CFS] Releasing inode {} failed: {}", inode.ino(), e);
        }
    }

    fn put_super(&self, sb: &SuperBlock) {
        if sb.take_fs_info().is_some() {
            log::debug!("[CFS] Released superblock extension");
        }
    }

    fn write_super(&self, sb: &SuperBlock) {
        sb.clear_dirty();
    }

    fn statfs(&self, sb: &SuperBlock) -> FsResult<StatFs> {
        // Only a live CFS extension answers
        sb.with_fs_info(|_: &CfsSbInfo| ())?;
        Ok(StatFs {
            f_type: sb.magic(),
            f_bsize: sb.blocksize() as u64,
            f_blocks: STATFS_TOTAL_BLOCKS,
            f_bfree: STATFS_FREE_BLOCKS,
            f_bavail: STATFS_AVAIL_BLOCKS,
            ..StatFs::default()
        })
    }
}

/// Fill a fresh superblock for a CFS mount
pub fn cfs_fill_super(
    sb: &Arc<SuperBlock>,
    pool: &Arc<CfsInodePool>,
    mounts: &Arc<AtomicUsize>,
    silent: bool,
) -> Result<(), CfsError> {
    if sb.faults().should_fail(FaultPoint::SuperInfo) {
        return Err(CfsError::AllocationFailure.during(FillStage::Extension));
    }
    sb.set_fs_info(Box::new(CfsSbInfo::new(mounts.clone())));

    if let Err(e) = sb.set_blocksize(CFS_BLOCK_SIZE, CFS_BLOCK_SHIFT) {
        sb.take_fs_info();
        return Err(CfsError::Host(e).during(FillStage::Geometry));
    }
    sb.set_magic(CFS_SUPER_MAGIC);
    sb.set_s_op(Arc::new(CfsSuperOps { pool: pool.clone() }));

    let root_mode = FileMode::new(FileMode::S_IFDIR | CFS_ROOT_PERMS);
    let root = match cfs_make_inode(sb, root_mode, DevId::NONE) {
        Ok(root) => root,
        Err(e) => {
            if !silent {
                log::warn!("[CFS] get root inode failed: {}", e);
            }
            sb.take_fs_info();
            return Err(e.during(FillStage::RootNode));
        }
    };

    match d_alloc_root(&root) {
        Ok(dentry) => sb.set_root(dentry),
        Err(e) => {
            if !silent {
                log::warn!("[CFS] get root dentry failed: {}", e);
            }
            iput(root);
            sb.take_fs_info();
            return Err(CfsError::Host(e).during(FillStage::RootLinkage));
        }
    }

    Ok(())
}

/// The CFS filesystem type
pub struct CfsFsType {
    pool: Arc<CfsInodePool>,
    faults: Arc<FaultInjector>,
    mounts: Arc<AtomicUsize>,
}

impl CfsFsType {
    /// Filesystem type allocating its nodes from `pool`
    pub fn new(pool: Arc<CfsInodePool>) -> Self {
        Self {
            pool,
            faults: Arc::new(FaultInjector::new()),
            mounts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pool(&self) -> &Arc<CfsInodePool> {
        &self.pool
    }

    /// Fault injector shared by every instance this type mounts
    pub fn faults(&self) -> &Arc<FaultInjector> {
        &self.faults
    }

    /// Instances whose private extension is still alive
    pub fn active_mounts(&self) -> usize {
        self.mounts.load(Ordering::Acquire)
    }

    /// Mount an instance on `dev`, keeping the CFS error detail
    pub fn get_sb(
        &self,
        dev: Option<Arc<dyn BlockDevice>>,
        opts: MountOpts,
    ) -> Result<Arc<SuperBlock>, CfsError> {
        get_sb_bdev(self, dev, opts, self.faults.clone(), |sb, _data, silent| {
            cfs_fill_super(sb, &self.pool, &self.mounts, silent)
        })
    }
}

impl FsType for CfsFsType {
    fn name(&self) -> &'static str {
        CFS_FS_NAME
    }

    fn fs_flags(&self) -> FsTypeFlags {
        FsTypeFlags::REQUIRES_DEV
    }

    fn mount(
        &self,
        dev: Option<Arc<dyn BlockDevice>>,
        opts: MountOpts,
    ) -> FsResult<Arc<SuperBlock>> {
        self.get_sb(dev, opts).map_err(|e| {
            log::warn!("[CFS] {}", e);
            FsError::from(e)
        })
    }

    fn kill_sb(&self, sb: &Arc<SuperBlock>) -> FsResult<()> {
        kill_block_super(sb)
    }
}
