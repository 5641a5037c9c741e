//! CFS Inode and Node Factory
//!
//! [`CfsInode`] is the pool-resident node structure: the generic VFS inode
//! plus the slot it occupies. [`cfs_make_inode`] is the only place a CFS node
//! is brought to life; it leaves the node fully wired for its type or not at
//! all.

use alloc::sync::Arc;
use core::any::Any;
use core::sync::atomic::{AtomicU32, Ordering};

use super::aops::CFS_AOPS;
use super::error::CfsError;
use super::file::{CFS_FILE_INODE_OPERATIONS, CFS_FILE_OPERATIONS};
use super::namei::CFS_DIR_INODE_OPERATIONS;
use super::pool::{ObjectPool, PoolObject, SlotId};
use crate::fs::vfs::inode::{
    iput, new_inode, DevId, FileMode, FileType, FsInode, Inode, InodeOps, InodeRef,
};
use crate::fs::vfs::libfs::{init_special_inode, SIMPLE_DIR_OPERATIONS};
use crate::fs::vfs::superblock::SuperBlock;
use crate::fs::vfs::time::current_time;

/// The process-wide pool CFS nodes live in
pub type CfsInodePool = ObjectPool<CfsInode>;

/// CFS in-memory node
pub struct CfsInode {
    slot_index: u32,
    /// Generation of the slot lifetime currently holding this block
    slot_generation: AtomicU32,
    vfs_inode: Inode,
}

impl CfsInode {
    /// Slot handle of the current lifetime
    pub fn slot(&self) -> SlotId {
        SlotId::new(self.slot_index, self.slot_generation.load(Ordering::Acquire))
    }

    pub(super) fn bind_slot(&self, slot: SlotId) {
        self.slot_generation.store(slot.generation(), Ordering::Release);
    }
}

impl PoolObject for CfsInode {
    fn init_once(index: usize) -> Self {
        log::trace!("[CFS] Constructing inode block {}", index);
        Self {
            slot_index: index as u32,
            slot_generation: AtomicU32::new(0),
            vfs_inode: Inode::new_once(),
        }
    }
}

impl FsInode for CfsInode {
    fn vfs_inode(&self) -> &Inode {
        &self.vfs_inode
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Build a live CFS node of `mode` in `sb`
///
/// The returned handle carries the node's single reference. Regular files get
/// the CFS file tables and page hooks, directories the CFS directory table
/// with dcache enumeration; symlinks and special nodes are handed to the
/// generic special-node initializer. A mode naming no known type releases
/// the node again.
pub fn cfs_make_inode(
    sb: &Arc<SuperBlock>,
    mode: FileMode,
    dev: DevId,
) -> Result<InodeRef, CfsError> {
    let inode = new_inode(sb).map_err(|e| {
        log::debug!("[CFS] new_inode failed: {}", e);
        CfsError::AllocationFailure
    })?;

    {
        let now = current_time();
        let mut meta = inode.meta_mut();
        meta.mode = mode;
        meta.uid = 0;
        meta.gid = 0;
        meta.blocks = 0;
        meta.atime = now;
        meta.mtime = now;
        meta.ctime = now;
    }

    let wired = match mode.file_type() {
        Some(FileType::Regular) => {
            inode.meta_mut().ops = InodeOps::Regular {
                i_op: &CFS_FILE_INODE_OPERATIONS,
                i_fop: &CFS_FILE_OPERATIONS,
            };
            inode.mapping().set_a_ops(&CFS_AOPS);
            Ok(())
        }
        Some(FileType::Directory) => {
            let mut meta = inode.meta_mut();
            meta.ops = InodeOps::Directory {
                i_op: &CFS_DIR_INODE_OPERATIONS,
                i_fop: &SIMPLE_DIR_OPERATIONS,
            };
            // "." and the entry in the parent
            meta.nlink = 2;
            Ok(())
        }
        Some(
            FileType::Symlink
            | FileType::CharDevice
            | FileType::BlockDevice
            | FileType::Fifo
            | FileType::Socket,
        ) => init_special_inode(&inode, mode, dev).map_err(|_| CfsError::InvalidMode(mode)),
        None => Err(CfsError::InvalidMode(mode)),
    };

    if let Err(e) = wired {
        log::warn!("[CFS] Refusing inode of mode {:o}", mode.0);
        iput(inode);
        return Err(e);
    }

    log::trace!("[CFS] Made inode {} mode {:o}", inode.ino(), mode.0);
    Ok(inode)
}
