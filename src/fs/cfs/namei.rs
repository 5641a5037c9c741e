//! CFS directory operations
//!
//! create, mkdir, mknod and symlink build a node through the factory and bind
//! it to the caller's negative dentry. A node that cannot be bound is
//! released before the error is returned, so a failed call leaves both the
//! directory and the inode pool as they were. Lookup, link, unlink, rmdir
//! and rename are the generic dcache helpers.

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::error::CfsError;
use super::inode::cfs_make_inode;
use crate::config::CFS_SYMLINK_PERMS;
use crate::fs::vfs::dentry::{d_clear, d_instantiate, dget, Dentry};
use crate::fs::vfs::inode::{
    inc_nlink, iput, DevId, FileMode, FsError, FsResult, InodeOperations, InodeRef,
};
use crate::fs::vfs::libfs::{
    page_symlink, simple_link, simple_lookup, simple_rename, simple_rmdir, simple_unlink,
};
use crate::fs::vfs::time::current_time;

/// Bind the freshly made `inode` to `dentry` and pin it in the tree
///
/// Consumes the caller's inode reference whether or not it succeeds.
fn cfs_instantiate(dir: &InodeRef, dentry: &Arc<Dentry>, inode: InodeRef) -> Result<(), CfsError> {
    if let Err(e) = d_instantiate(dentry, &inode) {
        iput(inode);
        return Err(CfsError::LinkageFailure(e));
    }
    if let Err(e) = dget(dentry) {
        if let Some(inode) = d_clear(dentry) {
            iput(inode);
        }
        return Err(CfsError::LinkageFailure(e));
    }
    dir.touch_mtime_ctime(current_time());
    Ok(())
}

pub fn cfs_mknod(
    dir: &InodeRef,
    dentry: &Arc<Dentry>,
    mode: FileMode,
    dev: DevId,
) -> Result<(), CfsError> {
    let sb = dir.sb()?;
    let inode = cfs_make_inode(&sb, mode, dev)?;
    cfs_instantiate(dir, dentry, inode)
}

pub fn cfs_create(dir: &InodeRef, dentry: &Arc<Dentry>, mode: FileMode) -> Result<(), CfsError> {
    cfs_mknod(dir, dentry, mode.with_type(FileMode::S_IFREG), DevId::NONE)
}

pub fn cfs_mkdir(dir: &InodeRef, dentry: &Arc<Dentry>, mode: FileMode) -> Result<(), CfsError> {
    cfs_mknod(dir, dentry, mode.with_type(FileMode::S_IFDIR), DevId::NONE)?;
    // The child's ".."
    inc_nlink(dir);
    Ok(())
}

pub fn cfs_symlink(dir: &InodeRef, dentry: &Arc<Dentry>, target: &str) -> Result<(), CfsError> {
    let sb = dir.sb()?;
    let mode = FileMode::new(FileMode::S_IFLNK | CFS_SYMLINK_PERMS);
    let inode = cfs_make_inode(&sb, mode, DevId::NONE)?;

    let mut symname = Vec::with_capacity(target.len() + 1);
    symname.extend_from_slice(target.as_bytes());
    symname.push(0);
    if let Err(e) = page_symlink(&inode, &symname) {
        log::debug!("[CFS] Storing symlink target for '{}' failed: {}", dentry.name(), e);
        iput(inode);
        return Err(CfsError::ContentWriteFailure(e));
    }

    cfs_instantiate(dir, dentry, inode)
}

/// Directory inode operations
pub struct CfsDirInodeOperations;

impl InodeOperations for CfsDirInodeOperations {
    fn create(&self, dir: &InodeRef, dentry: &Arc<Dentry>, mode: FileMode) -> FsResult<()> {
        cfs_create(dir, dentry, mode).map_err(FsError::from)
    }

    fn lookup(&self, dir: &InodeRef, dentry: &Arc<Dentry>) -> FsResult<Option<Arc<Dentry>>> {
        simple_lookup(dir, dentry)
    }

    fn link(&self, old: &Arc<Dentry>, dir: &InodeRef, dentry: &Arc<Dentry>) -> FsResult<()> {
        simple_link(old, dir, dentry)
    }

    fn unlink(&self, dir: &InodeRef, dentry: &Arc<Dentry>) -> FsResult<()> {
        simple_unlink(dir, dentry)
    }

    fn symlink(&self, dir: &InodeRef, dentry: &Arc<Dentry>, target: &str) -> FsResult<()> {
        cfs_symlink(dir, dentry, target).map_err(FsError::from)
    }

    fn mkdir(&self, dir: &InodeRef, dentry: &Arc<Dentry>, mode: FileMode) -> FsResult<()> {
        cfs_mkdir(dir, dentry, mode).map_err(FsError::from)
    }

    fn rmdir(&self, dir: &InodeRef, dentry: &Arc<Dentry>) -> FsResult<()> {
        simple_rmdir(dir, dentry)
    }

    fn mknod(
        &self,
        dir: &InodeRef,
        dentry: &Arc<Dentry>,
        mode: FileMode,
        dev: DevId,
    ) -> FsResult<()> {
        cfs_mknod(dir, dentry, mode, dev).map_err(FsError::from)
    }

    fn rename(
        &self,
        old_dir: &InodeRef,
        old_dentry: &Arc<Dentry>,
        new_dir: &InodeRef,
        new_dentry: &Arc<Dentry>,
    ) -> FsResult<()> {
        simple_rename(old_dir, old_dentry, new_dir, new_dentry)
    }
}

pub static CFS_DIR_INODE_OPERATIONS: CfsDirInodeOperations = CfsDirInodeOperations;
