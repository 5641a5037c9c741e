//! Generic Filesystem Helpers
//!
//! Building blocks for filesystems whose namespace lives entirely in the
//! dentry tree: name lookup that never finds anything on storage, hard
//! links, unlink/rmdir/rename bookkeeping, directory enumeration from the
//! dentry tree, page-backed symlinks and the initializer for device, FIFO
//! and socket nodes.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;

use super::dentry::{d_instantiate, dget, dput, Dentry};
use super::filemap::{alloc_page, generic_file_read};
use super::inode::{
    drop_nlink, ihold, inc_nlink, iput, mark_inode_dirty, DevId, DirCookie, DirEnt, FileMode,
    FileOperations, FileType, FsError, FsResult, InodeOperations, InodeOps, InodeRef,
};
use super::time::current_time;
use crate::config::{NAME_MAX, PAGE_SIZE};

/// Lookup for filesystems without backing storage: every miss is negative
pub fn simple_lookup(_dir: &InodeRef, dentry: &Arc<Dentry>) -> FsResult<Option<Arc<Dentry>>> {
    if dentry.name().len() > NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    Ok(None)
}

/// Hard link `old_dentry`'s inode under the negative `dentry`
pub fn simple_link(old_dentry: &Arc<Dentry>, dir: &InodeRef, dentry: &Arc<Dentry>) -> FsResult<()> {
    let inode = old_dentry.inode().ok_or(FsError::NotFound)?;
    if inode.mode().is_dir() {
        return Err(FsError::PermissionDenied);
    }

    inc_nlink(&inode);
    ihold(&inode);
    if let Err(e) = d_instantiate(dentry, &inode) {
        drop_nlink(&inode);
        iput(inode);
        return Err(e);
    }
    if let Err(e) = dget(dentry) {
        // The dentry owns the extra reference now and drops it with itself
        drop_nlink(&inode);
        return Err(e);
    }

    let now = current_time();
    inode.meta_mut().ctime = now;
    dir.touch_mtime_ctime(now);
    Ok(())
}

/// A directory is empty when no positive child is hashed under it
pub fn simple_empty(dentry: &Dentry) -> bool {
    dentry.subdirs().iter().all(|child| child.is_negative())
}

/// Remove the name `dentry`; the inode goes when its last dentry handle does
pub fn simple_unlink(dir: &InodeRef, dentry: &Arc<Dentry>) -> FsResult<()> {
    let inode = dentry.inode().ok_or(FsError::NotFound)?;
    let now = current_time();
    inode.meta_mut().ctime = now;
    dir.touch_mtime_ctime(now);
    drop_nlink(&inode);
    dput(dentry);
    Ok(())
}

pub fn simple_rmdir(dir: &InodeRef, dentry: &Arc<Dentry>) -> FsResult<()> {
    if !simple_empty(dentry) {
        return Err(FsError::DirectoryNotEmpty);
    }
    let inode = dentry.inode().ok_or(FsError::NotFound)?;
    drop_nlink(&inode);
    simple_unlink(dir, dentry)?;
    drop_nlink(dir);
    Ok(())
}

/// Link-count bookkeeping of a rename; the dentry move is left to the caller
pub fn simple_rename(
    old_dir: &InodeRef,
    old_dentry: &Arc<Dentry>,
    new_dir: &InodeRef,
    new_dentry: &Arc<Dentry>,
) -> FsResult<()> {
    let inode = old_dentry.inode().ok_or(FsError::NotFound)?;
    let they_are_dirs = inode.mode().is_dir();

    if !simple_empty(new_dentry) {
        return Err(FsError::DirectoryNotEmpty);
    }

    if let Some(victim) = new_dentry.inode() {
        simple_unlink(new_dir, new_dentry)?;
        if they_are_dirs {
            drop_nlink(&victim);
            drop_nlink(old_dir);
        }
    } else if they_are_dirs {
        drop_nlink(old_dir);
        inc_nlink(new_dir);
    }

    let now = current_time();
    old_dir.touch_mtime_ctime(now);
    new_dir.touch_mtime_ctime(now);
    inode.meta_mut().ctime = now;
    Ok(())
}

/// Directory enumeration straight from the dentry tree
///
/// Cookie 0 is ".", 1 is "..", and `2 + n` the n-th hashed child in name
/// order.
pub fn dcache_readdir(
    dentry: &Arc<Dentry>,
    cookie: &mut DirCookie,
    sink: &mut dyn FnMut(DirEnt) -> bool,
) -> FsResult<()> {
    let inode = dentry.inode().ok_or(FsError::NotFound)?;
    if !inode.mode().is_dir() {
        return Err(FsError::NotDirectory);
    }

    if cookie.offset == 0 {
        let dot = DirEnt {
            ino: inode.ino(),
            off: 1,
            name: String::from("."),
            file_type: DirEnt::DT_DIR,
        };
        if !sink(dot) {
            return Ok(());
        }
        cookie.offset = 1;
    }

    if cookie.offset == 1 {
        let parent_ino = dentry
            .parent()
            .and_then(|p| p.inode())
            .map(|p| p.ino())
            .unwrap_or_else(|| inode.ino());
        let dotdot = DirEnt {
            ino: parent_ino,
            off: 2,
            name: String::from(".."),
            file_type: DirEnt::DT_DIR,
        };
        if !sink(dotdot) {
            return Ok(());
        }
        cookie.offset = 2;
    }

    let skip = (cookie.offset - 2) as usize;
    for child in dentry.subdirs().into_iter().skip(skip) {
        let Some(child_inode) = child.inode() else {
            continue;
        };
        let ent = DirEnt {
            ino: child_inode.ino(),
            off: cookie.offset + 1,
            name: child.name(),
            file_type: DirEnt::file_type_from_mode(child_inode.mode()),
        };
        if !sink(ent) {
            return Ok(());
        }
        cookie.offset += 1;
    }

    inode.meta_mut().atime = current_time();
    Ok(())
}

/// Directory file operations backed by [`dcache_readdir`]
pub struct SimpleDirOperations;

impl FileOperations for SimpleDirOperations {
    fn readdir(
        &self,
        dentry: &Arc<Dentry>,
        cookie: &mut DirCookie,
        sink: &mut dyn FnMut(DirEnt) -> bool,
    ) -> FsResult<()> {
        dcache_readdir(dentry, cookie, sink)
    }
}

pub static SIMPLE_DIR_OPERATIONS: SimpleDirOperations = SimpleDirOperations;

/// Store a symlink target in page 0 of `inode`
///
/// `symname` includes its terminating NUL; the recorded size does not.
pub fn page_symlink(inode: &InodeRef, symname: &[u8]) -> FsResult<()> {
    if symname.len() > PAGE_SIZE {
        return Err(FsError::NameTooLong);
    }
    let mut page = alloc_page(inode, 0)?;
    page.data_mut()[..symname.len()].copy_from_slice(symname);
    page.set_uptodate();
    page.set_dirty();
    inode.mapping().insert_page(page);

    let target_len = symname
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(symname.len());
    inode.meta_mut().size = target_len as u64;
    mark_inode_dirty(inode);
    Ok(())
}

/// Symlink inode operations reading the target back from page 0
pub struct PageSymlinkInodeOperations;

impl InodeOperations for PageSymlinkInodeOperations {
    fn readlink(&self, dentry: &Arc<Dentry>) -> FsResult<String> {
        let inode = dentry.inode().ok_or(FsError::NotFound)?;
        let mut buf = vec![0u8; inode.size() as usize];
        let len = generic_file_read(&inode, 0, &mut buf)?;
        buf.truncate(len);
        if let Some(nul) = buf.iter().position(|&b| b == 0) {
            buf.truncate(nul);
        }
        String::from_utf8(buf).map_err(|_| FsError::InvalidArgument)
    }
}

pub static PAGE_SYMLINK_INODE_OPERATIONS: PageSymlinkInodeOperations = PageSymlinkInodeOperations;

/// File operations of device, FIFO and socket nodes
///
/// Opening the underlying driver is outside the VFS, so data access through
/// the node itself is refused.
pub struct SpecialFileOperations;

impl FileOperations for SpecialFileOperations {
    fn read(&self, _inode: &InodeRef, _off: u64, _dst: &mut [u8]) -> FsResult<usize> {
        Err(FsError::NoDevice)
    }

    fn write(&self, _inode: &InodeRef, _off: u64, _src: &[u8]) -> FsResult<usize> {
        Err(FsError::NoDevice)
    }
}

pub static SPECIAL_FILE_OPERATIONS: SpecialFileOperations = SpecialFileOperations;

/// Wire up a node whose behaviour does not depend on the filesystem
///
/// Symlinks get the page-backed symlink table; character and block devices,
/// FIFOs and sockets get the special file table and `rdev`. Any other mode
/// is rejected.
pub fn init_special_inode(inode: &InodeRef, mode: FileMode, rdev: DevId) -> FsResult<()> {
    let ops = match mode.file_type() {
        Some(FileType::Symlink) => InodeOps::Symlink {
            i_op: &PAGE_SYMLINK_INODE_OPERATIONS,
        },
        Some(ty) if ty.is_special() => InodeOps::Special {
            i_fop: &SPECIAL_FILE_OPERATIONS,
        },
        _ => {
            log::warn!(
                "[VFS] init_special_inode: bogus i_mode ({:o}) for inode {}",
                mode.0,
                inode.ino()
            );
            return Err(FsError::InvalidArgument);
        }
    };

    let mut meta = inode.meta_mut();
    meta.mode = mode;
    meta.ops = ops;
    if matches!(ops, InodeOps::Special { .. }) {
        meta.rdev = rdev;
    }
    Ok(())
}
