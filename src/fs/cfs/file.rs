//! CFS regular file tables
//!
//! File data goes through the page cache; the per-page work is done by the
//! address space hooks in `aops`.

use crate::fs::vfs::filemap::{
    generic_file_read, generic_file_write, write_inode_pages, WritebackControl,
};
use crate::fs::vfs::inode::{FileOperations, FsResult, InodeOperations, InodeRef};

/// Inode operations of regular files
pub struct CfsFileInodeOperations;

impl InodeOperations for CfsFileInodeOperations {}

pub static CFS_FILE_INODE_OPERATIONS: CfsFileInodeOperations = CfsFileInodeOperations;

/// File operations of regular files
pub struct CfsFileOperations;

impl FileOperations for CfsFileOperations {
    fn read(&self, inode: &InodeRef, off: u64, dst: &mut [u8]) -> FsResult<usize> {
        generic_file_read(inode, off, dst)
    }

    fn write(&self, inode: &InodeRef, off: u64, src: &[u8]) -> FsResult<usize> {
        generic_file_write(inode, off, src)
    }

    fn fsync(&self, inode: &InodeRef) -> FsResult<()> {
        let written = write_inode_pages(inode, &WritebackControl::sync_all())?;
        log::trace!("[CFS] fsync of inode {} wrote {} pages", inode.ino(), written);
        Ok(())
    }
}

pub static CFS_FILE_OPERATIONS: CfsFileOperations = CfsFileOperations;
