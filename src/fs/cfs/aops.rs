//! CFS page I/O hooks
//!
//! The page cache calls these to fill a page from the device and to write a
//! dirty page back. Compression and decompression of page payloads belong
//! here; no codec exists yet, so both hooks complete without moving data.

use crate::fs::vfs::filemap::{AddressSpaceOperations, Page, WritebackControl};
use crate::fs::vfs::inode::{FsResult, InodeRef};

pub struct CfsAddressSpaceOperations;

impl AddressSpaceOperations for CfsAddressSpaceOperations {
    fn readpage(&self, inode: &InodeRef, page: &mut Page) -> FsResult<()> {
        log::trace!("[CFS] readpage inode {} index {}", inode.ino(), page.index());
        Ok(())
    }

    fn writepage(
        &self,
        inode: &InodeRef,
        page: &mut Page,
        _wbc: &WritebackControl,
    ) -> FsResult<()> {
        log::trace!("[CFS] writepage inode {} index {}", inode.ino(), page.index());
        Ok(())
    }
}

pub static CFS_AOPS: CfsAddressSpaceOperations = CfsAddressSpaceOperations;
