//! Page Cache
//!
//! Each inode owns an [`AddressSpace`] holding its cached pages. Regular file
//! reads and writes go through the cache; a filesystem only supplies the
//! per-page [`AddressSpaceOperations`] that fill a page from storage and
//! push a dirty page back to it.

use alloc::boxed::Box;
use alloc::collections::btree_map::Entry;
use alloc::collections::BTreeMap;
use alloc::vec;
use spin::{Mutex, RwLock};

use super::fault::FaultPoint;
use super::inode::{mark_inode_dirty, FsError, FsResult, InodeRef};
use super::time::current_time;
use crate::config::{DIRTY_PAGES_PER_INODE, PAGE_SHIFT, PAGE_SIZE};

bitflags::bitflags! {
    /// Page state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        /// Contents reflect storage
        const UPTODATE = 1 << 0;
        /// Modified since last writeback
        const DIRTY = 1 << 1;
        /// Last writeback failed
        const ERROR = 1 << 2;
    }
}

/// One cached page of file data
pub struct Page {
    index: u64,
    flags: PageFlags,
    data: Box<[u8]>,
}

impl Page {
    /// Zero-filled page at `index`
    pub fn new(index: u64) -> Self {
        Self {
            index,
            flags: PageFlags::empty(),
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Byte offset of the page in its file
    pub fn offset(&self) -> u64 {
        self.index << PAGE_SHIFT
    }

    pub fn flags(&self) -> PageFlags {
        self.flags
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_uptodate(&self) -> bool {
        self.flags.contains(PageFlags::UPTODATE)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PageFlags::DIRTY)
    }

    pub fn set_uptodate(&mut self) {
        self.flags.insert(PageFlags::UPTODATE);
    }

    pub fn set_dirty(&mut self) {
        self.flags.insert(PageFlags::DIRTY);
    }

    pub fn clear_dirty(&mut self) {
        self.flags.remove(PageFlags::DIRTY | PageFlags::ERROR);
    }

    pub fn set_error(&mut self) {
        self.flags.insert(PageFlags::ERROR);
    }
}

/// Writeback request parameters
#[derive(Debug, Clone, Copy)]
pub struct WritebackControl {
    /// Upper bound on pages to write
    pub nr_to_write: usize,
}

impl WritebackControl {
    /// Data integrity sync, every dirty page is attempted
    pub const fn sync_all() -> Self {
        Self {
            nr_to_write: usize::MAX,
        }
    }

    /// Flush at most `nr_to_write` pages on behalf of a writer
    pub const fn background(nr_to_write: usize) -> Self {
        Self { nr_to_write }
    }
}

/// Per-page storage hooks of a filesystem
pub trait AddressSpaceOperations: Sync {
    /// Fill `page` from storage
    ///
    /// On success the page is marked up to date by the caller.
    fn readpage(&self, inode: &InodeRef, page: &mut Page) -> FsResult<()>;

    /// Persist or queue a dirty `page`
    ///
    /// On failure the page stays dirty and is retried by a later writeback.
    fn writepage(&self, inode: &InodeRef, page: &mut Page, wbc: &WritebackControl)
        -> FsResult<()>;
}

/// Cached pages of one inode
pub struct AddressSpace {
    pages: Mutex<BTreeMap<u64, Page>>,
    a_ops: RwLock<Option<&'static dyn AddressSpaceOperations>>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(BTreeMap::new()),
            a_ops: RwLock::new(None),
        }
    }

    /// Forget pages and hooks from a previous inode lifetime
    pub fn reset(&self) {
        self.truncate_pages();
        *self.a_ops.write() = None;
    }

    pub fn set_a_ops(&self, a_ops: &'static dyn AddressSpaceOperations) {
        *self.a_ops.write() = Some(a_ops);
    }

    pub fn a_ops(&self) -> Option<&'static dyn AddressSpaceOperations> {
        *self.a_ops.read()
    }

    /// Drop every cached page
    pub fn truncate_pages(&self) {
        self.pages.lock().clear();
    }

    pub fn nrpages(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn nr_dirty(&self) -> usize {
        self.pages.lock().values().filter(|p| p.is_dirty()).count()
    }

    /// Insert a fully prepared page, replacing any cached one
    pub fn insert_page(&self, page: Page) {
        self.pages.lock().insert(page.index(), page);
    }

    /// Run `f` on the cached page at `index`
    pub fn with_page<R>(&self, index: u64, f: impl FnOnce(&Page) -> R) -> Option<R> {
        self.pages.lock().get(&index).map(f)
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate a page for `inode`, honouring the mount's fault injector
pub fn alloc_page(inode: &InodeRef, index: u64) -> FsResult<Page> {
    if inode.sb()?.faults().should_fail(FaultPoint::Page) {
        return Err(FsError::OutOfMemory);
    }
    Ok(Page::new(index))
}

/// Find the page at `index`, reading it through `readpage` on a miss
fn find_or_read<'a>(
    inode: &InodeRef,
    pages: &'a mut BTreeMap<u64, Page>,
    index: u64,
    fill: bool,
) -> FsResult<&'a mut Page> {
    match pages.entry(index) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => {
            let mut page = alloc_page(inode, index)?;
            if fill {
                let a_ops = inode.mapping().a_ops().ok_or(FsError::IoError)?;
                a_ops.readpage(inode, &mut page)?;
            }
            page.set_uptodate();
            Ok(entry.insert(page))
        }
    }
}

/// Read file data through the page cache
pub fn generic_file_read(inode: &InodeRef, off: u64, dst: &mut [u8]) -> FsResult<usize> {
    let size = inode.size();
    if off >= size || dst.is_empty() {
        return Ok(0);
    }
    let end = size.min(off.saturating_add(dst.len() as u64));

    let mut pages = inode.mapping().pages.lock();
    let mut pos = off;
    while pos < end {
        let index = pos >> PAGE_SHIFT;
        let in_page = (pos as usize) & (PAGE_SIZE - 1);
        let chunk = (PAGE_SIZE - in_page).min((end - pos) as usize);

        let page = find_or_read(inode, &mut pages, index, true)?;
        let done = (pos - off) as usize;
        dst[done..done + chunk].copy_from_slice(&page.data()[in_page..in_page + chunk]);
        pos += chunk as u64;
    }
    drop(pages);

    inode.meta_mut().atime = current_time();
    Ok((end - off) as usize)
}

/// Write file data into the page cache, leaving the pages dirty
pub fn generic_file_write(inode: &InodeRef, off: u64, src: &[u8]) -> FsResult<usize> {
    if src.is_empty() {
        return Ok(0);
    }
    let size = inode.size();
    let end = off
        .checked_add(src.len() as u64)
        .ok_or(FsError::InvalidArgument)?;

    let mut pages = inode.mapping().pages.lock();
    let mut pos = off;
    while pos < end {
        let index = pos >> PAGE_SHIFT;
        let in_page = (pos as usize) & (PAGE_SIZE - 1);
        let chunk = (PAGE_SIZE - in_page).min((end - pos) as usize);

        // A partial overwrite of existing data must see the old contents
        let partial = chunk < PAGE_SIZE && (index << PAGE_SHIFT) < size;
        let page = find_or_read(inode, &mut pages, index, partial)?;
        let done = (pos - off) as usize;
        page.data_mut()[in_page..in_page + chunk].copy_from_slice(&src[done..done + chunk]);
        page.set_dirty();
        pos += chunk as u64;
    }
    drop(pages);

    {
        let now = current_time();
        let mut meta = inode.meta_mut();
        meta.size = meta.size.max(end);
        meta.mtime = now;
        meta.ctime = now;
    }
    mark_inode_dirty(inode);
    balance_dirty_pages(inode);
    Ok(src.len())
}

/// Write back the dirty pages of `inode` beyond its per-file limit
fn balance_dirty_pages(inode: &InodeRef) {
    let dirty = inode.mapping().nr_dirty();
    if dirty <= DIRTY_PAGES_PER_INODE {
        return;
    }
    let wbc = WritebackControl::background(dirty - DIRTY_PAGES_PER_INODE);
    match write_inode_pages(inode, &wbc) {
        Ok(n) => log::debug!("[VFS] Throttled inode {}: wrote {} pages", inode.ino(), n),
        Err(e) => log::warn!("[VFS] Throttled writeback of inode {} failed: {}", inode.ino(), e),
    }
}

/// Push the dirty pages of `inode` through its `writepage` hook
///
/// Returns the number of pages written. A failed page stays dirty and is
/// flagged; the first error is reported after every page was attempted.
pub fn write_inode_pages(inode: &InodeRef, wbc: &WritebackControl) -> FsResult<usize> {
    let Some(a_ops) = inode.mapping().a_ops() else {
        return Ok(0);
    };

    let mut pages = inode.mapping().pages.lock();
    let mut written = 0;
    let mut first_err = None;
    for page in pages.values_mut().filter(|p| p.is_dirty()) {
        if written >= wbc.nr_to_write {
            break;
        }
        match a_ops.writepage(inode, page, wbc) {
            Ok(()) => {
                page.clear_dirty();
                written += 1;
            }
            Err(e) => {
                log::warn!(
                    "[VFS] writepage failed for inode {} page {}: {}",
                    inode.ino(),
                    page.index(),
                    e
                );
                page.set_error();
                first_err.get_or_insert(e);
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(written),
    }
}
