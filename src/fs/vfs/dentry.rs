//! Dentry Tree
//!
//! A dentry binds a name in a parent directory to an inode (positive) or to
//! nothing (negative). Hashed dentries are pinned by their parent's child
//! map, so the tree rooted at the superblock's root dentry is the in-memory
//! namespace of a mounted instance. A positive dentry owns one inode
//! reference and drops it when the dentry itself goes away.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use core::mem;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::{Mutex, RwLock};

use super::fault::FaultPoint;
use super::inode::{iput, FsError, FsResult, InodeRef};
use super::superblock::SuperBlock;

/// Directory entry
pub struct Dentry {
    d_name: RwLock<String>,
    d_parent: RwLock<Weak<Dentry>>,
    d_sb: Weak<SuperBlock>,
    d_inode: RwLock<Option<InodeRef>>,
    d_subdirs: Mutex<BTreeMap<String, Arc<Dentry>>>,
    d_hashed: AtomicBool,
}

impl Dentry {
    fn new(name: String, parent: Weak<Dentry>, sb: Weak<SuperBlock>) -> Self {
        Self {
            d_name: RwLock::new(name),
            d_parent: RwLock::new(parent),
            d_sb: sb,
            d_inode: RwLock::new(None),
            d_subdirs: Mutex::new(BTreeMap::new()),
            d_hashed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> String {
        self.d_name.read().clone()
    }

    /// Parent dentry, `None` for the root
    pub fn parent(&self) -> Option<Arc<Dentry>> {
        self.d_parent.read().upgrade()
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    pub fn sb(&self) -> FsResult<Arc<SuperBlock>> {
        self.d_sb.upgrade().ok_or(FsError::StaleHandle)
    }

    /// Bound inode, `None` for a negative dentry
    pub fn inode(&self) -> Option<InodeRef> {
        self.d_inode.read().clone()
    }

    pub fn is_negative(&self) -> bool {
        self.d_inode.read().is_none()
    }

    /// Pinned in its parent's child map
    pub fn is_hashed(&self) -> bool {
        self.d_hashed.load(Ordering::Acquire)
    }

    /// Hashed children in name order
    pub fn subdirs(&self) -> Vec<Arc<Dentry>> {
        self.d_subdirs.lock().values().cloned().collect()
    }

    pub fn has_children(&self) -> bool {
        !self.d_subdirs.lock().is_empty()
    }
}

impl Drop for Dentry {
    fn drop(&mut self) {
        if let Some(inode) = self.d_inode.get_mut().take() {
            iput(inode);
        }
    }
}

impl fmt::Debug for Dentry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dentry")
            .field("name", &*self.d_name.read())
            .field("inode", &self.d_inode.read().as_ref().map(|i| i.ino()))
            .field("hashed", &self.is_hashed())
            .finish()
    }
}

/// Allocate an unhashed negative dentry for `name` under `parent`
pub fn d_alloc(parent: &Arc<Dentry>, name: &str) -> FsResult<Arc<Dentry>> {
    let sb = parent.sb()?;
    if sb.faults().should_fail(FaultPoint::Dentry) {
        return Err(FsError::OutOfMemory);
    }
    Ok(Arc::new(Dentry::new(
        name.to_string(),
        Arc::downgrade(parent),
        Arc::downgrade(&sb),
    )))
}

/// Allocate the root dentry of a mount, bound to `inode`
///
/// On success the dentry owns the caller's inode reference. On failure the
/// reference stays with the caller.
pub fn d_alloc_root(inode: &InodeRef) -> FsResult<Arc<Dentry>> {
    let sb = inode.sb()?;
    if sb.faults().should_fail(FaultPoint::Dentry) {
        log::debug!("[VFS] Root dentry allocation failed for {}", sb.fs_type_name());
        return Err(FsError::OutOfMemory);
    }
    let root = Arc::new(Dentry::new(
        "/".to_string(),
        Weak::new(),
        Arc::downgrade(&sb),
    ));
    *root.d_inode.write() = Some(inode.clone());
    root.d_hashed.store(true, Ordering::Release);
    Ok(root)
}

/// Bind a negative dentry to `inode`
///
/// The dentry takes over the caller's inode reference. A dentry that is
/// already positive is left untouched and the reference stays with the
/// caller.
pub fn d_instantiate(dentry: &Arc<Dentry>, inode: &InodeRef) -> FsResult<()> {
    let mut slot = dentry.d_inode.write();
    if slot.is_some() {
        return Err(FsError::AlreadyExists);
    }
    *slot = Some(inode.clone());
    Ok(())
}

/// Turn `dentry` negative again, handing its inode reference back
pub fn d_clear(dentry: &Dentry) -> Option<InodeRef> {
    dentry.d_inode.write().take()
}

/// Pin `dentry` into its parent's child map
pub fn dget(dentry: &Arc<Dentry>) -> FsResult<()> {
    let Some(parent) = dentry.parent() else {
        // The root is pinned by its superblock
        return Ok(());
    };
    let name = dentry.name();
    let mut subdirs = parent.d_subdirs.lock();
    match subdirs.get(&name) {
        Some(existing) if Arc::ptr_eq(existing, dentry) => {}
        Some(_) => return Err(FsError::AlreadyExists),
        None => {
            subdirs.insert(name, dentry.clone());
        }
    }
    dentry.d_hashed.store(true, Ordering::Release);
    Ok(())
}

/// Unpin `dentry` from its parent's child map
///
/// The dentry and its inode reference live on until the last handle to the
/// dentry is dropped.
pub fn dput(dentry: &Arc<Dentry>) {
    if let Some(parent) = dentry.parent() {
        let name = dentry.name();
        let mut subdirs = parent.d_subdirs.lock();
        if subdirs.get(&name).is_some_and(|d| Arc::ptr_eq(d, dentry)) {
            subdirs.remove(&name);
        }
    }
    dentry.d_hashed.store(false, Ordering::Release);
}

/// Find the hashed child `name` of `parent`
pub fn d_lookup(parent: &Dentry, name: &str) -> Option<Arc<Dentry>> {
    parent.d_subdirs.lock().get(name).cloned()
}

/// Move `dentry` to `new_name` under `new_parent`
///
/// Any dentry hashed at the destination must have been unpinned first.
pub fn d_move(dentry: &Arc<Dentry>, new_parent: &Arc<Dentry>, new_name: &str) -> FsResult<()> {
    if d_lookup(new_parent, new_name).is_some_and(|d| !Arc::ptr_eq(&d, dentry)) {
        return Err(FsError::AlreadyExists);
    }
    dput(dentry);
    *dentry.d_name.write() = new_name.to_string();
    *dentry.d_parent.write() = Arc::downgrade(new_parent);
    dget(dentry)
}

/// Visit the inode of every positive dentry below and including `root`
pub fn for_each_inode(root: &Arc<Dentry>, f: &mut dyn FnMut(&InodeRef)) {
    if let Some(inode) = root.inode() {
        f(&inode);
    }
    for child in root.subdirs() {
        for_each_inode(&child, f);
    }
}

/// Dismantle the tree below `root` at unmount
///
/// Every dentry is unhashed and turned negative, dropping the inode
/// references the tree held. Handles to dentries kept elsewhere stay valid
/// but no longer reach an inode.
pub fn shrink_dcache_for_umount(root: Arc<Dentry>) {
    let children = mem::take(&mut *root.d_subdirs.lock());
    for (_, child) in children {
        child.d_hashed.store(false, Ordering::Release);
        shrink_dcache_for_umount(child);
    }
    let inode = root.d_inode.write().take();
    if let Some(inode) = inode {
        iput(inode);
    }
}
