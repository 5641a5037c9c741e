//! Namespace Entry Points
//!
//! Callers of the VFS use these instead of the dispatch tables directly.
//! Each entry point validates the name, checks that the instance is still
//! mounted, takes the parent directory lock, resolves the target dentry and
//! only then calls into the filesystem.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::dentry::{d_alloc, d_lookup, d_move, Dentry};
use super::inode::{DevId, DirCookie, DirEnt, FileMode, FsError, FsResult, InodeRef};
use super::superblock::{StatFs, SuperBlock};
use crate::config::NAME_MAX;

/// Validate a single path component
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::InvalidArgument);
    }
    if name.len() > NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    if name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidArgument);
    }
    Ok(())
}

fn active_sb(dentry: &Dentry) -> FsResult<Arc<SuperBlock>> {
    let sb = dentry.sb()?;
    if !sb.is_active() {
        return Err(FsError::StaleHandle);
    }
    Ok(sb)
}

/// Directory inode behind `dir`
fn dir_inode(dir: &Dentry) -> FsResult<InodeRef> {
    let inode = dir.inode().ok_or(FsError::StaleHandle)?;
    if !inode.mode().is_dir() {
        return Err(FsError::NotDirectory);
    }
    Ok(inode)
}

/// Directory inode behind `dir`, `NotFound` once the directory was removed
fn live_dir_inode(dir: &Dentry) -> FsResult<InodeRef> {
    let inode = dir_inode(dir)?;
    if !dir.is_hashed() || inode.nlink() == 0 {
        return Err(FsError::NotFound);
    }
    Ok(inode)
}

/// Checks shared by every entry point creating or removing `name` in `dir`
fn enter_dir(dir: &Arc<Dentry>, name: &str) -> FsResult<InodeRef> {
    validate_name(name)?;
    active_sb(dir)?;
    live_dir_inode(dir)
}

/// Resolve `name` with the directory lock held
fn lookup_locked(
    dir: &Arc<Dentry>,
    dir_inode: &InodeRef,
    name: &str,
) -> FsResult<Arc<Dentry>> {
    if let Some(dentry) = d_lookup(dir, name) {
        return Ok(dentry);
    }
    let dentry = d_alloc(dir, name)?;
    match dir_inode.i_op()?.lookup(dir_inode, &dentry)? {
        Some(alias) => Ok(alias),
        None => Ok(dentry),
    }
}

/// Resolve `name` to a fresh negative dentry, `AlreadyExists` if it is taken
fn negative_child(
    dir: &Arc<Dentry>,
    dir_inode: &InodeRef,
    name: &str,
) -> FsResult<Arc<Dentry>> {
    let dentry = lookup_locked(dir, dir_inode, name)?;
    if !dentry.is_negative() {
        return Err(FsError::AlreadyExists);
    }
    Ok(dentry)
}

/// Resolve an existing `name`, `NotFound` if it is negative
fn positive_child(
    dir: &Arc<Dentry>,
    dir_inode: &InodeRef,
    name: &str,
) -> FsResult<Arc<Dentry>> {
    let dentry = lookup_locked(dir, dir_inode, name)?;
    if dentry.is_negative() {
        return Err(FsError::NotFound);
    }
    Ok(dentry)
}

/// Look up `name` in `dir`; the result may be negative
pub fn lookup(dir: &Arc<Dentry>, name: &str) -> FsResult<Arc<Dentry>> {
    validate_name(name)?;
    active_sb(dir)?;
    let inode = dir_inode(dir)?;
    let _guard = inode.lock_dir();
    lookup_locked(dir, &inode, name)
}

pub fn vfs_create(dir: &Arc<Dentry>, name: &str, mode: FileMode) -> FsResult<Arc<Dentry>> {
    let dir_inode = enter_dir(dir, name)?;
    let _guard = dir_inode.lock_dir();
    let dentry = negative_child(dir, &dir_inode, name)?;
    dir_inode.i_op()?.create(&dir_inode, &dentry, mode)?;
    Ok(dentry)
}

pub fn vfs_mkdir(dir: &Arc<Dentry>, name: &str, mode: FileMode) -> FsResult<Arc<Dentry>> {
    let dir_inode = enter_dir(dir, name)?;
    let _guard = dir_inode.lock_dir();
    let dentry = negative_child(dir, &dir_inode, name)?;
    dir_inode.i_op()?.mkdir(&dir_inode, &dentry, mode)?;
    Ok(dentry)
}

/// Create a node of the type in `mode`; the filesystem decides which types it
/// accepts
pub fn vfs_mknod(
    dir: &Arc<Dentry>,
    name: &str,
    mode: FileMode,
    dev: DevId,
) -> FsResult<Arc<Dentry>> {
    let dir_inode = enter_dir(dir, name)?;
    let _guard = dir_inode.lock_dir();
    let dentry = negative_child(dir, &dir_inode, name)?;
    dir_inode.i_op()?.mknod(&dir_inode, &dentry, mode, dev)?;
    Ok(dentry)
}

pub fn vfs_symlink(dir: &Arc<Dentry>, name: &str, target: &str) -> FsResult<Arc<Dentry>> {
    if target.is_empty() || target.contains('\0') {
        return Err(FsError::InvalidArgument);
    }
    let dir_inode = enter_dir(dir, name)?;
    let _guard = dir_inode.lock_dir();
    let dentry = negative_child(dir, &dir_inode, name)?;
    dir_inode.i_op()?.symlink(&dir_inode, &dentry, target)?;
    Ok(dentry)
}

/// Hard link `old` as `name` in `dir`
pub fn vfs_link(old: &Arc<Dentry>, dir: &Arc<Dentry>, name: &str) -> FsResult<Arc<Dentry>> {
    let dir_inode = enter_dir(dir, name)?;
    if !Arc::ptr_eq(&old.sb()?, &dir.sb()?) {
        return Err(FsError::CrossDevice);
    }
    let _guard = dir_inode.lock_dir();
    let dentry = negative_child(dir, &dir_inode, name)?;
    dir_inode.i_op()?.link(old, &dir_inode, &dentry)?;
    Ok(dentry)
}

pub fn vfs_unlink(dir: &Arc<Dentry>, name: &str) -> FsResult<()> {
    let dir_inode = enter_dir(dir, name)?;
    let _guard = dir_inode.lock_dir();
    let dentry = positive_child(dir, &dir_inode, name)?;
    if dentry.inode().is_some_and(|i| i.mode().is_dir()) {
        return Err(FsError::IsDirectory);
    }
    dir_inode.i_op()?.unlink(&dir_inode, &dentry)
}

pub fn vfs_rmdir(dir: &Arc<Dentry>, name: &str) -> FsResult<()> {
    let dir_inode = enter_dir(dir, name)?;
    let _guard = dir_inode.lock_dir();
    let dentry = positive_child(dir, &dir_inode, name)?;
    if !dentry.inode().is_some_and(|i| i.mode().is_dir()) {
        return Err(FsError::NotDirectory);
    }
    dir_inode.i_op()?.rmdir(&dir_inode, &dentry)
}

/// `ancestor` is `dentry` or one of its parents
fn is_ancestor(ancestor: &Arc<Dentry>, dentry: &Arc<Dentry>) -> bool {
    let mut cur = Some(dentry.clone());
    while let Some(d) = cur {
        if Arc::ptr_eq(&d, ancestor) {
            return true;
        }
        cur = d.parent();
    }
    false
}

/// Rename `old_name` in `old_dir` to `new_name` in `new_dir`
///
/// Takes the superblock rename mutex, then both directory locks in inode
/// number order.
pub fn vfs_rename(
    old_dir: &Arc<Dentry>,
    old_name: &str,
    new_dir: &Arc<Dentry>,
    new_name: &str,
) -> FsResult<()> {
    validate_name(old_name)?;
    validate_name(new_name)?;
    let sb = active_sb(old_dir)?;
    if !Arc::ptr_eq(&sb, &new_dir.sb()?) {
        return Err(FsError::CrossDevice);
    }
    let old_dir_inode = dir_inode(old_dir)?;
    let new_dir_inode = live_dir_inode(new_dir)?;

    let _rename = sb.lock_rename();
    let (_first, _second) = if old_dir_inode.ptr_eq(&new_dir_inode) {
        (old_dir_inode.lock_dir(), None)
    } else if old_dir_inode.ino() < new_dir_inode.ino() {
        (old_dir_inode.lock_dir(), Some(new_dir_inode.lock_dir()))
    } else {
        let second = new_dir_inode.lock_dir();
        (old_dir_inode.lock_dir(), Some(second))
    };

    let old_dentry = positive_child(old_dir, &old_dir_inode, old_name)?;
    let new_dentry = lookup_locked(new_dir, &new_dir_inode, new_name)?;
    if Arc::ptr_eq(&old_dentry, &new_dentry) {
        return Ok(());
    }
    // Two names of one node
    if let (Some(old), Some(new)) = (old_dentry.inode(), new_dentry.inode()) {
        if old.ptr_eq(&new) {
            return Ok(());
        }
    }

    let old_is_dir = old_dentry.inode().is_some_and(|i| i.mode().is_dir());
    if let Some(target) = new_dentry.inode() {
        match (old_is_dir, target.mode().is_dir()) {
            (true, false) => return Err(FsError::NotDirectory),
            (false, true) => return Err(FsError::IsDirectory),
            _ => {}
        }
    }
    if old_is_dir && is_ancestor(&old_dentry, new_dir) {
        return Err(FsError::InvalidArgument);
    }

    old_dir_inode
        .i_op()?
        .rename(&old_dir_inode, &old_dentry, &new_dir_inode, &new_dentry)?;
    d_move(&old_dentry, new_dir, new_name)
}

/// Target of the symlink `dentry`
pub fn vfs_readlink(dentry: &Arc<Dentry>) -> FsResult<String> {
    active_sb(dentry)?;
    let inode = dentry.inode().ok_or(FsError::NotFound)?;
    if !inode.mode().is_symlink() {
        return Err(FsError::InvalidArgument);
    }
    inode.i_op()?.readlink(dentry)
}

/// Enumerate the directory `dentry` from `cookie` onwards
pub fn vfs_readdir(
    dentry: &Arc<Dentry>,
    cookie: &mut DirCookie,
    sink: &mut dyn FnMut(DirEnt) -> bool,
) -> FsResult<()> {
    active_sb(dentry)?;
    let inode = dir_inode(dentry)?;
    let _guard = inode.lock_dir();
    inode.i_fop()?.readdir(dentry, cookie, sink)
}

/// Every entry of the directory `dentry`, "." and ".." included
pub fn read_dir_all(dentry: &Arc<Dentry>) -> FsResult<Vec<DirEnt>> {
    let mut entries = Vec::new();
    let mut cookie = DirCookie::default();
    vfs_readdir(dentry, &mut cookie, &mut |ent| {
        entries.push(ent);
        true
    })?;
    Ok(entries)
}

pub fn vfs_read(dentry: &Arc<Dentry>, off: u64, dst: &mut [u8]) -> FsResult<usize> {
    active_sb(dentry)?;
    let inode = dentry.inode().ok_or(FsError::NotFound)?;
    if inode.mode().is_dir() {
        return Err(FsError::IsDirectory);
    }
    inode.i_fop()?.read(&inode, off, dst)
}

pub fn vfs_write(dentry: &Arc<Dentry>, off: u64, src: &[u8]) -> FsResult<usize> {
    let sb = active_sb(dentry)?;
    if sb.flags().contains(super::superblock::MountFlags::MS_RDONLY) {
        return Err(FsError::PermissionDenied);
    }
    let inode = dentry.inode().ok_or(FsError::NotFound)?;
    if inode.mode().is_dir() {
        return Err(FsError::IsDirectory);
    }
    inode.i_fop()?.write(&inode, off, src)
}

pub fn vfs_fsync(dentry: &Arc<Dentry>) -> FsResult<()> {
    active_sb(dentry)?;
    let inode = dentry.inode().ok_or(FsError::NotFound)?;
    inode.i_fop()?.fsync(&inode)
}

/// Statistics of the instance `dentry` belongs to
pub fn vfs_statfs(dentry: &Dentry) -> FsResult<StatFs> {
    dentry.sb()?.statfs()
}
