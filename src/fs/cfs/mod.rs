//! CFS - Compressed Filesystem
//!
//! Block-device filesystem whose nodes live in a process-wide inode pool.
//! [`init_cfs`] creates the pool and registers the filesystem type;
//! [`exit_cfs`] undoes both. Every mount in between allocates its nodes from
//! that one pool.

pub mod aops;
pub mod error;
pub mod file;
pub mod inode;
pub mod namei;
pub mod pool;
pub mod super_impl;

pub use error::{CfsError, FillStage};
pub use inode::{cfs_make_inode, CfsInode, CfsInodePool};
pub use pool::{ObjectPool, PoolError, PoolObject, SlotId};
pub use super_impl::{CfsFsType, CfsSbInfo};

use alloc::sync::Arc;
use spin::RwLock;

use crate::config::{CFS_FS_NAME, CFS_INODE_POOL_LIMIT, CFS_INODE_POOL_NAME};
use crate::fs::vfs::inode::FsError;
use crate::fs::vfs::registry::{register_filesystem, unregister_filesystem};

/// State owned by the loaded module
struct CfsModule {
    pool: Arc<CfsInodePool>,
    fs_type: Arc<CfsFsType>,
}

static CFS_MODULE: RwLock<Option<CfsModule>> = RwLock::new(None);

/// Module load: create the inode pool, then register the filesystem type
pub fn init_cfs() -> Result<(), CfsError> {
    let mut module = CFS_MODULE.write();
    if module.is_some() {
        return Err(CfsError::Host(FsError::AlreadyExists));
    }

    let pool = CfsInodePool::create(CFS_INODE_POOL_NAME, CFS_INODE_POOL_LIMIT)?;
    let fs_type = Arc::new(CfsFsType::new(pool.clone()));

    if let Err(e) = register_filesystem(fs_type.clone()) {
        drop(fs_type);
        if let Err(pe) = ObjectPool::destroy(Some(pool)) {
            log::error!("[CFS] Could not destroy inode pool: {}", pe);
        }
        return Err(CfsError::Host(e));
    }

    *module = Some(CfsModule { pool, fs_type });
    log::info!("[CFS] Module loaded");
    Ok(())
}

/// Module unload: unregister the filesystem type, then destroy the pool
///
/// Unloading with instances still mounted is logged; the pool then refuses
/// destruction while their nodes are outstanding.
pub fn exit_cfs() -> Result<(), CfsError> {
    let Some(module) = CFS_MODULE.write().take() else {
        return Ok(());
    };

    if let Err(e) = unregister_filesystem(CFS_FS_NAME) {
        log::warn!("[CFS] Filesystem type was not registered: {}", e);
    }

    let active = module.fs_type.active_mounts();
    if active > 0 {
        log::warn!("[CFS] Unloading with {} instances still mounted", active);
    }
    drop(module.fs_type);

    ObjectPool::destroy(Some(module.pool))?;
    log::info!("[CFS] Module unloaded");
    Ok(())
}

/// The module-wide inode pool, if the module is loaded
pub fn cfs_inode_pool() -> Option<Arc<CfsInodePool>> {
    CFS_MODULE.read().as_ref().map(|m| m.pool.clone())
}

/// The registered filesystem type, if the module is loaded
pub fn cfs_fs_type() -> Option<Arc<CfsFsType>> {
    CFS_MODULE.read().as_ref().map(|m| m.fs_type.clone())
}
