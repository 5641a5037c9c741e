//! Virtual File System (VFS) Layer
//!
//! This module provides the generic layer a filesystem driver plugs into:
//! trait-based superblock and dispatch-table abstractions, the dentry tree,
//! the page cache, shared namespace helpers, and the registry and mount table
//! through which instances are attached.

pub mod dentry;
pub mod fault;
pub mod filemap;
pub mod inode;
pub mod libfs;
pub mod mount;
pub mod namei;
pub mod path;
pub mod registry;
pub mod superblock;
pub mod time;

// Re-export commonly used items
pub use dentry::Dentry;
pub use fault::{FaultInjector, FaultPoint};
pub use inode::{DevId, FileMode, FileType, FsError, FsInode, FsResult, Inode, InodeRef};
pub use mount::{mount_table, MountTable};
pub use registry::{lookup_filesystem, register_filesystem, unregister_filesystem};
pub use superblock::{
    FsType, MountFlags, MountOpts, StatFs, SuperBlock, SuperOperations, SuperState,
};
