//! Shared fixtures for the CFS integration tests

#![allow(dead_code)]

use std::sync::Arc;

use cfs::config::CFS_INODE_POOL_LIMIT;
use cfs::fs::block_dev::{BlockDevice, RamDisk};
use cfs::fs::cfs::{CfsFsType, CfsInodePool};
use cfs::fs::vfs::dentry::{self, Dentry};
use cfs::fs::vfs::{FsType, InodeRef, MountOpts, SuperBlock};

/// One mounted CFS instance with its own inode pool
pub struct Fixture {
    pub fs: Arc<CfsFsType>,
    pub sb: Arc<SuperBlock>,
    pub root: Arc<Dentry>,
}

impl Fixture {
    pub fn outstanding(&self) -> usize {
        self.fs.pool().outstanding()
    }

    pub fn unmount(self) -> Arc<CfsFsType> {
        self.fs.kill_sb(&self.sb).expect("unmount");
        self.fs
    }
}

pub fn ramdisk() -> Option<Arc<dyn BlockDevice>> {
    Some(Arc::new(RamDisk::new("ram0", 128)))
}

/// Filesystem type with a private pool named `pool_name`
pub fn cfs_type(pool_name: &'static str) -> Arc<CfsFsType> {
    let pool = CfsInodePool::create(pool_name, CFS_INODE_POOL_LIMIT).expect("pool");
    Arc::new(CfsFsType::new(pool))
}

pub fn mount(pool_name: &'static str) -> Fixture {
    let fs = cfs_type(pool_name);
    let sb = fs.mount(ramdisk(), MountOpts::default()).expect("mount");
    let root = sb.root().expect("root dentry");
    Fixture { fs, sb, root }
}

/// Distinct inodes reachable from `root` through the dentry tree
pub fn reachable_nodes(root: &Arc<Dentry>) -> usize {
    let mut seen: Vec<InodeRef> = Vec::new();
    dentry::for_each_inode(root, &mut |inode| {
        if !seen.iter().any(|s| s.ptr_eq(inode)) {
            seen.push(inode.clone());
        }
    });
    seen.len()
}
