//! CFS Module Lifecycle Tests
//!
//! Load and unload of the filesystem module against the global registry,
//! block device manager and mount table. The module is process-wide state,
//! so the whole lifecycle runs as one ordered test.

use std::sync::Arc;

use cfs::config::{CFS_FS_NAME, CFS_INODE_POOL_NAME};
use cfs::fs::block_dev::{block_device_manager, RamDisk};
use cfs::fs::cfs::{cfs_fs_type, cfs_inode_pool, exit_cfs, init_cfs, CfsError, PoolError};
use cfs::fs::vfs::namei::{vfs_create, vfs_statfs};
use cfs::fs::vfs::registry::list_filesystems;
use cfs::fs::vfs::{lookup_filesystem, mount_table, FileMode, FsError, FsType, MountOpts};

/// Load, mount by name, refuse a busy unload, recover and reload
#[test]
fn test_module_lifecycle() {
    // Unloading a module that was never loaded is a no-op
    assert_eq!(exit_cfs(), Ok(()));
    assert!(cfs_inode_pool().is_none());

    // Load
    init_cfs().unwrap();
    let pool = cfs_inode_pool().unwrap();
    assert_eq!(pool.name(), CFS_INODE_POOL_NAME);
    assert_eq!(pool.outstanding(), 0);
    assert!(lookup_filesystem(CFS_FS_NAME).is_some());
    assert!(list_filesystems().iter().any(|fs| fs.name() == CFS_FS_NAME));
    assert_eq!(init_cfs(), Err(CfsError::Host(FsError::AlreadyExists)));

    // Mount through the registry and device manager
    assert!(block_device_manager().register_device(Arc::new(RamDisk::new("cfs0", 256))));
    assert_eq!(
        mount_table()
            .mount_by_name(CFS_FS_NAME, Some("missing"), "/srv", MountOpts::default())
            .err(),
        Some(FsError::NotFound)
    );
    assert_eq!(
        mount_table()
            .mount_by_name("nosuchfs", Some("cfs0"), "/srv", MountOpts::default())
            .err(),
        Some(FsError::NoDevice)
    );
    mount_table()
        .mount_by_name(CFS_FS_NAME, Some("cfs0"), "/srv", MountOpts::default())
        .unwrap();
    let root = mount_table().get_mount("/srv").unwrap().root().unwrap();
    vfs_create(&root, "file", FileMode::new(FileMode::S_IFREG | 0o644)).unwrap();
    assert_eq!(pool.outstanding(), 2);
    assert_eq!(cfs_fs_type().unwrap().active_mounts(), 1);
    drop(pool);

    // Unload with a live mount: the type goes away, the pool refuses
    assert_eq!(exit_cfs(), Err(CfsError::Pool(PoolError::Busy)));
    assert!(lookup_filesystem(CFS_FS_NAME).is_none());
    assert!(cfs_inode_pool().is_none());
    assert!(vfs_statfs(&root).is_ok());

    // The mount keeps working until it is detached
    mount_table().umount("/srv").unwrap();
    assert_eq!(vfs_statfs(&root), Err(FsError::StaleHandle));
    drop(root);

    // Everything was released, so the module loads cleanly again
    init_cfs().unwrap();
    assert_eq!(cfs_inode_pool().unwrap().outstanding(), 0);
    mount_table()
        .mount_by_name(CFS_FS_NAME, Some("cfs0"), "/srv", MountOpts::default())
        .unwrap();
    mount_table().umount("/srv").unwrap();
    assert_eq!(exit_cfs(), Ok(()));
    assert!(lookup_filesystem(CFS_FS_NAME).is_none());
    assert_eq!(exit_cfs(), Ok(()));

    block_device_manager().unregister_device("cfs0");
}
