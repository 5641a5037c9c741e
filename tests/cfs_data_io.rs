//! CFS Data I/O Tests
//!
//! Regular file data through the page cache and the CFS page hooks:
//! - reads return what was written, across page boundaries
//! - holes read back as zeros
//! - fsync and filesystem sync leave no dirty pages
//! - page allocation failure and read-only mounts
//! - offsets at the end of the file range
//! - a large write flushes what exceeds the per-file dirty limit

mod common;

use cfs::config::{DIRTY_PAGES_PER_INODE, PAGE_SIZE};
use cfs::fs::vfs::namei::{vfs_create, vfs_fsync, vfs_mkdir, vfs_read, vfs_write};
use cfs::fs::vfs::superblock::sync_filesystem;
use cfs::fs::vfs::{FaultPoint, FileMode, FsError, FsType, MountFlags, MountOpts};

use common::{cfs_type, mount, ramdisk};

fn reg() -> FileMode {
    FileMode::new(FileMode::S_IFREG | 0o644)
}

/// Data written to a file reads back unchanged
#[test]
fn test_write_then_read() {
    let fx = mount("io_basic");
    let f = vfs_create(&fx.root, "f", reg()).unwrap();

    assert_eq!(vfs_write(&f, 0, b"hello, cfs").unwrap(), 10);
    let inode = f.inode().unwrap();
    assert_eq!(inode.size(), 10);
    assert_eq!(inode.mapping().nrpages(), 1);

    let mut buf = [0u8; 32];
    let n = vfs_read(&f, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello, cfs");

    let n = vfs_read(&f, 7, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"cfs");
    assert_eq!(vfs_read(&f, 10, &mut buf).unwrap(), 0);
    assert_eq!(vfs_read(&f, 1000, &mut buf).unwrap(), 0);

    drop((f, inode));
    fx.unmount();
}

/// Writes spanning pages land in every page they touch
#[test]
fn test_cross_page_write() {
    let fx = mount("io_cross_page");
    let f = vfs_create(&fx.root, "f", reg()).unwrap();

    let data: Vec<u8> = (0..PAGE_SIZE + 300).map(|i| (i % 251) as u8).collect();
    let off = PAGE_SIZE as u64 - 100;
    vfs_write(&f, off, &data).unwrap();

    let inode = f.inode().unwrap();
    assert_eq!(inode.size(), off + data.len() as u64);
    assert_eq!(inode.mapping().nrpages(), 3);

    let mut back = vec![0u8; data.len()];
    assert_eq!(vfs_read(&f, off, &mut back).unwrap(), data.len());
    assert_eq!(back, data);

    drop((f, inode));
    fx.unmount();
}

/// A partial overwrite keeps the untouched bytes of the page
#[test]
fn test_partial_overwrite() {
    let fx = mount("io_overwrite");
    let f = vfs_create(&fx.root, "f", reg()).unwrap();
    vfs_write(&f, 0, b"aaaaaaaaaa").unwrap();
    vfs_write(&f, 3, b"XYZ").unwrap();

    let mut buf = [0u8; 10];
    vfs_read(&f, 0, &mut buf).unwrap();
    assert_eq!(&buf, b"aaaXYZaaaa");
    assert_eq!(f.inode().unwrap().size(), 10);
    drop(f);
    fx.unmount();
}

/// Bytes never written read back as zeros
#[test]
fn test_sparse_region_reads_zero() {
    let fx = mount("io_sparse");
    let f = vfs_create(&fx.root, "f", reg()).unwrap();
    let far = 3 * PAGE_SIZE as u64 + 17;
    vfs_write(&f, far, b"end").unwrap();
    assert_eq!(f.inode().unwrap().size(), far + 3);

    let mut buf = vec![0xffu8; PAGE_SIZE];
    assert_eq!(vfs_read(&f, PAGE_SIZE as u64, &mut buf).unwrap(), PAGE_SIZE);
    assert!(buf.iter().all(|&b| b == 0));

    let mut tail = [0u8; 3];
    vfs_read(&f, far, &mut tail).unwrap();
    assert_eq!(&tail, b"end");
    drop(f);
    fx.unmount();
}

/// fsync pushes every dirty page through the write hook
#[test]
fn test_fsync_cleans_pages() {
    let fx = mount("io_fsync");
    let f = vfs_create(&fx.root, "f", reg()).unwrap();
    vfs_write(&f, 0, &vec![7u8; 2 * PAGE_SIZE + 1]).unwrap();

    let inode = f.inode().unwrap();
    assert_eq!(inode.mapping().nr_dirty(), 3);
    vfs_fsync(&f).unwrap();
    assert_eq!(inode.mapping().nr_dirty(), 0);
    assert_eq!(inode.mapping().nrpages(), 3);
    assert_eq!(
        inode.mapping().with_page(2, |p| (p.is_dirty(), p.is_uptodate())),
        Some((false, true))
    );

    // Cached data survives writeback
    let mut buf = [0u8; 4];
    vfs_read(&f, 2 * PAGE_SIZE as u64 - 2, &mut buf).unwrap();
    assert_eq!(&buf, &[7, 7, 7, 0]);
    drop((f, inode));
    fx.unmount();
}

/// Filesystem sync writes back every file of the instance
#[test]
fn test_sync_filesystem() {
    let fx = mount("io_syncfs");
    let d = vfs_mkdir(&fx.root, "d", FileMode::new(0o755)).unwrap();
    let a = vfs_create(&fx.root, "a", reg()).unwrap();
    let b = vfs_create(&d, "b", reg()).unwrap();
    vfs_write(&a, 0, b"one").unwrap();
    vfs_write(&b, 0, b"two").unwrap();
    assert!(fx.sb.is_dirty());
    assert_eq!(a.inode().unwrap().mapping().nr_dirty(), 1);

    sync_filesystem(&fx.sb).unwrap();
    assert_eq!(a.inode().unwrap().mapping().nr_dirty(), 0);
    assert_eq!(b.inode().unwrap().mapping().nr_dirty(), 0);
    assert!(!fx.sb.is_dirty());
    drop((d, a, b));
    fx.unmount();
}

/// A write whose end does not fit a file offset is refused untouched
#[test]
fn test_write_past_offset_range() {
    let fx = mount("io_offset_range");
    let f = vfs_create(&fx.root, "f", reg()).unwrap();
    let inode = f.inode().unwrap();

    assert_eq!(vfs_write(&f, u64::MAX - 1, b"abcd"), Err(FsError::InvalidArgument));
    assert_eq!(inode.size(), 0);
    assert_eq!(inode.mapping().nrpages(), 0);

    // A write ending exactly at the limit fits
    assert_eq!(vfs_write(&f, u64::MAX - 4, b"abcd").unwrap(), 4);
    assert_eq!(inode.size(), u64::MAX);
    let mut buf = [0u8; 16];
    assert_eq!(vfs_read(&f, u64::MAX - 2, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"cd");
    assert_eq!(vfs_read(&f, u64::MAX, &mut buf).unwrap(), 0);
    drop((f, inode));
    fx.unmount();
}

/// Dirty pages beyond the per-file limit are written back by the writer
#[test]
fn test_large_write_is_throttled() {
    let fx = mount("io_throttle");
    let f = vfs_create(&fx.root, "f", reg()).unwrap();
    let inode = f.inode().unwrap();

    let small = vec![3u8; DIRTY_PAGES_PER_INODE * PAGE_SIZE];
    vfs_write(&f, 0, &small).unwrap();
    assert_eq!(inode.mapping().nr_dirty(), DIRTY_PAGES_PER_INODE);

    let big = vec![5u8; 100 * PAGE_SIZE];
    vfs_write(&f, small.len() as u64, &big).unwrap();
    assert_eq!(inode.mapping().nrpages(), DIRTY_PAGES_PER_INODE + 100);
    assert_eq!(inode.mapping().nr_dirty(), DIRTY_PAGES_PER_INODE);

    let mut back = [0u8; 2];
    vfs_read(&f, small.len() as u64 - 1, &mut back).unwrap();
    assert_eq!(back, [3, 5]);
    vfs_fsync(&f).unwrap();
    assert_eq!(inode.mapping().nr_dirty(), 0);
    drop((f, inode));
    fx.unmount();
}

/// A failed page allocation leaves the file as it was
#[test]
fn test_write_page_allocation_failure() {
    let fx = mount("io_alloc_fail");
    let f = vfs_create(&fx.root, "f", reg()).unwrap();

    fx.sb.faults().fail_next(FaultPoint::Page);
    assert_eq!(vfs_write(&f, 0, b"data"), Err(FsError::OutOfMemory));
    let inode = f.inode().unwrap();
    assert_eq!(inode.size(), 0);
    assert_eq!(inode.mapping().nrpages(), 0);

    assert_eq!(vfs_write(&f, 0, b"data").unwrap(), 4);
    drop((f, inode));
    fx.unmount();
}

/// Directories carry no file data
#[test]
fn test_directory_data_refused() {
    let fx = mount("io_dir");
    let d = vfs_mkdir(&fx.root, "d", FileMode::new(0o755)).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(vfs_read(&d, 0, &mut buf), Err(FsError::IsDirectory));
    assert_eq!(vfs_write(&d, 0, b"x"), Err(FsError::IsDirectory));
    drop(d);
    fx.unmount();
}

/// A read-only instance refuses writes but still serves reads
#[test]
fn test_read_only_mount() {
    let fs = cfs_type("io_rdonly");
    let opts = MountOpts {
        flags: MountFlags::MS_RDONLY,
        ..MountOpts::default()
    };
    let sb = fs.mount(ramdisk(), opts).unwrap();
    let root = sb.root().unwrap();
    let f = vfs_create(&root, "f", reg()).unwrap();

    assert_eq!(vfs_write(&f, 0, b"x"), Err(FsError::PermissionDenied));
    let mut buf = [0u8; 1];
    assert_eq!(vfs_read(&f, 0, &mut buf).unwrap(), 0);
    drop((root, f));
    fs.kill_sb(&sb).unwrap();
    assert_eq!(fs.pool().outstanding(), 0);
}

/// File data is dropped with the node when its last name goes
#[test]
fn test_unlink_drops_pages() {
    use cfs::fs::vfs::namei::vfs_unlink;

    let fx = mount("io_unlink");
    let f = vfs_create(&fx.root, "f", reg()).unwrap();
    vfs_write(&f, 0, &vec![1u8; 3 * PAGE_SIZE]).unwrap();
    drop(f);
    vfs_unlink(&fx.root, "f").unwrap();
    assert_eq!(fx.outstanding(), 1);

    // A recycled node starts fresh
    let g = vfs_create(&fx.root, "g", reg()).unwrap();
    let inode = g.inode().unwrap();
    assert_eq!(inode.size(), 0);
    assert_eq!(inode.mapping().nrpages(), 0);
    drop((g, inode));
    fx.unmount();
}
