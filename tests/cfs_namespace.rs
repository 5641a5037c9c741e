//! CFS Namespace Tests
//!
//! Tests directory-modifying operations through the VFS entry points:
//! - create, mkdir, mknod and symlink with their type rules
//! - lookup, link, unlink, rmdir and rename accounting
//! - directory enumeration and path resolution
//! - failed operations leave the directory and the pool unchanged
//! - a removed directory refuses new entries

mod common;

use cfs::config::{CFS_SUPER_MAGIC, NAME_MAX};
use cfs::fs::vfs::namei::{
    lookup, read_dir_all, vfs_create, vfs_link, vfs_mkdir, vfs_mknod, vfs_readlink, vfs_rename,
    vfs_rmdir, vfs_statfs, vfs_symlink, vfs_unlink,
};
use cfs::fs::vfs::path::{resolve_path, resolve_path_nofollow, PathResolver};
use cfs::fs::vfs::{DevId, FaultPoint, FileMode, FileType, FsError};

use common::{mount, reachable_nodes};

fn reg(perms: u16) -> FileMode {
    FileMode::new(FileMode::S_IFREG | perms)
}

/// A created file is found again by lookup
#[test]
fn test_create_then_lookup() {
    let fx = mount("ns_create");
    let created = vfs_create(&fx.root, "hello", FileMode::new(0o644)).unwrap();
    let found = lookup(&fx.root, "hello").unwrap();
    assert!(std::sync::Arc::ptr_eq(&created, &found));

    let inode = found.inode().unwrap();
    assert_eq!(inode.mode().file_type(), Some(FileType::Regular));
    assert_eq!(inode.mode().permissions(), 0o644);
    assert_eq!(inode.nlink(), 1);
    assert_eq!(inode.size(), 0);

    assert!(lookup(&fx.root, "missing").unwrap().is_negative());
    drop((created, found, inode));
    fx.unmount();
}

/// Creating a taken name fails without allocating
#[test]
fn test_create_existing_name() {
    let fx = mount("ns_exists");
    vfs_create(&fx.root, "x", reg(0o644)).unwrap();
    let outstanding = fx.outstanding();

    assert_eq!(
        vfs_create(&fx.root, "x", reg(0o644)).err(),
        Some(FsError::AlreadyExists)
    );
    assert_eq!(
        vfs_mkdir(&fx.root, "x", FileMode::new(0o755)).err(),
        Some(FsError::AlreadyExists)
    );
    assert_eq!(fx.outstanding(), outstanding);
    fx.unmount();
}

/// mkdir yields a directory whatever type bits the caller passes
#[test]
fn test_mkdir_forces_directory() {
    let fx = mount("ns_mkdir");
    let root_links = fx.root.inode().unwrap().nlink();

    for (i, bits) in [FileMode::S_IFREG, FileMode::S_IFLNK, FileMode::S_IFCHR, 0]
        .into_iter()
        .enumerate()
    {
        let name = format!("d{}", i);
        let d = vfs_mkdir(&fx.root, &name, FileMode::new(bits | 0o750)).unwrap();
        let inode = d.inode().unwrap();
        assert!(inode.mode().is_dir());
        assert_eq!(inode.mode().permissions(), 0o750);
        assert_eq!(inode.nlink(), 2);
    }
    assert_eq!(fx.root.inode().unwrap().nlink(), root_links + 4);
    fx.unmount();
}

/// mknod takes the type verbatim and records the device id
#[test]
fn test_mknod_types() {
    let fx = mount("ns_mknod");
    let cases = [
        (FileMode::S_IFCHR, FileType::CharDevice),
        (FileMode::S_IFBLK, FileType::BlockDevice),
        (FileMode::S_IFIFO, FileType::Fifo),
        (FileMode::S_IFSOCK, FileType::Socket),
        (FileMode::S_IFREG, FileType::Regular),
    ];
    for (i, (bits, ty)) in cases.into_iter().enumerate() {
        let name = format!("n{}", i);
        let dev = DevId::new(8, i as u32);
        let d = vfs_mknod(&fx.root, &name, FileMode::new(bits | 0o600), dev).unwrap();
        let inode = d.inode().unwrap();
        assert_eq!(inode.mode().file_type(), Some(ty));
        assert!(inode.ops().matches(inode.mode()));
        if ty.is_special() {
            assert_eq!(inode.rdev(), dev);
        }
    }
    fx.unmount();
}

/// mknod of a mode naming no type is refused and leaves nothing behind
#[test]
fn test_mknod_invalid_type() {
    let fx = mount("ns_mknod_bad");
    let outstanding = fx.outstanding();
    assert_eq!(
        vfs_mknod(&fx.root, "bogus", FileMode::new(0o644), DevId::NONE).err(),
        Some(FsError::InvalidArgument)
    );
    assert_eq!(fx.outstanding(), outstanding);
    assert!(lookup(&fx.root, "bogus").unwrap().is_negative());
    fx.unmount();
}

/// A symlink's stored target reads back exactly
#[test]
fn test_symlink_readlink() {
    let fx = mount("ns_symlink");
    vfs_symlink(&fx.root, "a", "target").unwrap();

    let link = lookup(&fx.root, "a").unwrap();
    let inode = link.inode().unwrap();
    assert!(inode.mode().is_symlink());
    assert_eq!(inode.mode().permissions(), 0o777);
    assert_eq!(inode.size(), 6);
    assert_eq!(vfs_readlink(&link).unwrap(), "target");
    fx.unmount();
}

/// A failed target write keeps the name out of the directory
#[test]
fn test_symlink_write_failure() {
    let fx = mount("ns_symlink_fail");
    let outstanding = fx.outstanding();

    fx.sb.faults().fail_next(FaultPoint::Page);
    assert_eq!(
        vfs_symlink(&fx.root, "a", "target").err(),
        Some(FsError::OutOfMemory)
    );
    assert!(lookup(&fx.root, "a").unwrap().is_negative());
    assert_eq!(fx.outstanding(), outstanding);

    // Nothing left armed: the retry succeeds
    vfs_symlink(&fx.root, "a", "target").unwrap();
    fx.unmount();
}

/// readlink refuses non-symlinks
#[test]
fn test_readlink_on_file() {
    let fx = mount("ns_readlink_file");
    let f = vfs_create(&fx.root, "f", reg(0o644)).unwrap();
    assert_eq!(vfs_readlink(&f).err(), Some(FsError::InvalidArgument));
    drop(f);
    fx.unmount();
}

/// Unlinking the last name releases the node
#[test]
fn test_unlink_releases_node() {
    let fx = mount("ns_unlink");
    drop(vfs_create(&fx.root, "f", reg(0o644)).unwrap());
    assert_eq!(fx.outstanding(), 2);

    vfs_unlink(&fx.root, "f").unwrap();
    assert_eq!(fx.outstanding(), 1);
    assert!(lookup(&fx.root, "f").unwrap().is_negative());
    assert_eq!(vfs_unlink(&fx.root, "f"), Err(FsError::NotFound));
    fx.unmount();
}

/// A node held by an open handle outlives its last name
#[test]
fn test_unlinked_node_lives_while_held() {
    let fx = mount("ns_unlink_held");
    let held = vfs_create(&fx.root, "f", reg(0o644)).unwrap();
    vfs_unlink(&fx.root, "f").unwrap();
    assert_eq!(fx.outstanding(), 2);
    assert_eq!(held.inode().unwrap().nlink(), 0);
    drop(held);
    assert_eq!(fx.outstanding(), 1);
    fx.unmount();
}

/// Hard links share the node until the last name goes
#[test]
fn test_hard_links() {
    let fx = mount("ns_link");
    let f = vfs_create(&fx.root, "f", reg(0o644)).unwrap();
    let g = vfs_link(&f, &fx.root, "g").unwrap();
    assert!(f.inode().unwrap().ptr_eq(&g.inode().unwrap()));
    assert_eq!(f.inode().unwrap().nlink(), 2);
    assert_eq!(fx.outstanding(), 2);
    drop((f, g));

    vfs_unlink(&fx.root, "f").unwrap();
    assert_eq!(fx.outstanding(), 2);
    assert_eq!(lookup(&fx.root, "g").unwrap().inode().unwrap().nlink(), 1);

    vfs_unlink(&fx.root, "g").unwrap();
    assert_eq!(fx.outstanding(), 1);
    fx.unmount();
}

/// Directories cannot be hard linked
#[test]
fn test_link_directory_refused() {
    let fx = mount("ns_link_dir");
    let d = vfs_mkdir(&fx.root, "d", FileMode::new(0o755)).unwrap();
    assert_eq!(
        vfs_link(&d, &fx.root, "alias").err(),
        Some(FsError::PermissionDenied)
    );
    assert!(lookup(&fx.root, "alias").unwrap().is_negative());
    drop(d);
    fx.unmount();
}

/// rmdir only removes empty directories and restores parent links
#[test]
fn test_rmdir() {
    let fx = mount("ns_rmdir");
    let root_links = fx.root.inode().unwrap().nlink();
    let d = vfs_mkdir(&fx.root, "d", FileMode::new(0o755)).unwrap();
    drop(vfs_create(&d, "f", reg(0o644)).unwrap());

    assert_eq!(vfs_rmdir(&fx.root, "d"), Err(FsError::DirectoryNotEmpty));
    assert_eq!(vfs_unlink(&fx.root, "d"), Err(FsError::IsDirectory));
    assert_eq!(vfs_rmdir(&d, "f"), Err(FsError::NotDirectory));

    vfs_unlink(&d, "f").unwrap();
    drop(d);
    vfs_rmdir(&fx.root, "d").unwrap();
    assert_eq!(fx.root.inode().unwrap().nlink(), root_links);
    assert_eq!(fx.outstanding(), 1);
    fx.unmount();
}

/// Rename within and across directories, including over an existing file
#[test]
fn test_rename() {
    let fx = mount("ns_rename");
    let a = vfs_mkdir(&fx.root, "a", FileMode::new(0o755)).unwrap();
    let b = vfs_mkdir(&fx.root, "b", FileMode::new(0o755)).unwrap();
    drop(vfs_create(&a, "f", reg(0o644)).unwrap());
    drop(vfs_create(&b, "victim", reg(0o644)).unwrap());
    assert_eq!(fx.outstanding(), 5);

    vfs_rename(&a, "f", &a, "g").unwrap();
    assert!(lookup(&a, "f").unwrap().is_negative());
    assert!(!lookup(&a, "g").unwrap().is_negative());

    vfs_rename(&a, "g", &b, "victim").unwrap();
    assert!(lookup(&a, "g").unwrap().is_negative());
    assert_eq!(fx.outstanding(), 4);
    let moved = lookup(&b, "victim").unwrap();
    assert!(std::sync::Arc::ptr_eq(&moved.parent().unwrap(), &b));
    assert_eq!(moved.name(), "victim");
    drop(moved);

    let a_links = a.inode().unwrap().nlink();
    let sub = vfs_mkdir(&a, "sub", FileMode::new(0o755)).unwrap();
    assert_eq!(a.inode().unwrap().nlink(), a_links + 1);
    vfs_rename(&a, "sub", &b, "sub").unwrap();
    assert_eq!(a.inode().unwrap().nlink(), a_links);
    assert_eq!(
        vfs_rename(&fx.root, "b", &sub, "loop"),
        Err(FsError::InvalidArgument)
    );
    assert_eq!(
        vfs_rename(&b, "victim", &b, "sub"),
        Err(FsError::IsDirectory)
    );
    drop((a, b, sub));
    fx.unmount();
}

/// Renaming one name of a node over another name of it changes nothing
#[test]
fn test_rename_between_links_of_one_node() {
    let fx = mount("ns_rename_links");
    let f = vfs_create(&fx.root, "f", reg(0o644)).unwrap();
    let g = vfs_link(&f, &fx.root, "g").unwrap();
    let inode = f.inode().unwrap();
    assert_eq!(inode.nlink(), 2);

    vfs_rename(&fx.root, "g", &fx.root, "f").unwrap();
    assert_eq!(inode.nlink(), 2);
    assert!(std::sync::Arc::ptr_eq(&lookup(&fx.root, "f").unwrap(), &f));
    assert!(std::sync::Arc::ptr_eq(&lookup(&fx.root, "g").unwrap(), &g));
    assert_eq!(read_dir_all(&fx.root).unwrap().len(), 4);
    assert_eq!(fx.outstanding(), 2);

    drop((f, g, inode));
    vfs_unlink(&fx.root, "f").unwrap();
    vfs_unlink(&fx.root, "g").unwrap();
    assert_eq!(fx.outstanding(), 1);
    fx.unmount();
}

/// A removed directory still held by the caller accepts no new entries
#[test]
fn test_create_in_removed_directory() {
    let fx = mount("ns_removed_dir");
    let d = vfs_mkdir(&fx.root, "d", FileMode::new(0o755)).unwrap();
    let f = vfs_create(&fx.root, "f", reg(0o644)).unwrap();
    vfs_rmdir(&fx.root, "d").unwrap();
    assert_eq!(d.inode().unwrap().nlink(), 0);
    let before = fx.outstanding();

    assert_eq!(vfs_create(&d, "f", reg(0o644)).err(), Some(FsError::NotFound));
    assert_eq!(
        vfs_mkdir(&d, "sub", FileMode::new(0o755)).err(),
        Some(FsError::NotFound)
    );
    assert_eq!(
        vfs_mknod(&d, "p", FileMode::new(FileMode::S_IFIFO | 0o600), DevId::NONE).err(),
        Some(FsError::NotFound)
    );
    assert_eq!(vfs_symlink(&d, "s", "target").err(), Some(FsError::NotFound));
    assert_eq!(vfs_link(&f, &d, "l").err(), Some(FsError::NotFound));
    assert_eq!(vfs_rename(&fx.root, "f", &d, "f"), Err(FsError::NotFound));
    assert_eq!(fx.outstanding(), before);

    // Only the held directory is outside the tree
    assert_eq!(fx.outstanding(), reachable_nodes(&fx.root) + 1);
    drop(d);
    assert_eq!(fx.outstanding(), reachable_nodes(&fx.root));
    drop(f);
    let fs = fx.unmount();
    assert_eq!(fs.pool().outstanding(), 0);
}

/// Enumeration lists ".", ".." and then children in name order
#[test]
fn test_readdir_order() {
    let fx = mount("ns_readdir");
    let d = vfs_mkdir(&fx.root, "d", FileMode::new(0o755)).unwrap();
    for name in ["zeta", "alpha", "mid"] {
        drop(vfs_create(&d, name, reg(0o644)).unwrap());
    }
    drop(vfs_mkdir(&d, "beta", FileMode::new(0o755)).unwrap());

    let entries = read_dir_all(&d).unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, [".", "..", "alpha", "beta", "mid", "zeta"]);
    assert_eq!(entries[0].ino, d.inode().unwrap().ino());
    assert_eq!(entries[1].ino, fx.root.inode().unwrap().ino());
    assert_eq!(entries[3].file_type, cfs::fs::vfs::inode::DirEnt::DT_DIR);
    assert_eq!(entries[2].file_type, cfs::fs::vfs::inode::DirEnt::DT_REG);
    drop(d);
    fx.unmount();
}

/// Enumeration resumes from a saved cookie
#[test]
fn test_readdir_cookie_resume() {
    use cfs::fs::vfs::inode::DirCookie;
    use cfs::fs::vfs::namei::vfs_readdir;

    let fx = mount("ns_readdir_cookie");
    for name in ["a", "b", "c"] {
        drop(vfs_create(&fx.root, name, reg(0o644)).unwrap());
    }

    let mut cookie = DirCookie::default();
    let mut first = Vec::new();
    vfs_readdir(&fx.root, &mut cookie, &mut |ent| {
        first.push(ent.name);
        first.len() < 3
    })
    .unwrap();
    assert_eq!(first, [".", "..", "a"]);

    let mut rest = Vec::new();
    vfs_readdir(&fx.root, &mut cookie, &mut |ent| {
        rest.push(ent.name);
        true
    })
    .unwrap();
    assert_eq!(rest, ["a", "b", "c"]);
    fx.unmount();
}

/// Path resolution through directories and symlinks
#[test]
fn test_path_resolution() {
    let fx = mount("ns_path");
    let a = vfs_mkdir(&fx.root, "a", FileMode::new(0o755)).unwrap();
    let b = vfs_mkdir(&a, "b", FileMode::new(0o755)).unwrap();
    let f = vfs_create(&b, "f", reg(0o644)).unwrap();
    vfs_symlink(&fx.root, "abs", "/a/b").unwrap();
    vfs_symlink(&a, "rel", "b/f").unwrap();

    let found = resolve_path(&fx.root, "/a/b/f").unwrap();
    assert!(std::sync::Arc::ptr_eq(&found, &f));
    assert!(std::sync::Arc::ptr_eq(&resolve_path(&fx.root, "/abs/f").unwrap(), &f));
    assert!(std::sync::Arc::ptr_eq(&resolve_path(&fx.root, "a/rel").unwrap(), &f));
    assert!(std::sync::Arc::ptr_eq(&resolve_path(&fx.root, "/a/./b/../b/f").unwrap(), &f));
    assert!(std::sync::Arc::ptr_eq(&resolve_path(&fx.root, "/..").unwrap(), &fx.root));

    let link = resolve_path_nofollow(&fx.root, "/a/rel").unwrap();
    assert!(link.inode().unwrap().mode().is_symlink());

    assert_eq!(resolve_path(&fx.root, "/a/nope").err(), Some(FsError::NotFound));
    assert_eq!(resolve_path(&fx.root, "/a/b/f/x").err(), Some(FsError::NotDirectory));

    let mut resolver = PathResolver::new(a.clone(), fx.root.clone());
    let (parent, name) = resolver.resolve_parent("b/newfile").unwrap();
    assert!(std::sync::Arc::ptr_eq(&parent, &b));
    assert_eq!(name, "newfile");
    drop((a, b, f, found, link, parent));
    fx.unmount();
}

/// Symlink cycles are cut off
#[test]
fn test_symlink_loop() {
    let fx = mount("ns_symlink_loop");
    vfs_symlink(&fx.root, "ping", "pong").unwrap();
    vfs_symlink(&fx.root, "pong", "ping").unwrap();
    assert_eq!(
        resolve_path(&fx.root, "/ping").err(),
        Some(FsError::TooManySymlinks)
    );
    fx.unmount();
}

/// Names are validated before anything is allocated
#[test]
fn test_name_validation() {
    let fx = mount("ns_names");
    let outstanding = fx.outstanding();
    let long = "n".repeat(NAME_MAX + 1);
    assert_eq!(lookup(&fx.root, &long).err(), Some(FsError::NameTooLong));
    assert_eq!(
        vfs_create(&fx.root, &long, reg(0o644)).err(),
        Some(FsError::NameTooLong)
    );
    assert_eq!(
        vfs_create(&fx.root, "a/b", reg(0o644)).err(),
        Some(FsError::InvalidArgument)
    );
    assert_eq!(
        vfs_mkdir(&fx.root, "..", FileMode::new(0o755)).err(),
        Some(FsError::InvalidArgument)
    );
    assert_eq!(
        vfs_symlink(&fx.root, "s", "").err(),
        Some(FsError::InvalidArgument)
    );
    assert_eq!(fx.outstanding(), outstanding);
    fx.unmount();
}

/// Creation in a non-directory is refused
#[test]
fn test_create_under_file() {
    let fx = mount("ns_under_file");
    let f = vfs_create(&fx.root, "f", reg(0o644)).unwrap();
    assert_eq!(
        vfs_create(&f, "child", reg(0o644)).err(),
        Some(FsError::NotDirectory)
    );
    drop(f);
    fx.unmount();
}

/// Parent timestamps move forward with every mutation
#[test]
fn test_parent_times_updated() {
    let fx = mount("ns_times");
    let dir = fx.root.inode().unwrap();
    let before = dir.meta().mtime;
    drop(vfs_create(&fx.root, "f", reg(0o644)).unwrap());
    let after_create = dir.meta().mtime;
    assert!(after_create > before);
    assert_eq!(dir.meta().ctime, after_create);

    vfs_unlink(&fx.root, "f").unwrap();
    assert!(dir.meta().mtime > after_create);
    drop(dir);
    fx.unmount();
}

/// statfs reports the fixed placeholders however the tree changes
#[test]
fn test_statfs_unaffected_by_mutations() {
    let fx = mount("ns_statfs");
    let check = |fx: &common::Fixture| {
        let st = vfs_statfs(&fx.root).unwrap();
        assert_eq!(st.f_type, CFS_SUPER_MAGIC);
        assert_eq!(st.f_bsize, 4096);
        assert_eq!((st.f_blocks, st.f_bfree, st.f_bavail), (1024, 1023, 1023));
    };
    check(&fx);
    let d = vfs_mkdir(&fx.root, "d", FileMode::new(0o755)).unwrap();
    for i in 0..20 {
        drop(vfs_create(&d, &format!("f{}", i), reg(0o644)).unwrap());
    }
    vfs_symlink(&d, "s", "f0").unwrap();
    check(&fx);
    drop(d);
    fx.unmount();
}

/// Outstanding pool blocks equal the nodes reachable from the root
#[test]
fn test_pool_matches_reachable_nodes() {
    let fx = mount("ns_reachable");
    let d = vfs_mkdir(&fx.root, "d", FileMode::new(0o755)).unwrap();
    drop(vfs_create(&d, "f", reg(0o644)).unwrap());
    let _ = vfs_create(&d, "f", reg(0o644));
    let _ = vfs_mknod(&d, "bad", FileMode::new(0o644), DevId::NONE);
    vfs_symlink(&d, "s", "f").unwrap();
    fx.sb.faults().fail_next(FaultPoint::Page);
    let _ = vfs_symlink(&d, "s2", "f");
    fx.sb.faults().fail_next(FaultPoint::Dentry);
    let _ = vfs_mkdir(&d, "e", FileMode::new(0o755));
    let f = lookup(&d, "f").unwrap();
    drop(vfs_link(&f, &fx.root, "f-link").unwrap());
    drop(f);

    assert_eq!(fx.outstanding(), reachable_nodes(&fx.root));
    assert_eq!(fx.outstanding(), 4);
    drop(d);
    fx.unmount();
}
