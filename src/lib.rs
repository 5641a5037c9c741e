//! CFS - Compressed Filesystem
//!
//! A block-device filesystem driver together with the VFS layer it mounts
//! into. The driver lives in [`fs::cfs`]; the generic machinery it relies on
//! (superblocks, inodes, dentries, page cache, mount table) lives in
//! [`fs::vfs`].
//!
//! The crate is `no_std` and only needs `alloc`.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod fs;

pub use fs::cfs::{exit_cfs, init_cfs, CfsError, CfsFsType};
pub use fs::vfs::{FsError, FsResult};
