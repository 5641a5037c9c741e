//! Filesystem Support
//!
//! This module contains the CFS driver, the Virtual File System (VFS) layer
//! it plugs into, and the block device interface mounts are made against.

pub mod block_dev;
pub mod cfs;
pub mod vfs;
