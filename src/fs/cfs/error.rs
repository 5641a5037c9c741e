//! CFS error taxonomy

use core::fmt;

use super::pool::PoolError;
use crate::fs::vfs::inode::{FileMode, FsError};

/// Stage of `cfs_fill_super` a mount failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStage {
    /// Allocating the private superblock extension
    Extension,
    /// Setting block size and magic
    Geometry,
    /// Building the root directory node
    RootNode,
    /// Installing the root dentry
    RootLinkage,
}

impl fmt::Display for FillStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extension => write!(f, "superblock extension"),
            Self::Geometry => write!(f, "block geometry"),
            Self::RootNode => write!(f, "root node"),
            Self::RootLinkage => write!(f, "root linkage"),
        }
    }
}

/// CFS errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfsError {
    /// No node could be taken from the inode pool
    AllocationFailure,
    /// Mode does not name a type CFS can build
    InvalidMode(FileMode),
    /// A new node could not be bound to its dentry
    LinkageFailure(FsError),
    /// Symlink target could not be stored
    ContentWriteFailure(FsError),
    /// `cfs_fill_super` failed; nothing of the attempt remains
    MountFailure { stage: FillStage, cause: FsError },
    /// Inode pool lifecycle error
    Pool(PoolError),
    /// Error from the VFS outside the stages above
    Host(FsError),
}

impl CfsError {
    /// Mount failure at `stage` caused by `self`
    pub fn during(self, stage: FillStage) -> Self {
        let cause = match self {
            // Inside mount an exhausted pool is a memory shortage
            Self::AllocationFailure | Self::Pool(PoolError::Exhausted) => FsError::OutOfMemory,
            Self::MountFailure { cause, .. } => cause,
            other => FsError::from(other),
        };
        Self::MountFailure { stage, cause }
    }
}

impl fmt::Display for CfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailure => write!(f, "Inode allocation failed"),
            Self::InvalidMode(mode) => write!(f, "Invalid inode mode {:o}", mode.0),
            Self::LinkageFailure(e) => write!(f, "Linking new inode failed: {}", e),
            Self::ContentWriteFailure(e) => write!(f, "Writing symlink target failed: {}", e),
            Self::MountFailure { stage, cause } => {
                write!(f, "Mount failed at {}: {}", stage, cause)
            }
            Self::Pool(e) => write!(f, "Inode pool: {}", e),
            Self::Host(e) => write!(f, "{}", e),
        }
    }
}

impl From<PoolError> for CfsError {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}

impl From<FsError> for CfsError {
    fn from(e: FsError) -> Self {
        Self::Host(e)
    }
}

impl From<CfsError> for FsError {
    fn from(e: CfsError) -> Self {
        match e {
            CfsError::AllocationFailure => FsError::NoSpace,
            CfsError::InvalidMode(_) => FsError::InvalidArgument,
            CfsError::LinkageFailure(cause)
            | CfsError::ContentWriteFailure(cause)
            | CfsError::MountFailure { cause, .. }
            | CfsError::Host(cause) => cause,
            CfsError::Pool(PoolError::Exhausted) => FsError::NoSpace,
            CfsError::Pool(PoolError::Busy) => FsError::Busy,
            CfsError::Pool(PoolError::InitError) => FsError::OutOfMemory,
            CfsError::Pool(PoolError::BadSlot) | CfsError::Pool(PoolError::Destroyed) => {
                FsError::StaleHandle
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_failure_surfaces_as_no_space() {
        assert_eq!(FsError::from(CfsError::AllocationFailure), FsError::NoSpace);
    }

    #[test]
    fn test_allocation_failure_during_mount_is_oom() {
        let e = CfsError::AllocationFailure.during(FillStage::RootNode);
        assert_eq!(
            e,
            CfsError::MountFailure {
                stage: FillStage::RootNode,
                cause: FsError::OutOfMemory,
            }
        );
        assert_eq!(FsError::from(e), FsError::OutOfMemory);
    }

    #[test]
    fn test_causes_are_carried() {
        assert_eq!(
            FsError::from(CfsError::ContentWriteFailure(FsError::NameTooLong)),
            FsError::NameTooLong
        );
        assert_eq!(
            CfsError::Host(FsError::OutOfMemory).during(FillStage::RootLinkage),
            CfsError::MountFailure {
                stage: FillStage::RootLinkage,
                cause: FsError::OutOfMemory,
            }
        );
    }
}
