/// Configuration constants for CFS

/// Magic number reported in the superblock and by statfs
pub const CFS_SUPER_MAGIC: u64 = 0x1998_0122;

/// Registered filesystem type name
pub const CFS_FS_NAME: &str = "cfs";

/// Page cache page size in bytes (4 KiB)
pub const PAGE_SIZE: usize = 4096;

/// log2(PAGE_SIZE)
pub const PAGE_SHIFT: u32 = 12;

/// Filesystem block size; CFS blocks are page sized
pub const CFS_BLOCK_SIZE: u32 = PAGE_SIZE as u32;

/// log2(CFS_BLOCK_SIZE)
pub const CFS_BLOCK_SHIFT: u32 = PAGE_SHIFT;

/// Placeholder capacity reported by statfs (blocks)
/// Not derived from real usage; space accounting does not exist yet
pub const STATFS_TOTAL_BLOCKS: u64 = 1024;

/// Placeholder free block count reported by statfs
pub const STATFS_FREE_BLOCKS: u64 = 1023;

/// Placeholder available block count reported by statfs
pub const STATFS_AVAIL_BLOCKS: u64 = 1023;

/// Name of the process-wide inode pool
pub const CFS_INODE_POOL_NAME: &str = "cfs_inode_cache";

/// Default number of inode blocks the pool may hand out
/// At 64 bytes of bookkeeping per block this stays well under a MiB
pub const CFS_INODE_POOL_LIMIT: usize = 16 * 1024;

/// Root directory permissions (rwxr-xr-x)
pub const CFS_ROOT_PERMS: u16 = 0o755;

/// Symlink permissions (rwxrwxrwx)
pub const CFS_SYMLINK_PERMS: u16 = 0o777;

/// Maximum length of a single path component
pub const NAME_MAX: usize = 255;

/// Maximum length of a full path
pub const PATH_MAX: usize = 4096;

/// Maximum number of symlink hops during path resolution
pub const MAX_SYMLINK_HOPS: usize = 40;

/// Dirty pages one file may hold before its writer flushes the excess
pub const DIRTY_PAGES_PER_INODE: usize = 64;
