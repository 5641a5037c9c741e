//! Inode Types and Dispatch Tables
//!
//! This module defines the generic inode every filesystem embeds in its own
//! node structure, the mode bits and error codes shared across the VFS, and
//! the operation tables (dispatch tables) a node is wired to by its
//! filesystem.

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::any::Any;
use core::fmt;
use core::ops::Deref;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::dentry::Dentry;
use super::filemap::AddressSpace;
use super::superblock::{SuperBlock, SuperOperations};
use super::time::Timespec;

/// File mode bits following POSIX specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct FileMode(pub u16);

impl FileMode {
    // File types
    pub const S_IFMT: u16 = 0o170000;   // File type mask
    pub const S_IFREG: u16 = 0o100000;  // Regular file
    pub const S_IFDIR: u16 = 0o040000;  // Directory
    pub const S_IFLNK: u16 = 0o120000;  // Symbolic link
    pub const S_IFCHR: u16 = 0o020000;  // Character device
    pub const S_IFBLK: u16 = 0o060000;  // Block device
    pub const S_IFIFO: u16 = 0o010000;  // FIFO
    pub const S_IFSOCK: u16 = 0o140000; // Socket

    // Permissions
    pub const S_IRWXU: u16 = 0o0700;    // User rwx
    pub const S_IRWXG: u16 = 0o0070;    // Group rwx
    pub const S_IRWXO: u16 = 0o0007;    // Other rwx
    pub const S_IRWXUGO: u16 = 0o0777;  // Everyone rwx

    // Special bits
    pub const S_ISUID: u16 = 0o4000;    // Set UID
    pub const S_ISGID: u16 = 0o2000;    // Set GID
    pub const S_ISVTX: u16 = 0o1000;    // Sticky bit

    /// Create a new FileMode
    pub const fn new(mode: u16) -> Self {
        Self(mode)
    }

    /// Get the raw file type bits
    pub const fn type_bits(&self) -> u16 {
        self.0 & Self::S_IFMT
    }

    /// Get the permission bits
    pub const fn permissions(&self) -> u16 {
        self.0 & 0o7777
    }

    /// Replace the type bits, keeping permissions
    pub const fn with_type(self, type_bits: u16) -> Self {
        Self((self.0 & !Self::S_IFMT) | (type_bits & Self::S_IFMT))
    }

    /// Decode the file type, `None` for bit patterns POSIX does not define
    pub const fn file_type(&self) -> Option<FileType> {
        match self.type_bits() {
            Self::S_IFREG => Some(FileType::Regular),
            Self::S_IFDIR => Some(FileType::Directory),
            Self::S_IFLNK => Some(FileType::Symlink),
            Self::S_IFCHR => Some(FileType::CharDevice),
            Self::S_IFBLK => Some(FileType::BlockDevice),
            Self::S_IFIFO => Some(FileType::Fifo),
            Self::S_IFSOCK => Some(FileType::Socket),
            _ => None,
        }
    }

    pub const fn is_regular(&self) -> bool {
        self.type_bits() == Self::S_IFREG
    }

    pub const fn is_dir(&self) -> bool {
        self.type_bits() == Self::S_IFDIR
    }

    pub const fn is_symlink(&self) -> bool {
        self.type_bits() == Self::S_IFLNK
    }
}

/// Decoded file type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

impl FileType {
    /// The `S_IF*` bits for this type
    pub const fn mode_bits(self) -> u16 {
        match self {
            Self::Regular => FileMode::S_IFREG,
            Self::Directory => FileMode::S_IFDIR,
            Self::Symlink => FileMode::S_IFLNK,
            Self::CharDevice => FileMode::S_IFCHR,
            Self::BlockDevice => FileMode::S_IFBLK,
            Self::Fifo => FileMode::S_IFIFO,
            Self::Socket => FileMode::S_IFSOCK,
        }
    }

    /// Character/block devices, FIFOs and sockets
    pub const fn is_special(self) -> bool {
        matches!(
            self,
            Self::CharDevice | Self::BlockDevice | Self::Fifo | Self::Socket
        )
    }
}

/// Device identifier (major:minor) for special files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
#[repr(transparent)]
pub struct DevId(pub u32);

impl DevId {
    const MINOR_BITS: u32 = 20;
    const MINOR_MASK: u32 = (1 << Self::MINOR_BITS) - 1;

    pub const NONE: Self = Self(0);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self((major << Self::MINOR_BITS) | (minor & Self::MINOR_MASK))
    }

    pub const fn major(&self) -> u32 {
        self.0 >> Self::MINOR_BITS
    }

    pub const fn minor(&self) -> u32 {
        self.0 & Self::MINOR_MASK
    }
}

/// Linux-compatible stat structure
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Stat {
    pub st_dev: u64,         // Device ID (filesystem ID)
    pub st_ino: u64,         // Inode number
    pub st_mode: u32,        // File type and mode
    pub st_nlink: u32,       // Number of hard links
    pub st_uid: u32,         // User ID
    pub st_gid: u32,         // Group ID
    pub st_rdev: u64,        // Device ID (if special file)
    pub st_size: u64,        // Total size in bytes
    pub st_blksize: u32,     // Block size for I/O
    pub st_blocks: u64,      // Number of 512B blocks
    pub st_atime: Timespec,  // Access time
    pub st_mtime: Timespec,  // Modification time
    pub st_ctime: Timespec,  // Status change time
}

/// Directory entry produced by readdir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEnt {
    pub ino: u64,            // Inode number
    pub off: u64,            // Cookie of the next entry
    pub name: String,        // Entry name
    pub file_type: u8,       // File type (DT_*)
}

impl DirEnt {
    // File type constants for d_type field
    pub const DT_UNKNOWN: u8 = 0;
    pub const DT_FIFO: u8 = 1;
    pub const DT_CHR: u8 = 2;
    pub const DT_DIR: u8 = 4;
    pub const DT_BLK: u8 = 6;
    pub const DT_REG: u8 = 8;
    pub const DT_LNK: u8 = 10;
    pub const DT_SOCK: u8 = 12;

    /// Convert FileMode to d_type
    pub fn file_type_from_mode(mode: FileMode) -> u8 {
        match mode.file_type() {
            Some(FileType::Regular) => Self::DT_REG,
            Some(FileType::Directory) => Self::DT_DIR,
            Some(FileType::Symlink) => Self::DT_LNK,
            Some(FileType::CharDevice) => Self::DT_CHR,
            Some(FileType::BlockDevice) => Self::DT_BLK,
            Some(FileType::Fifo) => Self::DT_FIFO,
            Some(FileType::Socket) => Self::DT_SOCK,
            None => Self::DT_UNKNOWN,
        }
    }
}

/// Directory iteration cookie
#[derive(Debug, Clone, Copy, Default)]
pub struct DirCookie {
    pub offset: u64,
}

/// Result type for filesystem operations
pub type FsResult<T> = Result<T, FsError>;

/// Filesystem error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Invalid argument
    InvalidArgument,
    /// No such file or directory
    NotFound,
    /// File exists
    AlreadyExists,
    /// Operation not permitted
    PermissionDenied,
    /// Not a directory
    NotDirectory,
    /// Is a directory
    IsDirectory,
    /// Directory not empty
    DirectoryNotEmpty,
    /// No space left on device
    NoSpace,
    /// Out of memory
    OutOfMemory,
    /// I/O error
    IoError,
    /// Name too long
    NameTooLong,
    /// Too many symbolic links
    TooManySymlinks,
    /// Too many links
    TooManyLinks,
    /// Cross-device link
    CrossDevice,
    /// No such device
    NoDevice,
    /// Device or resource busy
    Busy,
    /// Stale file handle
    StaleHandle,
    /// Operation not supported
    NotSupported,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "Invalid argument"),
            Self::NotFound => write!(f, "No such file or directory"),
            Self::AlreadyExists => write!(f, "File exists"),
            Self::PermissionDenied => write!(f, "Operation not permitted"),
            Self::NotDirectory => write!(f, "Not a directory"),
            Self::IsDirectory => write!(f, "Is a directory"),
            Self::DirectoryNotEmpty => write!(f, "Directory not empty"),
            Self::NoSpace => write!(f, "No space left on device"),
            Self::OutOfMemory => write!(f, "Out of memory"),
            Self::IoError => write!(f, "I/O error"),
            Self::NameTooLong => write!(f, "File name too long"),
            Self::TooManySymlinks => write!(f, "Too many levels of symbolic links"),
            Self::TooManyLinks => write!(f, "Too many links"),
            Self::CrossDevice => write!(f, "Cross-device link"),
            Self::NoDevice => write!(f, "No such device"),
            Self::Busy => write!(f, "Device or resource busy"),
            Self::StaleHandle => write!(f, "Stale file handle"),
            Self::NotSupported => write!(f, "Operation not supported"),
        }
    }
}

/// Inode operations - the directory/namespace half of a dispatch table
///
/// Every method defaults to "not supported" so tables only implement what
/// their node type needs.
pub trait InodeOperations: Sync {
    /// Create a regular file for the negative `dentry`
    fn create(&self, _dir: &InodeRef, _dentry: &Arc<Dentry>, _mode: FileMode) -> FsResult<()> {
        Err(FsError::NotSupported)
    }

    /// Resolve `dentry` in `dir`; `Ok(None)` leaves it negative
    fn lookup(&self, _dir: &InodeRef, _dentry: &Arc<Dentry>) -> FsResult<Option<Arc<Dentry>>> {
        Err(FsError::NotDirectory)
    }

    /// Create a hard link to `old` named by `dentry`
    fn link(&self, _old: &Arc<Dentry>, _dir: &InodeRef, _dentry: &Arc<Dentry>) -> FsResult<()> {
        Err(FsError::NotSupported)
    }

    fn unlink(&self, _dir: &InodeRef, _dentry: &Arc<Dentry>) -> FsResult<()> {
        Err(FsError::NotSupported)
    }

    fn symlink(&self, _dir: &InodeRef, _dentry: &Arc<Dentry>, _target: &str) -> FsResult<()> {
        Err(FsError::NotSupported)
    }

    fn mkdir(&self, _dir: &InodeRef, _dentry: &Arc<Dentry>, _mode: FileMode) -> FsResult<()> {
        Err(FsError::NotSupported)
    }

    fn rmdir(&self, _dir: &InodeRef, _dentry: &Arc<Dentry>) -> FsResult<()> {
        Err(FsError::NotSupported)
    }

    fn mknod(
        &self,
        _dir: &InodeRef,
        _dentry: &Arc<Dentry>,
        _mode: FileMode,
        _dev: DevId,
    ) -> FsResult<()> {
        Err(FsError::NotSupported)
    }

    fn rename(
        &self,
        _old_dir: &InodeRef,
        _old_dentry: &Arc<Dentry>,
        _new_dir: &InodeRef,
        _new_dentry: &Arc<Dentry>,
    ) -> FsResult<()> {
        Err(FsError::NotSupported)
    }

    /// Read the target of a symbolic link
    fn readlink(&self, _dentry: &Arc<Dentry>) -> FsResult<String> {
        Err(FsError::InvalidArgument)
    }
}

/// File operations - the open-file half of a dispatch table
pub trait FileOperations: Sync {
    fn read(&self, _inode: &InodeRef, _off: u64, _dst: &mut [u8]) -> FsResult<usize> {
        Err(FsError::InvalidArgument)
    }

    fn write(&self, _inode: &InodeRef, _off: u64, _src: &[u8]) -> FsResult<usize> {
        Err(FsError::InvalidArgument)
    }

    /// Enumerate a directory; `sink` returns false to stop early
    fn readdir(
        &self,
        _dentry: &Arc<Dentry>,
        _cookie: &mut DirCookie,
        _sink: &mut dyn FnMut(DirEnt) -> bool,
    ) -> FsResult<()> {
        Err(FsError::NotDirectory)
    }

    /// Flush the file's dirty pages
    fn fsync(&self, _inode: &InodeRef) -> FsResult<()> {
        Ok(())
    }
}

/// Dispatch table installed on a node, tagged by node type
///
/// Only the variant matching the node's `S_IF*` bits may be installed.
#[derive(Clone, Copy)]
pub enum InodeOps {
    /// Freshly allocated, not yet wired by its filesystem
    Unset,
    Regular {
        i_op: &'static dyn InodeOperations,
        i_fop: &'static dyn FileOperations,
    },
    Directory {
        i_op: &'static dyn InodeOperations,
        i_fop: &'static dyn FileOperations,
    },
    Symlink {
        i_op: &'static dyn InodeOperations,
    },
    Special {
        i_fop: &'static dyn FileOperations,
    },
}

impl InodeOps {
    pub fn i_op(&self) -> Option<&'static dyn InodeOperations> {
        match *self {
            Self::Regular { i_op, .. } | Self::Directory { i_op, .. } | Self::Symlink { i_op } => {
                Some(i_op)
            }
            Self::Unset | Self::Special { .. } => None,
        }
    }

    pub fn i_fop(&self) -> Option<&'static dyn FileOperations> {
        match *self {
            Self::Regular { i_fop, .. }
            | Self::Directory { i_fop, .. }
            | Self::Special { i_fop } => Some(i_fop),
            Self::Unset | Self::Symlink { .. } => None,
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Whether this table is the right shape for a node of `mode`
    pub fn matches(&self, mode: FileMode) -> bool {
        match (self, mode.file_type()) {
            (Self::Regular { .. }, Some(FileType::Regular)) => true,
            (Self::Directory { .. }, Some(FileType::Directory)) => true,
            (Self::Symlink { .. }, Some(FileType::Symlink)) => true,
            (Self::Special { .. }, Some(ty)) => ty.is_special(),
            _ => false,
        }
    }
}

impl fmt::Debug for InodeOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unset => "Unset",
            Self::Regular { .. } => "Regular",
            Self::Directory { .. } => "Directory",
            Self::Symlink { .. } => "Symlink",
            Self::Special { .. } => "Special",
        };
        f.write_str(name)
    }
}

/// Per-lifetime inode metadata, reset every time the inode is handed out
pub struct InodeMeta {
    pub ino: u64,
    pub mode: FileMode,
    pub uid: u32,
    pub gid: u32,
    pub rdev: DevId,
    pub nlink: u32,
    pub size: u64,
    /// 512-byte blocks in use
    pub blocks: u64,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
    pub ops: InodeOps,
    sb: Weak<SuperBlock>,
    /// Release hook of the allocating instance; outlives its superblock
    s_op: Option<Arc<dyn SuperOperations>>,
}

impl InodeMeta {
    fn blank() -> Self {
        Self {
            ino: 0,
            mode: FileMode::default(),
            uid: 0,
            gid: 0,
            rdev: DevId::NONE,
            nlink: 0,
            size: 0,
            blocks: 0,
            atime: Timespec::ZERO,
            mtime: Timespec::ZERO,
            ctime: Timespec::ZERO,
            ops: InodeOps::Unset,
            sb: Weak::new(),
            s_op: None,
        }
    }
}

/// Generic inode
///
/// Filesystems embed one of these in their own node type and hand it to the
/// VFS through [`FsInode`]. The lock and page mapping are built once per
/// memory block by [`Inode::new_once`] and keep their identity when the block
/// is recycled; everything else lives in [`InodeMeta`] and is reset by
/// [`inode_init_always`].
pub struct Inode {
    i_rwsem: Mutex<()>,
    i_mapping: AddressSpace,
    i_count: AtomicU32,
    i_generation: AtomicU32,
    meta: RwLock<InodeMeta>,
}

impl Inode {
    /// One-time construction of the embedded generic state
    pub fn new_once() -> Self {
        Self {
            i_rwsem: Mutex::new(()),
            i_mapping: AddressSpace::new(),
            i_count: AtomicU32::new(0),
            i_generation: AtomicU32::new(0),
            meta: RwLock::new(InodeMeta::blank()),
        }
    }

    pub fn ino(&self) -> u64 {
        self.meta.read().ino
    }

    pub fn mode(&self) -> FileMode {
        self.meta.read().mode
    }

    pub fn nlink(&self) -> u32 {
        self.meta.read().nlink
    }

    pub fn size(&self) -> u64 {
        self.meta.read().size
    }

    pub fn rdev(&self) -> DevId {
        self.meta.read().rdev
    }

    pub fn ops(&self) -> InodeOps {
        self.meta.read().ops
    }

    pub fn meta(&self) -> RwLockReadGuard<'_, InodeMeta> {
        self.meta.read()
    }

    pub fn meta_mut(&self) -> RwLockWriteGuard<'_, InodeMeta> {
        self.meta.write()
    }

    /// Reference count held by dentries and callers
    pub fn count(&self) -> u32 {
        self.i_count.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u32 {
        self.i_generation.load(Ordering::Acquire)
    }

    pub fn mapping(&self) -> &AddressSpace {
        &self.i_mapping
    }

    /// Per-directory exclusion shared by every namespace operation on it
    pub fn lock_dir(&self) -> MutexGuard<'_, ()> {
        self.i_rwsem.lock()
    }

    /// Owning superblock, `StaleHandle` once it is gone
    pub fn sb(&self) -> FsResult<Arc<SuperBlock>> {
        self.meta.read().sb.upgrade().ok_or(FsError::StaleHandle)
    }

    pub fn i_op(&self) -> FsResult<&'static dyn InodeOperations> {
        self.ops().i_op().ok_or(FsError::NotSupported)
    }

    pub fn i_fop(&self) -> FsResult<&'static dyn FileOperations> {
        self.ops().i_fop().ok_or(FsError::NotSupported)
    }

    /// Set mtime and ctime to `now`
    pub fn touch_mtime_ctime(&self, now: Timespec) {
        let mut meta = self.meta.write();
        meta.mtime = now;
        meta.ctime = now;
    }

    pub fn stat(&self) -> Stat {
        let meta = self.meta.read();
        let blksize = meta
            .sb
            .upgrade()
            .map(|sb| sb.blocksize())
            .unwrap_or(0);
        Stat {
            st_dev: 0,
            st_ino: meta.ino,
            st_mode: meta.mode.0 as u32,
            st_nlink: meta.nlink,
            st_uid: meta.uid,
            st_gid: meta.gid,
            st_rdev: meta.rdev.0 as u64,
            st_size: meta.size,
            st_blksize: blksize,
            st_blocks: meta.blocks,
            st_atime: meta.atime,
            st_mtime: meta.mtime,
            st_ctime: meta.ctime,
        }
    }
}

/// Filesystem node containing a generic [`Inode`]
pub trait FsInode: Send + Sync + 'static {
    fn vfs_inode(&self) -> &Inode;

    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a filesystem node
///
/// Cloning the handle does not take an inode reference; the inode reference
/// count is managed explicitly with [`ihold`] and [`iput`].
#[derive(Clone)]
pub struct InodeRef {
    node: Arc<dyn FsInode>,
    generation: u32,
}

impl InodeRef {
    /// Downcast to the filesystem's node type
    pub fn fs_node<T: FsInode>(&self) -> Option<&T> {
        self.node.as_any().downcast_ref::<T>()
    }

    /// Same underlying node
    pub fn ptr_eq(&self, other: &InodeRef) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// The node was released and possibly reused since this handle was made
    pub fn is_stale(&self) -> bool {
        self.generation != self.node.vfs_inode().generation()
    }

    /// Strong handles to the node's memory block, including this one
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.node)
    }
}

impl Deref for InodeRef {
    type Target = Inode;

    fn deref(&self) -> &Inode {
        self.node.vfs_inode()
    }
}

impl fmt::Debug for InodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InodeRef")
            .field("ino", &self.ino())
            .field("mode", &self.mode())
            .field("ops", &self.ops())
            .finish()
    }
}

/// Reset an inode for a new lifetime in `sb`
///
/// Bumps the generation, so handles from the previous lifetime become stale.
fn inode_init_always(sb: &Arc<SuperBlock>, s_op: Arc<dyn SuperOperations>, inode: &Inode) {
    inode.i_generation.fetch_add(1, Ordering::AcqRel);
    inode.i_count.store(1, Ordering::Release);
    inode.i_mapping.reset();
    let mut meta = inode.meta.write();
    *meta = InodeMeta::blank();
    meta.ino = sb.next_ino();
    meta.nlink = 1;
    meta.sb = Arc::downgrade(sb);
    meta.s_op = Some(s_op);
}

/// Allocate a new inode for `sb` through its `alloc_inode` hook
///
/// The caller owns the single reference and must either hand it to a dentry
/// or drop it with [`iput`].
pub fn new_inode(sb: &Arc<SuperBlock>) -> FsResult<InodeRef> {
    let s_op = sb.s_op()?;
    let node = s_op.alloc_inode(sb)?;
    inode_init_always(sb, s_op, node.vfs_inode());
    let generation = node.vfs_inode().generation();
    Ok(InodeRef { node, generation })
}

/// Take an additional inode reference
pub fn ihold(inode: &InodeRef) {
    inode.i_count.fetch_add(1, Ordering::AcqRel);
}

/// Drop an inode reference, destroying the inode when it was the last
pub fn iput(inode: InodeRef) {
    let prev = inode
        .i_count
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    match prev {
        Ok(1) => evict(inode),
        Ok(_) => {}
        Err(_) => log::error!("[VFS] iput on inode {} with zero references", inode.ino()),
    }
}

fn evict(inode: InodeRef) {
    inode.i_mapping.truncate_pages();
    let s_op = {
        let mut meta = inode.meta.write();
        meta.ops = InodeOps::Unset;
        meta.s_op.take()
    };
    match s_op {
        Some(s_op) => s_op.destroy_inode(inode),
        None => log::error!("[VFS] Inode {} evicted twice", inode.ino()),
    }
}

/// Increment the link count
pub fn inc_nlink(inode: &Inode) {
    inode.meta.write().nlink += 1;
}

/// Decrement the link count, warning instead of underflowing
pub fn drop_nlink(inode: &Inode) {
    let mut meta = inode.meta.write();
    match meta.nlink.checked_sub(1) {
        Some(n) => meta.nlink = n,
        None => log::warn!("[VFS] drop_nlink underflow on inode {}", meta.ino),
    }
}

/// Record that `inode` has changes writeback should pick up
pub fn mark_inode_dirty(inode: &Inode) {
    if let Ok(sb) = inode.sb() {
        sb.mark_dirty();
    }
}
