//! Filesystem Type Registry
//!
//! This module manages registration and lookup of filesystem types.

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::RwLock;

use super::inode::{FsError, FsResult};
use super::superblock::FsType;

/// Set of registered filesystem types, keyed by name
pub struct FsRegistry {
    types: RwLock<Vec<Arc<dyn FsType>>>,
}

impl FsRegistry {
    pub const fn new() -> Self {
        Self {
            types: RwLock::new(Vec::new()),
        }
    }

    /// Register a filesystem type
    pub fn register(&self, fs_type: Arc<dyn FsType>) -> FsResult<()> {
        let mut types = self.types.write();

        if types.iter().any(|existing| existing.name() == fs_type.name()) {
            log::warn!("[VFS] Filesystem type '{}' already registered", fs_type.name());
            return Err(FsError::AlreadyExists);
        }

        log::info!("[VFS] Registered filesystem type '{}'", fs_type.name());
        types.push(fs_type);
        Ok(())
    }

    /// Remove a filesystem type, returning it
    pub fn unregister(&self, name: &str) -> FsResult<Arc<dyn FsType>> {
        let mut types = self.types.write();
        let pos = types
            .iter()
            .position(|fs_type| fs_type.name() == name)
            .ok_or(FsError::NotFound)?;
        log::info!("[VFS] Unregistered filesystem type '{}'", name);
        Ok(types.remove(pos))
    }

    /// Lookup a filesystem type by name
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn FsType>> {
        self.types
            .read()
            .iter()
            .find(|fs_type| fs_type.name() == name)
            .cloned()
    }

    /// List all registered filesystem types
    pub fn list(&self) -> Vec<Arc<dyn FsType>> {
        self.types.read().clone()
    }
}

impl Default for FsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global filesystem type registry
static FS_REGISTRY: FsRegistry = FsRegistry::new();

pub fn fs_registry() -> &'static FsRegistry {
    &FS_REGISTRY
}

/// Register a filesystem type
pub fn register_filesystem(fs_type: Arc<dyn FsType>) -> FsResult<()> {
    FS_REGISTRY.register(fs_type)
}

/// Unregister a filesystem type by name
pub fn unregister_filesystem(name: &str) -> FsResult<Arc<dyn FsType>> {
    FS_REGISTRY.unregister(name)
}

/// Lookup a filesystem type by name
pub fn lookup_filesystem(name: &str) -> Option<Arc<dyn FsType>> {
    FS_REGISTRY.lookup(name)
}

/// List all registered filesystem types
pub fn list_filesystems() -> Vec<Arc<dyn FsType>> {
    FS_REGISTRY.list()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::block_dev::BlockDevice;
    use crate::fs::vfs::superblock::{MountOpts, SuperBlock};

    struct NamedFs(&'static str);

    impl FsType for NamedFs {
        fn name(&self) -> &'static str {
            self.0
        }

        fn mount(
            &self,
            _dev: Option<Arc<dyn BlockDevice>>,
            _opts: MountOpts,
        ) -> FsResult<Arc<SuperBlock>> {
            Err(FsError::NotSupported)
        }

        fn kill_sb(&self, _sb: &Arc<SuperBlock>) -> FsResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = FsRegistry::new();
        registry.register(Arc::new(NamedFs("a"))).unwrap();
        assert_eq!(
            registry.register(Arc::new(NamedFs("a"))).err(),
            Some(FsError::AlreadyExists)
        );
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_unregister_then_lookup() {
        let registry = FsRegistry::new();
        registry.register(Arc::new(NamedFs("a"))).unwrap();
        registry.register(Arc::new(NamedFs("b"))).unwrap();
        assert!(registry.lookup("a").is_some());
        registry.unregister("a").unwrap();
        assert!(registry.lookup("a").is_none());
        assert!(registry.lookup("b").is_some());
        assert_eq!(registry.unregister("a").err(), Some(FsError::NotFound));
    }
}
