//! Path Resolution
//!
//! This module implements path resolution with symlink loop detection.
//! It handles absolute and relative paths and "." and ".." components,
//! walking the dentry tree of a single mounted instance.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::dentry::Dentry;
use super::inode::{FsError, FsResult};
use super::namei;
use crate::config::{MAX_SYMLINK_HOPS, NAME_MAX, PATH_MAX};

/// Path resolution context
pub struct PathResolver {
    /// Current working directory (for relative paths)
    cwd: Arc<Dentry>,
    /// Root directory (for absolute paths)
    root: Arc<Dentry>,
    /// Symlink hop counter
    symlink_hops: usize,
}

impl PathResolver {
    pub fn new(cwd: Arc<Dentry>, root: Arc<Dentry>) -> Self {
        Self {
            cwd,
            root,
            symlink_hops: 0,
        }
    }

    /// Resolver rooted at `root` with `root` as working directory
    pub fn at_root(root: Arc<Dentry>) -> Self {
        Self::new(root.clone(), root)
    }

    /// Resolve a path to a positive dentry
    ///
    /// Intermediate symlinks are always followed; the final component only
    /// when `follow_final_symlink` is set.
    pub fn resolve(&mut self, path: &str, follow_final_symlink: bool) -> FsResult<Arc<Dentry>> {
        let start = self.start_of(path)?;
        self.walk(start, path, follow_final_symlink)
    }

    /// Resolve all but the last component of `path`
    ///
    /// Returns the parent directory and the final name, for callers that are
    /// about to create or remove that name.
    pub fn resolve_parent(&mut self, path: &str) -> FsResult<(Arc<Dentry>, String)> {
        let start = self.start_of(path)?;
        let trimmed = path.trim_end_matches('/');
        let (dir_path, name) = match trimmed.rfind('/') {
            Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
            None => ("", trimmed),
        };
        if name.is_empty() || name == "." || name == ".." {
            return Err(FsError::InvalidArgument);
        }
        if name.len() > NAME_MAX {
            return Err(FsError::NameTooLong);
        }
        let parent = self.walk(start, dir_path, true)?;
        Ok((parent, String::from(name)))
    }

    fn start_of(&self, path: &str) -> FsResult<Arc<Dentry>> {
        if path.len() > PATH_MAX {
            return Err(FsError::NameTooLong);
        }
        if path.contains('\0') {
            return Err(FsError::InvalidArgument);
        }
        Ok(if path.starts_with('/') {
            self.root.clone()
        } else {
            self.cwd.clone()
        })
    }

    fn walk(
        &mut self,
        start: Arc<Dentry>,
        path: &str,
        follow_final: bool,
    ) -> FsResult<Arc<Dentry>> {
        let components: Vec<&str> = path
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .collect();

        let mut current = start;
        for (i, component) in components.iter().enumerate() {
            let is_last = i + 1 == components.len();

            if component.len() > NAME_MAX {
                return Err(FsError::NameTooLong);
            }

            if *component == ".." {
                current = self.resolve_parent_dir(&current);
                continue;
            }

            let next = namei::lookup(&current, component)?;
            let Some(inode) = next.inode() else {
                return Err(FsError::NotFound);
            };

            if inode.mode().is_symlink() && (!is_last || follow_final) {
                self.symlink_hops += 1;
                if self.symlink_hops > MAX_SYMLINK_HOPS {
                    return Err(FsError::TooManySymlinks);
                }
                let target = namei::vfs_readlink(&next)?;
                let base = if target.starts_with('/') {
                    self.root.clone()
                } else {
                    current.clone()
                };
                current = self.walk(base, &target, true)?;
                continue;
            }

            if !is_last && !inode.mode().is_dir() {
                return Err(FsError::NotDirectory);
            }
            current = next;
        }

        Ok(current)
    }

    /// ".." of `dir`, never leaving the resolver's root
    fn resolve_parent_dir(&self, dir: &Arc<Dentry>) -> Arc<Dentry> {
        if Arc::ptr_eq(dir, &self.root) {
            return dir.clone();
        }
        dir.parent().unwrap_or_else(|| dir.clone())
    }
}

/// Resolve `path` from `root`, following every symlink
pub fn resolve_path(root: &Arc<Dentry>, path: &str) -> FsResult<Arc<Dentry>> {
    PathResolver::at_root(root.clone()).resolve(path, true)
}

/// Resolve `path` from `root` without following a final symlink
pub fn resolve_path_nofollow(root: &Arc<Dentry>, path: &str) -> FsResult<Arc<Dentry>> {
    PathResolver::at_root(root.clone()).resolve(path, false)
}
