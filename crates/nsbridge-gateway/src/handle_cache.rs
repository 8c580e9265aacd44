//! Bidirectional path <-> handle registry.
//!
//! NFS clients address objects by numeric handle while the namespace backend
//! addresses them by path. Handles are handed out lazily on first reference
//! and follow their object across renames, including renames of an ancestor
//! directory.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{GatewayError, Result};

/// Numeric handle a protocol client uses in place of a path.
pub type Handle = u64;

/// Handles below this value are reserved and never resolve.
pub const FIRST_VALID_HANDLE: Handle = 100;

#[derive(Debug)]
struct Maps {
    by_path: HashMap<String, Handle>,
    by_handle: HashMap<Handle, String>,
    counter: Handle,
}

impl Maps {
    fn insert(&mut self, path: String, handle: Handle) {
        self.by_handle.insert(handle, path.clone());
        self.by_path.insert(path, handle);
    }

    fn next_handle(&mut self) -> Handle {
        self.counter += 1;
        self.counter
    }
}

/// Path <-> handle bijection shared by every request handler.
///
/// Entries are never evicted: a handle stays bound to its object for the
/// lifetime of the cache, even after the object is removed from the backend.
#[derive(Debug)]
pub struct HandleCache {
    maps: RwLock<Maps>,
}

impl HandleCache {
    /// Creates an empty cache. The first allocated handle is
    /// `FIRST_VALID_HANDLE + 1`.
    pub fn new() -> Self {
        Self {
            maps: RwLock::new(Maps {
                by_path: HashMap::new(),
                by_handle: HashMap::new(),
                counter: FIRST_VALID_HANDLE,
            }),
        }
    }

    /// Returns the handle for `path`, allocating one if the path is unseen.
    pub fn allocate(&self, path: &str) -> Handle {
        if let Some(handle) = self.lookup(path) {
            return handle;
        }

        // The shared-lock probe above may race with another allocator, so
        // the presence check is repeated under the exclusive lock.
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        if let Some(&handle) = maps.by_path.get(path) {
            return handle;
        }
        let handle = maps.next_handle();
        maps.insert(path.to_string(), handle);
        tracing::debug!(handle, path, "allocated handle");
        handle
    }

    /// Returns the handle already bound to `path`, without allocating.
    pub fn lookup(&self, path: &str) -> Option<Handle> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        maps.by_path.get(path).copied()
    }

    /// Resolves a handle back to its current path.
    pub fn resolve(&self, handle: Handle) -> Result<String> {
        if handle < FIRST_VALID_HANDLE {
            return Err(GatewayError::Nfs3NoEnt);
        }
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        maps.by_handle
            .get(&handle)
            .cloned()
            .ok_or(GatewayError::Nfs3NoEnt)
    }

    /// Moves `old_path`'s handle to `new_path`.
    ///
    /// When `is_dir` is set every cached descendant of `old_path` is rebased
    /// onto `new_path` as well. This scans the whole cache under the
    /// exclusive lock.
    pub fn rename(&self, old_path: &str, new_path: &str, is_dir: bool) {
        if old_path == new_path {
            return;
        }
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());

        // Whatever was cached at the destination has been replaced.
        if let Some(displaced) = maps.by_path.remove(new_path) {
            maps.by_handle.remove(&displaced);
        }

        let handle = match maps.by_path.remove(old_path) {
            Some(h) => h,
            None => maps.next_handle(),
        };
        maps.insert(new_path.to_string(), handle);

        if !is_dir {
            return;
        }

        let old_prefix = format!("{}/", old_path.trim_end_matches('/'));
        let new_prefix = format!("{}/", new_path.trim_end_matches('/'));
        let moved: Vec<(String, Handle)> = maps
            .by_path
            .iter()
            .filter(|(path, _)| path.starts_with(&old_prefix))
            .map(|(path, &h)| (path.clone(), h))
            .collect();

        for (path, _) in &moved {
            maps.by_path.remove(path);
        }
        for (path, h) in moved {
            let rebased = format!("{}{}", new_prefix, &path[old_prefix.len()..]);
            if let Some(displaced) = maps.by_path.remove(&rebased) {
                maps.by_handle.remove(&displaced);
            }
            maps.insert(rebased, h);
        }
        tracing::debug!(old_path, new_path, "rebased directory subtree in handle cache");
    }

    /// Number of cached paths.
    pub fn len(&self) -> usize {
        self.maps
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .by_path
            .len()
    }

    /// Returns true if no path has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleCache {
    fn default() -> Self {
        Self::new()
    }
}
