//! Path-addressed storage backend interface and an in-memory implementation.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::SystemTime;

pub use crate::error::NamespaceError;
use crate::path;

/// Result type for namespace backend calls.
pub type NsResult<T> = std::result::Result<T, NamespaceError>;

/// Generic metadata for one namespace object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Final path component
    pub name: String,
    /// Length in bytes
    pub size: u64,
    /// Permission bits (no file-type bits)
    pub mode: u32,
    /// Last modification time
    pub mtime: SystemTime,
    /// True for directories
    pub is_dir: bool,
}

/// A single attribute update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetAttr {
    /// Replace the permission bits
    Mode(u32),
    /// Truncate or extend to this length
    Size(u64),
    /// Set the modification time
    ModTime(SystemTime),
}

/// Storage backend addressed by rooted, normalized paths.
///
/// Implementations must return [`Namespace::list`] results in a stable order
/// for an unchanged directory so that READDIR cookies stay meaningful.
pub trait Namespace: Send + Sync {
    /// Metadata of one object.
    fn stat(&self, path: &str) -> NsResult<FileInfo>;
    /// Children of a directory.
    fn list(&self, path: &str) -> NsResult<Vec<FileInfo>>;
    /// Creates an empty regular file; fails if the name exists.
    fn create_file(&self, path: &str) -> NsResult<()>;
    /// Creates a directory.
    fn create_dir(&self, path: &str) -> NsResult<()>;
    /// Removes a file or an empty directory.
    fn remove(&self, path: &str) -> NsResult<()>;
    /// Moves an object, with its subtree, to a new path.
    fn rename(&self, from: &str, to: &str) -> NsResult<()>;
    /// Applies one attribute change.
    fn set_attr(&self, path: &str, attr: SetAttr) -> NsResult<()>;
    /// Reads into `buf` starting at `offset`. A short read reports
    /// [`NamespaceError::Eof`] carrying the bytes copied.
    fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> NsResult<usize>;
    /// Writes all of `buf` at `offset`, extending the file as needed.
    fn write(&self, path: &str, buf: &[u8], offset: u64) -> NsResult<usize>;
}

#[derive(Debug, Clone)]
enum NodeKind {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    mode: u32,
    mtime: SystemTime,
}

impl Node {
    fn new_dir() -> Self {
        Self {
            kind: NodeKind::Dir,
            mode: 0o755,
            mtime: SystemTime::now(),
        }
    }

    fn new_file() -> Self {
        Self {
            kind: NodeKind::File(Vec::new()),
            mode: 0o644,
            mtime: SystemTime::now(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }

    fn info(&self, path: &str) -> FileInfo {
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let size = match &self.kind {
            NodeKind::Dir => 4096,
            NodeKind::File(data) => data.len() as u64,
        };
        FileInfo {
            name,
            size,
            mode: self.mode,
            mtime: self.mtime,
            is_dir: self.is_dir(),
        }
    }
}

/// Largest file [`MemNamespace`] will hold.
pub const MEM_MAX_FILE_SIZE: u64 = 1 << 30;

/// Converts a client-supplied file length into a buffer length, refusing
/// anything past [`MEM_MAX_FILE_SIZE`].
fn checked_len(len: u64) -> NsResult<usize> {
    if len > MEM_MAX_FILE_SIZE {
        return Err(NamespaceError::InvalidArgument);
    }
    usize::try_from(len).map_err(|_| NamespaceError::InvalidArgument)
}

fn parent_of(p: &str) -> &str {
    match p.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &p[..idx],
    }
}

fn is_descendant(p: &str, dir: &str) -> bool {
    if dir == "/" {
        return p != "/";
    }
    p.len() > dir.len() && p.starts_with(dir) && p.as_bytes()[dir.len()] == b'/'
}

/// In-memory namespace keyed by normalized path. Listings come back in
/// lexical name order.
pub struct MemNamespace {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl MemNamespace {
    /// Creates a namespace holding only the root directory.
    pub fn new() -> Self {
        let nodes: BTreeMap<String, Node> = [("/".to_string(), Node::new_dir())].into();
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    fn insert_node(&self, p: &str, node: Node) -> NsResult<()> {
        let p = path::clean(p);
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        if nodes.contains_key(&p) {
            return Err(NamespaceError::AlreadyExists);
        }
        match nodes.get_mut(parent_of(&p)) {
            Some(parent) if parent.is_dir() => parent.mtime = SystemTime::now(),
            Some(_) => return Err(NamespaceError::InvalidArgument),
            None => return Err(NamespaceError::NotFound),
        }
        nodes.insert(p, node);
        Ok(())
    }
}

impl Default for MemNamespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace for MemNamespace {
    fn stat(&self, p: &str) -> NsResult<FileInfo> {
        let p = path::clean(p);
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes
            .get(&p)
            .map(|n| n.info(&p))
            .ok_or(NamespaceError::NotFound)
    }

    fn list(&self, p: &str) -> NsResult<Vec<FileInfo>> {
        let p = path::clean(p);
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        let dir = nodes.get(&p).ok_or(NamespaceError::NotFound)?;
        if !dir.is_dir() {
            return Err(NamespaceError::InvalidArgument);
        }
        Ok(nodes
            .iter()
            .filter(|(k, _)| k.as_str() != "/" && parent_of(k) == p)
            .map(|(k, n)| n.info(k))
            .collect())
    }

    fn create_file(&self, p: &str) -> NsResult<()> {
        self.insert_node(p, Node::new_file())
    }

    fn create_dir(&self, p: &str) -> NsResult<()> {
        self.insert_node(p, Node::new_dir())
    }

    fn remove(&self, p: &str) -> NsResult<()> {
        let p = path::clean(p);
        if p == "/" {
            return Err(NamespaceError::PermissionDenied);
        }
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        if !nodes.contains_key(&p) {
            return Err(NamespaceError::NotFound);
        }
        if nodes.keys().any(|k| is_descendant(k, &p)) {
            return Err(NamespaceError::Other("directory not empty".to_string()));
        }
        nodes.remove(&p);
        if let Some(parent) = nodes.get_mut(parent_of(&p)) {
            parent.mtime = SystemTime::now();
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> NsResult<()> {
        let from = path::clean(from);
        let to = path::clean(to);
        if from == "/" || is_descendant(&to, &from) {
            return Err(NamespaceError::InvalidArgument);
        }
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        let src_is_dir = nodes.get(&from).ok_or(NamespaceError::NotFound)?.is_dir();
        if from == to {
            return Ok(());
        }
        match nodes.get(parent_of(&to)) {
            Some(parent) if parent.is_dir() => {}
            Some(_) => return Err(NamespaceError::InvalidArgument),
            None => return Err(NamespaceError::NotFound),
        }
        if let Some(existing) = nodes.get(&to) {
            if existing.is_dir() != src_is_dir {
                return Err(NamespaceError::InvalidArgument);
            }
            if nodes.keys().any(|k| is_descendant(k, &to)) {
                return Err(NamespaceError::Other("directory not empty".to_string()));
            }
            nodes.remove(&to);
        }

        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| k.as_str() == from || is_descendant(k, &from))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = nodes.remove(&key) {
                let rebased = format!("{}{}", to, &key[from.len()..]);
                nodes.insert(rebased, node);
            }
        }
        Ok(())
    }

    fn set_attr(&self, p: &str, attr: SetAttr) -> NsResult<()> {
        let p = path::clean(p);
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        let node = nodes.get_mut(&p).ok_or(NamespaceError::NotFound)?;
        match attr {
            SetAttr::Mode(mode) => node.mode = mode & 0o7777,
            SetAttr::Size(size) => match &mut node.kind {
                NodeKind::File(data) => {
                    data.resize(checked_len(size)?, 0);
                    node.mtime = SystemTime::now();
                }
                NodeKind::Dir => return Err(NamespaceError::InvalidArgument),
            },
            SetAttr::ModTime(t) => node.mtime = t,
        }
        Ok(())
    }

    fn read(&self, p: &str, buf: &mut [u8], offset: u64) -> NsResult<usize> {
        let p = path::clean(p);
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        let node = nodes.get(&p).ok_or(NamespaceError::NotFound)?;
        let data = match &node.kind {
            NodeKind::File(data) => data,
            NodeKind::Dir => return Err(NamespaceError::InvalidArgument),
        };
        let start = usize::try_from(offset).map_or(data.len(), |o| o.min(data.len()));
        let n = (data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&data[start..start + n]);
        if n < buf.len() {
            return Err(NamespaceError::Eof { transferred: n });
        }
        Ok(n)
    }

    fn write(&self, p: &str, buf: &[u8], offset: u64) -> NsResult<usize> {
        let p = path::clean(p);
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        let node = nodes.get_mut(&p).ok_or(NamespaceError::NotFound)?;
        let data = match &mut node.kind {
            NodeKind::File(data) => data,
            NodeKind::Dir => return Err(NamespaceError::InvalidArgument),
        };
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(NamespaceError::InvalidArgument)?;
        let end = checked_len(end)?;
        let start = end - buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        node.mtime = SystemTime::now();
        Ok(buf.len())
    }
}
