//! NFS daemon request handlers
//!
//! Each handler takes the primitive arguments the daemon passes, normalizes
//! paths, calls the namespace backend and returns a protocol status. Errors
//! never escape as panics: an unrecognized backend failure is logged with
//! the operation context and reported as `NFS3ERR_IO`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::attr::{self, AttrRecord};
use crate::config::DEFAULT_MAX_NAME_LEN;
use crate::error::{
    translate, NamespaceError, NFS3ERR_INVAL, NFS3ERR_ISDIR, NFS3ERR_NOTDIR, NFS3_OK,
};
use crate::handle_cache::{Handle, HandleCache};
use crate::mount::{self, MountPolicy};
use crate::namespace::{Namespace, SetAttr};
use crate::path;
use crate::readdir::{self, DirentBuffers, ReaddirArgs};

/// Returned by [`Bridge::readdir`] when the listing did not fit and the
/// daemon should call again from the last cookie.
pub const READDIR_INCOMPLETE: i32 = -1;

/// Returned by [`Bridge::unsupported`].
pub const UNSUPPORTED: i32 = -1;

/// Logs an unrecognized failure and returns the translated status.
macro_rules! status_of {
    ($err:expr, $($ctx:tt)+) => {{
        let err: Option<&NamespaceError> = $err;
        let (status, known) = translate(err);
        if !known {
            if let Some(e) = err {
                tracing::warn!(error = %e, $($ctx)+);
            }
        }
        status
    }};
}

/// Request handlers for one export.
///
/// The handle cache is shared so several bridges (or worker threads holding
/// clones of one bridge) hand out consistent handles.
pub struct Bridge<N: Namespace> {
    ns: Arc<N>,
    handles: Arc<HandleCache>,
    policy: Arc<dyn MountPolicy>,
    max_name_len: usize,
}

impl<N: Namespace> Clone for Bridge<N> {
    fn clone(&self) -> Self {
        Self {
            ns: Arc::clone(&self.ns),
            handles: Arc::clone(&self.handles),
            policy: Arc::clone(&self.policy),
            max_name_len: self.max_name_len,
        }
    }
}

impl<N: Namespace> Bridge<N> {
    /// Builds handlers over `ns`, handing out handles from `handles` and
    /// admitting mounts through `policy`.
    pub fn new(ns: Arc<N>, handles: Arc<HandleCache>, policy: Arc<dyn MountPolicy>) -> Self {
        tracing::info!("nsbridge request handlers initialized");
        Self {
            ns,
            handles,
            policy,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }

    /// Caps the READDIR name slot the daemon may ask for.
    pub fn with_max_name_len(mut self, max_name_len: usize) -> Self {
        self.max_name_len = max_name_len;
        self
    }

    /// Shared handle cache.
    pub fn handles(&self) -> &HandleCache {
        &self.handles
    }

    /// Backend the handlers operate on.
    pub fn namespace(&self) -> &N {
        &self.ns
    }

    /// Releases the bridge. Handles are never persisted, so this only
    /// reports what the cache accumulated.
    pub fn shutdown(self) {
        tracing::info!(cached_handles = self.handles.len(), "nsbridge shutting down");
    }

    /// Admits or refuses a mount of `raw_path` by the client at `addr`.
    pub fn accept_mount(&self, addr: u32, raw_path: &str) -> u32 {
        mount::accept_mount(self.policy.as_ref(), addr, raw_path)
    }

    /// Resolves a handle back to the path the daemon should operate on.
    pub fn path_of(&self, handle: Handle) -> Option<String> {
        match self.handles.resolve(handle) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(handle, cached = self.handles.len(), error = %e, "fgetpath failed");
                None
            }
        }
    }

    /// Packs a page of `raw_path`'s listing into the daemon's buffers.
    ///
    /// Returns `NFS3_OK` once the listing is exhausted, `READDIR_INCOMPLETE`
    /// when more entries remain, or an NFS status on failure. A name slot
    /// wider than the configured maximum is refused with `NFS3ERR_INVAL`.
    pub fn readdir(&self, raw_path: &str, args: &ReaddirArgs, bufs: &mut DirentBuffers<'_>) -> i32 {
        let dir = path::clean(raw_path);
        if args.max_name_len > self.max_name_len {
            bufs.names.fill(0);
            bufs.entries.fill(0);
            tracing::warn!(
                path = %dir,
                requested = args.max_name_len,
                limit = self.max_name_len,
                "readdir_full: name slot exceeds configured maximum"
            );
            return NFS3ERR_INVAL as i32;
        }
        let listing = match self.ns.list(&dir) {
            Ok(l) => l,
            Err(e) => {
                bufs.names.fill(0);
                bufs.entries.fill(0);
                return status_of!(Some(&e), path = %dir, "readdir_full: list failed") as i32;
            }
        };
        let names: Vec<&str> = listing.iter().map(|fi| fi.name.as_str()).collect();

        match readdir::marshal(&dir, &names, &self.handles, args, bufs) {
            Ok(outcome) if outcome.eof => NFS3_OK as i32,
            Ok(_) => READDIR_INCOMPLETE,
            Err(e) => {
                tracing::warn!(path = %dir, cookie = args.start_cookie, error = %e, "readdir_full failed");
                e.nfs3_status() as i32
            }
        }
    }

    /// Attributes of `raw_path`, registering its handle on success.
    pub fn lstat(&self, raw_path: &str) -> (u32, Option<AttrRecord>) {
        self.stat_with("lstat", raw_path)
    }

    /// Same as [`Bridge::lstat`]; the backend has nothing to flush.
    pub fn sync(&self, raw_path: &str) -> (u32, Option<AttrRecord>) {
        self.stat_with("sync", raw_path)
    }

    fn stat_with(&self, op: &'static str, raw_path: &str) -> (u32, Option<AttrRecord>) {
        let p = path::clean(raw_path);
        match self.ns.stat(&p) {
            Ok(info) => {
                let handle = self.handles.allocate(&p);
                (NFS3_OK, Some(attr::translate(&info, handle)))
            }
            Err(e) => (status_of!(Some(&e), op, path = %p, "stat failed"), None),
        }
    }

    /// Replaces the permission bits.
    pub fn chmod(&self, raw_path: &str, mode: u32) -> u32 {
        let p = path::clean(raw_path);
        let res = self.ns.set_attr(&p, SetAttr::Mode(mode));
        status_of!(res.as_ref().err(), path = %p, mode = format_args!("{:o}", mode), "chmod failed")
    }

    /// Truncates or extends to `size` bytes.
    pub fn truncate(&self, raw_path: &str, size: u64) -> u32 {
        let p = path::clean(raw_path);
        let res = self.ns.set_attr(&p, SetAttr::Size(size));
        status_of!(res.as_ref().err(), path = %p, size, "truncate failed")
    }

    /// Sets the modification time, given in seconds since the Unix epoch.
    pub fn set_mtime(&self, raw_path: &str, secs: u32) -> u32 {
        let p = path::clean(raw_path);
        let mtime: SystemTime = UNIX_EPOCH + Duration::from_secs(secs as u64);
        let res = self.ns.set_attr(&p, SetAttr::ModTime(mtime));
        status_of!(res.as_ref().err(), path = %p, secs, "set modtime failed")
    }

    /// Renames in the backend, then moves the cached handles so clients
    /// holding them keep reaching the same objects.
    pub fn rename(&self, raw_old: &str, raw_new: &str) -> u32 {
        let old = path::clean(raw_old);
        let new = path::clean(raw_new);

        let info = match self.ns.stat(&old) {
            Ok(info) => info,
            Err(e) => return status_of!(Some(&e), from = %old, "rename: stat failed"),
        };
        if let Err(e) = self.ns.rename(&old, &new) {
            return status_of!(Some(&e), from = %old, to = %new, "rename: move failed");
        }
        self.handles.rename(&old, &new, info.is_dir);
        NFS3_OK
    }

    /// Creates an empty file and applies `mode`. Fails if the name exists.
    pub fn create(&self, raw_path: &str, mode: u32) -> u32 {
        let p = path::clean(raw_path);
        if let Err(e) = self.ns.create_file(&p) {
            return status_of!(Some(&e), path = %p, "create failed");
        }
        self.apply_create_mode("create", &p, mode)
    }

    /// Creates `raw_path`, replacing an existing regular file.
    pub fn create_over(&self, raw_path: &str, mode: u32) -> u32 {
        let p = path::clean(raw_path);
        if let Ok(existing) = self.ns.stat(&p) {
            if existing.is_dir {
                tracing::warn!(path = %p, "createover: name of a pre-existing directory");
                return NFS3ERR_ISDIR;
            }
            if let Err(e) = self.ns.remove(&p) {
                return status_of!(Some(&e), path = %p, "createover: remove failed");
            }
        }
        if let Err(e) = self.ns.create_file(&p) {
            return status_of!(Some(&e), path = %p, "createover: create failed");
        }
        self.apply_create_mode("createover", &p, mode)
    }

    fn apply_create_mode(&self, op: &'static str, p: &str, mode: u32) -> u32 {
        let res = self.ns.set_attr(p, SetAttr::Mode(mode));
        status_of!(res.as_ref().err(), op, path = %p, mode = format_args!("{:o}", mode), "setmode after create failed")
    }

    /// Removes a regular file. Directories are refused with `NFS3ERR_ISDIR`.
    pub fn remove(&self, raw_path: &str) -> u32 {
        self.remove_kind(raw_path, false)
    }

    /// Removes an empty directory. Files are refused with `NFS3ERR_NOTDIR`.
    pub fn rmdir(&self, raw_path: &str) -> u32 {
        self.remove_kind(raw_path, true)
    }

    fn remove_kind(&self, raw_path: &str, want_dir: bool) -> u32 {
        let p = path::clean(raw_path);
        let info = match self.ns.stat(&p) {
            Ok(info) => info,
            Err(e) => return status_of!(Some(&e), path = %p, want_dir, "remove: stat failed"),
        };
        match (info.is_dir, want_dir) {
            (true, false) => return NFS3ERR_ISDIR,
            (false, true) => return NFS3ERR_NOTDIR,
            _ => {}
        }
        let res = self.ns.remove(&p);
        status_of!(res.as_ref().err(), path = %p, want_dir, "remove failed")
    }

    /// Creates a directory. The backend picks the directory's permissions;
    /// `mode` is recorded in the log only.
    pub fn mkdir(&self, raw_path: &str, mode: u32) -> u32 {
        let p = path::clean(raw_path);
        let res = self.ns.create_dir(&p);
        status_of!(res.as_ref().err(), path = %p, mode = format_args!("{:o}", mode), "mkdir failed")
    }

    /// Reads into `buf` at `offset`. Returns the byte count, or the negated
    /// NFS status on failure. Hitting end of file is a short read, not an
    /// error.
    pub fn pread(&self, raw_path: &str, buf: &mut [u8], offset: u64) -> i32 {
        let p = path::clean(raw_path);
        let count = buf.len();
        match self.ns.read(&p, buf, offset) {
            Ok(n) | Err(NamespaceError::Eof { transferred: n }) => byte_count(n),
            Err(e) => -(status_of!(Some(&e), path = %p, offset, count, "pread failed") as i32),
        }
    }

    /// Writes `buf` at `offset`. Returns the byte count, or the negated NFS
    /// status on failure.
    pub fn pwrite(&self, raw_path: &str, buf: &[u8], offset: u64) -> i32 {
        let p = path::clean(raw_path);
        let count = buf.len();
        match self.ns.write(&p, buf, offset) {
            Ok(n) | Err(NamespaceError::Eof { transferred: n }) => byte_count(n),
            Err(e) => -(status_of!(Some(&e), path = %p, offset, count, "pwrite failed") as i32),
        }
    }

    /// Placeholder for daemon procedures the bridge does not implement.
    pub fn unsupported(&self, name: &str) -> i32 {
        tracing::warn!(operation = name, "unsupported command");
        UNSUPPORTED
    }
}

/// Transfer count as the daemon's signed return value. Counts past
/// `i32::MAX` saturate so they never read as a negated status.
fn byte_count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
