//! Translation of namespace metadata into the daemon's stat record

use std::time::{SystemTime, UNIX_EPOCH};

use crate::handle_cache::Handle;
use crate::namespace::FileInfo;

/// File type bit: directory
pub const S_IFDIR: u32 = 0o040000;
/// File type bit: regular file
pub const S_IFREG: u32 = 0o100000;

/// Device number reported for every object in the export.
pub const EXPORT_DEV: u32 = 1;

/// Fixed-layout stat record consumed by the NFS daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrRecord {
    /// Always [`EXPORT_DEV`]
    pub dev: u32,
    /// Inode number, always the object's handle
    pub ino: u64,
    /// Length in bytes
    pub size: u64,
    /// Seconds since the Unix epoch
    pub atime: i64,
    pub mtime: i64,
    /// Mirrors `mtime`
    pub ctime: i64,
    /// Permission bits combined with `S_IFDIR` or `S_IFREG`
    pub mode: u32,
}

impl AttrRecord {
    /// True when the mode carries the directory type bit.
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFDIR != 0
    }
}

fn unix_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Builds the stat record for `info`, using `handle` as the inode number.
///
/// The access time is the time of translation; backends are not asked for
/// one.
pub fn translate(info: &FileInfo, handle: Handle) -> AttrRecord {
    let mtime = unix_secs(info.mtime);
    let kind = if info.is_dir { S_IFDIR } else { S_IFREG };
    AttrRecord {
        dev: EXPORT_DEV,
        ino: handle,
        size: info.size,
        atime: unix_secs(SystemTime::now()),
        mtime,
        ctime: mtime,
        mode: info.mode | kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn info(is_dir: bool, mode: u32) -> FileInfo {
        FileInfo {
            name: "f".to_string(),
            size: 1234,
            mode,
            mtime: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            is_dir,
        }
    }

    #[test]
    fn test_regular_file() {
        let rec = translate(&info(false, 0o644), 150);
        assert_eq!(rec.ino, 150);
        assert_eq!(rec.dev, 1);
        assert_eq!(rec.size, 1234);
        assert_eq!(rec.mode, 0o100644);
        assert!(!rec.is_dir());
    }

    #[test]
    fn test_directory_mode_bit() {
        let rec = translate(&info(true, 0o755), 101);
        assert_eq!(rec.mode, 0o040755);
        assert!(rec.is_dir());
    }

    #[test]
    fn test_times() {
        let before = unix_secs(SystemTime::now());
        let rec = translate(&info(false, 0o600), 200);
        assert_eq!(rec.mtime, 1_700_000_000);
        assert_eq!(rec.ctime, rec.mtime);
        assert!(rec.atime >= before);
    }

    #[test]
    fn test_pre_epoch_mtime_clamps() {
        let mut fi = info(false, 0o600);
        fi.mtime = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(translate(&fi, 300).mtime, 0);
    }
}
