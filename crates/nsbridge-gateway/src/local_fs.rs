//! Namespace backed by a directory on the host filesystem

use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::{FileExt, PermissionsExt};
use std::path::PathBuf;

use crate::namespace::{FileInfo, Namespace, NamespaceError, NsResult, SetAttr};
use crate::path;

/// Serves the tree under `root`. Namespace paths are normalized before
/// being joined, so `..` can never climb above the root.
#[derive(Debug, Clone)]
pub struct LocalNamespace {
    root: PathBuf,
}

impl LocalNamespace {
    /// Exports the host directory `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn host_path(&self, p: &str) -> PathBuf {
        let mut out = self.root.clone();
        for part in path::components(p) {
            out.push(part);
        }
        out
    }
}

fn file_info(name: String, meta: &fs::Metadata) -> NsResult<FileInfo> {
    Ok(FileInfo {
        name,
        size: meta.len(),
        mode: meta.permissions().mode() & 0o7777,
        mtime: meta.modified()?,
        is_dir: meta.is_dir(),
    })
}

impl Namespace for LocalNamespace {
    fn stat(&self, p: &str) -> NsResult<FileInfo> {
        let host = self.host_path(p);
        let meta = fs::symlink_metadata(&host)?;
        let name = path::components(p).last().unwrap_or(&"").to_string();
        file_info(name, &meta)
    }

    fn list(&self, p: &str) -> NsResult<Vec<FileInfo>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(self.host_path(p))? {
            let entry = entry?;
            let name = entry
                .file_name()
                .into_string()
                .map_err(|raw| NamespaceError::Other(format!("non UTF-8 name: {:?}", raw)))?;
            out.push(file_info(name, &entry.metadata()?)?);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn create_file(&self, p: &str) -> NsResult<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.host_path(p))?;
        Ok(())
    }

    fn create_dir(&self, p: &str) -> NsResult<()> {
        fs::create_dir(self.host_path(p))?;
        Ok(())
    }

    fn remove(&self, p: &str) -> NsResult<()> {
        let host = self.host_path(p);
        if fs::symlink_metadata(&host)?.is_dir() {
            fs::remove_dir(&host)?;
        } else {
            fs::remove_file(&host)?;
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> NsResult<()> {
        fs::rename(self.host_path(from), self.host_path(to))?;
        Ok(())
    }

    fn set_attr(&self, p: &str, attr: SetAttr) -> NsResult<()> {
        let host = self.host_path(p);
        match attr {
            SetAttr::Mode(mode) => {
                fs::set_permissions(&host, fs::Permissions::from_mode(mode & 0o7777))?
            }
            SetAttr::Size(size) => OpenOptions::new().write(true).open(&host)?.set_len(size)?,
            SetAttr::ModTime(t) => File::open(&host)?.set_modified(t)?,
        }
        Ok(())
    }

    fn read(&self, p: &str, buf: &mut [u8], offset: u64) -> NsResult<usize> {
        let file = File::open(self.host_path(p))?;
        let mut done = 0;
        while done < buf.len() {
            match file.read_at(&mut buf[done..], offset.saturating_add(done as u64))? {
                0 => return Err(NamespaceError::Eof { transferred: done }),
                n => done += n,
            }
        }
        Ok(done)
    }

    fn write(&self, p: &str, buf: &[u8], offset: u64) -> NsResult<usize> {
        let file = OpenOptions::new().write(true).open(self.host_path(p))?;
        file.write_all_at(buf, offset)?;
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn setup() -> (tempfile::TempDir, LocalNamespace) {
        let dir = tempfile::tempdir().unwrap();
        let ns = LocalNamespace::new(dir.path());
        (dir, ns)
    }

    #[test]
    fn test_create_stat_list() {
        let (_dir, ns) = setup();
        ns.create_dir("/sub").unwrap();
        ns.create_file("/sub/b").unwrap();
        ns.create_file("/sub/a").unwrap();
        let names: Vec<String> = ns.list("/sub").unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(ns.stat("/sub").unwrap().is_dir);
        assert_eq!(ns.stat("/sub/a").unwrap().name, "a");
    }

    #[test]
    fn test_create_existing() {
        let (_dir, ns) = setup();
        ns.create_file("/f").unwrap();
        assert_eq!(ns.create_file("/f"), Err(NamespaceError::AlreadyExists));
    }

    #[test]
    fn test_missing() {
        let (_dir, ns) = setup();
        assert_eq!(ns.stat("/nope"), Err(NamespaceError::NotFound));
    }

    #[test]
    fn test_dotdot_stays_inside_root() {
        let (dir, ns) = setup();
        assert_eq!(ns.host_path("/../../etc/passwd"), dir.path().join("etc/passwd"));
    }

    #[test]
    fn test_read_write_eof() {
        let (_dir, ns) = setup();
        ns.create_file("/f").unwrap();
        assert_eq!(ns.write("/f", b"abcdef", 0).unwrap(), 6);
        let mut buf = [0u8; 4];
        assert_eq!(ns.read("/f", &mut buf, 1).unwrap(), 4);
        assert_eq!(&buf, b"bcde");
        let mut buf = [0u8; 4];
        assert_eq!(
            ns.read("/f", &mut buf, 4),
            Err(NamespaceError::Eof { transferred: 2 })
        );
    }

    #[test]
    fn test_set_attr() {
        let (_dir, ns) = setup();
        ns.create_file("/f").unwrap();
        ns.set_attr("/f", SetAttr::Mode(0o600)).unwrap();
        ns.set_attr("/f", SetAttr::Size(42)).unwrap();
        let t = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        ns.set_attr("/f", SetAttr::ModTime(t)).unwrap();
        let fi = ns.stat("/f").unwrap();
        assert_eq!(fi.mode, 0o600);
        assert_eq!(fi.size, 42);
        assert_eq!(fi.mtime, t);
    }

    #[test]
    fn test_remove_non_empty_dir_message() {
        let (_dir, ns) = setup();
        ns.create_dir("/d").unwrap();
        ns.create_file("/d/x").unwrap();
        let err = ns.remove("/d").unwrap_err();
        assert_eq!(crate::error::translate(Some(&err)).0, crate::error::NFS3ERR_NOTEMPTY);
    }

    #[test]
    fn test_rename() {
        let (_dir, ns) = setup();
        ns.create_file("/a").unwrap();
        ns.rename("/a", "/b").unwrap();
        assert!(ns.stat("/b").is_ok());
        assert_eq!(ns.stat("/a"), Err(NamespaceError::NotFound));
    }
}
