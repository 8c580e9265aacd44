//! End-to-end tests of the request handlers over a host directory.

use std::sync::Arc;

use nsbridge_gateway::error::{NFS3ERR_NOENT, NFS3ERR_NOTEMPTY, NFS3_OK};
use nsbridge_gateway::local_fs::LocalNamespace;
use nsbridge_gateway::mount::HostAllowList;
use nsbridge_gateway::ops::READDIR_INCOMPLETE;
use nsbridge_gateway::readdir::{walk, AddrWidth, DirentBuffers, ReaddirArgs};
use nsbridge_gateway::{Bridge, HandleCache};

fn setup() -> (tempfile::TempDir, Bridge<LocalNamespace>) {
    let dir = tempfile::tempdir().unwrap();
    let bridge = Bridge::new(
        Arc::new(LocalNamespace::new(dir.path())),
        Arc::new(HandleCache::new()),
        Arc::new(HostAllowList::localhost_only()),
    );
    (dir, bridge)
}

#[test]
fn test_file_lifecycle() {
    let (_dir, bridge) = setup();
    assert_eq!(bridge.mkdir("/docs", 0o755), NFS3_OK);
    assert_eq!(bridge.create("/docs/readme", 0o644), NFS3_OK);
    assert_eq!(bridge.pwrite("/docs/readme", b"nsbridge", 0), 8);

    let mut buf = [0u8; 16];
    assert_eq!(bridge.pread("/docs/readme", &mut buf, 2), 6);
    assert_eq!(&buf[..6], b"bridge");

    let (status, rec) = bridge.lstat("/docs/readme");
    assert_eq!(status, NFS3_OK);
    let rec = rec.unwrap();
    assert_eq!(rec.size, 8);
    assert_eq!(rec.mode & 0o777, 0o644);

    assert_eq!(bridge.rmdir("/docs"), NFS3ERR_NOTEMPTY);
    assert_eq!(bridge.remove("/docs/readme"), NFS3_OK);
    assert_eq!(bridge.rmdir("/docs"), NFS3_OK);
    assert_eq!(bridge.lstat("/docs").0, NFS3ERR_NOENT);
}

#[test]
fn test_readdir_then_rename_keeps_handles() {
    let (_dir, bridge) = setup();
    bridge.mkdir("/src", 0o755);
    for name in ["one", "three", "two"] {
        bridge.create(&format!("/src/{}", name), 0o644);
    }

    let width = AddrWidth::native();
    let slot = 64;
    let mut names = vec![0u8; slot * 8];
    let mut entries = vec![0u8; width.record_size() * 8];
    let names_base = names.as_ptr() as usize as u64;
    let entries_base = entries.as_ptr() as usize as u64;
    let args = ReaddirArgs {
        start_cookie: 0,
        max_bytes: 8192,
        max_entries: 8,
        max_name_len: slot,
        width,
    };
    {
        let mut bufs = DirentBuffers::in_process(&mut names, &mut entries);
        assert_eq!(bridge.readdir("/src", &args, &mut bufs), NFS3_OK as i32);
    }
    let listed = walk(&names, names_base, &entries, entries_base, width, 3).unwrap();
    let listed_names: Vec<&str> = listed.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(listed_names, vec!["one", "three", "two"]);

    assert_eq!(bridge.rename("/src", "/dst"), NFS3_OK);
    for view in &listed {
        let expected = format!("/dst/{}", view.name);
        assert_eq!(bridge.path_of(view.fileid).as_deref(), Some(expected.as_str()));
        assert_eq!(bridge.lstat(&expected).1.unwrap().ino, view.fileid);
    }
}

#[test]
fn test_readdir_resume_from_cookie() {
    let (_dir, bridge) = setup();
    for i in 0..5 {
        bridge.create(&format!("/f{}", i), 0o644);
    }
    let width = AddrWidth::Eight;
    let mut names = vec![0u8; 32 * 2];
    let mut entries = vec![0u8; 32 * 2];
    let mut cookie = 0;
    let mut pages = 0;
    loop {
        let args = ReaddirArgs {
            start_cookie: cookie,
            max_bytes: 4096,
            max_entries: 2,
            max_name_len: 32,
            width,
        };
        let mut bufs = DirentBuffers::in_process(&mut names, &mut entries);
        let status = bridge.readdir("/", &args, &mut bufs);
        pages += 1;
        if status != READDIR_INCOMPLETE {
            assert_eq!(status, NFS3_OK as i32);
            break;
        }
        cookie += 2;
    }
    assert_eq!(pages, 3);
    assert_eq!(bridge.handles().len(), 5);
}

#[test]
fn test_concurrent_lstat_shares_handles() {
    let (_dir, bridge) = setup();
    for i in 0..10 {
        bridge.create(&format!("/c{}", i), 0o644);
    }

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let bridge = bridge.clone();
            std::thread::spawn(move || {
                (0..10)
                    .map(|i| bridge.lstat(&format!("/c{}", i)).1.unwrap().ino)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<Vec<u64>> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    for r in &results[1..] {
        assert_eq!(r, &results[0]);
    }
    assert_eq!(bridge.handles().len(), 10);
}
