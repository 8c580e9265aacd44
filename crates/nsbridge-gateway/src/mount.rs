//! Mount-time access decision

use std::net::Ipv4Addr;

use crate::error::{NFS3ERR_ACCES, NFS3_OK};
use crate::path;

/// Decides whether a client may mount an export path.
pub trait MountPolicy: Send + Sync {
    /// True if `client` may mount the normalized export `path`.
    fn is_allowed(&self, client: Ipv4Addr, path: &str) -> bool;
}

/// Allows clients whose address appears in a fixed list. `"*"` matches any
/// client; an empty list admits nobody.
#[derive(Debug, Clone)]
pub struct HostAllowList {
    hosts: Vec<String>,
}

impl HostAllowList {
    /// Allow list over dotted-quad addresses and `"*"`.
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }

    /// Only the loopback address may mount.
    pub fn localhost_only() -> Self {
        Self::new(vec![Ipv4Addr::LOCALHOST.to_string()])
    }
}

impl MountPolicy for HostAllowList {
    fn is_allowed(&self, client: Ipv4Addr, _path: &str) -> bool {
        let client = client.to_string();
        self.hosts
            .iter()
            .any(|h| h == "*" || h.eq_ignore_ascii_case(&client))
    }
}

/// Decodes an IPv4 address the daemon passes as a native `u32` holding the
/// network-order octets, so the first octet sits in the low byte.
pub fn decode_client_addr(addr: u32) -> Ipv4Addr {
    Ipv4Addr::from(addr.to_le_bytes())
}

/// Checks a mount request and returns the NFS status to hand back.
pub fn accept_mount(policy: &dyn MountPolicy, addr: u32, raw_path: &str) -> u32 {
    let client = decode_client_addr(addr);
    let export = path::clean(raw_path);
    if policy.is_allowed(client, &export) {
        tracing::info!(%client, path = %export, "host allowed to mount");
        NFS3_OK
    } else {
        tracing::info!(%client, path = %export, "host not allowed to mount");
        NFS3ERR_ACCES
    }
}
