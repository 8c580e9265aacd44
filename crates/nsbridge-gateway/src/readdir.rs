//! READDIR marshaling into the daemon's pointer-linked entry buffers
//!
//! The daemon hands over two flat buffers. The names buffer is split into
//! `max_name_len`-byte slots, one NUL-terminated name per slot. The entries
//! buffer holds fixed-width records, little-endian:
//!
//! ```text
//! [u64 fileid][ptr -> name slot][u64 cookie][ptr -> next record | 0]
//! ```
//!
//! Pointer fields are as wide as the daemon's address size, so a record is
//! 24 bytes on a 32-bit host and 32 bytes on a 64-bit host.

use bytes::{Buf, BufMut};

use crate::error::{GatewayError, Result};
use crate::handle_cache::{Handle, HandleCache};
use crate::path;

/// Width in bytes of a pointer field in the daemon's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrWidth {
    /// 32-bit daemon
    Four,
    /// 64-bit daemon
    Eight,
}

impl AddrWidth {
    /// Address width of the running process.
    pub fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            AddrWidth::Eight
        } else {
            AddrWidth::Four
        }
    }

    /// Width for an address size in bytes; only 4 and 8 are accepted.
    pub fn from_bytes(n: usize) -> Result<Self> {
        match n {
            4 => Ok(AddrWidth::Four),
            8 => Ok(AddrWidth::Eight),
            _ => Err(GatewayError::Nfs3Inval {
                reason: format!("unsupported address width: {}", n),
            }),
        }
    }

    /// Pointer field size in bytes.
    pub fn bytes(self) -> usize {
        match self {
            AddrWidth::Four => 4,
            AddrWidth::Eight => 8,
        }
    }

    /// Size of one entry record.
    pub fn record_size(self) -> usize {
        16 + 2 * self.bytes()
    }

    /// Bytes charged against the byte budget for an entry named `name`:
    /// the name, its terminator, two u64 fields and two pointers.
    pub fn entry_cost(self, name: &str) -> usize {
        name.len() + 1 + self.record_size()
    }

    fn put_ptr(self, buf: &mut impl BufMut, addr: u64) {
        match self {
            AddrWidth::Four => buf.put_u32_le(addr as u32),
            AddrWidth::Eight => buf.put_u64_le(addr),
        }
    }

    fn get_ptr(self, buf: &mut impl Buf) -> u64 {
        match self {
            AddrWidth::Four => buf.get_u32_le() as u64,
            AddrWidth::Eight => buf.get_u64_le(),
        }
    }
}

/// Per-call READDIR parameters supplied by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaddirArgs {
    /// Index of the first listing entry to emit
    pub start_cookie: u64,
    /// Byte budget for the reply
    pub max_bytes: u32,
    /// Maximum number of entries the buffers can hold
    pub max_entries: usize,
    /// Size of one slot in the names buffer, terminator included
    pub max_name_len: usize,
    /// Pointer width of the daemon
    pub width: AddrWidth,
}

/// The daemon's output buffers and the addresses it sees them at.
pub struct DirentBuffers<'a> {
    /// Name slots, `max_entries * max_name_len` bytes at least
    pub names: &'a mut [u8],
    /// Daemon-side address of `names`
    pub names_base: u64,
    /// Entry records, `max_entries * record_size` bytes at least
    pub entries: &'a mut [u8],
    /// Daemon-side address of `entries`
    pub entries_base: u64,
}

impl<'a> DirentBuffers<'a> {
    /// Buffers shared with a daemon in this address space; the pointer
    /// fields refer to the slices' own addresses.
    pub fn in_process(names: &'a mut [u8], entries: &'a mut [u8]) -> Self {
        let names_base = names.as_ptr() as usize as u64;
        let entries_base = entries.as_ptr() as usize as u64;
        Self {
            names,
            names_base,
            entries,
            entries_base,
        }
    }

    fn zero(&mut self) {
        self.names.fill(0);
        self.entries.fill(0);
    }
}

/// How far a READDIR call got through the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaddirOutcome {
    /// Records written to the entries buffer
    pub written: usize,
    /// Cookie to resume from; equals the last written record's cookie
    pub next_cookie: u64,
    /// True when the end of the listing was reached
    pub eof: bool,
}

#[derive(Debug)]
struct PlannedEntry<'n> {
    fileid: Handle,
    name: &'n str,
    cookie: u64,
}

/// Packs `listing[start_cookie..]` of directory `dir` into `bufs`.
///
/// Both buffers are zeroed before anything else. Entries are emitted until
/// the next one would overrun either the byte budget or `max_entries`, in
/// which case the outcome is not `eof`. Each emitted entry's handle comes
/// from `cache`, so listing a directory registers its children.
pub fn marshal<S: AsRef<str>>(
    dir: &str,
    listing: &[S],
    cache: &HandleCache,
    args: &ReaddirArgs,
    bufs: &mut DirentBuffers<'_>,
) -> Result<ReaddirOutcome> {
    bufs.zero();

    let record_size = args.width.record_size();
    if bufs.names.len() < args.max_entries.saturating_mul(args.max_name_len)
        || bufs.entries.len() < args.max_entries.saturating_mul(record_size)
    {
        return Err(GatewayError::Nfs3Inval {
            reason: format!(
                "buffers too small for {} entries (names {}, entries {})",
                args.max_entries,
                bufs.names.len(),
                bufs.entries.len()
            ),
        });
    }

    if args.start_cookie > listing.len() as u64 {
        return Err(GatewayError::Nfs3BadCookie {
            cookie: args.start_cookie,
            len: listing.len(),
        });
    }

    let start = args.start_cookie as usize;
    let mut budget = args.max_bytes as i64;
    let mut planned: Vec<PlannedEntry<'_>> = Vec::new();
    let mut eof = true;

    for (idx, name) in listing.iter().enumerate().skip(start) {
        let name = name.as_ref();
        budget -= args.width.entry_cost(name) as i64;
        if budget < 0 || planned.len() >= args.max_entries {
            eof = false;
            break;
        }
        if name.len() + 1 > args.max_name_len {
            return Err(GatewayError::Nfs3NameTooLong {
                name: name.to_string(),
            });
        }
        planned.push(PlannedEntry {
            fileid: cache.allocate(&path::join(dir, name)),
            name,
            cookie: idx as u64 + 1,
        });
    }

    write_records(&planned, args, bufs)?;

    let written = planned.len();
    Ok(ReaddirOutcome {
        written,
        next_cookie: args.start_cookie + written as u64,
        eof,
    })
}

fn write_records(
    planned: &[PlannedEntry<'_>],
    args: &ReaddirArgs,
    bufs: &mut DirentBuffers<'_>,
) -> Result<()> {
    let record_size = args.width.record_size();
    let slot = args.max_name_len;

    for (k, entry) in planned.iter().enumerate() {
        let name_off = k * slot;
        let mut name_slot = bufs
            .names
            .get_mut(name_off..name_off + slot)
            .ok_or_else(|| overrun("names", name_off))?;
        name_slot.put_slice(entry.name.as_bytes());
        name_slot.put_u8(0);

        let next = if k + 1 < planned.len() {
            bufs.entries_base + ((k + 1) * record_size) as u64
        } else {
            0
        };

        let rec_off = k * record_size;
        let mut rec = bufs
            .entries
            .get_mut(rec_off..rec_off + record_size)
            .ok_or_else(|| overrun("entries", rec_off))?;
        rec.put_u64_le(entry.fileid);
        args.width.put_ptr(&mut rec, bufs.names_base + name_off as u64);
        rec.put_u64_le(entry.cookie);
        args.width.put_ptr(&mut rec, next);
    }
    Ok(())
}

fn overrun(which: &str, offset: usize) -> GatewayError {
    GatewayError::Nfs3Inval {
        reason: format!("{} buffer overrun at offset {}", which, offset),
    }
}

/// One record read back out of an entries buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirentView {
    /// Handle of the entry
    pub fileid: Handle,
    /// Entry name without its terminator
    pub name: String,
    /// Cookie to resume after this entry
    pub cookie: u64,
}

/// Follows the record chain starting at the first record and returns the
/// entries in link order.
///
/// Pointers are interpreted relative to the bases in `bufs`; a pointer that
/// lands outside either buffer is rejected.
pub fn walk(
    names: &[u8],
    names_base: u64,
    entries: &[u8],
    entries_base: u64,
    width: AddrWidth,
    written: usize,
) -> Result<Vec<DirentView>> {
    let record_size = width.record_size();
    let mut out = Vec::with_capacity(written);
    if written == 0 {
        return Ok(out);
    }

    let mut offset = 0usize;
    loop {
        let mut rec = entries
            .get(offset..)
            .and_then(|tail| tail.get(..record_size))
            .ok_or_else(|| overrun("entries", offset))?;
        let fileid = rec.get_u64_le();
        let name_ptr = width.get_ptr(&mut rec);
        let cookie = rec.get_u64_le();
        let next = width.get_ptr(&mut rec);

        let name_off = name_ptr
            .checked_sub(names_base)
            .ok_or_else(|| overrun("names", 0))? as usize;
        let tail = names
            .get(name_off..)
            .ok_or_else(|| overrun("names", name_off))?;
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| overrun("names", name_off))?;
        out.push(DirentView {
            fileid,
            name: String::from_utf8_lossy(&tail[..len]).into_owned(),
            cookie,
        });

        if next == 0 || out.len() >= written {
            break;
        }
        offset = next
            .checked_sub(entries_base)
            .ok_or_else(|| overrun("entries", 0))? as usize;
    }
    Ok(out)
}
