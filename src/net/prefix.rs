//! Prefix sets and the masked binary search
//!
//! A prefix set is an immutable, sorted list of `(address, length)` pairs
//! loaded once at startup. Lookup is a binary search where every probe
//! masks the candidate address with the probe entry's own prefix length
//! before the three-way compare, so entries of mixed lengths share one
//! sorted list.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;

use tracing::debug;

use super::family::FamilyOps;
use super::FlowAddr;
use crate::error::{Result, SpoofmonError};

/// A single network prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    pub addr: FlowAddr,
    pub len: u8,
}

/// Sorted prefix list for one address family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixSet {
    entries: Vec<Prefix>,
}

impl PrefixSet {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a set from raw entries, sorting them under the family
    /// collation used by [`lookup`](Self::lookup).
    pub fn from_entries<F: FamilyOps>(mut entries: Vec<Prefix>) -> Self {
        entries.sort_by(|a, b| F::compare(&a.addr, &b.addr));
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Prefix> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[Prefix] {
        &self.entries
    }

    /// Find the prefix containing `addr`, returning its index.
    ///
    /// Each probe masks `addr` down to the midpoint entry's length and
    /// compares the result against the entry. When overlapping entries of
    /// different lengths both cover `addr`, the one whose bytes collate at
    /// the midpoint where equality is first detected wins.
    pub fn lookup<F: FamilyOps>(&self, ops: &F, addr: &FlowAddr) -> Option<usize> {
        let mut begin = 0isize;
        let mut end = self.entries.len() as isize - 1;

        while begin <= end {
            let mid = ((begin + end) >> 1) as usize;
            let entry = &self.entries[mid];
            let masked = ops.mask_at(addr, entry.len);
            match F::compare(&entry.addr, &masked) {
                std::cmp::Ordering::Less => begin = mid as isize + 1,
                std::cmp::Ordering::Greater => end = mid as isize - 1,
                std::cmp::Ordering::Equal => return Some(mid),
            }
        }
        None
    }
}

/// Prefix sets for both families, as loaded from one file.
#[derive(Debug, Clone, Default)]
pub struct FamilyPrefixSets {
    pub v4: PrefixSet,
    pub v6: PrefixSet,
}

/// Load a prefix file: one `<address>/<length>` per line.
///
/// Whitespace inside the address token is stripped. Lines whose address
/// does not parse, that carry no `/` separator, or whose length does not
/// fit the address family are skipped. The length accepts the usual
/// base-0 forms (`24`, `0x18`, `030`).
pub fn load_prefix_file(path: &Path) -> Result<FamilyPrefixSets> {
    let file = File::open(path).map_err(|source| SpoofmonError::PrefixFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut v4 = Vec::new();
    let mut v6 = Vec::new();

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| SpoofmonError::PrefixFile {
            path: path.to_path_buf(),
            source,
        })?;

        let Some((addr_token, len_token)) = line.split_once('/') else {
            continue;
        };

        let addr_token: String = addr_token.chars().filter(|c| !c.is_whitespace()).collect();
        let Ok(ip) = addr_token.parse::<IpAddr>() else {
            continue;
        };
        let addr = FlowAddr::from_ip(ip);

        let Some(len) = parse_prefix_len(len_token) else {
            debug!("skipping prefix line with bad length: {:?}", line);
            continue;
        };

        let (list, max_len) = match ip {
            IpAddr::V4(_) => (&mut v4, 32),
            IpAddr::V6(_) => (&mut v6, 128),
        };
        if len > max_len {
            debug!("skipping prefix {} with out-of-range length {}", addr, len);
            continue;
        }

        list.push(Prefix {
            addr,
            len: len as u8,
        });
    }

    Ok(FamilyPrefixSets {
        v4: PrefixSet::from_entries::<super::family::V4Ops>(v4),
        v6: PrefixSet::from_entries::<super::family::V6Ops>(v6),
    })
}

/// Parse a prefix length the way `strtoul(s, NULL, 0)` reads numbers:
/// `0x` prefix means hex, a leading zero means octal, decimal otherwise.
fn parse_prefix_len(token: &str) -> Option<u32> {
    let t = token.trim();
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if t.len() > 1 && t.starts_with('0') {
        u32::from_str_radix(&t[1..], 8).ok()
    } else {
        t.parse().ok()
    }
}
