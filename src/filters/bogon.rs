//! Bogon and own-network filter
//!
//! Flags records whose source address sits in a bogon prefix, or - for
//! inbound records only - inside the operator's own networks. A source
//! claiming to be one of our own addresses while arriving from outside
//! cannot be legitimate.

use std::sync::Arc;

use tracing::debug;

use super::Verdict;
use crate::net::family::FamilyOps;
use crate::net::prefix::PrefixSet;
use crate::record::FlowRecord;

#[derive(Debug, Default, Clone)]
pub struct BogonStats {
    pub checked: u64,
    pub bogon_hits: u64,
    pub own_network_hits: u64,
}

/// Stateless membership filter over the bogon and own-network sets.
#[derive(Debug)]
pub struct BogonFilter {
    bogons: PrefixSet,
    own_networks: Arc<PrefixSet>,
    stats: BogonStats,
}

impl BogonFilter {
    pub fn new(bogons: PrefixSet, own_networks: Arc<PrefixSet>) -> Self {
        Self {
            bogons,
            own_networks,
            stats: BogonStats::default(),
        }
    }

    /// Check the record's source address. Never mutates filter state, so
    /// re-running a record yields the same verdict.
    pub fn check<F: FamilyOps>(&mut self, ops: &F, record: &FlowRecord) -> Verdict {
        self.stats.checked += 1;

        if let Some(idx) = self.bogons.lookup(ops, &record.src_addr) {
            let hit = &self.bogons.entries()[idx];
            debug!(
                "source {} fits bogon prefix {}/{}",
                record.src_addr, hit.addr, hit.len
            );
            self.stats.bogon_hits += 1;
            return Verdict::Positive;
        }

        if record.is_inbound() {
            if let Some(idx) = self.own_networks.lookup(ops, &record.src_addr) {
                let hit = &self.own_networks.entries()[idx];
                debug!(
                    "inbound source {} fits own network {}/{}",
                    record.src_addr, hit.addr, hit.len
                );
                self.stats.own_network_hits += 1;
                return Verdict::Positive;
            }
        }

        Verdict::Negative
    }

    pub fn stats(&self) -> &BogonStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::family::{V4Ops, V6Ops};
    use crate::net::prefix::{Prefix, PrefixSet};
    use crate::net::FlowAddr;

    fn set<F: FamilyOps>(prefixes: &[(&str, u8)]) -> PrefixSet {
        let entries = prefixes
            .iter()
            .map(|(addr, len)| Prefix {
                addr: FlowAddr::from_ip(addr.parse().unwrap()),
                len: *len,
            })
            .collect();
        PrefixSet::from_entries::<F>(entries)
    }

    fn record(src: &str, dst: &str, dir: u8) -> FlowRecord {
        FlowRecord {
            src_addr: FlowAddr::from_ip(src.parse().unwrap()),
            dst_addr: FlowAddr::from_ip(dst.parse().unwrap()),
            dirbitfield: dir,
            ..FlowRecord::default()
        }
    }

    #[test]
    fn test_v4_bogon_hit() {
        let ops = V4Ops::new();
        let mut filter = BogonFilter::new(
            set::<V4Ops>(&[("10.0.0.0", 8)]),
            Arc::new(PrefixSet::empty()),
        );

        let rec = record("10.1.2.3", "8.8.8.8", 0);
        assert_eq!(filter.check(&ops, &rec), Verdict::Positive);
        assert_eq!(filter.stats().bogon_hits, 1);
    }

    #[test]
    fn test_v4_bogon_miss() {
        let ops = V4Ops::new();
        let mut filter = BogonFilter::new(
            set::<V4Ops>(&[("10.0.0.0", 8)]),
            Arc::new(PrefixSet::empty()),
        );

        let rec = record("8.8.8.8", "192.0.2.1", 0);
        assert_eq!(filter.check(&ops, &rec), Verdict::Negative);
    }

    #[test]
    fn test_v6_bogon_hit() {
        let ops = V6Ops::new();
        let mut filter = BogonFilter::new(
            set::<V6Ops>(&[("2001:db8::", 32)]),
            Arc::new(PrefixSet::empty()),
        );

        let rec = record("2001:db8:1::1", "2a00::1", 0);
        assert_eq!(filter.check(&ops, &rec), Verdict::Positive);
    }

    #[test]
    fn test_own_network_only_checked_inbound() {
        let ops = V4Ops::new();
        let own = Arc::new(set::<V4Ops>(&[("192.0.2.0", 24)]));
        let mut filter = BogonFilter::new(PrefixSet::empty(), own);

        // our own source going out is normal
        let outbound = record("192.0.2.5", "8.8.8.8", 0);
        assert_eq!(filter.check(&ops, &outbound), Verdict::Negative);

        // our own source coming in from outside is spoofed
        let inbound = record("192.0.2.5", "8.8.8.8", 1);
        assert_eq!(filter.check(&ops, &inbound), Verdict::Positive);
        assert_eq!(filter.stats().own_network_hits, 1);
    }

    #[test]
    fn test_idempotent() {
        let ops = V4Ops::new();
        let mut filter = BogonFilter::new(
            set::<V4Ops>(&[("10.0.0.0", 8)]),
            Arc::new(PrefixSet::empty()),
        );

        let rec = record("10.1.2.3", "8.8.8.8", 0);
        let first = filter.check(&ops, &rec);
        let second = filter.check(&ops, &rec);
        assert_eq!(first, second);

        let miss = record("8.8.8.8", "10.0.0.1", 0);
        assert_eq!(filter.check(&ops, &miss), filter.check(&ops, &miss));
    }
}
