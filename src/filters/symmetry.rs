//! Symmetric-route filter
//!
//! Outbound traffic teaches the filter which ingress links serve a remote
//! network: every outbound flow ORs its link bit into the witness entry
//! for the aggregated destination (v4 /24, v6 /64). Inbound traffic from
//! a witnessed network must arrive on one of those links; a disjoint link
//! mask means the route is asymmetric and the source is flagged. Unknown
//! networks are never flagged - absence of a witness is not evidence.

use std::collections::HashMap;

use tracing::debug;

use super::Verdict;
use crate::net::family::FamilyOps;
use crate::record::FlowRecord;

/// Witnessed ingress links for one aggregated destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkWitness {
    /// OR of every link bit seen on outbound flows.
    pub links: u64,
    /// Raw `first` timestamp of the latest outbound flow.
    pub last_seen: u64,
}

#[derive(Debug, Default, Clone)]
pub struct SymmetryStats {
    pub outbound_seen: u64,
    pub inbound_checked: u64,
    pub asymmetric_hits: u64,
}

#[derive(Debug)]
pub struct SymmetryFilter {
    witnesses: HashMap<u64, LinkWitness>,
    /// Window in seconds after which a stale witness is overwritten
    /// instead of extended.
    rewrite_window: u64,
    stats: SymmetryStats,
}

impl SymmetryFilter {
    pub fn new(rewrite_window_secs: u64) -> Self {
        Self {
            witnesses: HashMap::new(),
            rewrite_window: rewrite_window_secs,
            stats: SymmetryStats::default(),
        }
    }

    pub fn check<F: FamilyOps>(&mut self, ops: &F, record: &FlowRecord) -> Verdict {
        if record.is_outbound() {
            self.learn(ops.witness_key(&record.dst_addr), record);
            return Verdict::Negative;
        }

        self.stats.inbound_checked += 1;
        let key = ops.witness_key(&record.src_addr);
        match self.witnesses.get(&key) {
            Some(witness) if witness.links & record.linkbitfield == 0 => {
                debug!(
                    "asymmetric route: {} -> {} came over links {:#x}, witnessed {:#x}",
                    record.src_addr, record.dst_addr, record.linkbitfield, witness.links
                );
                self.stats.asymmetric_hits += 1;
                Verdict::Positive
            }
            // witnessed on a shared link, or no witness at all
            _ => Verdict::Negative,
        }
    }

    fn learn(&mut self, key: u64, record: &FlowRecord) {
        self.stats.outbound_seen += 1;

        match self.witnesses.get_mut(&key) {
            Some(witness)
                if record
                    .first_secs()
                    .wrapping_sub(witness.last_seen >> 32)
                    < self.rewrite_window =>
            {
                witness.links |= record.linkbitfield;
                witness.last_seen = record.first;
            }
            _ => {
                self.witnesses.insert(
                    key,
                    LinkWitness {
                        links: record.linkbitfield,
                        last_seen: record.first,
                    },
                );
            }
        }
    }

    /// Witness entry for an aggregation key, if any.
    pub fn witness(&self, key: u64) -> Option<&LinkWitness> {
        self.witnesses.get(&key)
    }

    pub fn len(&self) -> usize {
        self.witnesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.witnesses.is_empty()
    }

    pub fn stats(&self) -> &SymmetryStats {
        &self.stats
    }
}
