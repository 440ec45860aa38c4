//! New-flow counter filter
//!
//! Counts distinct aggregated sources per watched prefix using a
//! double-buffered Bloom filter pair. The active side answers membership
//! and drives the threshold decision; the learning side is primed with the
//! same insertions so the next window starts warm. Rotation is driven by
//! record timestamps, never by a wall clock.

use std::mem;
use std::sync::Arc;

use tracing::debug;

use super::Verdict;
use crate::bloom::{BloomFilter, BloomParams};
use crate::net::family::FamilyOps;
use crate::net::prefix::PrefixSet;
use crate::net::AddrFamily;
use crate::record::FlowRecord;

/// Distinct-source state for one watched prefix.
#[derive(Debug)]
struct FlowBucket {
    sources: BloomFilter,
    count: u64,
}

#[derive(Debug, Default, Clone)]
pub struct NewFlowStats {
    pub checked: u64,
    pub counted: u64,
    pub threshold_hits: u64,
    pub rotations: u64,
}

#[derive(Debug)]
pub struct NewFlowFilter {
    watched: Arc<PrefixSet>,
    active: Vec<FlowBucket>,
    learning: Vec<FlowBucket>,
    /// Record-time (seconds) of the last rotation; primed by the first
    /// record seen.
    window_start: Option<u64>,
    threshold: u64,
    swap_window: u64,
    stats: NewFlowStats,
}

impl NewFlowFilter {
    pub fn new(
        watched: Arc<PrefixSet>,
        params: &BloomParams,
        threshold: u64,
        swap_window_secs: u64,
    ) -> Self {
        let buckets = |n: usize| {
            (0..n)
                .map(|_| FlowBucket {
                    sources: BloomFilter::new(params),
                    count: 0,
                })
                .collect()
        };

        Self {
            active: buckets(watched.len()),
            learning: buckets(watched.len()),
            watched,
            window_start: None,
            threshold,
            swap_window: swap_window_secs,
            stats: NewFlowStats::default(),
        }
    }

    pub fn check<F: FamilyOps>(&mut self, ops: &F, record: &FlowRecord) -> Verdict {
        self.stats.checked += 1;
        self.maybe_rotate(record.first_secs());

        // v4 buckets are keyed by the destination network, v6 by the
        // source network; aggregation below always uses the source.
        let probe = match F::FAMILY {
            AddrFamily::V4 => &record.dst_addr,
            AddrFamily::V6 => &record.src_addr,
        };
        let Some(idx) = self.watched.lookup(ops, probe) else {
            return Verdict::Negative;
        };

        let key = ops.aggregate(&record.src_addr).to_string();
        if self.active[idx].sources.contains(key.as_bytes()) {
            return Verdict::Negative;
        }

        self.active[idx].sources.insert(key.as_bytes());
        self.learning[idx].sources.insert(key.as_bytes());
        self.active[idx].count += 1;
        self.learning[idx].count += 1;
        self.stats.counted += 1;

        if self.active[idx].count > self.threshold {
            let watched = &self.watched.entries()[idx];
            debug!(
                "{}/{} receiving too many new flows ({})",
                watched.addr, watched.len, self.active[idx].count
            );
            self.stats.threshold_hits += 1;
            return Verdict::Positive;
        }
        Verdict::Negative
    }

    /// Swap the active and learning sides once the window has elapsed in
    /// record time. The fresh learning side is cleared exactly once and
    /// both sides adopt the current record time.
    fn maybe_rotate(&mut self, now_secs: u64) {
        match self.window_start {
            None => self.window_start = Some(now_secs),
            Some(start) if now_secs.wrapping_sub(start) > self.swap_window => {
                mem::swap(&mut self.active, &mut self.learning);
                for bucket in &mut self.learning {
                    bucket.sources.clear();
                    bucket.count = 0;
                }
                self.window_start = Some(now_secs);
                self.stats.rotations += 1;
                debug!("rotated new-flow filters at record time {}", now_secs);
            }
            Some(_) => {}
        }
    }

    /// Distinct-source count of the active bucket for a watched prefix.
    pub fn active_count(&self, index: usize) -> Option<u64> {
        self.active.get(index).map(|b| b.count)
    }

    pub fn stats(&self) -> &NewFlowStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::family::{V4Ops, V6Ops};
    use crate::net::prefix::Prefix;
    use crate::net::FlowAddr;

    fn ts(secs: u64) -> u64 {
        secs << 32
    }

    fn watched<F: FamilyOps>(prefixes: &[(&str, u8)]) -> Arc<PrefixSet> {
        let entries = prefixes
            .iter()
            .map(|(addr, len)| Prefix {
                addr: FlowAddr::from_ip(addr.parse().unwrap()),
                len: *len,
            })
            .collect();
        Arc::new(PrefixSet::from_entries::<F>(entries))
    }

    fn small_params() -> BloomParams {
        BloomParams {
            projected_items: 1000,
            false_positive_rate: 0.01,
        }
    }

    fn inbound(src: &str, dst: &str, secs: u64) -> FlowRecord {
        FlowRecord {
            src_addr: FlowAddr::from_ip(src.parse().unwrap()),
            dst_addr: FlowAddr::from_ip(dst.parse().unwrap()),
            dirbitfield: 1,
            first: ts(secs),
            ..FlowRecord::default()
        }
    }

    #[test]
    fn test_unwatched_destination_ignored() {
        let ops = V4Ops::new();
        let mut filter = NewFlowFilter::new(
            watched::<V4Ops>(&[("192.0.2.0", 24)]),
            &small_params(),
            2,
            3600,
        );

        let rec = inbound("10.0.0.1", "198.51.100.1", 100);
        assert_eq!(filter.check(&ops, &rec), Verdict::Negative);
        assert_eq!(filter.stats().counted, 0);
    }

    #[test]
    fn test_threshold_breach() {
        let ops = V4Ops::new();
        let mut filter = NewFlowFilter::new(
            watched::<V4Ops>(&[("192.0.2.0", 24)]),
            &small_params(),
            2,
            3600,
        );

        assert_eq!(
            filter.check(&ops, &inbound("10.0.0.1", "192.0.2.10", 100)),
            Verdict::Negative
        );
        assert_eq!(
            filter.check(&ops, &inbound("10.0.1.1", "192.0.2.10", 101)),
            Verdict::Negative
        );
        assert_eq!(
            filter.check(&ops, &inbound("10.0.2.1", "192.0.2.10", 102)),
            Verdict::Positive
        );
        assert_eq!(filter.active_count(0), Some(3));
    }

    #[test]
    fn test_duplicate_source_counted_once() {
        let ops = V4Ops::new();
        let mut filter = NewFlowFilter::new(
            watched::<V4Ops>(&[("192.0.2.0", 24)]),
            &small_params(),
            1000,
            3600,
        );

        // same /24 source network, different hosts
        filter.check(&ops, &inbound("10.0.0.1", "192.0.2.10", 100));
        filter.check(&ops, &inbound("10.0.0.2", "192.0.2.10", 101));
        filter.check(&ops, &inbound("10.0.0.1", "192.0.2.99", 102));
        assert_eq!(filter.active_count(0), Some(1));
    }

    #[test]
    fn test_v6_probes_source_network() {
        let ops = V6Ops::new();
        let mut filter = NewFlowFilter::new(
            watched::<V6Ops>(&[("2001:db8:f::", 48)]),
            &small_params(),
            1,
            3600,
        );

        // source inside the watched net, destination outside: still counted
        assert_eq!(
            filter.check(&ops, &inbound("2001:db8:f:1::1", "2a00::1", 100)),
            Verdict::Negative
        );
        assert_eq!(
            filter.check(&ops, &inbound("2001:db8:f:2::1", "2a00::1", 101)),
            Verdict::Positive
        );
        assert_eq!(filter.active_count(0), Some(2));
    }

    #[test]
    fn test_rotation_keeps_learning_side_warm() {
        let ops = V4Ops::new();
        let mut filter = NewFlowFilter::new(
            watched::<V4Ops>(&[("192.0.2.0", 24)]),
            &small_params(),
            1000,
            60,
        );

        filter.check(&ops, &inbound("10.0.0.1", "192.0.2.10", 100));
        assert_eq!(filter.active_count(0), Some(1));

        // past the window: the primed learning side takes over
        filter.check(&ops, &inbound("10.0.0.1", "192.0.2.10", 200));
        assert_eq!(filter.stats().rotations, 1);
        // the source was pre-warmed, so it is not re-counted
        assert_eq!(filter.active_count(0), Some(1));

        // a second rotation leaves an empty active side behind
        filter.check(&ops, &inbound("10.9.9.9", "192.0.2.10", 300));
        assert_eq!(filter.stats().rotations, 2);
        assert_eq!(filter.active_count(0), Some(1));
    }

    #[test]
    fn test_rotation_resets_counts() {
        let ops = V4Ops::new();
        let mut filter = NewFlowFilter::new(
            watched::<V4Ops>(&[("192.0.2.0", 24)]),
            &small_params(),
            1000,
            60,
        );

        filter.check(&ops, &inbound("10.0.0.1", "192.0.2.10", 100));
        filter.check(&ops, &inbound("10.0.1.1", "192.0.2.10", 101));

        // two windows later both sides have been cleared in turn
        filter.check(&ops, &inbound("10.0.2.1", "192.0.2.10", 200));
        filter.check(&ops, &inbound("10.0.3.1", "192.0.2.10", 300));
        assert_eq!(filter.stats().rotations, 2);
        // active side carries the warm learning window, not the full history
        assert_eq!(filter.active_count(0), Some(2));
    }
}
