//! Detector pipeline
//!
//! One single-threaded loop: receive a frame, decode it, run the record
//! through bogon, symmetric-route and new-flow filters in that order. The
//! first POSITIVE forwards the record to the sink and skips the remaining
//! stages, so a flagged record never mutates downstream filter state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info};

use crate::bloom::BloomParams;
use crate::config::Config;
use crate::error::{Result, SpoofmonError};
use crate::filters::{BogonFilter, NewFlowFilter, SymmetryFilter};
use crate::net::family::{FamilyOps, V4Ops, V6Ops};
use crate::net::prefix::{load_prefix_file, FamilyPrefixSets, PrefixSet};
use crate::net::AddrFamily;
use crate::record::{FlowRecord, RECORD_WIRE_SIZE};

/// Which stage flagged a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Bogon,
    Symmetry,
    NewFlow,
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterStage::Bogon => write!(f, "bogon"),
            FilterStage::Symmetry => write!(f, "symmetry"),
            FilterStage::NewFlow => write!(f, "new-flow"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DetectorStats {
    pub v4_records: u64,
    pub v6_records: u64,
    pub flagged: u64,
    pub bogon_hits: u64,
    pub symmetry_hits: u64,
    pub newflow_hits: u64,
}

/// Cancellation handle for the run loop. Setting it stops the detector at
/// the next iteration boundary; an in-flight emission completes first.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// All per-family filter state.
#[derive(Debug)]
struct FamilyPipeline<F: FamilyOps> {
    ops: F,
    bogon: BogonFilter,
    symmetry: SymmetryFilter,
    newflow: NewFlowFilter,
}

impl<F: FamilyOps> FamilyPipeline<F> {
    fn new(bogons: PrefixSet, watched: PrefixSet, config: &Config) -> Self {
        let watched = Arc::new(watched);
        let params = BloomParams {
            projected_items: config.newflow.projected_flows,
            false_positive_rate: config.newflow.false_positive_rate,
        };

        Self {
            ops: F::new(),
            bogon: BogonFilter::new(bogons, watched.clone()),
            symmetry: SymmetryFilter::new(config.symmetry.rewrite_window_secs),
            newflow: NewFlowFilter::new(
                watched,
                &params,
                config.newflow.threshold,
                config.newflow.swap_window_secs,
            ),
        }
    }

    fn check(&mut self, record: &FlowRecord) -> Option<FilterStage> {
        if self.bogon.check(&self.ops, record).is_positive() {
            return Some(FilterStage::Bogon);
        }
        if self.symmetry.check(&self.ops, record).is_positive() {
            return Some(FilterStage::Symmetry);
        }
        if self.newflow.check(&self.ops, record).is_positive() {
            return Some(FilterStage::NewFlow);
        }
        None
    }
}

/// Spoofed-source detector over a stream of flow records.
#[derive(Debug)]
pub struct Detector {
    v4: FamilyPipeline<V4Ops>,
    v6: FamilyPipeline<V6Ops>,
    stats: DetectorStats,
    stop: Arc<AtomicBool>,
}

impl Detector {
    /// Build the detector: load and sort the prefix sets, create the mask
    /// tables and the Bloom filter pairs.
    pub fn new(config: &Config) -> Result<Self> {
        let bogon_path = config
            .prefixes
            .bogons
            .as_deref()
            .ok_or(SpoofmonError::MissingBogonFile)?;
        let bogons = load_prefix_file(bogon_path)?;

        let watched = match config.prefixes.networks.as_deref() {
            Some(path) => load_prefix_file(path)?,
            None => FamilyPrefixSets::default(),
        };

        info!(
            "loaded {} v4 / {} v6 bogon prefixes, watching {} v4 / {} v6 networks",
            bogons.v4.len(),
            bogons.v6.len(),
            watched.v4.len(),
            watched.v6.len()
        );

        let params = BloomParams {
            projected_items: config.newflow.projected_flows,
            false_positive_rate: config.newflow.false_positive_rate,
        };
        let (bits, hashes) = params.optimal();
        info!(
            "new-flow filters: {} bits x {} hashes per bucket, threshold {}, window {}s",
            bits, hashes, config.newflow.threshold, config.newflow.swap_window_secs
        );

        Ok(Self {
            v4: FamilyPipeline::new(bogons.v4, watched.v4, config),
            v6: FamilyPipeline::new(bogons.v6, watched.v6, config),
            stats: DetectorStats::default(),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    /// Run one record through the pipeline, returning the stage that
    /// flagged it, if any.
    pub fn process(&mut self, record: &FlowRecord) -> Option<FilterStage> {
        let stage = match record.family() {
            AddrFamily::V4 => {
                self.stats.v4_records += 1;
                self.v4.check(record)
            }
            AddrFamily::V6 => {
                self.stats.v6_records += 1;
                self.v6.check(record)
            }
        };

        if let Some(stage) = stage {
            self.stats.flagged += 1;
            match stage {
                FilterStage::Bogon => self.stats.bogon_hits += 1,
                FilterStage::Symmetry => self.stats.symmetry_hits += 1,
                FilterStage::NewFlow => self.stats.newflow_hits += 1,
            }
        }
        stage
    }

    /// Consume frames until the stream ends or [`StopHandle::stop`] is
    /// called, forwarding every flagged record to `flagged`.
    ///
    /// A frame of one byte or less is the end-of-stream marker; any other
    /// frame that does not match the record width is fatal.
    pub fn run(&mut self, frames: &Receiver<Vec<u8>>, flagged: &Sender<FlowRecord>) -> Result<()> {
        while !self.stop.load(Ordering::Relaxed) {
            let frame = match frames.recv() {
                Ok(frame) => frame,
                // input side closed: treat like end of stream
                Err(_) => break,
            };

            if frame.len() <= 1 {
                debug!("end-of-stream marker received");
                break;
            }
            if frame.len() != RECORD_WIRE_SIZE {
                error!(
                    "record size mismatch: expected {}, got {}",
                    RECORD_WIRE_SIZE,
                    frame.len()
                );
                return Err(SpoofmonError::RecordSize {
                    expected: RECORD_WIRE_SIZE,
                    got: frame.len(),
                });
            }

            let record = FlowRecord::decode(&frame)?;
            if let Some(stage) = self.process(&record) {
                debug!(
                    "{} flagged by {} filter (dst {})",
                    record.src_addr, stage, record.dst_addr
                );
                flagged
                    .send(record)
                    .map_err(|_| SpoofmonError::SinkClosed)?;
            }
        }

        self.log_summary();
        Ok(())
    }

    fn log_summary(&self) {
        info!(
            "processed {} v4 / {} v6 records, {} flagged ({} bogon, {} symmetry, {} new-flow)",
            self.stats.v4_records,
            self.stats.v6_records,
            self.stats.flagged,
            self.stats.bogon_hits,
            self.stats.symmetry_hits,
            self.stats.newflow_hits
        );
    }

    pub fn stats(&self) -> &DetectorStats {
        &self.stats
    }
}
