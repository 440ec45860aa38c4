//! # spoofmon
//!
//! Flow-based IP spoofing detector. Consumes a stream of unidirectional
//! flow records and forwards the ones whose source address is judged
//! spoofed, using three complementary checks over one data path:
//!
//! 1. Bogon prefixes (plus operator networks showing up as inbound
//!    sources)
//! 2. Symmetric routing, learned from outbound ingress-link witnesses
//! 3. New-flow counting per watched prefix over rotating Bloom filters

pub mod bloom;
pub mod config;
pub mod detector;
pub mod error;
pub mod filters;
pub mod net;
pub mod record;

pub use config::Config;
pub use detector::{Detector, DetectorStats, FilterStage, StopHandle};
pub use error::{Result, SpoofmonError};
pub use filters::Verdict;
pub use record::{FlowRecord, RECORD_WIRE_SIZE};
