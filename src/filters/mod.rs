//! Detection filters
//!
//! Every stage answers with a [`Verdict`]: POSITIVE flags the record as
//! spoofed and short-circuits the remaining stages, NEGATIVE passes it on.

pub mod bogon;
pub mod newflow;
pub mod symmetry;

pub use bogon::BogonFilter;
pub use newflow::NewFlowFilter;
pub use symmetry::SymmetryFilter;

/// Outcome of one filter stage for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Source address judged spoofed.
    Positive,
    /// No evidence of spoofing from this stage.
    Negative,
}

impl Verdict {
    pub fn is_positive(self) -> bool {
        matches!(self, Verdict::Positive)
    }
}
