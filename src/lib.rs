//! Estimate the copy number of variable number tandem repeats (VNTRs) from
//! short sequencing reads.
//!
//! For each reference locus, a profile HMM of the repeat unit is trained
//! from the aligned repeat segments ([`profile`]), chained between two flank
//! matchers into one state graph ([`assembler`], [`hmm`]), and every candidate
//! read is decoded by Viterbi on both strands. The number of bases a read
//! spends inside the repeat copies, summed over accepted reads and divided
//! by the sequencing coverage, is the copy number ([`estimate`]).
#[macro_use]
extern crate log;
pub mod assembler;
pub mod cache;
pub mod candidates;
pub mod error;
pub mod estimate;
pub mod fasta;
pub mod gen_seq;
pub mod hmm;
pub mod locus;
pub mod msa;
pub mod profile;
pub mod report;
pub mod sam;
pub mod seq;
pub use error::{Result, VntrError};
pub use estimate::{estimate_copy_number, CopyNumber, Estimate, UnresolvedReason};
pub use hmm::MatcherParams;
pub use locus::VntrLocus;

/// Log probability of an impossible event.
pub const EP: f64 = -100000000000000000000000f64;

#[derive(Debug, Clone, PartialEq)]
/// Configurations
pub struct EstimateConfig {
    /// Length of the sequencing reads. Decides the number of repeat copies
    /// in the matcher and the length of the baseline windows.
    pub read_length: usize,
    /// Number of flanking bases modelled on each side.
    pub flank_size: usize,
    /// A column with at least this fraction of gaps is an insertion column.
    pub insertion_threshold: f64,
    pub error_rate: f64,
    /// Each repeat segment enters the profile alignment this many times.
    /// Larger values weigh the pseudocount up against the observed columns.
    pub segment_replicates: usize,
    /// Reads with fewer repeat bases are not counted.
    pub min_repeat_bp: usize,
    /// Spacing of the acceptance threshold ladder.
    pub score_step: f64,
    pub ladder_below: usize,
    pub ladder_above: usize,
    pub min_sensitivity: f64,
    pub genome_length: usize,
    /// Load matchers from the cache instead of training them.
    pub use_cached_models: bool,
    pub matcher: MatcherParams,
}

impl EstimateConfig {
    pub fn new(read_length: usize, genome_length: usize) -> Self {
        Self {
            read_length,
            genome_length,
            ..Self::default()
        }
    }
    pub fn with_cached_models(mut self, use_cached_models: bool) -> Self {
        self.use_cached_models = use_cached_models;
        self
    }
    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }
    pub fn with_insertion_threshold(mut self, insertion_threshold: f64) -> Self {
        self.insertion_threshold = insertion_threshold;
        self
    }
    pub fn with_segment_replicates(mut self, segment_replicates: usize) -> Self {
        self.segment_replicates = segment_replicates;
        self
    }
    pub fn with_min_repeat_bp(mut self, min_repeat_bp: usize) -> Self {
        self.min_repeat_bp = min_repeat_bp;
        self
    }
    /// `min + k * score_step` for k in `-ladder_below..=ladder_above`.
    pub fn thresholds(&self, min: f64) -> Vec<f64> {
        let below = self.ladder_below as i64;
        let above = self.ladder_above as i64;
        (-below..=above)
            .map(|k| min + k as f64 * self.score_step)
            .collect()
    }
}

impl std::default::Default for EstimateConfig {
    fn default() -> Self {
        Self {
            read_length: 150,
            flank_size: 140,
            insertion_threshold: 0.1,
            error_rate: 0.05,
            segment_replicates: 1,
            min_repeat_bp: 2,
            score_step: 8f64,
            ladder_below: 13,
            ladder_above: 12,
            min_sensitivity: 0.9,
            genome_length: 102_531_392,
            use_cached_models: false,
            matcher: MatcherParams::default(),
        }
    }
}
