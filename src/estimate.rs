//! Copy number estimation from the reads decoded by a locus matcher.
//!
//! Every relevant read is decoded on both strands. Reads whose best path
//! spends enough bases inside the repeat copies are accepted by each
//! threshold of a score ladder their log probability exceeds, and each
//! threshold sums the number of units its reads cover. Dividing such a sum
//! by the sequencing coverage gives a copy number; which threshold to trust
//! is chosen by sensitivity against known true reads when they are given.
use crate::error::{Result, VntrError};
use crate::fasta::ReadRecord;
use crate::hmm::{MatcherModel, Orientation};
use crate::locus::VntrLocus;
use crate::EstimateConfig;
use rayon::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No read was scanned, or the genome length is zero.
    CoverageUnavailable,
    /// No threshold accepts enough of the true reads.
    NoThresholdMeetsSensitivity,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnresolvedReason::CoverageUnavailable => write!(f, "coverage unavailable"),
            UnresolvedReason::NoThresholdMeetsSensitivity => {
                write!(f, "no threshold meets the sensitivity")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CopyNumber {
    Resolved(f64),
    Unresolved(UnresolvedReason),
}

impl CopyNumber {
    pub fn value(&self) -> Option<f64> {
        match self {
            CopyNumber::Resolved(cn) => Some(*cn),
            CopyNumber::Unresolved(_) => None,
        }
    }
}

/// Outcome of one threshold of the ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdEvaluation {
    pub threshold: f64,
    pub accepted: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    /// `true_positives / |true reads|`, 0 if there is no true read.
    pub sensitivity: f64,
    /// Sum of the occurrences of the accepted reads.
    pub occurrence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub copy_number: CopyNumber,
    /// The baseline score the ladder is centered on.
    pub min_score: f64,
    pub coverage: f64,
    pub read_length: usize,
    pub reads_scanned: usize,
    pub reads_decoded: usize,
    pub reads_skipped: usize,
    /// In increasing order of threshold.
    pub evaluations: Vec<ThresholdEvaluation>,
    pub selected_threshold: Option<f64>,
}

/// Average sequencing depth. 0 if it can not be computed.
pub fn coverage(reads: usize, read_length: usize, genome_length: usize) -> f64 {
    if reads == 0 || read_length == 0 || genome_length == 0 {
        0f64
    } else {
        (reads * read_length) as f64 / genome_length as f64
    }
}

/// The lowest score of the reference repeat, read `copies` segments at a
/// time and truncated to `read_length`. Never above zero, and zero if there
/// are fewer segments than `copies`.
///
/// A window that can not be decoded (e.g., a segment with an `N`) is
/// skipped. It is an error only if every window is skipped.
pub fn min_score(
    model: &MatcherModel,
    segments: &[Vec<u8>],
    copies: usize,
    read_length: usize,
) -> Result<f64> {
    if copies == 0 || segments.len() < copies {
        return Ok(0f64);
    }
    let mut min = 0f64;
    let mut decoded = 0;
    for (i, window) in segments.windows(copies).enumerate() {
        let mut read: Vec<u8> = window.concat();
        read.truncate(read_length);
        match model.viterbi(&read) {
            Ok(decoding) => {
                decoded += 1;
                min = min.min(decoding.log_probability);
            }
            Err(why) => warn!("Skip baseline window {}: {}", i, why),
        }
    }
    if decoded == 0 {
        return Err(VntrError::InputShape(format!(
            "none of the {} baseline windows could be decoded",
            segments.len() - copies + 1
        )));
    }
    Ok(min)
}

/// Best decoding of a read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadScore {
    pub log_probability: f64,
    pub orientation: Orientation,
    pub repeat_bp: usize,
}

pub fn score_read(model: &MatcherModel, read: &ReadRecord) -> Result<ReadScore> {
    let revcomp = read.reverse_complement.as_deref();
    let (orientation, decoding) = model.viterbi_both_strands(&read.seq, revcomp)?;
    trace!("{}\t{:?}\t{}", read.id, orientation, decoding.describe(model));
    Ok(ReadScore {
        log_probability: decoding.log_probability,
        orientation,
        repeat_bp: decoding.repeat_bp(model),
    })
}

// Per-threshold accumulators of one worker.
#[derive(Debug, Clone)]
struct Tally {
    occurrences: Vec<f64>,
    accepted: Vec<Vec<String>>,
    decoded: usize,
    skipped: usize,
}

impl Tally {
    fn new(thresholds: usize) -> Self {
        Self {
            occurrences: vec![0f64; thresholds],
            accepted: vec![vec![]; thresholds],
            decoded: 0,
            skipped: 0,
        }
    }
    fn merge(mut self, other: Self) -> Self {
        self.occurrences
            .iter_mut()
            .zip(other.occurrences.iter())
            .for_each(|(x, y)| *x += y);
        self.accepted
            .iter_mut()
            .zip(other.accepted)
            .for_each(|(xs, ys)| xs.extend(ys));
        self.decoded += other.decoded;
        self.skipped += other.skipped;
        self
    }
}

// Decode `read` and add it to every threshold it passes.
fn classify(
    mut tally: Tally,
    read: &ReadRecord,
    model: &MatcherModel,
    thresholds: &[f64],
    unit_len: usize,
    min_repeat_bp: usize,
) -> Tally {
    let score = match score_read(model, read) {
        Ok(score) => score,
        Err(why) => {
            debug!("Skipped {}: {}", read.id, why);
            tally.skipped += 1;
            return tally;
        }
    };
    tally.decoded += 1;
    trace!("{}\t{:?}", read.id, score);
    if score.repeat_bp < min_repeat_bp {
        return tally;
    }
    let occurrence = score.repeat_bp as f64 / unit_len as f64;
    for (i, &threshold) in thresholds.iter().enumerate() {
        if threshold < score.log_probability {
            tally.occurrences[i] += occurrence;
            tally.accepted[i].push(read.id.clone());
        }
    }
    tally
}

/// Estimate the copy number of `locus` from `reads`.
///
/// Only the reads in `candidates` or `truth` are decoded, but every read is
/// counted for the coverage. The read length is that of the first read.
/// With `truth`, the threshold with sensitivity above
/// `config.min_sensitivity` whose copy number is closest to the number of
/// reference segments is selected. Without it, the strictest threshold
/// strictly below the baseline score is used.
pub fn estimate_copy_number<I>(
    locus: &VntrLocus,
    model: &MatcherModel,
    candidates: &HashSet<String>,
    truth: Option<&HashSet<String>>,
    reads: I,
    config: &EstimateConfig,
) -> Result<Estimate>
where
    I: IntoIterator<Item = Result<ReadRecord>>,
{
    let empty = HashSet::new();
    let truth_set = truth.unwrap_or(&empty);
    let mut missed: Vec<_> = truth_set.difference(candidates).collect();
    missed.sort();
    for id in missed {
        warn!("False negative in filtering: {} for {}", id, locus.id());
    }
    let min_score = min_score(
        model,
        locus.repeat_segments(),
        model.copies(),
        config.read_length,
    )?;
    let thresholds = config.thresholds(min_score.trunc());
    debug!("Baseline score of {} is {:.2}", locus.id(), min_score);
    let mut reads_scanned = 0;
    let mut read_length = 0;
    let mut relevant = vec![];
    for read in reads {
        let read = read?;
        if reads_scanned == 0 {
            read_length = read.seq.len();
        }
        reads_scanned += 1;
        if candidates.contains(&read.id) || truth_set.contains(&read.id) {
            relevant.push(read);
        }
    }
    debug!(
        "{} relevant reads out of {} for {}",
        relevant.len(),
        reads_scanned,
        locus.id()
    );
    let unit_len = locus.unit_len().max(1);
    let tally = relevant
        .par_iter()
        .fold(
            || Tally::new(thresholds.len()),
            |tally, read| {
                let min_bp = config.min_repeat_bp;
                classify(tally, read, model, &thresholds, unit_len, min_bp)
            },
        )
        .reduce(|| Tally::new(thresholds.len()), Tally::merge);
    if 0 < tally.skipped {
        info!("Skipped {} reads of {}", tally.skipped, locus.id());
    }
    let coverage = coverage(reads_scanned, read_length, config.genome_length);
    let evaluations: Vec<_> = thresholds
        .iter()
        .zip(tally.occurrences.iter())
        .zip(tally.accepted.iter())
        .map(|((&threshold, &occurrence), accepted)| {
            let true_positives = accepted
                .iter()
                .filter(|id| truth_set.contains(*id))
                .count();
            let sensitivity = match truth_set.len() {
                0 => 0f64,
                total => true_positives as f64 / total as f64,
            };
            ThresholdEvaluation {
                threshold,
                accepted: accepted.len(),
                true_positives,
                false_positives: accepted.len() - true_positives,
                sensitivity,
                occurrence,
            }
        })
        .collect();
    let known_segments = locus.repeat_segments().len() as f64;
    let selected = match truth {
        Some(_) => evaluations
            .iter()
            .filter(|eval| config.min_sensitivity < eval.sensitivity)
            .inspect(|eval| {
                info!(
                    "{}\t{}\tsensitivity {:.3}\tFP {}",
                    locus.id(),
                    eval.threshold,
                    eval.sensitivity,
                    eval.false_positives
                )
            })
            .fold(None, |best: Option<(f64, &ThresholdEvaluation)>, eval| {
                let error = (known_segments - eval.occurrence / coverage).abs();
                match best {
                    Some((min, _)) if min <= error => best,
                    _ => Some((error, eval)),
                }
            })
            .map(|(_, eval)| eval),
        None => evaluations
            .iter()
            .filter(|eval| eval.threshold < min_score)
            .last(),
    };
    let copy_number = match selected {
        _ if coverage <= 0f64 => CopyNumber::Unresolved(UnresolvedReason::CoverageUnavailable),
        Some(eval) => CopyNumber::Resolved(eval.occurrence / coverage),
        None => CopyNumber::Unresolved(UnresolvedReason::NoThresholdMeetsSensitivity),
    };
    let selected_threshold = match copy_number {
        CopyNumber::Resolved(_) => selected.map(|eval| eval.threshold),
        CopyNumber::Unresolved(_) => None,
    };
    Ok(Estimate {
        copy_number,
        min_score,
        coverage,
        read_length,
        reads_scanned,
        reads_decoded: tally.decoded,
        reads_skipped: tally.skipped,
        evaluations,
        selected_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::build_matcher;
    use crate::gen_seq::{generate_seq, sample_reads, tandem_locus, PROFILE};
    use crate::msa::Prealigned;
    use crate::seq::reverse_complement;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    const UNIT: &[u8] = b"ACGGTCAT";
    // Flanks that can not be confused with the unit at the junctions.
    fn locus(segments: Vec<Vec<u8>>, flank_len: usize, seed: u64) -> VntrLocus {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(seed);
        let mut left = generate_seq(&mut rng, flank_len);
        let mut right = generate_seq(&mut rng, flank_len);
        if let Some(last) = left.last_mut() {
            *last = b'G';
        }
        if let Some(first) = right.first_mut() {
            *first = b'C';
        }
        VntrLocus::new(
            "t".to_string(),
            UNIT.to_vec(),
            segments,
            left,
            right,
            "chrT".to_string(),
            1000,
        )
    }
    fn records(seqs: &[&[u8]]) -> Vec<Result<ReadRecord>> {
        seqs.iter()
            .enumerate()
            .map(|(i, seq)| Ok(ReadRecord::new(format!("r{}", i), seq.to_vec())))
            .collect()
    }
    #[test]
    fn three_copies() {
        let locus = locus(vec![UNIT.to_vec(); 5], 150, 1);
        let config = EstimateConfig::default();
        let model = build_matcher(&locus, 3, &config, &Prealigned).unwrap();
        let read = ReadRecord::new("r".to_string(), UNIT.repeat(3));
        let score = score_read(&model, &read).unwrap();
        assert_eq!(score.repeat_bp, 3 * UNIT.len());
        assert_eq!(score.repeat_bp as f64 / UNIT.len() as f64, 3f64);
        assert_eq!(score.orientation, Orientation::Forward);
        // And from the other strand.
        let read = ReadRecord::new("r".to_string(), reverse_complement(&UNIT.repeat(3)));
        let score = score_read(&model, &read).unwrap();
        assert_eq!(score.repeat_bp, 3 * UNIT.len());
        assert_eq!(score.orientation, Orientation::Reverse);
    }
    #[test]
    fn orientation_invariance() {
        let locus = locus(vec![UNIT.to_vec(); 4], 20, 2);
        let model = build_matcher(&locus, 3, &EstimateConfig::default(), &Prealigned).unwrap();
        let seq = [&locus.left_flank()[10..], &UNIT.repeat(2)[..]].concat();
        let plain = ReadRecord::new("a".to_string(), seq.clone());
        let twice = reverse_complement(&reverse_complement(&seq));
        let given = ReadRecord::new("a".to_string(), twice)
            .with_reverse_complement(reverse_complement(&seq));
        let (plain, given) = (score_read(&model, &plain), score_read(&model, &given));
        assert_eq!(plain.unwrap(), given.unwrap());
    }
    #[test]
    fn baseline_below_consensus() {
        let mut segments = vec![UNIT.to_vec(); 6];
        segments[2][3] = b'A';
        segments[3][5] = b'G';
        let locus = locus(segments, 0, 3);
        let mut config = EstimateConfig::default();
        config.read_length = 24;
        let copies = locus.copy_count(config.read_length);
        assert_eq!(copies, 4);
        let model = build_matcher(&locus, copies, &config, &Prealigned).unwrap();
        let min = min_score(&model, locus.repeat_segments(), copies, config.read_length).unwrap();
        assert!(min < 0f64);
        let consensus = UNIT.repeat(copies);
        let score = model.viterbi(&consensus).unwrap().log_probability;
        assert!(min <= score, "{} > {}", min, score);
        // Fewer segments than copies: no window at all.
        let short = min_score(&model, &locus.repeat_segments()[..2], copies, 24).unwrap();
        assert_eq!(short, 0f64);
        assert_eq!(min_score(&model, locus.repeat_segments(), 0, 24).unwrap(), 0f64);
    }
    #[test]
    fn baseline_below_flanked_consensus() {
        // Segment i carries a transversion at column i % 8.
        let segments: Vec<Vec<u8>> = (0..24)
            .map(|i| {
                let mut segment = UNIT.to_vec();
                segment[i % 8] = match segment[i % 8] {
                    b'A' => b'T',
                    b'C' => b'G',
                    b'G' => b'C',
                    _ => b'A',
                };
                segment
            })
            .collect();
        let locus = locus(segments, 200, 6);
        let config = EstimateConfig::default();
        let copies = locus.copy_count(config.read_length);
        assert_eq!(copies, 19);
        let model = build_matcher(&locus, copies, &config, &Prealigned).unwrap();
        let min = min_score(&model, locus.repeat_segments(), copies, config.read_length).unwrap();
        assert!(min < 0f64);
        let left = locus.left_flank();
        let read = [
            &left[left.len() - config.flank_size..],
            &UNIT.repeat(copies)[..],
            &locus.right_flank()[..config.flank_size],
        ]
        .concat();
        let score = model.viterbi(&read).unwrap().log_probability;
        assert!(min <= score, "{} > {}", min, score);
    }
    #[test]
    fn baseline_skips_ambiguous_segments() {
        let mut segments = vec![UNIT.to_vec(); 6];
        segments[3][3] = b'N';
        let locus = locus(segments, 150, 7);
        let config = EstimateConfig::default();
        let model = build_matcher(&locus, 3, &config, &Prealigned).unwrap();
        // Only the first window avoids the fourth segment.
        let min = min_score(&model, locus.repeat_segments(), 3, 24).unwrap();
        let first = model.viterbi(&UNIT.repeat(3)).unwrap().log_probability;
        assert_eq!(min, first.min(0f64));
        assert!(matches!(
            min_score(&model, &locus.repeat_segments()[2..5], 3, 24),
            Err(VntrError::InputShape(_))
        ));
        let ids: HashSet<String> = vec!["r0".to_string()].into_iter().collect();
        let reads = records(&[&UNIT.repeat(3)]);
        let estimate = estimate_copy_number(&locus, &model, &ids, None, reads, &config).unwrap();
        assert_eq!(estimate.min_score, min);
        assert_eq!(estimate.reads_decoded, 1);
    }
    #[test]
    fn empty_sets_are_unresolved() {
        let locus = locus(vec![UNIT.to_vec(); 4], 20, 4);
        let model = build_matcher(&locus, 3, &EstimateConfig::default(), &Prealigned).unwrap();
        let empty = HashSet::new();
        let config = EstimateConfig::default();
        let reads = records(&[b"ACGT", b"TTTT"]);
        let estimate =
            estimate_copy_number(&locus, &model, &empty, Some(&empty), reads, &config).unwrap();
        assert_eq!(
            estimate.copy_number,
            CopyNumber::Unresolved(UnresolvedReason::NoThresholdMeetsSensitivity)
        );
        assert_eq!(estimate.reads_scanned, 2);
        assert_eq!(estimate.reads_decoded, 0);
        assert!(estimate.evaluations.iter().all(|e| e.sensitivity == 0f64));
        let none: Vec<Result<ReadRecord>> = vec![];
        let estimate =
            estimate_copy_number(&locus, &model, &empty, Some(&empty), none, &config).unwrap();
        assert_eq!(
            estimate.copy_number,
            CopyNumber::Unresolved(UnresolvedReason::CoverageUnavailable)
        );
        assert_eq!(estimate.coverage, 0f64);
        assert_eq!(estimate.evaluations.len(), 26);
    }
    #[test]
    fn coverage_is_linear() {
        assert_eq!(coverage(0, 150, 1000), 0f64);
        assert_eq!(coverage(10, 150, 0), 0f64);
        let single = coverage(1000, 150, 102_531_392);
        assert_eq!(coverage(2000, 150, 102_531_392), 2f64 * single);
    }
    #[test]
    fn skips_bad_reads() {
        let locus = locus(vec![UNIT.to_vec(); 4], 20, 5);
        let config = EstimateConfig::default();
        let model = build_matcher(&locus, 3, &config, &Prealigned).unwrap();
        let reads = records(&[&UNIT.repeat(2), b"ACGNNA", b""]);
        let ids: HashSet<String> = vec!["r0", "r1", "r2"]
            .into_iter()
            .map(String::from)
            .collect();
        let estimate = estimate_copy_number(&locus, &model, &ids, None, reads, &config).unwrap();
        assert_eq!(estimate.reads_scanned, 3);
        assert_eq!(estimate.reads_decoded, 1);
        assert_eq!(estimate.reads_skipped, 2);
        assert_eq!(estimate.read_length, 16);
    }
    #[test]
    fn simulated() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(42);
        let locus = tandem_locus(&mut rng, "sim", UNIT, 20, 300, 0.02);
        let haplotype = locus.reference_sequence();
        let read_len = 60;
        // Reads start uniformly at one of these positions.
        let genome_length = haplotype.len() - read_len + 1;
        let config = EstimateConfig::new(read_len, genome_length);
        let copies = locus.copy_count(read_len);
        let model = build_matcher(&locus, copies, &config, &Prealigned).unwrap();
        let reads = sample_reads(&mut rng, &haplotype, read_len, 1000, &PROFILE);
        let (repeat_start, repeat_end) = (300, 300 + locus.length());
        let truth: HashSet<String> = reads
            .iter()
            .enumerate()
            .filter(|(_, (start, _))| *start < repeat_end && repeat_start < start + read_len)
            .map(|(i, _)| format!("r{}", i))
            .collect();
        let records: Vec<_> = reads
            .iter()
            .enumerate()
            .map(|(i, (_, seq))| Ok(ReadRecord::new(format!("r{}", i), seq.clone())))
            .collect();
        let estimate =
            estimate_copy_number(&locus, &model, &truth, Some(&truth), records, &config).unwrap();
        let expected = coverage(1000, estimate.read_length, genome_length);
        assert_eq!(estimate.coverage, expected);
        assert_eq!(estimate.reads_decoded, truth.len());
        // Stricter thresholds accept subsets.
        for pair in estimate.evaluations.windows(2) {
            assert!(pair[1].accepted <= pair[0].accepted);
            assert!(pair[1].sensitivity <= pair[0].sensitivity);
            assert!(pair[1].occurrence <= pair[0].occurrence);
        }
        let cn = estimate.copy_number.value().unwrap();
        assert!((cn - 20f64).abs() < 4f64, "{:?}", estimate);
    }
}
