//! Synthetic tandem repeats and reads, to assess the estimator.
//! Usually, it would not be used in the real-applications.
use crate::locus::VntrLocus;
use crate::seq::reverse_complement;
use rand::seq::SliceRandom;
use rand::Rng;

/// Per-base error rates.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub sub: f64,
    pub del: f64,
    pub ins: f64,
}

pub const PROFILE: Profile = Profile {
    sub: 0.01,
    del: 0.005,
    ins: 0.005,
};

#[derive(Debug, Clone, Copy)]
enum Op {
    Match,
    MisMatch,
    Del,
    In,
}
impl Op {
    fn weight(self, p: &Profile) -> f64 {
        match self {
            Op::Match => 1. - p.sub - p.del - p.ins,
            Op::MisMatch => p.sub,
            Op::Del => p.del,
            Op::In => p.ins,
        }
    }
}
const OPERATIONS: [Op; 4] = [Op::Match, Op::MisMatch, Op::Del, Op::In];

pub fn introduce_randomness<T: Rng>(seq: &[u8], rng: &mut T, p: &Profile) -> Vec<u8> {
    let mut res = vec![];
    let mut remainings: Vec<_> = seq.iter().copied().rev().collect();
    while let Some(&base) = remainings.last() {
        match OPERATIONS.choose_weighted(rng, |e| e.weight(p)) {
            Ok(Op::MisMatch) => {
                remainings.pop();
                res.push(choose_base(rng, base));
            }
            Ok(Op::In) => res.push(random_base(rng)),
            Ok(Op::Del) => {
                remainings.pop();
            }
            _ => {
                remainings.pop();
                res.push(base);
            }
        }
    }
    res
}

pub fn generate_seq<T: Rng>(rng: &mut T, len: usize) -> Vec<u8> {
    let bases = b"ACTG";
    (0..len)
        .filter_map(|_| bases.choose(rng))
        .copied()
        .collect()
}

fn choose_base<T: Rng>(rng: &mut T, base: u8) -> u8 {
    let bases: Vec<u8> = b"ATCG".iter().filter(|&&e| e != base).copied().collect();
    bases.choose(rng).copied().unwrap_or(base)
}
fn random_base<T: Rng>(rng: &mut T) -> u8 {
    b"ATGC".choose(rng).copied().unwrap_or(b'A')
}

/// A locus of `copies` segments of `unit`, each passed through `profile`
/// with substitutions only, so that the segments stay aligned.
pub fn tandem_locus<T: Rng>(
    rng: &mut T,
    id: &str,
    unit: &[u8],
    copies: usize,
    flank_len: usize,
    sub: f64,
) -> VntrLocus {
    let segments: Vec<Vec<u8>> = (0..copies)
        .map(|_| {
            unit.iter()
                .map(|&base| match rng.gen_bool(sub) {
                    true => choose_base(rng, base),
                    false => base,
                })
                .collect()
        })
        .collect();
    let left_flank = generate_seq(rng, flank_len);
    let right_flank = generate_seq(rng, flank_len);
    VntrLocus::new(
        id.to_string(),
        unit.to_vec(),
        segments,
        left_flank,
        right_flank,
        "chrS".to_string(),
        1_000,
    )
}

/// Reads of `read_len` drawn uniformly from `haplotype`. Half of them are
/// reverse complemented.
pub fn sample_reads<T: Rng>(
    rng: &mut T,
    haplotype: &[u8],
    read_len: usize,
    num: usize,
    profile: &Profile,
) -> Vec<(usize, Vec<u8>)> {
    if haplotype.len() < read_len {
        return vec![];
    }
    (0..num)
        .map(|_| {
            let start = rng.gen_range(0..=haplotype.len() - read_len);
            let read = introduce_randomness(&haplotype[start..start + read_len], rng, profile);
            match rng.gen_bool(0.5) {
                true => (start, reverse_complement(&read)),
                false => (start, read),
            }
        })
        .collect()
}
