//! Profile hidden Markov model of a single repeat unit.
//!
//! The model is a linear chain of Match/Insert/Delete states trained from a
//! multiple alignment of the observed repeat segments. Columns where gaps
//! are frequent become insertion columns, the others are "core" columns,
//! each of which owns one Match and one Delete state.
//!
//! States are laid out in a fixed order so that both tables are plain
//! arrays:
//!
//! ```text
//! unit_start, I0, M1, D1, I1, M2, D2, I2, ..., ML, DL, IL, unit_end
//! ```
//!
//! The transition table is a dense `states x states` matrix in row-major
//! order; by accessing `from * states + to` we get Pr{from -> to}.
use crate::error::{Result, VntrError};
use crate::seq::{convert_to_twobit, ALPHABET, GAP, NULL};
use serde::{Deserialize, Serialize};

/// A state of the profile. Match, Insert, and Delete carry the core column
/// index they belong to; Match/Delete run over `1..=L`, Insert over `0..=L`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileState {
    Start,
    End,
    Match(usize),
    Insert(usize),
    Delete(usize),
}

impl ProfileState {
    /// Index into the tables of a profile with `core_len` core columns.
    pub fn index(self, core_len: usize) -> usize {
        match self {
            ProfileState::Start => 0,
            ProfileState::Match(i) => 3 * i - 1,
            ProfileState::Delete(i) => 3 * i,
            ProfileState::Insert(i) => 3 * i + 1,
            ProfileState::End => 3 * core_len + 2,
        }
    }
    pub fn from_index(index: usize, core_len: usize) -> Self {
        if index == 0 {
            ProfileState::Start
        } else if index == 3 * core_len + 2 {
            ProfileState::End
        } else {
            match index % 3 {
                0 => ProfileState::Delete(index / 3),
                1 => ProfileState::Insert(index / 3),
                _ => ProfileState::Match((index + 1) / 3),
            }
        }
    }
    /// Silent states consume no symbol.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            ProfileState::Start | ProfileState::End | ProfileState::Delete(_)
        )
    }
    /// The architecturally valid successors. Every other target has
    /// probability exactly zero.
    pub fn successors(self, core_len: usize) -> Vec<ProfileState> {
        use ProfileState::*;
        let position = match self {
            Start => 0,
            End => return vec![],
            Match(i) | Insert(i) | Delete(i) => i,
        };
        if position < core_len {
            vec![Insert(position), Match(position + 1), Delete(position + 1)]
        } else {
            vec![Insert(position), End]
        }
    }
}

impl std::fmt::Display for ProfileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileState::Start => write!(f, "unit_start"),
            ProfileState::End => write!(f, "unit_end"),
            ProfileState::Match(i) => write!(f, "M{}", i),
            ProfileState::Insert(i) => write!(f, "I{}", i),
            ProfileState::Delete(i) => write!(f, "D{}", i),
        }
    }
}

/// Equal-length aligned rows over {A,C,G,T,-}, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    rows: Vec<Vec<u8>>,
}

impl Alignment {
    /// Validate aligned rows. Rows with a symbol outside the alphabet are
    /// dropped (and logged); unequal lengths or an alignment without any
    /// usable row is an error.
    pub fn new<T: AsRef<[u8]>>(rows: &[T]) -> Result<Self> {
        let width = match rows.first() {
            Some(row) => row.as_ref().len(),
            None => return Err(VntrError::InputShape("empty alignment".to_string())),
        };
        if width == 0 {
            return Err(VntrError::InputShape("zero-width alignment".to_string()));
        }
        if let Some((i, len)) = rows
            .iter()
            .map(|row| row.as_ref().len())
            .enumerate()
            .find(|&(_, len)| len != width)
        {
            let message = format!("row {} has length {}, expected {}", i, len, width);
            return Err(VntrError::InputShape(message));
        }
        let rows: Vec<Vec<u8>> = rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let row = row.as_ref();
                match row.iter().position(|b| convert_to_twobit(b) == NULL) {
                    Some(position) => {
                        let why = VntrError::Alphabet {
                            symbol: row[position],
                            position,
                        };
                        warn!("Skip alignment row {}: {}", i, why);
                        None
                    }
                    None => Some(row.to_ascii_uppercase()),
                }
            })
            .collect();
        if rows.is_empty() {
            return Err(VntrError::InputShape(
                "no alignment row is over the nucleotide alphabet".to_string(),
            ));
        }
        Ok(Self { rows })
    }
    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }
    /// The rows repeated `times` times (at least once).
    pub fn replicated(&self, times: usize) -> Self {
        let rows: Vec<_> = (0..times.max(1))
            .flat_map(|_| self.rows.iter().cloned())
            .collect();
        Self { rows }
    }
    pub fn width(&self) -> usize {
        self.rows[0].len()
    }
    /// Number of gaps in each column.
    pub fn column_gaps(&self) -> Vec<usize> {
        let mut column = Vec::with_capacity(self.rows.len());
        (0..self.width())
            .map(|j| {
                column.clear();
                column.extend(self.rows.iter().map(|row| row[j]));
                bytecount::count(&column, b'-')
            })
            .collect()
    }
}

/// Pseudocount used for a repeat alignment of `rows` sequences.
pub fn pseudocount(rows: usize, error_rate: f64) -> f64 {
    (rows as f64 / 4f64) * (error_rate / 10f64)
}

/// A trained profile: emission and transition tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileHmm {
    core_len: usize,
    // Indexed by state. None for silent states.
    emission: Vec<Option<[f64; 4]>>,
    // [from * states + to] = Pr{from -> to}
    transition: Vec<f64>,
}

impl ProfileHmm {
    /// Number of core (Match/Delete) columns.
    pub fn core_len(&self) -> usize {
        self.core_len
    }
    pub fn num_states(&self) -> usize {
        3 * self.core_len + 3
    }
    /// All states in table order.
    pub fn states(&self) -> impl Iterator<Item = ProfileState> + '_ {
        (0..self.num_states()).map(move |i| ProfileState::from_index(i, self.core_len))
    }
    pub fn emission(&self, state: ProfileState) -> Option<&[f64; 4]> {
        self.emission[state.index(self.core_len)].as_ref()
    }
    pub fn transition(&self, from: ProfileState, to: ProfileState) -> f64 {
        let states = self.num_states();
        self.transition[from.index(self.core_len) * states + to.index(self.core_len)]
    }
    /// Transitions out of `from` with non-zero probability.
    pub fn transitions_from(
        &self,
        from: ProfileState,
    ) -> impl Iterator<Item = (ProfileState, f64)> + '_ {
        let states = self.num_states();
        let start = from.index(self.core_len) * states;
        self.transition[start..start + states]
            .iter()
            .enumerate()
            .filter(|&(_, &p)| 0f64 < p)
            .map(move |(to, &p)| (ProfileState::from_index(to, self.core_len), p))
    }
    /// The most probable symbol of each Match state.
    pub fn consensus(&self) -> Vec<u8> {
        (1..=self.core_len)
            .filter_map(|i| self.emission(ProfileState::Match(i)))
            .map(|probs| {
                let (argmax, _) = probs.iter().enumerate().fold(
                    (0, f64::MIN),
                    |(i, max), (j, &p)| if max < p { (j, p) } else { (i, max) },
                );
                ALPHABET[argmax]
            })
            .collect()
    }
}

impl std::fmt::Display for ProfileHmm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let states: Vec<_> = self.states().collect();
        let names: Vec<_> = states.iter().map(|s| s.to_string()).collect();
        writeln!(f, "\t{}", names.join("\t"))?;
        for &from in states.iter() {
            let probs: Vec<_> = states
                .iter()
                .map(|&to| format!("{:.3}", self.transition(from, to)))
                .collect();
            writeln!(f, "{}\t{}", from, probs.join("\t"))?;
        }
        writeln!(f, "--------")?;
        let header: Vec<_> = ALPHABET.iter().map(|&b| (b as char).to_string()).collect();
        writeln!(f, "\t{}", header.join("\t"))?;
        for &state in states.iter() {
            let probs = self.emission(state).copied().unwrap_or([0f64; 4]);
            let [a, c, g, t] = probs;
            writeln!(f, "{}\t{:.3}\t{:.3}\t{:.3}\t{:.3}", state, a, c, g, t)?;
        }
        Ok(())
    }
}

// Walk a row left to right. Core columns always yield a Match or a Delete;
// insertion columns yield an Insert only when the row has a symbol there.
fn state_path(row: &[u8], is_insert: &[bool]) -> Vec<(ProfileState, Option<u8>)> {
    let mut core = 0;
    row.iter()
        .zip(is_insert.iter())
        .filter_map(|(base, &insert)| {
            let code = convert_to_twobit(base);
            if insert {
                (code != GAP).then(|| (ProfileState::Insert(core), Some(code)))
            } else {
                core += 1;
                match code {
                    GAP => Some((ProfileState::Delete(core), None)),
                    _ => Some((ProfileState::Match(core), Some(code))),
                }
            }
        })
        .collect()
}

fn smooth_emission(counts: &[f64; 4], pseudocount: f64) -> [f64; 4] {
    let total: f64 = counts.iter().sum();
    if total <= 0f64 {
        return [4f64.recip(); 4];
    }
    let mut probs = [0f64; 4];
    probs
        .iter_mut()
        .zip(counts.iter())
        .for_each(|(p, &c)| *p = c / total + pseudocount);
    let sum: f64 = probs.iter().sum();
    probs.iter_mut().for_each(|p| *p /= sum);
    probs
}

/// Train a profile from `alignment`.
///
/// A column is an insertion column iff its gap count is at least
/// `insertion_threshold * rows`. Emission frequencies are smoothed by adding
/// `pseudocount` to each normalized frequency; transition counts by
/// `(count + pseudocount) / (total + pseudocount * successors)`.
pub fn train(
    alignment: &Alignment,
    insertion_threshold: f64,
    pseudocount: f64,
) -> Result<ProfileHmm> {
    let rows = alignment.rows();
    let threshold = insertion_threshold * rows.len() as f64;
    let is_insert: Vec<bool> = alignment
        .column_gaps()
        .into_iter()
        .map(|gaps| threshold <= gaps as f64)
        .collect();
    let core_len = is_insert.iter().filter(|&&x| !x).count();
    if core_len == 0 {
        return Err(VntrError::InputShape(
            "every column is an insertion column".to_string(),
        ));
    }
    let states = 3 * core_len + 3;
    debug!(
        "Training a profile of {} core columns from {} rows ({} insertion columns)",
        core_len,
        rows.len(),
        alignment.width() - core_len
    );
    let mut emission_counts = vec![[0f64; 4]; states];
    let mut transition_counts = vec![0f64; states * states];
    for row in rows.iter() {
        let path = state_path(row, &is_insert);
        let mut from = ProfileState::Start.index(core_len);
        for &(state, symbol) in path.iter() {
            let to = state.index(core_len);
            if let Some(symbol) = symbol {
                emission_counts[to][symbol as usize] += 1f64;
            }
            transition_counts[from * states + to] += 1f64;
            from = to;
        }
        transition_counts[from * states + ProfileState::End.index(core_len)] += 1f64;
    }
    let emission: Vec<_> = emission_counts
        .iter()
        .enumerate()
        .map(|(i, counts)| {
            let state = ProfileState::from_index(i, core_len);
            (!state.is_silent()).then(|| smooth_emission(counts, pseudocount))
        })
        .collect();
    let mut transition = vec![0f64; states * states];
    for from in 0..states {
        let successors = ProfileState::from_index(from, core_len).successors(core_len);
        if successors.is_empty() {
            continue;
        }
        let counts = &transition_counts[from * states..(from + 1) * states];
        let successors: Vec<_> = successors.iter().map(|s| s.index(core_len)).collect();
        debug_assert!(counts
            .iter()
            .enumerate()
            .all(|(to, &c)| c == 0f64 || successors.contains(&to)));
        let total: f64 = successors.iter().map(|&to| counts[to]).sum();
        let denom = total + pseudocount * successors.len() as f64;
        for &to in successors.iter() {
            transition[from * states + to] = if 0f64 < total {
                (counts[to] + pseudocount) / denom
            } else {
                (successors.len() as f64).recip()
            };
        }
    }
    Ok(ProfileHmm {
        core_len,
        emission,
        transition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256StarStar;
    const TOLERANCE: f64 = 0.000000001;
    // Rows of a random alignment with a few gappy columns.
    fn random_alignment<R: Rng>(rng: &mut R, rows: usize, width: usize) -> Vec<Vec<u8>> {
        let gappy: Vec<bool> = (0..width).map(|_| rng.gen_bool(0.2)).collect();
        let template = crate::gen_seq::generate_seq(rng, width);
        (0..rows)
            .map(|_| {
                template
                    .iter()
                    .zip(gappy.iter())
                    .map(|(&base, &gappy)| {
                        let gap_prob = if gappy { 0.8 } else { 0.05 };
                        if rng.gen_bool(gap_prob) {
                            b'-'
                        } else if rng.gen_bool(0.1) {
                            ALPHABET[rng.gen_range(0..4)]
                        } else {
                            base
                        }
                    })
                    .collect()
            })
            .collect()
    }
    #[test]
    fn state_index_roundtrip() {
        let core_len = 5;
        for i in 0..3 * core_len + 3 {
            assert_eq!(ProfileState::from_index(i, core_len).index(core_len), i);
        }
        assert_eq!(ProfileState::from_index(1, core_len), ProfileState::Insert(0));
        assert_eq!(ProfileState::from_index(2, core_len), ProfileState::Match(1));
        assert_eq!(ProfileState::from_index(17, core_len), ProfileState::End);
    }
    #[test]
    fn identical_rows() {
        let alignment = Alignment::new(&[b"ACGT"; 4]).unwrap();
        let profile = train(&alignment, 0.5, 0.01).unwrap();
        assert_eq!(profile.core_len(), 4);
        for (i, &base) in b"ACGT".iter().enumerate() {
            let probs = profile.emission(ProfileState::Match(i + 1)).unwrap();
            let observed = convert_to_twobit(&base) as usize;
            for (j, &p) in probs.iter().enumerate() {
                if j != observed {
                    assert!(p < probs[observed]);
                }
            }
            assert!((probs[observed] - 1.01 / 1.04).abs() < TOLERANCE);
        }
        assert_eq!(profile.consensus(), b"ACGT".to_vec());
        // Never visited: uniform.
        let insert = profile.emission(ProfileState::Insert(2)).unwrap();
        assert!(insert.iter().all(|&p| (p - 0.25).abs() < TOLERANCE));
        assert!(profile.emission(ProfileState::Delete(2)).is_none());
        let expected = (4f64 + 0.01) / (4f64 + 0.03);
        let mat = profile.transition(ProfileState::Match(1), ProfileState::Match(2));
        assert!((mat - expected).abs() < TOLERANCE);
    }
    #[test]
    fn insert_columns() {
        let rows = [b"AC-GT", b"ACTGT", b"AC-GA"];
        let alignment = Alignment::new(&rows).unwrap();
        assert_eq!(alignment.column_gaps(), vec![0, 0, 2, 0, 0]);
        let is_insert = [false, false, true, false, false];
        let path: Vec<_> = state_path(rows[1], &is_insert)
            .into_iter()
            .map(|x| x.0)
            .collect();
        use ProfileState::*;
        assert_eq!(path, vec![Match(1), Match(2), Insert(2), Match(3), Match(4)]);
        let path: Vec<_> = state_path(b"-C-GA", &is_insert)
            .into_iter()
            .map(|x| x.0)
            .collect();
        assert_eq!(path, vec![Delete(1), Match(2), Match(3), Match(4)]);
        let profile = train(&alignment, 0.5, 0.01).unwrap();
        assert_eq!(profile.core_len(), 4);
        let profile = train(&alignment, 0.9, 0.01).unwrap();
        assert_eq!(profile.core_len(), 5);
    }
    #[test]
    fn distributions_sum_to_one() {
        for seed in 0..20 {
            let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(seed);
            let rows = random_alignment(&mut rng, 12, 30);
            let alignment = Alignment::new(&rows).unwrap();
            let profile = train(&alignment, 0.5, pseudocount(rows.len(), 0.05)).unwrap();
            for state in profile.states() {
                if let Some(probs) = profile.emission(state) {
                    let sum: f64 = probs.iter().sum();
                    assert!((sum - 1f64).abs() < TOLERANCE, "{}\t{}", state, sum);
                }
                if state != ProfileState::End {
                    let sum: f64 = profile.states().map(|to| profile.transition(state, to)).sum();
                    assert!((sum - 1f64).abs() < TOLERANCE, "{}\t{}", state, sum);
                }
            }
        }
    }
    #[test]
    fn invalid_successors_are_zero() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(3290);
        let rows = random_alignment(&mut rng, 8, 25);
        let alignment = Alignment::new(&rows).unwrap();
        let profile = train(&alignment, 0.4, 0.3).unwrap();
        let core_len = profile.core_len();
        for from in profile.states() {
            let successors = from.successors(core_len);
            for to in profile.states() {
                let p = profile.transition(from, to);
                if successors.contains(&to) {
                    assert!(0f64 < p);
                } else {
                    assert_eq!(p, 0f64, "{}->{}", from, to);
                }
            }
        }
    }
    #[test]
    fn unvisited_states_are_uniform() {
        let alignment = Alignment::new(&[b"ACG", b"ACG"]).unwrap();
        let profile = train(&alignment, 0.5, 0.1).unwrap();
        use ProfileState::*;
        for &to in &[Insert(1), Match(2), Delete(2)] {
            assert!((profile.transition(Delete(1), to) - 1f64 / 3f64).abs() < TOLERANCE);
        }
        for &to in &[Insert(3), End] {
            assert!((profile.transition(Insert(3), to) - 0.5).abs() < TOLERANCE);
        }
    }
    #[test]
    fn deterministic() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(42);
        let rows = random_alignment(&mut rng, 10, 40);
        let alignment = Alignment::new(&rows).unwrap();
        let first = train(&alignment, 0.3, 0.2).unwrap();
        let second = train(&alignment, 0.3, 0.2).unwrap();
        assert_eq!(first, second);
    }
    #[test]
    fn malformed_alignments() {
        let empty: [&[u8]; 0] = [];
        assert!(matches!(Alignment::new(&empty), Err(VntrError::InputShape(_))));
        let ragged: [&[u8]; 2] = [b"ACGT", b"ACG"];
        assert!(matches!(Alignment::new(&ragged), Err(VntrError::InputShape(_))));
        let rows: [&[u8]; 3] = [b"ACGT", b"ACNT", b"acgt"];
        let alignment = Alignment::new(&rows).unwrap();
        assert_eq!(alignment.rows().len(), 2);
        assert_eq!(alignment.rows()[1], b"ACGT".to_vec());
        let rows: [&[u8]; 1] = [b"AXGT"];
        assert!(Alignment::new(&rows).is_err());
        let gaps = Alignment::new(&[b"--", b"--"]).unwrap();
        assert!(matches!(train(&gaps, 0.5, 0.1), Err(VntrError::InputShape(_))));
    }
    #[test]
    fn display_tables() {
        let alignment = Alignment::new(&[b"AC", b"AC"]).unwrap();
        let profile = train(&alignment, 0.5, 0.1).unwrap();
        let table = profile.to_string();
        assert!(table.starts_with("\tunit_start\tI0\tM1\tD1\tI1\tM2\tD2\tI2\tunit_end\n"));
        assert!(table.contains("--------"));
    }
}
