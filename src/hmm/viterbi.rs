//! Most probable state path of a read through a [`MatcherModel`].
use super::MatcherModel;
use crate::error::{Result, VntrError};
use crate::seq::{encode, reverse_complement};
use crate::EP;

// Marks a cell without a predecessor.
const NONE: u32 = u32::MAX;
// Scores below this value only come from impossible paths.
const REACHABLE: f64 = EP / 2f64;

/// One state of a decoded path. `position` is the 0-based read position
/// consumed by an emitting state, `None` for silent states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    pub state: usize,
    pub position: Option<usize>,
}

/// Result of a Viterbi run.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoding {
    /// Natural log of the best path probability, or `EP` if the read can
    /// not be generated at all.
    pub log_probability: f64,
    /// The best path from the model start to the model end. Empty iff the
    /// end is unreachable.
    pub path: Vec<PathStep>,
}

impl Decoding {
    pub fn is_reachable(&self) -> bool {
        !self.path.is_empty()
    }
    /// The number of read bases emitted by repeat Match/Insert states.
    pub fn repeat_bp(&self, model: &MatcherModel) -> usize {
        self.path
            .iter()
            .filter(|step| step.position.is_some())
            .filter(|step| model.label(step.state).is_repeat_emission())
            .count()
    }
    /// Human readable path, for logging.
    pub fn describe(&self, model: &MatcherModel) -> String {
        let names: Vec<_> = self
            .path
            .iter()
            .filter(|step| step.position.is_some())
            .map(|step| model.label(step.state).to_string())
            .collect();
        names.join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Forward,
    Reverse,
}

impl MatcherModel {
    /// Viterbi decoding of `seq`. Fails if `seq` is empty or contains a
    /// symbol outside ACGT.
    pub fn viterbi(&self, seq: &[u8]) -> Result<Decoding> {
        let seq = encode(seq)?;
        let states = self.num_states();
        let mut prev = vec![EP; states];
        let mut current = vec![EP; states];
        let mut traceback = vec![NONE; (seq.len() + 1) * states];
        current[self.start()] = 0f64;
        self.fill_silent(&mut current, &mut traceback[..states]);
        for (i, &base) in seq.iter().enumerate().map(|(i, x)| (i + 1, x)) {
            std::mem::swap(&mut prev, &mut current);
            current.iter_mut().for_each(|x| *x = EP);
            let column = &mut traceback[i * states..(i + 1) * states];
            for &s in self.emitting_states() {
                let (score, from) = best_predecessor(&prev, self.incoming(s));
                if let (Some(from), Some(emission)) = (from, self.log_emission(s)) {
                    current[s] = score + emission[base as usize];
                    column[s] = from as u32;
                }
            }
            self.fill_silent(&mut current, column);
        }
        let score = current[self.end()];
        if score <= REACHABLE {
            return Ok(Decoding {
                log_probability: EP,
                path: vec![],
            });
        }
        let mut path = vec![];
        let (mut state, mut column) = (self.end(), seq.len());
        loop {
            let emitting = !self.is_silent(state);
            path.push(PathStep {
                state,
                position: emitting.then(|| column - 1),
            });
            if state == self.start() && column == 0 {
                break;
            }
            let from = traceback[column * states + state];
            if from == NONE {
                let why = format!("broken traceback at {}", self.label(state));
                return Err(VntrError::Model(why));
            }
            if emitting {
                column -= 1;
            }
            state = from as usize;
        }
        path.reverse();
        Ok(Decoding {
            log_probability: score,
            path,
        })
    }
    /// Decode `seq` and its reverse complement, returning the better one.
    /// The forward strand wins ties. `revcomp` may supply a precomputed
    /// reverse complement.
    pub fn viterbi_both_strands(
        &self,
        seq: &[u8],
        revcomp: Option<&[u8]>,
    ) -> Result<(Orientation, Decoding)> {
        let forward = self.viterbi(seq)?;
        let reverse = match revcomp {
            Some(revcomp) => self.viterbi(revcomp)?,
            None => self.viterbi(&reverse_complement(seq))?,
        };
        if forward.log_probability < reverse.log_probability {
            Ok((Orientation::Reverse, reverse))
        } else {
            Ok((Orientation::Forward, forward))
        }
    }
    // Propagate scores through silent states of the same column.
    fn fill_silent(&self, row: &mut [f64], column: &mut [u32]) {
        for &s in self.silent_order() {
            if s == self.start() {
                continue;
            }
            if let (score, Some(from)) = best_predecessor(row, self.incoming(s)) {
                row[s] = score;
                column[s] = from as u32;
            }
        }
    }
}

// The best reachable predecessor. The first one wins ties.
fn best_predecessor(row: &[f64], incoming: &[(usize, f64)]) -> (f64, Option<usize>) {
    incoming
        .iter()
        .filter(|&&(from, _)| REACHABLE < row[from])
        .fold((EP, None), |(max, arg), &(from, lp)| {
            let score = row[from] + lp;
            match arg {
                Some(_) if score <= max => (max, arg),
                _ => (score, Some(from)),
            }
        })
}
