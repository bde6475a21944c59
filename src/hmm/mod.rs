//! A tiny hidden Markov model runtime over an explicit state graph.
//!
//! The composite VNTR matcher is assembled from three submodels, each of
//! which is a run of states added to a [`ModelBuilder`]. States are either
//! emitting (one distribution over ACGT) or silent. After all submodels are
//! chained, `bake` turns the builder into an immutable [`MatcherModel`]:
//! probabilities go to log space, each state gets the list of its
//! predecessors, and silent states are put in topological order so that the
//! decoder can propagate through chains of silent states within a column.
pub mod flank;
pub mod repeats;
pub mod viterbi;
pub use viterbi::{Decoding, Orientation, PathStep};

use crate::error::{Result, VntrError};
use crate::profile::ProfileState;
use crate::EP;
use serde::{Deserialize, Serialize};

// Tolerance on the row sums of the transition matrix.
const ROW_SUM_TOLERANCE: f64 = 0.000001;

pub(crate) fn log(x: &f64) -> f64 {
    assert!(!x.is_sign_negative(), "{}", x);
    if f64::EPSILON < x.abs() {
        x.ln()
    } else {
        EP
    }
}

/// Parameters of the fixed (untrained) parts of the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatcherParams {
    /// Pr{Mat->Mat}, Pr{Mat->Ins}, Pr{Mat->Del} in the flank matchers.
    pub mat: (f64, f64, f64),
    /// Pr{Ins->Mat}, Pr{Ins->Ins}, Pr{Ins->Del}
    pub ins: (f64, f64, f64),
    /// Pr{Del->Mat}, Pr{Del->Ins}, Pr{Del->Del}
    pub del: (f64, f64, f64),
    /// Pr{flank base is read as itself}.
    pub match_emit: f64,
    /// Pr{a read enters the first repeat copy past its first column}.
    pub partial_entry: f64,
    /// Pr{the repeats stop after a complete copy}.
    pub copy_exit: f64,
    /// Pr{the repeats stop right after a Match state inside a copy}.
    pub partial_exit: f64,
}

impl std::default::Default for MatcherParams {
    fn default() -> Self {
        Self {
            mat: (0.96, 0.02, 0.02),
            ins: (0.85, 0.10, 0.05),
            del: (0.85, 0.10, 0.05),
            match_emit: 0.97,
            partial_entry: 0.5,
            copy_exit: 0.1,
            partial_exit: 0.05,
        }
    }
}

/// The submodel a state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    LeftFlank,
    /// The k-th copy of the repeat unit, 1-based.
    Repeat(usize),
    RightFlank,
    /// Silent entry/exit of the repeat block.
    Junction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateLabel {
    pub segment: Segment,
    pub state: ProfileState,
}

impl StateLabel {
    pub fn new(segment: Segment, state: ProfileState) -> Self {
        Self { segment, state }
    }
    /// Emitting state of one of the repeat copies.
    pub fn is_repeat_emission(&self) -> bool {
        matches!(self.segment, Segment::Repeat(_))
            && matches!(self.state, ProfileState::Match(_) | ProfileState::Insert(_))
    }
}

impl std::fmt::Display for StateLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.segment {
            Segment::LeftFlank => write!(f, "{}_suffix", self.state),
            Segment::Repeat(k) => write!(f, "{}_{}", self.state, k),
            Segment::RightFlank => write!(f, "{}_prefix", self.state),
            Segment::Junction => write!(f, "{}_repeats", self.state),
        }
    }
}

/// Entry and exit (both silent) of a submodel inside a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submodel {
    pub start: usize,
    pub end: usize,
}

/// Mutable state graph. Transition probabilities are in normal space.
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    labels: Vec<StateLabel>,
    emissions: Vec<Option<[f64; 4]>>,
    transitions: Vec<(usize, usize, f64)>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn num_states(&self) -> usize {
        self.labels.len()
    }
    /// Add a state. `None` makes it silent.
    pub fn add_state(&mut self, label: StateLabel, emission: Option<[f64; 4]>) -> usize {
        self.labels.push(label);
        self.emissions.push(emission);
        self.labels.len() - 1
    }
    pub fn add_transition(&mut self, from: usize, to: usize, prob: f64) {
        self.transitions.push((from, to, prob));
    }
    /// Chain `second` after `first`.
    pub fn concatenate(&mut self, first: &Submodel, second: &Submodel) {
        self.add_transition(first.end, second.start, 1f64);
    }
    /// Freeze the graph. Every state except `end` must have outgoing
    /// probabilities summing to one, and silent states must not form a cycle.
    pub fn bake(self, start: usize, end: usize, copies: usize) -> Result<MatcherModel> {
        let states = self.labels.len();
        if states <= start.max(end) {
            return Err(VntrError::Model(format!(
                "start {} or end {} out of {} states",
                start, end, states
            )));
        }
        let mut row_sums = vec![0f64; states];
        let mut incoming = vec![vec![]; states];
        for &(from, to, prob) in self.transitions.iter() {
            if states <= from.max(to) || prob.is_sign_negative() {
                return Err(VntrError::Model(format!(
                    "invalid transition {}->{} ({})",
                    from, to, prob
                )));
            }
            row_sums[from] += prob;
            if 0f64 < prob {
                incoming[to].push((from, log(&prob)));
            }
        }
        if let Some((state, sum)) = row_sums
            .iter()
            .enumerate()
            .find(|&(s, sum)| s != end && ROW_SUM_TOLERANCE < (sum - 1f64).abs())
        {
            return Err(VntrError::Model(format!(
                "transitions out of {} sum to {}",
                self.labels[state], sum
            )));
        }
        let log_emissions: Vec<_> = self
            .emissions
            .iter()
            .map(|emission| emission.map(|probs| [0, 1, 2, 3].map(|i| log(&probs[i]))))
            .collect();
        let model = MatcherModel {
            silent_order: vec![],
            emitting: vec![],
            labels: self.labels,
            log_emissions,
            incoming,
            start,
            end,
            copies,
        };
        model.finalize()
    }
}

/// Immutable, log-space model shared by all decoding threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherModel {
    labels: Vec<StateLabel>,
    log_emissions: Vec<Option<[f64; 4]>>,
    // incoming[to] = [(from, ln Pr{from->to})], in insertion order.
    incoming: Vec<Vec<(usize, f64)>>,
    silent_order: Vec<usize>,
    emitting: Vec<usize>,
    start: usize,
    end: usize,
    copies: usize,
}

impl MatcherModel {
    pub fn num_states(&self) -> usize {
        self.labels.len()
    }
    pub fn label(&self, state: usize) -> &StateLabel {
        &self.labels[state]
    }
    pub fn is_silent(&self, state: usize) -> bool {
        self.log_emissions[state].is_none()
    }
    pub fn start(&self) -> usize {
        self.start
    }
    pub fn end(&self) -> usize {
        self.end
    }
    /// Number of repeat-unit copies in the model.
    pub fn copies(&self) -> usize {
        self.copies
    }
    pub(crate) fn incoming(&self, state: usize) -> &[(usize, f64)] {
        &self.incoming[state]
    }
    pub(crate) fn log_emission(&self, state: usize) -> Option<&[f64; 4]> {
        self.log_emissions[state].as_ref()
    }
    pub(crate) fn emitting_states(&self) -> &[usize] {
        &self.emitting
    }
    pub(crate) fn silent_order(&self) -> &[usize] {
        &self.silent_order
    }
    /// Check the structural invariants. Used after deserialization, as a
    /// model from a cache could have been truncated or edited.
    pub fn validate(&self) -> Result<()> {
        let states = self.labels.len();
        if self.log_emissions.len() != states || self.incoming.len() != states {
            return Err(VntrError::Model("table sizes disagree".to_string()));
        }
        if states <= self.start.max(self.end) {
            return Err(VntrError::Model("start or end out of range".to_string()));
        }
        let dangling = self
            .incoming
            .iter()
            .flat_map(|preds| preds.iter())
            .any(|&(from, lp)| states <= from || !lp.is_finite());
        if dangling {
            return Err(VntrError::Model("dangling transition".to_string()));
        }
        if !self.is_silent(self.start) || !self.is_silent(self.end) {
            return Err(VntrError::Model("start and end must be silent".to_string()));
        }
        let remade = Self {
            silent_order: vec![],
            emitting: vec![],
            ..self.clone()
        }
        .finalize()?;
        if remade.silent_order != self.silent_order || remade.emitting != self.emitting {
            return Err(VntrError::Model("state order disagrees".to_string()));
        }
        Ok(())
    }
    // Compute the emitting states and the topological order of silent states.
    fn finalize(mut self) -> Result<Self> {
        let states = self.labels.len();
        if !self.is_silent(self.start) || !self.is_silent(self.end) {
            return Err(VntrError::Model("start and end must be silent".to_string()));
        }
        self.emitting = (0..states).filter(|&s| !self.is_silent(s)).collect();
        // Kahn's algorithm on the silent -> silent edges.
        let mut indegree = vec![0; states];
        let mut successors = vec![vec![]; states];
        for (to, preds) in self.incoming.iter().enumerate() {
            if !self.is_silent(to) {
                continue;
            }
            for &(from, _) in preds.iter().filter(|&&(from, _)| self.is_silent(from)) {
                indegree[to] += 1;
                successors[from].push(to);
            }
        }
        let mut queue: std::collections::VecDeque<_> = (0..states)
            .filter(|&s| self.is_silent(s) && indegree[s] == 0)
            .collect();
        let mut order = Vec::with_capacity(states - self.emitting.len());
        while let Some(s) = queue.pop_front() {
            order.push(s);
            for &to in successors[s].iter() {
                indegree[to] -= 1;
                if indegree[to] == 0 {
                    queue.push_back(to);
                }
            }
        }
        if order.len() + self.emitting.len() != states {
            return Err(VntrError::Model("silent states form a cycle".to_string()));
        }
        self.silent_order = order;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProfileState::*;
    fn label(state: ProfileState) -> StateLabel {
        StateLabel::new(Segment::Junction, state)
    }
    #[test]
    fn bake_orders_silent_states() {
        let mut builder = ModelBuilder::new();
        let end = builder.add_state(label(End), None);
        let d2 = builder.add_state(label(Delete(2)), None);
        let d1 = builder.add_state(label(Delete(1)), None);
        let m1 = builder.add_state(label(Match(1)), Some([0.25; 4]));
        let start = builder.add_state(label(Start), None);
        builder.add_transition(start, d1, 0.5);
        builder.add_transition(start, m1, 0.5);
        builder.add_transition(d1, d2, 1f64);
        builder.add_transition(m1, d2, 1f64);
        builder.add_transition(d2, end, 1f64);
        let model = builder.bake(start, end, 1).unwrap();
        assert_eq!(model.emitting_states(), &[m1]);
        let position = |s: usize| model.silent_order().iter().position(|&x| x == s).unwrap();
        assert!(position(start) < position(d1));
        assert!(position(d1) < position(d2));
        assert!(position(d2) < position(end));
        assert_eq!(model.incoming(d2).len(), 2);
        assert!(model.validate().is_ok());
    }
    #[test]
    fn bake_rejects() {
        let mut builder = ModelBuilder::new();
        let start = builder.add_state(label(Start), None);
        let d1 = builder.add_state(label(Delete(1)), None);
        let end = builder.add_state(label(End), None);
        builder.add_transition(start, d1, 1f64);
        builder.add_transition(d1, start, 0.5);
        builder.add_transition(d1, end, 0.5);
        assert!(matches!(
            builder.clone().bake(start, end, 1),
            Err(VntrError::Model(_))
        ));
        let mut builder = ModelBuilder::new();
        let start = builder.add_state(label(Start), None);
        let end = builder.add_state(label(End), None);
        builder.add_transition(start, end, 0.7);
        assert!(builder.bake(start, end, 1).is_err());
    }
    #[test]
    fn labels() {
        let label = StateLabel::new(Segment::Repeat(2), Match(3));
        assert!(label.is_repeat_emission());
        assert_eq!(label.to_string(), "M3_2");
        let label = StateLabel::new(Segment::LeftFlank, Match(3));
        assert!(!label.is_repeat_emission());
        let label = StateLabel::new(Segment::Repeat(1), Delete(3));
        assert!(!label.is_repeat_emission());
    }
}
