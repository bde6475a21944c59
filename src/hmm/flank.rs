//! Matchers for the unique sequence around a repeat.
//!
//! A read overlapping a VNTR usually starts somewhere inside the left flank
//! and stops somewhere inside the right flank. The suffix matcher lets the
//! read enter the left flank at any position and always leaves at its last
//! base; the prefix matcher always starts at the first base of the right
//! flank and lets the read stop anywhere. Both are plain match/insert/delete
//! chains with fixed, untrained probabilities.
use super::{MatcherParams, ModelBuilder, Segment, StateLabel, Submodel};
use crate::profile::ProfileState;
use crate::seq::{convert_to_twobit, GAP};

// Match, insertion, and deletion state of a flank position, 1-based.
#[derive(Debug, Clone, Copy)]
struct Position {
    mat: usize,
    ins: usize,
    del: usize,
}

fn match_emission(base: u8, params: &MatcherParams) -> [f64; 4] {
    match convert_to_twobit(&base) {
        code if code < GAP => {
            let mut probs = [(1f64 - params.match_emit) / 3f64; 4];
            probs[code as usize] = params.match_emit;
            probs
        }
        _ => [0.25; 4],
    }
}

// Add the chain states for `flank`, wire them together, and route the last
// position to `end`. `exit(i)` is the probability of jumping from M_i to
// `end` before the last position.
fn chain<F: Fn(usize) -> f64>(
    builder: &mut ModelBuilder,
    flank: &[u8],
    segment: Segment,
    params: &MatcherParams,
    end: usize,
    exit: F,
) -> Vec<Position> {
    let label = |state| StateLabel::new(segment, state);
    let positions: Vec<_> = flank
        .iter()
        .enumerate()
        .map(|(i, &base)| Position {
            mat: builder.add_state(
                label(ProfileState::Match(i + 1)),
                Some(match_emission(base, params)),
            ),
            ins: builder.add_state(label(ProfileState::Insert(i + 1)), Some([0.25; 4])),
            del: builder.add_state(label(ProfileState::Delete(i + 1)), None),
        })
        .collect();
    let (mm, mi, md) = params.mat;
    let (im, ii, id) = params.ins;
    let (dm, di, dd) = params.del;
    for (i, pos) in positions.iter().enumerate() {
        match positions.get(i + 1) {
            Some(next) => {
                let hazard = exit(i + 1);
                let stay = 1f64 - hazard;
                builder.add_transition(pos.mat, next.mat, mm * stay);
                builder.add_transition(pos.mat, pos.ins, mi * stay);
                builder.add_transition(pos.mat, next.del, md * stay);
                if 0f64 < hazard {
                    builder.add_transition(pos.mat, end, hazard);
                }
                builder.add_transition(pos.ins, next.mat, im);
                builder.add_transition(pos.ins, pos.ins, ii);
                builder.add_transition(pos.ins, next.del, id);
                builder.add_transition(pos.del, next.mat, dm);
                builder.add_transition(pos.del, pos.ins, di);
                builder.add_transition(pos.del, next.del, dd);
            }
            None => {
                builder.add_transition(pos.mat, end, mm + md);
                builder.add_transition(pos.mat, pos.ins, mi);
                builder.add_transition(pos.ins, end, im + id);
                builder.add_transition(pos.ins, pos.ins, ii);
                builder.add_transition(pos.del, end, dm + dd);
                builder.add_transition(pos.del, pos.ins, di);
            }
        }
    }
    positions
}

/// Matcher over `flank`, the tail of a left flank. Entering at any position
/// (or skipping the flank) has the same probability.
pub fn suffix_matcher(
    builder: &mut ModelBuilder,
    flank: &[u8],
    params: &MatcherParams,
) -> Submodel {
    let segment = Segment::LeftFlank;
    let start = builder.add_state(StateLabel::new(segment, ProfileState::Start), None);
    let end = builder.add_state(StateLabel::new(segment, ProfileState::End), None);
    let positions = chain(builder, flank, segment, params, end, |_| 0f64);
    let entry = 1f64 / (positions.len() + 1) as f64;
    builder.add_transition(start, end, entry);
    for pos in positions.iter() {
        builder.add_transition(start, pos.mat, entry);
    }
    Submodel { start, end }
}

/// Matcher over `flank`, the head of a right flank. The read may stop after
/// any position, uniformly, or skip the flank.
pub fn prefix_matcher(
    builder: &mut ModelBuilder,
    flank: &[u8],
    params: &MatcherParams,
) -> Submodel {
    let segment = Segment::RightFlank;
    let start = builder.add_state(StateLabel::new(segment, ProfileState::Start), None);
    let end = builder.add_state(StateLabel::new(segment, ProfileState::End), None);
    let len = flank.len();
    // Pr{stop right after M_i | reached M_i} so that every stop point
    // (including skipping) has probability 1/(len+1).
    let positions = chain(builder, flank, segment, params, end, |i| {
        1f64 / (len - i + 1) as f64
    });
    let skip = 1f64 / (len + 1) as f64;
    builder.add_transition(start, end, skip);
    if let Some(first) = positions.first() {
        builder.add_transition(start, first.mat, 1f64 - skip);
    }
    Submodel { start, end }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::MatcherModel;
    fn bake(flank: &[u8], suffix: bool) -> MatcherModel {
        let mut builder = ModelBuilder::new();
        let params = MatcherParams::default();
        let sub = match suffix {
            true => suffix_matcher(&mut builder, flank, &params),
            false => prefix_matcher(&mut builder, flank, &params),
        };
        builder.bake(sub.start, sub.end, 0).unwrap()
    }
    #[test]
    fn states() {
        let model = bake(b"ACGTA", true);
        assert_eq!(model.num_states(), 2 + 3 * 5);
        assert_eq!(model.emitting_states().len(), 10);
        let model = bake(b"", false);
        assert_eq!(model.num_states(), 2);
        assert_eq!(model.incoming(model.end()).len(), 1);
    }
    #[test]
    fn emissions() {
        let params = MatcherParams::default();
        let probs = match_emission(b'g', &params);
        assert!((probs[2] - 0.97).abs() < 0.0001);
        assert!((probs.iter().sum::<f64>() - 1f64).abs() < 0.0001);
        assert_eq!(match_emission(b'N', &params), [0.25; 4]);
    }
    #[test]
    fn prefix_stops_uniformly() {
        // Along the all-match path, stopping after M_j has probability
        // Pr{start->M1} * prod (1-h) * h, which must be 1/(len+1).
        let len = 6;
        let mut reach = 1f64 - 1f64 / (len + 1) as f64;
        for i in 1..len {
            let hazard = 1f64 / (len - i + 1) as f64;
            let stop = reach * hazard;
            assert!((stop - 1f64 / (len + 1) as f64).abs() < 0.000001);
            reach *= 1f64 - hazard;
        }
        assert!((reach - 1f64 / (len + 1) as f64).abs() < 0.000001);
        // and the builder accepted the resulting rows.
        let model = bake(b"ACGTAC", false);
        assert_eq!(model.num_states(), 2 + 3 * len);
    }
}
