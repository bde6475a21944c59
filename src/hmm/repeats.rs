//! Chain of profile-HMM copies modelling the repeat region.
use super::{MatcherParams, ModelBuilder, Segment, StateLabel, Submodel};
use crate::profile::{ProfileHmm, ProfileState};

/// Add `copies` copies of `profile` between a silent entry and exit.
///
/// A read may enter the first copy at any match column and may leave after
/// any match column of any copy, as reads rarely begin or end at unit
/// boundaries. After a complete copy, the block either continues with the
/// next copy or exits.
pub fn repeats_matcher(
    builder: &mut ModelBuilder,
    profile: &ProfileHmm,
    copies: usize,
    params: &MatcherParams,
) -> Submodel {
    let junction = |state| StateLabel::new(Segment::Junction, state);
    let start = builder.add_state(junction(ProfileState::Start), None);
    let end = builder.add_state(junction(ProfileState::End), None);
    let core_len = profile.core_len();
    let blocks: Vec<Vec<usize>> = (1..=copies)
        .map(|k| add_copy(builder, profile, k, end, params))
        .collect();
    let index = |state: ProfileState| state.index(core_len);
    match blocks.first() {
        None => builder.add_transition(start, end, 1f64),
        Some(first) if 2 <= core_len => {
            let partial = params.partial_entry / (core_len - 1) as f64;
            let unit_start = first[index(ProfileState::Start)];
            builder.add_transition(start, unit_start, 1f64 - params.partial_entry);
            for i in 2..=core_len {
                builder.add_transition(start, first[index(ProfileState::Match(i))], partial);
            }
        }
        Some(first) => builder.add_transition(start, first[index(ProfileState::Start)], 1f64),
    }
    for (i, block) in blocks.iter().enumerate() {
        let unit_end = block[index(ProfileState::End)];
        match blocks.get(i + 1) {
            Some(next) => {
                let next_start = next[index(ProfileState::Start)];
                builder.add_transition(unit_end, next_start, 1f64 - params.copy_exit);
                builder.add_transition(unit_end, end, params.copy_exit);
            }
            None => builder.add_transition(unit_end, end, 1f64),
        }
    }
    Submodel { start, end }
}

// Add the k-th copy. Returns the builder index of each profile state.
fn add_copy(
    builder: &mut ModelBuilder,
    profile: &ProfileHmm,
    copy: usize,
    exit: usize,
    params: &MatcherParams,
) -> Vec<usize> {
    let core_len = profile.core_len();
    let ids: Vec<usize> = profile
        .states()
        .map(|state| {
            let label = StateLabel::new(Segment::Repeat(copy), state);
            builder.add_state(label, profile.emission(state).copied())
        })
        .collect();
    for from in profile.states() {
        let source = ids[from.index(core_len)];
        let stay = match from {
            ProfileState::Match(i) if i < core_len => {
                builder.add_transition(source, exit, params.partial_exit);
                1f64 - params.partial_exit
            }
            _ => 1f64,
        };
        for (to, prob) in profile.transitions_from(from) {
            builder.add_transition(source, ids[to.index(core_len)], prob * stay);
        }
    }
    ids
}
