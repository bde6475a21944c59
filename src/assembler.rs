//! Build the composite matcher of a locus: left-flank suffix, repeat copies,
//! right-flank prefix.
use crate::cache::ModelCache;
use crate::error::{Result, VntrError};
use crate::hmm::{flank, repeats, MatcherModel, MatcherParams, ModelBuilder};
use crate::locus::VntrLocus;
use crate::msa::SegmentAligner;
use crate::profile::{pseudocount, train, Alignment, ProfileHmm};
use crate::EstimateConfig;

/// Chain the flank matchers around `copies` copies of `profile`.
/// `left_flank` and `right_flank` are used entirely; trim them beforehand.
pub fn assemble(
    profile: &ProfileHmm,
    left_flank: &[u8],
    right_flank: &[u8],
    copies: usize,
    params: &MatcherParams,
) -> Result<MatcherModel> {
    let mut builder = ModelBuilder::new();
    let suffix = flank::suffix_matcher(&mut builder, left_flank, params);
    let repeats = repeats::repeats_matcher(&mut builder, profile, copies, params);
    let prefix = flank::prefix_matcher(&mut builder, right_flank, params);
    builder.concatenate(&suffix, &repeats);
    builder.concatenate(&repeats, &prefix);
    builder.bake(suffix.start, prefix.end, copies)
}

/// Train the repeat-unit profile of `locus`.
pub fn train_profile(
    locus: &VntrLocus,
    config: &EstimateConfig,
    aligner: &dyn SegmentAligner,
) -> Result<ProfileHmm> {
    let rows = aligner.align(locus.repeat_segments())?;
    let alignment = Alignment::new(&rows)?.replicated(config.segment_replicates);
    let pseudocount = pseudocount(alignment.rows().len(), config.error_rate);
    train(&alignment, config.insertion_threshold, pseudocount)
}

/// Build the matcher of `locus` with `copy_count` repeat copies.
pub fn build_matcher(
    locus: &VntrLocus,
    copy_count: usize,
    config: &EstimateConfig,
    aligner: &dyn SegmentAligner,
) -> Result<MatcherModel> {
    let profile = train_profile(locus, config, aligner)?;
    let left = locus.left_flank();
    let left = &left[left.len().saturating_sub(config.flank_size)..];
    let right = locus.right_flank();
    let right = &right[..right.len().min(config.flank_size)];
    let model = assemble(&profile, left, right, copy_count, &config.matcher)?;
    debug!(
        "Built the matcher of {}: {} states, {} copies of {} columns",
        locus.id(),
        model.num_states(),
        copy_count,
        profile.core_len()
    );
    Ok(model)
}

/// Like [`build_matcher`], going through `cache`. A cached model is used
/// only if `config.use_cached_models` is set; an unreadable entry is
/// rebuilt. A fresh model is always stored, and a failure to store it is
/// only logged.
pub fn get_matcher(
    locus: &VntrLocus,
    copy_count: usize,
    config: &EstimateConfig,
    aligner: &dyn SegmentAligner,
    cache: &dyn ModelCache,
) -> Result<MatcherModel> {
    if config.use_cached_models {
        match cache.load(locus.id()) {
            Ok(Some(model)) => {
                debug!("Cache hit for {}", locus.id());
                return Ok(model);
            }
            Ok(None) => debug!("Cache miss for {}", locus.id()),
            Err(VntrError::ModelCache(why)) => warn!("Retraining: {}", why),
            Err(why) => warn!("Could not read the cached model of {}: {}", locus.id(), why),
        }
    }
    let model = build_matcher(locus, copy_count, config, aligner)?;
    if let Err(why) = cache.store(locus.id(), &model) {
        warn!("Could not cache the model of {}: {}", locus.id(), why);
    }
    Ok(model)
}
