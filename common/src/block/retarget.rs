//! Difficulty retargeting.
//!
//! Every `retarget_interval` blocks, the difficulty target is scaled by how long the
//! previous interval took to mine, compared to the target timespan. The walk over
//! ancestors lives in [`BlockReader::next_required_difficulty`]; this module holds the
//! arithmetic.
//!
//! [`BlockReader::next_required_difficulty`]: super::pool::BlockReader::next_required_difficulty
use bitcoin::util::uint::Uint256;
use thiserror::Error;

use super::{BlockHash, BlockTime, Height, Target};
use crate::network::Params;

/// The retarget window walk ran out of ancestors, even though the block's height says
/// they exist. This is a bug in height or linkage bookkeeping, never a property of
/// the block itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("retarget window of block {hash} at height {height} ends after {walked} ancestor(s)")]
pub struct Inconsistency {
    /// Block whose successor's difficulty was being computed.
    pub hash: BlockHash,
    /// Height of that block.
    pub height: Height,
    /// Number of ancestors found before the walk ended.
    pub walked: Height,
}

/// Check whether the block *following* the given height gets a new difficulty.
///
/// Since the height is 0-indexed, we add `1` to check it against the interval.
pub fn is_retarget_height(height: Height, params: &Params) -> bool {
    (height + 1) % params.retarget_interval == 0
}

/// Clamp an observed retarget timespan to the allowed range.
pub fn clamp_timespan(observed: BlockTime, params: &Params) -> BlockTime {
    observed.clamp(params.min_timespan(), params.max_timespan())
}

/// Compute the next target from the last target and the time the last retarget window
/// took, in seconds. The result never exceeds the network's proof-of-work limit.
///
/// `last_target * timespan / target_timespan` is computed exactly: the last target is
/// split into quotient and remainder by the target timespan first, so that no
/// intermediate value overflows.
pub fn retarget(last_target: &Target, observed: BlockTime, params: &Params) -> Target {
    let timespan = clamp_timespan(observed, params);
    let target_timespan = Uint256([params.target_timespan as u64, 0, 0, 0]);
    let max = !Target::default();

    let quotient = *last_target / target_timespan;
    let remainder = *last_target - quotient.mul_u32(params.target_timespan);

    let target = if quotient > max / Uint256([timespan as u64, 0, 0, 0]) {
        max
    } else {
        let high = quotient.mul_u32(timespan);
        // Smaller than `timespan`, since `remainder < target_timespan`.
        let low = remainder.mul_u32(timespan) / target_timespan;

        if high > max - low {
            max
        } else {
            high + low
        }
    };

    if target > params.max_difficulty {
        params.max_difficulty
    } else {
        target
    }
}
