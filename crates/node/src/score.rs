//! Chain scoring: the total order over competing candidates at a height.
//!
//! Lower is better. The base score is how late the block was verified within
//! its slot; a continuity bonus favours candidates that keep the cycle
//! healthy, and a missing-lineage penalty buries candidates whose ancestry
//! could not be checked. Ties break on ascending block hash so every honest
//! node picks the same winner.

use solidus_ledger::cycle::Continuity;
use solidus_ledger::{Block, BLOCK_DURATION_MS};

pub const CONTINUITY_BONUS: i64 = 2_000;
pub const MISSING_LINEAGE_PENALTY: i64 = 10_000;

pub fn chain_score(
    block: &Block,
    genesis_start: i64,
    continuity: Continuity,
    missing_lineage: u32,
) -> i64 {
    let slot_start =
        solidus_ledger::start_timestamp_for_height(genesis_start, block.height);
    let mut score = block.verification_timestamp - slot_start;
    if continuity == Continuity::Continuous {
        score -= CONTINUITY_BONUS;
    }
    score + missing_lineage as i64 * MISSING_LINEAGE_PENALTY
}

/// Earliest moment a candidate may receive this node's vote. Better-scoring
/// blocks become votable sooner, giving them a window to surface before the
/// node commits to a worse one it happened to see first.
pub fn minimum_vote_timestamp(first_seen_ms: i64, score: i64) -> i64 {
    first_seen_ms + score.clamp(0, BLOCK_DURATION_MS)
}

/// Whether a competing frozen suffix should replace the local one: only when
/// it scores strictly lower in total and every block in it is continuous.
/// Rollback past a locally frozen block is never automatic; the sync layer
/// calls this for suffixes above the local frozen edge.
pub fn prefer_competing_suffix(
    local_total: i64,
    competing_total: i64,
    competing_all_continuous: bool,
) -> bool {
    competing_all_continuous && competing_total < local_total
}
