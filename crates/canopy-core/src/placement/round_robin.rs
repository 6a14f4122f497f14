//! Round-robin placement.
//!
//! Picks the candidate with the fewest non-terminated instances; ties go to the
//! earliest candidate. Starting from equal counts this visits partitions in
//! order, so M placements over N partitions give each ⌊M/N⌋ or ⌈M/N⌉.

use super::{PartitionAlgorithm, PartitionContext};

#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl PartitionAlgorithm for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn select(&self, candidates: &[&PartitionContext]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, p)| p.has_capacity())
            // min_by_key は同値なら最初の要素を返す
            .min_by_key(|(_, p)| p.non_terminated_count())
            .map(|(index, _)| index)
    }
}
