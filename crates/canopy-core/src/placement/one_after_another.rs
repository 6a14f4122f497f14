//! Sequential-fill placement: fill the first partition up to its max, then the next.

use super::{PartitionAlgorithm, PartitionContext};

#[derive(Debug, Default, Clone, Copy)]
pub struct OneAfterAnother;

impl PartitionAlgorithm for OneAfterAnother {
    fn name(&self) -> &'static str {
        "one-after-another"
    }

    fn select(&self, candidates: &[&PartitionContext]) -> Option<usize> {
        candidates.iter().position(|p| p.has_capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstanceId, NetworkPartitionId, NetworkPartitionPolicy, PartitionId, PartitionPolicy};
    use crate::placement::{NetworkPartitionContext, PlacedInstance};

    #[test]
    fn fills_partitions_in_order() {
        let policy = NetworkPartitionPolicy {
            id: NetworkPartitionId::new("np1"),
            partition_algorithm: "one-after-another".into(),
            partitions: vec![
                PartitionPolicy { id: PartitionId::new("p1"), max: 2 },
                PartitionPolicy { id: PartitionId::new("p2"), max: 1 },
            ],
        };
        let mut ctx = NetworkPartitionContext::new(NetworkPartitionId::new("np1"));

        let mut chosen = Vec::new();
        for i in 0..4 {
            let selected = {
                let candidates = ctx.candidates(&policy);
                OneAfterAnother
                    .select(&candidates)
                    .map(|index| candidates[index].partition_id().clone())
            };
            let Some(partition) = selected else {
                chosen.push("none".to_string());
                continue;
            };
            chosen.push(partition.to_string());
            ctx.add_instance(PlacedInstance {
                instance_id: InstanceId::new(format!("g-{i}")),
                parent_id: None,
                partition_id: Some(partition),
            });
        }

        assert_eq!(chosen, vec!["p1", "p1", "p2", "none"]);
    }
}
