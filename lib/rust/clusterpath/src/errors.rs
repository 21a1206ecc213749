/// Violations of the partition invariants: every cluster non-empty, every id
/// present at most once.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    #[error("Found an empty partition. A partition needs at least one cluster.")]
    EmptyPartition,

    #[error("Cluster {index} of the partition is empty, which is not allowed.")]
    EmptyCluster { index: usize },

    #[error("The id '{id}' appears in more than one cluster of the same partition.")]
    DuplicateId { id: String },
}

/// A partition in a history does not cover its universe of sequence ids
/// exactly once. This indicates that a shard dropped or duplicated ids.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("The id '{id}' is missing from the partition at step {step}.")]
    MissingId { id: String, step: usize },

    #[error("The id '{id}' appears more than once in the partition at step {step}.")]
    DuplicateId { id: String, step: usize },

    #[error("The partition at step {step} contains the id '{id}', which is not in the universe.")]
    UnexpectedId { id: String, step: usize },

    #[error("Cluster {index} of the partition at step {step} is empty.")]
    EmptyCluster { index: usize, step: usize },
}
