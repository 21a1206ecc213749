//! clusterpath
//!
//! Partitions of a universe of sequence ids, and the agglomeration histories
//! (one partition per merge step) that worker processes hand to the merger.

mod errors;
mod partition;
mod path;
pub mod record;

pub use errors::{ConsistencyError, PartitionError};
pub use partition::{Partition, CLUSTER_SEPARATOR, ID_SEPARATOR};
pub use path::{ClusterPath, PathEntry, DEFAULT_BEST_MINUS};
