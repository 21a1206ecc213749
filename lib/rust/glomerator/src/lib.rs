//! glomerator
//!
//! Divide sequences among worker processes, merge the partition histories the
//! workers write back, and score partitions against a known truth.

mod errors;

/// Hamming-distance agglomeration of naive sequences into shards
pub mod naive_glom;

pub mod merge;
pub mod rounds;
pub mod truth;

pub use errors::GlomeratorError;
pub use merge::{pick_shard_to_advance, write_partitions, Glomerator};
pub use naive_glom::{divvy_up_queries, naive_seq_glomerate, HammingCache, NaiveSeqGlomerator};
pub use truth::{TruthSet, NO_TRUTH_ADJ_MI};
