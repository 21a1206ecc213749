//! The row layout used to hand partition histories between processes.

use crate::errors::PartitionError;
use crate::partition::Partition;
use crate::path::{ClusterPath, PathEntry};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// One partition of one particle's history.
///
/// The HMM engine writes `path_index, initial_path_index, partition, score,
/// logweight`; merged output adds `adj_mi`. Columns may appear in any order
/// and unknown columns are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRecord {
    /// Particle index.
    pub path_index: usize,
    /// Antecedent particle; empty or negative when there is none.
    #[serde(default)]
    pub initial_path_index: Option<i64>,
    /// Clusters joined by `;`, ids within a cluster joined by `:`.
    pub partition: String,
    /// Total log probability.
    pub score: f64,
    pub logweight: f64,
    #[serde(default)]
    pub adj_mi: Option<f64>,
}

impl PartitionRecord {
    pub fn from_entry(path_index: usize, initial_path_index: Option<usize>, entry: &PathEntry) -> Self {
        PartitionRecord {
            path_index,
            initial_path_index: initial_path_index.map(|i| i as i64),
            partition: entry.partition.to_string(),
            score: entry.logprob,
            logweight: entry.logweight,
            adj_mi: Some(entry.adj_mi),
        }
    }

    pub fn parse_partition(&self) -> Result<Partition, PartitionError> {
        self.partition.parse()
    }

    pub fn initial_path_index(&self) -> Option<usize> {
        self.initial_path_index
            .and_then(|i| usize::try_from(i).ok())
    }
}

/// Iterate over the records of a CSV stream with a header line.
pub fn read_records<R: Read>(reader: R) -> csv::DeserializeRecordsIntoIter<R, PartitionRecord> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .into_deserialize()
}

/// Write every entry of every path, using each path's position as its
/// `path_index`.
pub fn write_paths<W: Write>(writer: W, paths: &[ClusterPath]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (path_index, path) in paths.iter().enumerate() {
        for entry in path.entries() {
            wtr.serialize(PartitionRecord::from_entry(
                path_index,
                path.initial_path_index,
                entry,
            ))?;
        }
    }
    wtr.flush()?;
    Ok(())
}
