//! Merge the agglomeration histories of several worker processes into one
//! history per particle over the whole set of sequences.

use crate::errors::GlomeratorError;
use crate::truth::{mutual_information, TruthSet};
use anyhow::{Context, Result};
use clusterpath::record::{read_records, write_paths};
use clusterpath::{ClusterPath, Partition, PartitionError, DEFAULT_BEST_MINUS};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tempfile::NamedTempFile;

/// Reads shard histories and interleaves them into global histories.
#[derive(Debug, Clone)]
pub struct Glomerator {
    truth: Option<TruthSet>,
    best_minus: usize,
    universe: Option<BTreeSet<String>>,
}

impl Default for Glomerator {
    fn default() -> Self {
        Glomerator::new(None)
    }
}

impl Glomerator {
    /// With a truth set, every partition read or produced is scored against
    /// it; without one, scores are `NO_TRUTH_ADJ_MI`.
    pub fn new(truth: Option<TruthSet>) -> Self {
        Glomerator {
            truth,
            best_minus: DEFAULT_BEST_MINUS,
            universe: None,
        }
    }

    /// Margin given to every history this merger creates.
    pub fn with_best_minus(mut self, best_minus: usize) -> Self {
        self.best_minus = best_minus;
        self
    }

    /// Require every merged partition to cover exactly these ids. Without
    /// this, merged partitions are checked against the ids of their shards.
    pub fn with_universe(mut self, universe: BTreeSet<String>) -> Self {
        self.universe = Some(universe);
        self
    }

    pub fn mutual_information(&self, partition: &Partition) -> Result<f64, GlomeratorError> {
        mutual_information(self.truth.as_ref(), partition)
    }

    /// Read the histories one worker wrote for each of `n_paths` particles.
    pub fn read_file_info(&self, fname: &Path, n_paths: usize) -> Result<Vec<ClusterPath>> {
        let file = File::open(fname).with_context(|| fname.display().to_string())?;
        let mut paths: Vec<Option<ClusterPath>> = vec![None; n_paths];
        for (i, record) in read_records(BufReader::new(file)).enumerate() {
            // the header is line 1
            let line = i + 2;
            let record = record.with_context(|| format!("line {line} of {}", fname.display()))?;
            let partition = match record.parse_partition() {
                Ok(partition) => partition,
                Err(PartitionError::EmptyPartition) => {
                    return Err(GlomeratorError::NullPartition {
                        path: fname.to_path_buf(),
                        line,
                    }
                    .into())
                }
                Err(source) => {
                    return Err(GlomeratorError::MalformedPartition {
                        path: fname.to_path_buf(),
                        line,
                        source,
                    }
                    .into())
                }
            };
            if record.path_index >= n_paths {
                return Err(GlomeratorError::PathIndexOutOfRange {
                    path: fname.to_path_buf(),
                    line,
                    path_index: record.path_index,
                    n_paths,
                }
                .into());
            }
            let initial_path_index = record.initial_path_index();
            let path = paths[record.path_index].get_or_insert_with(|| {
                ClusterPath::new(initial_path_index).with_best_minus(self.best_minus)
            });
            if path.initial_path_index != initial_path_index {
                return Err(GlomeratorError::InconsistentInitialPathIndex {
                    path: fname.to_path_buf(),
                    line,
                    path_index: record.path_index,
                    expected: path.initial_path_index,
                    found: initial_path_index,
                }
                .into());
            }
            let adj_mi = self.mutual_information(&partition)?;
            path.add_partition(partition, record.score, record.logweight, adj_mi);
        }

        paths
            .into_iter()
            .enumerate()
            .map(|(path_index, path)| {
                let path = path.ok_or_else(|| GlomeratorError::MissingPath {
                    path: fname.to_path_buf(),
                    path_index,
                })?;
                path.check_universe(&path.universe())
                    .with_context(|| format!("path {path_index} of {}", fname.display()))?;
                if !path.is_monotonic_coarsening() {
                    warn!(
                        "path {path_index} of {} is not a sequence of single merges",
                        fname.display()
                    );
                }
                Ok(path)
            })
            .collect()
    }

    /// Interleave the per-process histories `fileinfos[process][particle]`
    /// into one history per particle.
    ///
    /// With `previous_info`, each history is first extended backwards with
    /// the history of the previous round that it was started from.
    pub fn merge_fileinfos(
        &self,
        mut fileinfos: Vec<Vec<ClusterPath>>,
        n_particles: usize,
        previous_info: Option<&[Vec<ClusterPath>]>,
    ) -> Result<Vec<ClusterPath>> {
        if fileinfos.is_empty() || n_particles == 0 {
            return Err(GlomeratorError::NothingToMerge {
                n_processes: fileinfos.len(),
                n_paths: n_particles,
            }
            .into());
        }
        for (process, paths) in fileinfos.iter().enumerate() {
            if paths.len() != n_particles {
                return Err(GlomeratorError::PathCountMismatch {
                    process,
                    expected: n_particles,
                    found: paths.len(),
                }
                .into());
            }
            if let Some(path_index) = paths.iter().position(ClusterPath::is_empty) {
                return Err(GlomeratorError::EmptyPath {
                    process,
                    path_index,
                }
                .into());
            }
        }

        if let Some(previous_info) = previous_info {
            self.prepend_previous_history(&mut fileinfos, previous_info)?;
        }

        let mut merged_paths = Vec::with_capacity(n_particles);
        for ipath in 0..n_particles {
            let mut shards: Vec<ClusterPath> = fileinfos
                .iter_mut()
                .map(|paths| std::mem::replace(&mut paths[ipath], ClusterPath::new(None)))
                .collect();
            let shard_universe: BTreeSet<String>;
            let universe = match &self.universe {
                Some(expected) => expected,
                None => {
                    shard_universe = shards.iter().flat_map(ClusterPath::universe).collect();
                    &shard_universe
                }
            };

            let mut merged = ClusterPath::new(None).with_best_minus(self.best_minus);
            while !shards.iter().all(|shard| shard.len() == 1) {
                self.add_next_global_partition(&mut merged, &shards)?;
                match pick_shard_to_advance(&shards) {
                    Some(ishard) => {
                        shards[ishard].remove_first_partition();
                    }
                    None => break,
                }
            }
            self.add_next_global_partition(&mut merged, &shards)?;
            merged.set_synthetic_logweight_history();

            merged
                .check_universe(universe)
                .with_context(|| format!("merged path {ipath}"))?;
            info!(
                "merged path {ipath} from {} processes: {} partitions over {} ids",
                shards.len(),
                merged.len(),
                universe.len()
            );
            debug!("merged path {ipath}:\n{merged}");
            merged_paths.push(merged);
        }
        Ok(merged_paths)
    }

    fn prepend_previous_history(
        &self,
        fileinfos: &mut [Vec<ClusterPath>],
        previous_info: &[Vec<ClusterPath>],
    ) -> Result<(), GlomeratorError> {
        if previous_info.len() != fileinfos.len() {
            return Err(GlomeratorError::PreviousInfoMismatch {
                expected: fileinfos.len(),
                found: previous_info.len(),
            });
        }
        for (process, (paths, previous_paths)) in fileinfos.iter_mut().zip(previous_info).enumerate() {
            for (path_index, path) in paths.iter_mut().enumerate() {
                let initial_path_index = path
                    .initial_path_index
                    .ok_or(GlomeratorError::MissingAntecedent {
                        process,
                        path_index,
                    })?;
                let previous_path = previous_paths.get(initial_path_index).ok_or(
                    GlomeratorError::AntecedentOutOfRange {
                        process,
                        path_index,
                        initial_path_index,
                        n_previous: previous_paths.len(),
                    },
                )?;
                let mut extended = ClusterPath::new(None).with_best_minus(self.best_minus);
                for entry in previous_path.entries().chain(path.entries()) {
                    extended.add_partition(
                        entry.partition.clone(),
                        entry.logprob,
                        entry.logweight,
                        entry.adj_mi,
                    );
                }
                // the combinatorial factors of the new steps build on the old ones
                extended.set_synthetic_logweight_history();
                *path = extended;
            }
        }
        Ok(())
    }

    // Concatenate the first partition of every shard.
    fn add_next_global_partition(&self, merged: &mut ClusterPath, shards: &[ClusterPath]) -> Result<()> {
        let firsts: Vec<_> = shards.iter().filter_map(ClusterPath::first).collect();
        let partition = Partition::concat(firsts.iter().map(|entry| &entry.partition));
        let logprob = firsts.iter().map(|entry| entry.logprob).sum();
        let adj_mi = self.mutual_information(&partition)?;
        // the real weight is only known once the whole history is assembled
        merged.add_partition(partition, logprob, 0.0, adj_mi);
        Ok(())
    }

    /// Read one history file per process and merge them.
    pub fn read_cached_agglomeration<P: AsRef<Path>>(
        &self,
        fnames: &[P],
        n_particles: usize,
        previous_info: Option<&[Vec<ClusterPath>]>,
    ) -> Result<Vec<ClusterPath>> {
        let fileinfos = fnames
            .iter()
            .map(|fname| self.read_file_info(fname.as_ref(), n_particles))
            .collect::<Result<Vec<_>>>()?;
        self.merge_fileinfos(fileinfos, n_particles, previous_info)
    }
}

/// The shard whose next step gains the most log probability. Ties go to the
/// lowest index; shards on their last partition are never picked.
///
/// A NaN gain never beats an earlier shard, but one in the first eligible
/// shard is kept, since nothing compares greater than it.
pub fn pick_shard_to_advance(shards: &[ClusterPath]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (ishard, shard) in shards.iter().enumerate() {
        let (Some(current), Some(next)) = (shard.get(0), shard.get(1)) else {
            continue;
        };
        let gain = next.logprob - current.logprob;
        if best.map_or(true, |(_, max_gain)| gain > max_gain) {
            best = Some((ishard, gain));
        }
    }
    best.map(|(ishard, _)| ishard)
}

/// Write `paths` to `outfname`. The file only appears once it is complete.
pub fn write_partitions(outfname: &Path, paths: &[ClusterPath]) -> Result<()> {
    let dir = match outfname.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).with_context(|| dir.display().to_string())?;
    write_paths(BufWriter::new(tmp.as_file_mut()), paths)
        .with_context(|| outfname.display().to_string())?;
    // dropping the returned file removes it
    tmp.persist(outfname)
        .map_err(|e| e.error)
        .with_context(|| outfname.display().to_string())?;
    Ok(())
}
