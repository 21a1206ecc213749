//! Bookkeeping between rounds of clustering: which process outputs get merged
//! together, and how many processes the next round uses.

use crate::errors::GlomeratorError;
use crate::merge::Glomerator;
use anyhow::Result;
use clusterpath::ClusterPath;

/// Pair up adjacent processes for merging. With an odd count the last
/// process joins the last pair, so 5 processes give `[[0, 1], [2, 3, 4]]`.
pub fn groups_to_merge(n_procs: usize) -> Vec<Vec<usize>> {
    if n_procs == 0 {
        return Vec::new();
    }
    let mut groups: Vec<Vec<usize>> = (0..n_procs - 1)
        .step_by(2)
        .map(|i| vec![i, i + 1])
        .collect();
    if n_procs % 2 != 0 {
        match groups.last_mut() {
            Some(last) => last.push(n_procs - 1),
            None => groups.push(vec![n_procs - 1]),
        }
    }
    groups
}

/// Merge the outputs of adjacent processes, giving one set of merged
/// histories per group of `groups_to_merge`.
///
/// `previous_info`, when present, holds the previous round's merged
/// histories for each of the same processes. `glom` should not carry an
/// expected universe, since each group only covers part of it.
pub fn merge_pairs_of_procs(
    glom: &Glomerator,
    fileinfos: Vec<Vec<ClusterPath>>,
    n_particles: usize,
    previous_info: Option<&[Vec<ClusterPath>]>,
) -> Result<Vec<Vec<ClusterPath>>> {
    let n_procs = fileinfos.len();
    if let Some(previous_info) = previous_info {
        if previous_info.len() != n_procs {
            return Err(GlomeratorError::PreviousInfoMismatch {
                expected: n_procs,
                found: previous_info.len(),
            }
            .into());
        }
    }
    let mut fileinfos = fileinfos.into_iter();
    groups_to_merge(n_procs)
        .into_iter()
        .map(|group| {
            // groups are runs of consecutive processes
            let (first, last) = (group[0], group[group.len() - 1]);
            let group_infos: Vec<_> = fileinfos.by_ref().take(group.len()).collect();
            let group_previous = previous_info.map(|previous| &previous[first..=last]);
            glom.merge_fileinfos(group_infos, n_particles, group_previous)
        })
        .collect()
}

/// Clusters the next round starts from: the size of the best-minus-margin
/// partition of the first particle, summed over processes.
pub fn n_clusters_for_next_round(merged: &[Vec<ClusterPath>]) -> usize {
    merged
        .iter()
        .filter_map(|paths| paths.first())
        .filter_map(|path| path.best_minus_margin_index().and_then(|i| path.get(i)))
        .map(|entry| entry.partition.len())
        .sum()
}

/// Number of processes for the round after one run with `n_procs`, or 0 when
/// that was the last round.
///
/// The count drops when the last round already used the same count, or when
/// each process would be left with fewer than `max_clusters_per_proc`
/// clusters. `n_proc_history` lists the counts of the rounds before this one.
pub fn next_n_procs(
    n_procs: usize,
    n_clusters: usize,
    n_proc_history: &[usize],
    max_clusters_per_proc: usize,
) -> usize {
    if n_procs <= 1 {
        return 0;
    }
    let repeated = n_proc_history.last() == Some(&n_procs);
    let too_few_clusters = n_clusters / n_procs < max_clusters_per_proc;
    if !(repeated || too_few_clusters) {
        return n_procs;
    }
    if n_procs > 20 {
        n_procs / 2
    } else if n_procs > 6 {
        (n_procs as f64 / 1.5) as usize
    } else {
        n_procs - 1
    }
}
