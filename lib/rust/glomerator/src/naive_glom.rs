//! Split sequences into roughly equal groups of similar naive sequences, so
//! that each worker process gets sequences that are likely to be clonally
//! related. Only used to divide work, never for the clonal inference itself.

use crate::errors::GlomeratorError;
use anyhow::{bail, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// Memo of pairwise Hamming distances between naive sequences, keyed by the
/// sequences' input positions. `None` marks a pair of unequal lengths.
#[derive(Debug, Default)]
pub struct HammingCache {
    distances: HashMap<(usize, usize), Option<u32>>,
}

impl HammingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distance between `seqs[a]` and `seqs[b]`, computed at most once.
    pub fn distance(&mut self, seqs: &[String], a: usize, b: usize) -> Option<u32> {
        let key = if a <= b { (a, b) } else { (b, a) };
        match self.distances.entry(key) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => *e.insert(hamming(&seqs[key.0], &seqs[key.1])),
        }
    }

    /// Number of distances computed so far.
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }
}

/// Number of mismatched positions, or `None` if the lengths differ.
pub fn hamming(a: &str, b: &str) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.bytes().zip(b.bytes()).filter(|(x, y)| x != y).count() as u32)
}

/// One run of hierarchical agglomeration on naive-sequence Hamming distance.
pub struct NaiveSeqGlomerator {
    ids: Vec<String>,
    seqs: Vec<String>,
    n_clusters: usize,
    clusters: Vec<Vec<usize>>,
    cache: HammingCache,
    max_per_cluster: usize,
    /// Once no pair fits under `max_per_cluster`, merge the closest pair
    /// regardless of size for the rest of the run.
    merge_whatever_you_got: bool,
    rebalance_ratio: f64,
    max_rebalance_iterations: usize,
}

impl NaiveSeqGlomerator {
    /// Set up a run that stops at `n_clusters` groups of `naive_seqs`, given
    /// as (id, naive sequence) pairs.
    pub fn new(naive_seqs: Vec<(String, String)>, n_clusters: usize) -> Result<Self> {
        if n_clusters == 0 {
            bail!("cannot divide sequences into zero groups");
        }
        if naive_seqs.is_empty() {
            bail!("no naive sequences to divide");
        }
        {
            let mut seen = HashSet::new();
            for (id, seq) in &naive_seqs {
                if seq.is_empty() {
                    bail!("zero-length naive sequence found for {id}");
                }
                if !seen.insert(id.as_str()) {
                    bail!("naive sequence for {id} was given more than once");
                }
            }
        }
        let (ids, seqs): (Vec<_>, Vec<_>) = naive_seqs.into_iter().unzip();
        let total = ids.len();
        Ok(NaiveSeqGlomerator {
            clusters: (0..total).map(|i| vec![i]).collect(),
            ids,
            seqs,
            n_clusters,
            cache: HammingCache::new(),
            max_per_cluster: total.div_ceil(n_clusters),
            merge_whatever_you_got: false,
            rebalance_ratio: 1.5,
            max_rebalance_iterations: 100,
        })
    }

    /// Change how hard the final group sizes are evened out.
    pub fn with_rebalancing(mut self, rebalance_ratio: f64, max_rebalance_iterations: usize) -> Self {
        self.rebalance_ratio = rebalance_ratio;
        self.max_rebalance_iterations = max_rebalance_iterations;
        self
    }

    pub fn cache(&self) -> &HammingCache {
        &self.cache
    }

    pub fn merge_whatever_you_got(&self) -> bool {
        self.merge_whatever_you_got
    }

    fn cluster_sizes(&self) -> String {
        self.clusters.iter().map(Vec::len).join(" ")
    }

    /// Merge the closest allowed pair of clusters. Returns false if no pair
    /// can be merged at all.
    fn glomerate(&mut self) -> bool {
        debug!("  current {}", self.cluster_sizes());
        let mut best: Option<(u32, usize, usize)> = None;
        for (ia, ib) in (0..self.clusters.len()).tuple_combinations() {
            let (clust_a, clust_b) = (&self.clusters[ia], &self.clusters[ib]);
            if clust_a.len() + clust_b.len() > self.max_per_cluster && !self.merge_whatever_you_got {
                continue;
            }
            let mut min_distance: Option<u32> = None;
            for &query_a in clust_a {
                for &query_b in clust_b {
                    if let Some(d) = self.cache.distance(&self.seqs, query_a, query_b) {
                        if min_distance.map_or(true, |m| d < m) {
                            min_distance = Some(d);
                        }
                    }
                }
            }
            if let Some(d) = min_distance {
                if best.map_or(true, |(smallest, _, _)| d < smallest) {
                    best = Some((d, ia, ib));
                }
            }
        }

        match best {
            Some((_, ia, ib)) => {
                debug!(
                    "    merging {} {}",
                    self.clusters[ia].len(),
                    self.clusters[ib].len()
                );
                let clust_b = self.clusters.remove(ib);
                let mut clust_a = self.clusters.remove(ia);
                clust_a.extend(clust_b);
                self.clusters.push(clust_a);
                true
            }
            None if self.merge_whatever_you_got => false,
            None => {
                debug!("    no pair fits under {}", self.max_per_cluster);
                self.merge_whatever_you_got = true;
                true
            }
        }
    }

    // Clusters are sorted by size on entry and on exit.
    fn homogenize(&mut self) {
        let n = self.clusters.len();
        if n > 2 {
            let second = std::mem::take(&mut self.clusters[1]);
            self.clusters[0].extend(second);
            let mut largest = std::mem::take(&mut self.clusters[n - 1]);
            let rest = largest.split_off(largest.len() / 2);
            self.clusters[1] = largest;
            self.clusters[n - 1] = rest;
        } else {
            let mut together = std::mem::take(&mut self.clusters[0]);
            together.append(&mut self.clusters[1]);
            self.clusters[1] = together.split_off(together.len() / 2);
            self.clusters[0] = together;
        }
        self.clusters.sort_by_key(Vec::len);
    }

    fn is_unbalanced(&self) -> bool {
        match (self.clusters.first(), self.clusters.last()) {
            (Some(smallest), Some(largest)) => {
                (smallest.len() as f64) < largest.len() as f64 / self.rebalance_ratio
            }
            _ => false,
        }
    }

    /// Agglomerate down to the requested number of groups, then even out
    /// their sizes.
    ///
    /// Sequences of unequal length are never merged directly, so the result
    /// can have more groups than requested; callers that need exactly
    /// `n_clusters` should check (see `divvy_up_queries`).
    pub fn run(mut self) -> Vec<Vec<String>> {
        while self.clusters.len() > self.n_clusters {
            if !self.glomerate() {
                warn!(
                    "no comparable sequences left to merge, stopping at {} groups instead of {}",
                    self.clusters.len(),
                    self.n_clusters
                );
                break;
            }
        }

        if self.clusters.len() > 1 {
            self.clusters.sort_by_key(Vec::len);
            let mut itries = 0;
            while self.is_unbalanced() {
                if itries == self.max_rebalance_iterations {
                    warn!(
                        "group sizes still uneven after {itries} rebalancing passes: {}",
                        self.cluster_sizes()
                    );
                    break;
                }
                debug!("  homogenizing {}", self.cluster_sizes());
                self.homogenize();
                itries += 1;
            }
        }
        info!(
            "divided {} sequences into {} groups using {} distances",
            self.ids.len(),
            self.clusters.len(),
            self.cache.len()
        );

        let ids = self.ids;
        self.clusters
            .into_iter()
            .map(|cluster| cluster.into_iter().map(|i| ids[i].clone()).collect())
            .collect()
    }
}

/// Hierarchically agglomerate `naive_seqs` into `n_clusters` groups, with the
/// configured rebalancing parameters.
pub fn naive_seq_glomerate(naive_seqs: Vec<(String, String)>, n_clusters: usize) -> Result<Vec<Vec<String>>> {
    Ok(NaiveSeqGlomerator::new(naive_seqs, n_clusters)?
        .with_rebalancing(
            *parameters_toml::rebalance_ratio()?,
            *parameters_toml::max_rebalance_iterations()?,
        )
        .run())
}

/// Divide sequences among `n_procs` worker processes.
pub fn divvy_up_queries(naive_seqs: Vec<(String, String)>, n_procs: usize) -> Result<Vec<Vec<String>>> {
    let divvied_queries = naive_seq_glomerate(naive_seqs, n_procs)?;
    info!(
        "divvy lengths {}",
        divvied_queries.iter().map(Vec::len).join(" ")
    );
    if divvied_queries.len() != n_procs {
        return Err(GlomeratorError::ShardCountMismatch {
            expected: n_procs,
            found: divvied_queries.len(),
        }
        .into());
    }
    Ok(divvied_queries)
}
