use crate::errors::ConsistencyError;
use crate::partition::Partition;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::f64::consts::LN_2;
use std::fmt;

/// How many steps `best_minus_margin_index` rewinds from the best partition
/// unless configured otherwise.
pub const DEFAULT_BEST_MINUS: usize = 10;

/// One step of an agglomeration history.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEntry {
    pub partition: Partition,
    /// Total log probability of the partition.
    pub logprob: f64,
    /// Importance-sampling log weight.
    pub logweight: f64,
    /// Adjusted mutual information against the true partition, or -1 when
    /// the truth is unknown.
    pub adj_mi: f64,
}

/// The ordered record of successive partitions produced by one agglomeration
/// (one worker shard and one particle, or a merged trajectory).
///
/// Entries are only ever appended, or removed from the front while merging.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPath {
    /// The antecedent trajectory this one was started from. `None` for merged
    /// paths, which in general descend from several antecedents.
    pub initial_path_index: Option<usize>,
    entries: VecDeque<PathEntry>,
    best_minus: usize,
}

impl ClusterPath {
    pub fn new(initial_path_index: Option<usize>) -> Self {
        ClusterPath {
            initial_path_index,
            entries: VecDeque::new(),
            best_minus: DEFAULT_BEST_MINUS,
        }
    }

    /// Set the number of steps `best_minus_margin_index` rewinds.
    pub fn with_best_minus(mut self, best_minus: usize) -> Self {
        self.best_minus = best_minus;
        self
    }

    pub fn add_partition(&mut self, partition: Partition, logprob: f64, logweight: f64, adj_mi: f64) {
        self.entries.push_back(PathEntry {
            partition,
            logprob,
            logweight,
            adj_mi,
        });
    }

    /// Drop the oldest entry; what was index 1 becomes index 0.
    pub fn remove_first_partition(&mut self) -> Option<PathEntry> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PathEntry> {
        self.entries.get(index)
    }

    pub fn first(&self) -> Option<&PathEntry> {
        self.entries.front()
    }

    pub fn last(&self) -> Option<&PathEntry> {
        self.entries.back()
    }

    pub fn entries(&self) -> impl ExactSizeIterator<Item = &PathEntry> + '_ {
        self.entries.iter()
    }

    /// Index of the most probable partition. Ties go to the earliest entry.
    pub fn best_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.logprob.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, max)| entry.logprob > max) {
                best = Some((i, entry.logprob));
            }
        }
        best.map(|(i, _)| i)
    }

    /// The best index moved `best_minus` steps toward the start, clamped to 0.
    /// Seeding the next round from here guards against over-merging on noisy
    /// scores.
    pub fn best_minus_margin_index(&self) -> Option<usize> {
        self.best_index()
            .map(|best| best.saturating_sub(self.best_minus))
    }

    /// Recompute every log weight from scratch.
    ///
    /// The weight of step i is the weight of step i-1 times one over the
    /// number of partitions that could have been merged into partition i.
    pub fn set_synthetic_logweight_history(&mut self) {
        let mut logweight = 0.0;
        for entry in &mut self.entries {
            logweight -= ln_potential_n_parents(&entry.partition);
            entry.logweight = logweight;
        }
    }

    /// The sorted set of ids covered by the first partition.
    pub fn universe(&self) -> BTreeSet<String> {
        self.first()
            .map(|e| e.partition.ids().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Check that every partition covers `universe` exactly once.
    pub fn check_universe(&self, universe: &BTreeSet<String>) -> Result<(), ConsistencyError> {
        for (step, entry) in self.entries.iter().enumerate() {
            let mut seen = HashSet::with_capacity(universe.len());
            for (index, cluster) in entry.partition.iter().enumerate() {
                if cluster.is_empty() {
                    return Err(ConsistencyError::EmptyCluster { index, step });
                }
                for id in cluster {
                    if !universe.contains(id) {
                        return Err(ConsistencyError::UnexpectedId {
                            id: id.clone(),
                            step,
                        });
                    }
                    if !seen.insert(id.as_str()) {
                        return Err(ConsistencyError::DuplicateId {
                            id: id.clone(),
                            step,
                        });
                    }
                }
            }
            if seen.len() != universe.len() {
                let id = universe
                    .iter()
                    .find(|id| !seen.contains(id.as_str()))
                    .cloned()
                    .unwrap_or_default();
                return Err(ConsistencyError::MissingId { id, step });
            }
        }
        Ok(())
    }

    /// True if each partition is obtained from its predecessor by merging
    /// exactly two clusters.
    pub fn is_monotonic_coarsening(&self) -> bool {
        self.entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .all(|(prev, next)| is_single_merge(&prev.partition, &next.partition))
    }
}

/// Log of the number of ways the last merge could have produced `partition`:
/// the sum over clusters of 2^(n-1) - 1, floored at 1.
fn ln_potential_n_parents(partition: &Partition) -> f64 {
    // ln(2^m - 1) = m ln 2 + ln(1 - 2^-m), kept in log space for big clusters
    let terms: Vec<f64> = partition
        .iter()
        .filter(|cluster| cluster.len() > 1)
        .map(|cluster| {
            let m = (cluster.len() - 1) as f64;
            m * LN_2 + (-(-m * LN_2).exp()).ln_1p()
        })
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
}

fn is_single_merge(prev: &Partition, next: &Partition) -> bool {
    if next.len() + 1 != prev.len() {
        return false;
    }
    let owner: HashMap<&str, usize> = prev
        .iter()
        .enumerate()
        .flat_map(|(i, cluster)| cluster.iter().map(move |id| (id.as_str(), i)))
        .collect();
    let mut n_merged = 0;
    for cluster in next {
        let mut sources = BTreeSet::new();
        for id in cluster {
            match owner.get(id.as_str()) {
                Some(&i) => {
                    sources.insert(i);
                }
                None => return false,
            }
        }
        let source_size: usize = sources.iter().map(|&i| prev.clusters()[i].len()).sum();
        if source_size != cluster.len() {
            return false;
        }
        match sources.len() {
            1 => {}
            2 => n_merged += 1,
            _ => return false,
        }
    }
    n_merged == 1
}

impl fmt::Display for ClusterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "    {:<15} {:<12} {:<8} {:>5}",
            "logprob", "logweight", "adj_mi", "clusters"
        )?;
        for (i, entry) in self.entries.iter().enumerate() {
            let marker = match (self.best_index(), self.best_minus_margin_index()) {
                (Some(b), _) if b == i => "*",
                (_, Some(bm)) if bm == i => "-",
                _ => " ",
            };
            writeln!(
                f,
                "  {marker} {:<15.2} {:<12.3} {:<8.3} {:>5}   {}",
                entry.logprob,
                entry.logweight,
                entry.adj_mi,
                entry.partition.len(),
                entry.partition
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn ptn(s: &str) -> Partition {
        s.parse().unwrap()
    }

    fn four_step_path() -> ClusterPath {
        let mut path = ClusterPath::new(Some(0)).with_best_minus(1);
        path.add_partition(ptn("a;b;c;d"), -40.0, 0.0, -1.0);
        path.add_partition(ptn("a:b;c;d"), -30.0, 0.0, -1.0);
        path.add_partition(ptn("a:b:c;d"), -25.0, 0.0, -1.0);
        path.add_partition(ptn("a:b:c:d"), -27.0, 0.0, -1.0);
        path
    }

    #[test]
    fn test_best_index() {
        let path = four_step_path();
        assert_eq!(path.best_index(), Some(2));
        assert_eq!(path.best_minus_margin_index(), Some(1));
        assert_eq!(path.clone().with_best_minus(10).best_minus_margin_index(), Some(0));
        assert_eq!(ClusterPath::new(None).best_index(), None);
    }

    #[test]
    fn test_best_index_ties_go_to_earliest() {
        let mut path = ClusterPath::new(None);
        path.add_partition(ptn("a;b;c"), -10.0, 0.0, -1.0);
        path.add_partition(ptn("a:b;c"), -5.0, 0.0, -1.0);
        path.add_partition(ptn("a:b:c"), -5.0, 0.0, -1.0);
        assert_eq!(path.best_index(), Some(1));
    }

    #[test]
    fn test_remove_first_partition() {
        let mut path = four_step_path();
        let removed = path.remove_first_partition().unwrap();
        assert_eq!(removed.logprob, -40.0);
        assert_eq!(path.len(), 3);
        assert_eq!(path.first().unwrap().partition, ptn("a:b;c;d"));
        assert_eq!(path.best_index(), Some(1));
    }

    #[test]
    fn test_synthetic_logweights() {
        let mut path = four_step_path();
        path.set_synthetic_logweight_history();
        let weights: Vec<f64> = path.entries().map(|e| e.logweight).collect();
        // factors: 1 (singletons), 1 (one pair), 3 (a triple), 7 (four ids)
        let expected = [0.0, 0.0, -(3f64.ln()), -(3f64.ln()) - 7f64.ln()];
        for (w, e) in weights.iter().zip(expected) {
            assert!((w - e).abs() < 1e-12, "{w} != {e}");
        }
    }

    #[test]
    fn test_synthetic_logweight_sums_clusters() {
        // 2^(3-1) - 1 + 2^(2-1) - 1 = 4
        assert!((ln_potential_n_parents(&ptn("a:b:c;d:e")) - 4f64.ln()).abs() < 1e-12);
        // large clusters do not overflow
        let big = Partition::new(vec![(0..2000).map(|i| i.to_string()).collect()]).unwrap();
        assert!((ln_potential_n_parents(&big) - 1999.0 * LN_2).abs() < 1e-9);
    }

    #[test]
    fn test_check_universe() {
        let path = four_step_path();
        let universe = path.universe();
        assert_eq!(path.check_universe(&universe), Ok(()));

        let mut bad = path.clone();
        bad.add_partition(ptn("a:b;c"), -1.0, 0.0, -1.0);
        assert_eq!(
            bad.check_universe(&universe),
            Err(ConsistencyError::MissingId {
                id: "d".into(),
                step: 4
            })
        );

        let mut dup = ClusterPath::new(None);
        dup.add_partition(Partition::concat([&ptn("a:b"), &ptn("b;c;d")]), 0.0, 0.0, -1.0);
        assert_eq!(
            dup.check_universe(&universe),
            Err(ConsistencyError::DuplicateId {
                id: "b".into(),
                step: 0
            })
        );

        let mut extra = ClusterPath::new(None);
        extra.add_partition(ptn("a:b:c:d;z"), 0.0, 0.0, -1.0);
        assert_eq!(
            extra.check_universe(&universe),
            Err(ConsistencyError::UnexpectedId {
                id: "z".into(),
                step: 0
            })
        );
    }

    #[test]
    fn test_monotonic_coarsening() {
        assert!(four_step_path().is_monotonic_coarsening());

        let mut skipped = ClusterPath::new(None);
        skipped.add_partition(ptn("a;b;c;d"), 0.0, 0.0, -1.0);
        skipped.add_partition(ptn("a:b:c;d"), 0.0, 0.0, -1.0);
        assert!(!skipped.is_monotonic_coarsening());

        let mut reshuffled = ClusterPath::new(None);
        reshuffled.add_partition(ptn("a:b;c;d"), 0.0, 0.0, -1.0);
        reshuffled.add_partition(ptn("a:c;b:d"), 0.0, 0.0, -1.0);
        assert!(!reshuffled.is_monotonic_coarsening());
    }

    #[test]
    fn test_display_marks_best() {
        let shown = four_step_path().to_string();
        let lines: Vec<&str> = shown.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[3].starts_with("  *"));
        assert!(lines[2].starts_with("  -"));
        assert!(lines[3].ends_with("a:b:c;d"));
    }

    proptest! {
        #[test]
        fn prop_random_merges_coarsen(n in 2usize..20, picks in prop::collection::vec(any::<prop::sample::Index>(), 19)) {
            let mut clusters: Vec<Vec<String>> = (0..n).map(|i| vec![format!("s{i}")]).collect();
            let mut path = ClusterPath::new(None);
            path.add_partition(Partition::new(clusters.clone()).unwrap(), 0.0, 0.0, -1.0);
            for pick in picks.iter().take(n - 1) {
                let i = pick.index(clusters.len() - 1);
                let merged = clusters.remove(i + 1);
                clusters[i].extend(merged);
                path.add_partition(Partition::new(clusters.clone()).unwrap(), 0.0, 0.0, -1.0);
            }
            prop_assert!(path.is_monotonic_coarsening());
            let universe = path.universe();
            prop_assert_eq!(universe.len(), n);
            prop_assert!(path.check_universe(&universe).is_ok());
        }
    }
}
