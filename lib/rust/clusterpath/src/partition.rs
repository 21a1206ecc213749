use crate::errors::PartitionError;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Separates the clusters of a partition in its text encoding.
pub const CLUSTER_SEPARATOR: char = ';';
/// Separates the ids within one cluster in its text encoding.
pub const ID_SEPARATOR: char = ':';

/// A grouping of sequence ids into disjoint, non-empty clusters.
///
/// The order of clusters, and of ids within a cluster, carries no meaning but
/// is preserved so that everything derived from a partition is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    clusters: Vec<Vec<String>>,
}

impl Partition {
    /// Build a partition, checking that no cluster is empty and no id repeats.
    pub fn new(clusters: Vec<Vec<String>>) -> Result<Self, PartitionError> {
        if clusters.is_empty() {
            return Err(PartitionError::EmptyPartition);
        }
        let mut seen = HashSet::new();
        for (index, cluster) in clusters.iter().enumerate() {
            if cluster.is_empty() {
                return Err(PartitionError::EmptyCluster { index });
            }
            for id in cluster {
                if !seen.insert(id.as_str()) {
                    return Err(PartitionError::DuplicateId { id: id.clone() });
                }
            }
        }
        Ok(Partition { clusters })
    }

    /// One cluster per id.
    pub fn singletons<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Partition {
            clusters: ids.into_iter().map(|id| vec![id.into()]).collect(),
        }
    }

    /// Place the clusters of every part side by side.
    ///
    /// The parts are expected to cover disjoint sets of ids; this is not
    /// re-checked here; use `ClusterPath::check_universe` on the result.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a Partition>) -> Self {
        Partition {
            clusters: parts
                .into_iter()
                .flat_map(|p| p.clusters.iter().cloned())
                .collect(),
        }
    }

    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Total number of ids over all clusters.
    pub fn n_ids(&self) -> usize {
        self.clusters.iter().map(Vec::len).sum()
    }

    pub fn clusters(&self) -> &[Vec<String>] {
        &self.clusters
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Vec<String>> {
        self.clusters.iter()
    }

    /// Every id, cluster by cluster.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.clusters.iter().flatten().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a Partition {
    type Item = &'a Vec<String>;
    type IntoIter = std::slice::Iter<'a, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.clusters.iter()
    }
}

impl FromStr for Partition {
    type Err = PartitionError;

    /// Parse `a:b;c;d` into the clusters `{a, b}`, `{c}` and `{d}`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PartitionError::EmptyPartition);
        }
        let clusters = s
            .split(CLUSTER_SEPARATOR)
            .enumerate()
            .map(|(index, cluster)| {
                let ids: Vec<String> = cluster.split(ID_SEPARATOR).map(str::to_string).collect();
                if ids.iter().any(String::is_empty) {
                    return Err(PartitionError::EmptyCluster { index });
                }
                Ok(ids)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Partition::new(clusters)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cluster) in self.clusters.iter().enumerate() {
            if i > 0 {
                write!(f, "{CLUSTER_SEPARATOR}")?;
            }
            for (j, id) in cluster.iter().enumerate() {
                if j > 0 {
                    write!(f, "{ID_SEPARATOR}")?;
                }
                write!(f, "{id}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_and_display() {
        let p: Partition = "a:b;c;d".parse().unwrap();
        assert_eq!(p.len(), 3);
        assert_eq!(p.n_ids(), 4);
        assert_eq!(p.clusters()[0], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(p.to_string(), "a:b;c;d");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!("".parse::<Partition>(), Err(PartitionError::EmptyPartition));
        assert_eq!(
            "a;;b".parse::<Partition>(),
            Err(PartitionError::EmptyCluster { index: 1 })
        );
        assert_eq!(
            "a::b".parse::<Partition>(),
            Err(PartitionError::EmptyCluster { index: 0 })
        );
    }

    #[test]
    fn test_duplicate_id() {
        assert_eq!(
            "a:b;b".parse::<Partition>(),
            Err(PartitionError::DuplicateId { id: "b".into() })
        );
    }

    #[test]
    fn test_concat() {
        let a: Partition = "a:b;c".parse().unwrap();
        let b = Partition::singletons(["e", "f"]);
        let joined = Partition::concat([&a, &b]);
        assert_eq!(joined.to_string(), "a:b;c;e;f");
        assert_eq!(joined.ids().collect::<Vec<_>>(), vec!["a", "b", "c", "e", "f"]);
    }
}
