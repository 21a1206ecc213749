//! Ground truth for simulated samples, used to score inferred partitions.

use crate::errors::GlomeratorError;
use anyhow::{bail, Context, Result};
use clusterpath::Partition;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Score reported in place of the adjusted mutual information when the true
/// partition is unknown.
pub const NO_TRUTH_ADJ_MI: f64 = -1.0;

#[derive(Debug, Deserialize)]
struct TruthRecord {
    unique_id: String,
    reco_id: String,
}

/// The recombination event each sequence really came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TruthSet {
    reco_ids: HashMap<String, String>,
}

impl TruthSet {
    pub fn new<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        TruthSet {
            reco_ids: pairs
                .into_iter()
                .map(|(id, reco)| (id.into(), reco.into()))
                .collect(),
        }
    }

    /// Read a CSV with the columns `unique_id` and `reco_id`.
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| path.display().to_string())?;
        Self::from_reader(BufReader::new(file)).with_context(|| path.display().to_string())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut reco_ids = HashMap::new();
        for (i, record) in rdr.deserialize().enumerate() {
            let TruthRecord { unique_id, reco_id } = record?;
            if reco_ids.contains_key(&unique_id) {
                bail!("duplicate unique_id '{unique_id}' in line {}", i + 2);
            }
            reco_ids.insert(unique_id, reco_id);
        }
        Ok(TruthSet { reco_ids })
    }

    pub fn len(&self) -> usize {
        self.reco_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reco_ids.is_empty()
    }

    pub fn reco_id(&self, id: &str) -> Option<&str> {
        self.reco_ids.get(id).map(String::as_str)
    }

    /// Group the ids by recombination event. Events are ordered by reco_id and
    /// ids within an event are sorted.
    pub fn true_partition(&self) -> Partition {
        let mut events: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (id, reco_id) in &self.reco_ids {
            events.entry(reco_id.as_str()).or_default().push(id.clone());
        }
        let clusters = events
            .into_values()
            .map(|mut ids| {
                ids.sort();
                ids
            })
            .collect();
        // built from a map, so ids are unique and clusters non-empty
        Partition::new(clusters).unwrap_or_default()
    }

    /// Adjusted mutual information between `partition` and the truth.
    pub fn adjusted_mutual_info(&self, partition: &Partition) -> Result<f64, GlomeratorError> {
        let mut true_labels = Vec::with_capacity(partition.n_ids());
        let mut inferred_labels = Vec::with_capacity(partition.n_ids());
        for (iclust, cluster) in partition.iter().enumerate() {
            for id in cluster {
                let reco_id = self
                    .reco_id(id)
                    .ok_or_else(|| GlomeratorError::UnknownId { id: id.clone() })?;
                true_labels.push(reco_id);
                inferred_labels.push(iclust);
            }
        }
        Ok(stats::adjusted_mutual_info(&true_labels, &inferred_labels))
    }
}

/// Score `partition` against the truth, or return `NO_TRUTH_ADJ_MI` when
/// there is none.
pub fn mutual_information(truth: Option<&TruthSet>, partition: &Partition) -> Result<f64, GlomeratorError> {
    match truth {
        None => Ok(NO_TRUTH_ADJ_MI),
        Some(truth) => truth.adjusted_mutual_info(partition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn truth() -> TruthSet {
        TruthSet::new([("a", "r1"), ("b", "r1"), ("c", "r2"), ("d", "r2"), ("e", "r3")])
    }

    #[test]
    fn test_exact_partition_scores_one() {
        let inferred: Partition = "d:c;e;b:a".parse().unwrap();
        assert_eq!(truth().adjusted_mutual_info(&inferred).unwrap(), 1.0);
    }

    #[test]
    fn test_no_truth_sentinel() {
        let inferred: Partition = "a;b".parse().unwrap();
        assert_eq!(mutual_information(None, &inferred).unwrap(), NO_TRUTH_ADJ_MI);
    }

    #[test]
    fn test_unknown_id() {
        let inferred: Partition = "a:b;z".parse().unwrap();
        let err = truth().adjusted_mutual_info(&inferred).unwrap_err();
        assert_eq!(err.to_string(), "The id 'z' has no entry in the true partition.");
    }

    #[test]
    fn test_true_partition() {
        assert_eq!(truth().true_partition().to_string(), "a:b;c:d;e");
    }

    #[test]
    fn test_read_csv() -> Result<()> {
        let text = "unique_id,reco_id\nq1,7\nq2,7\nq3,9\n";
        let truth = TruthSet::from_reader(text.as_bytes())?;
        assert_eq!(truth.len(), 3);
        assert_eq!(truth.reco_id("q2"), Some("7"));
        assert!(TruthSet::from_reader("unique_id,reco_id\nq1,7\nq1,8\n".as_bytes()).is_err());
        Ok(())
    }
}
