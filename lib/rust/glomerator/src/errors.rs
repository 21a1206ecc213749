use clusterpath::PartitionError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GlomeratorError {
    #[error(
        "Null partition in line {line} of {path:?}. One of the processes probably got passed \
         zero sequences."
    )]
    NullPartition { path: PathBuf, line: usize },

    #[error("Unable to parse the partition in line {line} of {path:?}")]
    MalformedPartition {
        path: PathBuf,
        line: usize,
        source: PartitionError,
    },

    #[error(
        "The path_index {path_index} in line {line} of {path:?} is out of range: only \
         {n_paths} paths were expected."
    )]
    PathIndexOutOfRange {
        path: PathBuf,
        line: usize,
        path_index: usize,
        n_paths: usize,
    },

    #[error(
        "The initial_path_index of path {path_index} changes from {expected:?} to {found:?} in \
         line {line} of {path:?}. All lines of one path need to descend from the same initial path."
    )]
    InconsistentInitialPathIndex {
        path: PathBuf,
        line: usize,
        path_index: usize,
        expected: Option<usize>,
        found: Option<usize>,
    },

    #[error("No partitions were read for path {path_index} from {path:?}")]
    MissingPath { path: PathBuf, path_index: usize },

    #[error("Nothing to merge: got {n_processes} processes with {n_paths} paths each.")]
    NothingToMerge { n_processes: usize, n_paths: usize },

    #[error("Process {process} has {found} paths, but {expected} were expected.")]
    PathCountMismatch {
        process: usize,
        expected: usize,
        found: usize,
    },

    #[error("Path {path_index} of process {process} has no partitions.")]
    EmptyPath { process: usize, path_index: usize },

    #[error(
        "Previous histories were supplied for {found} processes, but {expected} processes are \
         being merged."
    )]
    PreviousInfoMismatch { expected: usize, found: usize },

    #[error(
        "Path {path_index} of process {process} does not say which previous path it descends from."
    )]
    MissingAntecedent { process: usize, path_index: usize },

    #[error(
        "Path {path_index} of process {process} descends from previous path {initial_path_index}, \
         but process {process} only has {n_previous} previous paths."
    )]
    AntecedentOutOfRange {
        process: usize,
        path_index: usize,
        initial_path_index: usize,
        n_previous: usize,
    },

    #[error("Wrong number of clusters: asked for {expected} groups but got {found}.")]
    ShardCountMismatch { expected: usize, found: usize },

    #[error("The id '{id}' has no entry in the true partition.")]
    UnknownId { id: String },
}
