//! glomerator
#![deny(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;
use clusterpath::ClusterPath;
use env_logger::Builder;
use glomerator::rounds::{merge_pairs_of_procs, n_clusters_for_next_round, next_n_procs};
use glomerator::{divvy_up_queries, write_partitions, Glomerator, TruthSet};
use log::{info, LevelFilter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
enum Args {
    /// Merge the partition histories written by several worker processes.
    Merge(MergeArgs),
    /// Divide sequences among worker processes by naive-sequence similarity.
    Divvy {
        /// CSV with the columns unique_id,naive_seq.
        #[clap(long)]
        naive_seqs: PathBuf,
        #[clap(long)]
        n_procs: usize,
        /// Where to write the shard,unique_id table. Defaults to stdout.
        #[clap(long)]
        out: Option<PathBuf>,
    },
    /// Print the number of processes for the next round, 0 when done.
    Schedule {
        /// Number of processes in the round just finished.
        #[clap(long)]
        n_procs: usize,
        /// Process counts of the rounds before it, oldest first.
        #[clap(long = "history")]
        history: Vec<usize>,
        /// Merged output of the round just finished, one file per group.
        #[clap(long = "merged", required = true)]
        merged: Vec<PathBuf>,
        #[clap(long, default_value_t = 1)]
        particles: usize,
    },
    /// Print the true partition.
    PrintTruth {
        #[clap(long)]
        truth: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
struct MergeArgs {
    /// History file of one worker process, repeated once per process.
    #[clap(long = "shard", required = true)]
    shards: Vec<PathBuf>,
    /// Number of particles in every history file.
    #[clap(long, default_value_t = 1)]
    particles: usize,
    /// Merged output of the previous round for each process, in the same
    /// order as --shard.
    #[clap(long = "previous")]
    previous: Vec<PathBuf>,
    /// CSV with the columns unique_id,reco_id.
    #[clap(long)]
    truth: Option<PathBuf>,
    /// CSV with a unique_id column listing every input sequence. Merged
    /// partitions must cover exactly these ids.
    #[clap(long, conflicts_with = "group_pairs")]
    ids: Option<PathBuf>,
    /// Merge adjacent pairs of processes instead of all of them, writing
    /// merged-<group>.csv into the --out directory.
    #[clap(long)]
    group_pairs: bool,
    #[clap(long)]
    out: PathBuf,
}

#[derive(Deserialize)]
struct NaiveSeqRecord {
    unique_id: String,
    naive_seq: String,
}

#[derive(Deserialize)]
struct IdRecord {
    unique_id: String,
}

#[derive(Serialize)]
struct ShardRecord<'a> {
    shard: usize,
    unique_id: &'a str,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                buf.timestamp(),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    match args {
        Args::Merge(args) => merge(&args),
        Args::Divvy {
            naive_seqs,
            n_procs,
            out,
        } => divvy(&naive_seqs, n_procs, out.as_deref()),
        Args::Schedule {
            n_procs,
            history,
            merged,
            particles,
        } => {
            let glom = Glomerator::default().with_best_minus(*parameters_toml::best_minus_margin()?);
            let merged = merged
                .iter()
                .map(|fname| glom.read_file_info(fname, particles))
                .collect::<Result<Vec<_>>>()?;
            let n_clusters = n_clusters_for_next_round(&merged);
            let next = next_n_procs(
                n_procs,
                n_clusters,
                &history,
                *parameters_toml::max_clusters_per_proc()?,
            );
            info!("{n_clusters} clusters with {n_procs} processes, next round uses {next}");
            println!("{next}");
            Ok(())
        }
        Args::PrintTruth { truth } => {
            let truth = TruthSet::read(&truth)?;
            println!("  true partition ({} sequences)", truth.len());
            for cluster in truth.true_partition().iter() {
                println!("    {}", cluster.join(":"));
            }
            Ok(())
        }
    }
}

fn read_ids(fname: &Path) -> Result<BTreeSet<String>> {
    let file = File::open(fname).with_context(|| fname.display().to_string())?;
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file))
        .into_deserialize()
        .map(|record| record.map(|r: IdRecord| r.unique_id))
        .collect::<Result<_, _>>()
        .with_context(|| fname.display().to_string())
}

fn log_paths(paths: &[ClusterPath]) {
    for (ipath, path) in paths.iter().enumerate() {
        if let (Some(best), Some(last)) = (path.best_index().and_then(|i| path.get(i)), path.last()) {
            info!(
                "path {ipath}: {} steps, best {:.2} with {} clusters (adj mi {:.3}), last {:.2} with {} clusters",
                path.len(),
                best.logprob,
                best.partition.len(),
                best.adj_mi,
                last.logprob,
                last.partition.len()
            );
        }
    }
}

fn merge(args: &MergeArgs) -> Result<()> {
    let n_particles = args.particles;
    let truth = args.truth.as_deref().map(TruthSet::read).transpose()?;
    let mut glom = Glomerator::new(truth).with_best_minus(*parameters_toml::best_minus_margin()?);
    if let Some(ids) = &args.ids {
        glom = glom.with_universe(read_ids(ids)?);
    }

    let previous_info = if args.previous.is_empty() {
        None
    } else {
        Some(
            args.previous
                .iter()
                .map(|fname| glom.read_file_info(fname, n_particles))
                .collect::<Result<Vec<_>>>()?,
        )
    };

    info!("merging {} histories of {n_particles} particles", args.shards.len());
    if !args.group_pairs {
        let paths = glom.read_cached_agglomeration(&args.shards[..], n_particles, previous_info.as_deref())?;
        log_paths(&paths);
        info!(
            "{} clusters to start the next round from",
            n_clusters_for_next_round(std::slice::from_ref(&paths))
        );
        write_partitions(&args.out, &paths)?;
        info!("wrote {}", args.out.display());
        return Ok(());
    }

    let fileinfos = args
        .shards
        .iter()
        .map(|fname| glom.read_file_info(fname, n_particles))
        .collect::<Result<Vec<_>>>()?;
    let groups = merge_pairs_of_procs(&glom, fileinfos, n_particles, previous_info.as_deref())?;
    info!(
        "{} clusters to start the next round from",
        n_clusters_for_next_round(&groups)
    );
    std::fs::create_dir_all(&args.out).with_context(|| args.out.display().to_string())?;
    // nothing is written until every group has merged
    for (igroup, paths) in groups.iter().enumerate() {
        log_paths(paths);
        let fname = args.out.join(format!("merged-{igroup}.csv"));
        write_partitions(&fname, paths)?;
        info!("wrote {}", fname.display());
    }
    Ok(())
}

fn divvy(naive_seqs_fname: &Path, n_procs: usize, out: Option<&Path>) -> Result<()> {
    let file = File::open(naive_seqs_fname).with_context(|| naive_seqs_fname.display().to_string())?;
    let naive_seqs = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file))
        .into_deserialize()
        .map(|record| record.map(|r: NaiveSeqRecord| (r.unique_id, r.naive_seq)))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| naive_seqs_fname.display().to_string())?;

    let divvied_queries = divvy_up_queries(naive_seqs, n_procs)?;

    let writer: Box<dyn Write> = match out {
        Some(fname) => Box::new(BufWriter::new(
            File::create(fname).with_context(|| fname.display().to_string())?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut wtr = csv::Writer::from_writer(writer);
    for (shard, queries) in divvied_queries.iter().enumerate() {
        for unique_id in queries {
            wtr.serialize(ShardRecord { shard, unique_id })?;
        }
    }
    wtr.flush()?;
    Ok(())
}
