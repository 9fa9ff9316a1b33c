//! Manual smoke-test CLI for the document query engine. Each invocation is a
//! single shot: state survives between invocations only through the
//! `<data-dir>/<collection>/bin-NNNN.dat` checkpoints written by
//! [`sombra::persistence`], reloaded into a [`Collection`] via
//! [`Collection::from_bins`].
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use sombra::{
    AccOp, AggregateLeaf, AggregateTarget, Atom, CancellationToken, Collection, EngineConfig,
    FindLeaf, Operator, PredicateTree, QueryDriver, QueryMetrics, TypeTag,
};

#[derive(Parser, Debug)]
#[command(name = "sombra", version, about = "Insert into and query a Sombra collection from the shell")]
struct Cli {
    /// Directory holding one subdirectory per collection.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: PathBuf,

    /// Collection to operate on.
    #[arg(long, global = true, default_value = "default")]
    collection: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates the on-disk directory for a collection.
    Init,
    /// Inserts one document made of `name=value` integer fields.
    Insert {
        /// A repeatable `name=value` pair, e.g. `--field 10=42 --field 20=7`.
        #[arg(long = "field", value_name = "NAME=VALUE", required = true)]
        fields: Vec<String>,
    },
    /// Runs a single-predicate find query and prints the match count.
    Find {
        #[arg(long)]
        name: u32,
        #[arg(long, value_enum)]
        op: OpArg,
        #[arg(long)]
        value: i64,
    },
    /// Runs a single-target group-by aggregate query and prints the row count.
    Aggregate {
        #[arg(long)]
        group: u32,
        #[arg(long)]
        value: u32,
        #[arg(long, value_enum)]
        op: AccOpArg,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OpArg {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
}

impl From<OpArg> for Operator {
    fn from(op: OpArg) -> Self {
        match op {
            OpArg::Eq => Operator::Eq,
            OpArg::Gt => Operator::Gt,
            OpArg::Gte => Operator::Gte,
            OpArg::Lt => Operator::Lt,
            OpArg::Lte => Operator::Lte,
            OpArg::Ne => Operator::Ne,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AccOpArg {
    Sum,
    Count,
    Min,
    Max,
}

impl From<AccOpArg> for AccOp {
    fn from(op: AccOpArg) -> Self {
        match op {
            AccOpArg::Sum => AccOp::Sum,
            AccOpArg::Count => AccOp::Count,
            AccOpArg::Min => AccOp::Min,
            AccOpArg::Max => AccOp::Max,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    sombra::logging::init_logging("info")?;
    let cli = Cli::parse();
    let collection_dir = cli.data_dir.join(&cli.collection);

    match cli.command {
        Command::Init => {
            std::fs::create_dir_all(&collection_dir)?;
            println!("initialized {}", collection_dir.display());
        }
        Command::Insert { fields } => {
            let collection = load_collection(&collection_dir, &cli.collection, EngineConfig::default())?;
            let atoms = parse_fields(&fields)?;
            let (bin_idx, elem_idx) = collection.acquire_insert_buffer(atoms.len() as u32)?;
            collection.write_and_release(bin_idx, elem_idx, &atoms)?;
            save_collection(&collection_dir, &collection)?;
            println!("inserted into bin {bin_idx} element {elem_idx}");
        }
        Command::Find { name, op, value } => {
            let collection = load_collection(&collection_dir, &cli.collection, EngineConfig::default())?;
            let driver = QueryDriver::new(collection.config().clone());
            let filter = Atom::new(0, name, TypeTag::Int64, 8, value as u64);
            let leaf = FindLeaf::new(0, op.into(), filter);
            let out = driver.find(
                &collection,
                vec![leaf],
                PredicateTree::Trivial,
                None,
                &CancellationToken::new(),
                &QueryMetrics::new(),
            )?;
            println!("{} matching document(s)", out[0].value());
        }
        Command::Aggregate { group, value, op } => {
            let collection = load_collection(&collection_dir, &cli.collection, EngineConfig::default())?;
            let driver = QueryDriver::new(collection.config().clone());
            let acc_op: AccOp = op.into();
            let leaf = AggregateLeaf::new(0, group, value, acc_op);
            let target = AggregateTarget { leaf_index: 0, target_name: value, op: acc_op };
            let out = driver.aggregate(
                &collection,
                vec![leaf],
                vec![target],
                false,
                &CancellationToken::new(),
                &QueryMetrics::new(),
            )?;
            println!("{} group(s)", out[0].value());
        }
    }
    Ok(())
}

fn parse_fields(fields: &[String]) -> Result<Vec<Atom>, Box<dyn std::error::Error>> {
    fields
        .iter()
        .map(|field| {
            let (name, value) = field
                .split_once('=')
                .ok_or_else(|| format!("invalid field '{field}', expected NAME=VALUE"))?;
            let name: u32 = name.parse()?;
            let value: i64 = value.parse()?;
            Ok(Atom::new(0, name, TypeTag::Int64, 8, value as u64))
        })
        .collect()
}

/// Loads every `bin-*.dat` under `dir` and rebuilds a [`Collection`] from
/// them, or starts an empty one if the directory doesn't exist yet.
fn load_collection(
    dir: &Path,
    name: &str,
    config: EngineConfig,
) -> Result<Collection, Box<dyn std::error::Error>> {
    if !dir.exists() {
        return Ok(Collection::new(name, config));
    }
    let mut bin_paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "dat"))
        .collect();
    bin_paths.sort();
    if bin_paths.is_empty() {
        return Ok(Collection::new(name, config));
    }
    let bins = bin_paths
        .iter()
        .map(|path| sombra::persistence::deserialize_bin(path))
        .collect::<sombra::error::Result<Vec<_>>>()?;
    Ok(Collection::from_bins(name, config, bins))
}

/// Checkpoints every bin in `collection` back to `dir`, one file per bin.
fn save_collection(dir: &Path, collection: &Collection) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    for bin in collection.bins_snapshot() {
        let path = dir.join(format!("bin-{:04}.dat", bin.index()));
        sombra::persistence::serialize_bin(&bin, &path)?;
    }
    Ok(())
}
