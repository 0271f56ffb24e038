use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use feather::parser::parse_vector_literal;
use feather::storage::read_header;
use feather::{FeatherDb, Options};
use ndarray::Array1;
use ndarray_npy::read_npy;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feather-cli", version, about = "Inspect and edit feather stores")]
struct Cli {
    /// JSON file with database options
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where a vector comes from: inline literal, a text file holding one, or
/// a one-dimensional float32 `.npy` array.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct VectorSource {
    /// Inline literal, e.g. "[0.1, 0.2, 0.3]"
    #[arg(short, long, allow_hyphen_values = true)]
    vector: Option<String>,

    /// File containing a vector literal
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// NumPy .npy file holding a 1-D float32 array
    #[arg(short, long)]
    npy: Option<PathBuf>,
}

impl VectorSource {
    fn read(&self) -> anyhow::Result<Vec<f32>> {
        let text = match (&self.vector, &self.file, &self.npy) {
            (Some(literal), _, _) => literal.clone(),
            (None, Some(path), _) => std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?,
            (None, None, Some(path)) => return read_npy_vector(path),
            (None, None, None) => bail!("no vector given"),
        };
        Ok(parse_vector_literal(&text)?)
    }
}

fn read_npy_vector(path: &Path) -> anyhow::Result<Vec<f32>> {
    let array: Array1<f32> = read_npy(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(array.to_vec())
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty store
    New {
        path: PathBuf,
        #[arg(long)]
        dim: usize,
    },
    /// Add (or overwrite) one vector and save
    Add {
        db: PathBuf,
        id: u64,
        #[command(flatten)]
        source: VectorSource,
    },
    /// Print the nearest neighbors of a vector
    Search {
        db: PathBuf,
        #[command(flatten)]
        source: VectorSource,
        #[arg(long, default_value_t = 5)]
        k: usize,
        /// Emit results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the header of a store file
    Info { db: PathBuf },
}

fn open(path: &Path, dim: usize, options: &Options) -> anyhow::Result<FeatherDb> {
    FeatherDb::open_with(path, dim, options.clone())
        .with_context(|| format!("opening {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let options = match &cli.config {
        Some(path) => Options::from_json_file(path)
            .with_context(|| format!("reading options from {}", path.display()))?,
        None => Options::default(),
    };

    match cli.command {
        Commands::New { path, dim } => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            open(&path, dim, &options)?.save()?;
            println!("Created: {}", path.display());
        }
        Commands::Add { db, id, source } => {
            let vector = source.read()?;
            let db = open(&db, vector.len(), &options)?;
            db.add(id, &vector)?;
            db.save()?;
            println!("Added ID {}", id);
        }
        Commands::Search { db, source, k, json } => {
            let query = source.read()?;
            let db = open(&db, query.len(), &options)?;
            let hits = db.search(&query, k)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                for hit in &hits {
                    println!("ID: {}  dist: {:.4}", hit.id, hit.distance);
                }
            }
        }
        Commands::Info { db } => {
            let header = read_header(&db).with_context(|| format!("reading {}", db.display()))?;
            println!("File:      {}", db.display());
            println!("Version:   {}", header.version);
            println!("Dimension: {}", header.dim);
            println!("Records:   {}", header.count);
        }
    }
    Ok(())
}
