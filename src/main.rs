use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use feather::model::DEMO_DIM;
use feather::{FeatherDb, IndexKind, Options};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing_subscriber::EnvFilter;

/// Fills a store with random vectors, runs one query and saves it.
#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(long, default_value = "demo.feather")]
    path: PathBuf,

    #[clap(long, default_value_t = DEMO_DIM)]
    dim: usize,

    #[clap(long, default_value_t = 1000)]
    count: u64,

    #[clap(long, default_value_t = 5)]
    k: usize,

    #[clap(long, default_value_t = 42)]
    seed: u64,

    /// Use the approximate HNSW index instead of the exact one
    #[clap(long)]
    hnsw: bool,

    /// JSON file with database options
    #[clap(long)]
    config: Option<PathBuf>,
}

fn random_vector(normal: &Normal<f32>, rng: &mut StdRng, dim: usize) -> Vec<f32> {
    (0..dim).map(|_| normal.sample(rng)).collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let mut options = match &args.config {
        Some(path) => Options::from_json_file(path)
            .with_context(|| format!("reading options from {}", path.display()))?,
        None => Options::default(),
    };
    if args.hnsw {
        options = options.with_index(IndexKind::Hnsw).with_seed(args.seed);
    }

    let db = FeatherDb::open_with(&args.path, args.dim, options)
        .with_context(|| format!("opening {}", args.path.display()))?;

    let normal = Normal::new(0.0f32, 1.0).context("building standard normal")?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    for id in 0..args.count {
        db.add(id, &random_vector(&normal, &mut rng, args.dim))?;
    }

    let query = vec![0.1f32; args.dim];
    let results = db.search(&query, args.k)?;

    println!("Top-{} nearest neighbors:", args.k);
    for hit in &results {
        println!("  ID: {}  distance: {}", hit.id, hit.distance);
    }

    db.save().context("saving store")?;
    Ok(())
}
