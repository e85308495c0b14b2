//! `island`: build per-world islands from a corpus directory and score text
//! against them.
//!
//! Islands are persisted under the configured artifacts directory, so a
//! `score` in a fresh process picks up the last successful `build`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use island_core::config::{Config, Settings};
use island_core::corpus::{list_worlds, load_corpus_dir};
use island_core::types::{BuildParams, ScoreResult, WorldStatus};
use island_embed::get_default_embedder;
use island_engine::IslandEngine;
use island_vector::IslandArchive;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "island")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build vector islands for fictional worlds and score text against them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or rebuild) the island for one world
    Build {
        world: String,

        /// Corpus root holding one sub-directory per world
        #[arg(long, value_name = "DIR")]
        corpus_dir: Option<PathBuf>,

        /// Only load corpus files whose name matches one of these patterns
        #[arg(long = "pattern", value_name = "GLOB")]
        patterns: Vec<String>,

        #[command(flatten)]
        overrides: ParamOverrides,
    },
    /// Build every world found under the corpus root
    BuildAll {
        #[arg(long, value_name = "DIR")]
        corpus_dir: Option<PathBuf>,

        #[command(flatten)]
        overrides: ParamOverrides,
    },
    /// Score a piece of text against a built world
    Score {
        world: String,
        text: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what is known about a world's island
    Status {
        world: String,

        #[arg(long)]
        json: bool,
    },
    /// List worlds that have an island
    Worlds,
}

#[derive(clap::Args)]
struct ParamOverrides {
    #[arg(long)]
    chunk_size: Option<usize>,
    #[arg(long)]
    overlap: Option<usize>,
    #[arg(long)]
    k: Option<usize>,
    #[arg(long)]
    accept_percentile: Option<f64>,
    #[arg(long)]
    review_percentile: Option<f64>,
}

impl ParamOverrides {
    fn apply(&self, base: &BuildParams) -> BuildParams {
        let mut params = base.clone();
        if let Some(v) = self.chunk_size {
            params.chunk_size = v;
        }
        if let Some(v) = self.overlap {
            params.overlap = v;
        }
        if let Some(v) = self.k {
            params.k = v;
        }
        if let Some(v) = self.accept_percentile {
            params.accept_percentile = v;
        }
        if let Some(v) = self.review_percentile {
            params.review_percentile = v;
        }
        params
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().context("loading configuration")?;
    let settings = config.settings().context("validating configuration")?;
    let base = std::env::current_dir().context("resolving working directory")?;

    let embedder = get_default_embedder(&settings.embedding).context("initializing embedder")?;
    let artifacts_dir = settings.paths.artifacts_dir(&base);
    let archive = IslandArchive::open(&artifacts_dir)
        .await
        .with_context(|| format!("opening artifacts at {}", artifacts_dir.display()))?;
    let engine = IslandEngine::from_settings(embedder, &settings).with_archive(Arc::new(archive));

    match cli.command {
        Commands::Build { world, corpus_dir, patterns, overrides } => {
            let root = corpus_root(&settings, &base, corpus_dir);
            let params = overrides.apply(&settings.build.params);
            build_world(&engine, &root, &world, &patterns, &params).await?;
        }
        Commands::BuildAll { corpus_dir, overrides } => {
            let root = corpus_root(&settings, &base, corpus_dir);
            let params = overrides.apply(&settings.build.params);
            let worlds = list_worlds(&root).with_context(|| format!("listing worlds under {}", root.display()))?;
            if worlds.is_empty() {
                println!("No worlds found under {}", root.display());
            }
            let mut failed = 0usize;
            for world in &worlds {
                if let Err(e) = build_world(&engine, &root, world, &[], &params).await {
                    error!(world_id = %world, "{e:#}");
                    failed += 1;
                }
            }
            println!("Built {} of {} worlds", worlds.len() - failed, worlds.len());
            if failed > 0 {
                anyhow::bail!("{failed} world(s) failed to build");
            }
        }
        Commands::Score { world, text, json } => {
            let result = engine.score(&world, &text).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_score(&result);
            }
        }
        Commands::Status { world, json } => {
            let status = engine.status(&world).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        Commands::Worlds => {
            for world in engine.worlds().await? {
                println!("{world}");
            }
        }
    }
    Ok(())
}

fn corpus_root(settings: &Settings, base: &Path, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| settings.paths.corpus_dir(base))
}

async fn build_world(
    engine: &IslandEngine,
    root: &Path,
    world: &str,
    patterns: &[String],
    params: &BuildParams,
) -> Result<()> {
    let dir = root.join(world);
    let docs = load_corpus_dir(&dir, patterns)?;
    info!(world_id = world, documents = docs.len(), dir = %dir.display(), "loaded corpus");
    let summary = engine.build(world, &docs, params).await?;
    println!(
        "{}: {} chunks, dim {}, k {}, accept {:.4}, review {:.4}, max {:.4} (v{})",
        summary.world_id,
        summary.chunks_processed,
        summary.embedding_dim,
        summary.k,
        summary.accept_distance,
        summary.review_distance,
        summary.max_distance,
        summary.manifold_version,
    );
    Ok(())
}

fn print_score(result: &ScoreResult) {
    println!("World:      {} (v{}, {})", result.world_id, result.manifold_version, result.model_name);
    println!("Decision:   {}", result.decision);
    println!("IW score:   {:.3}", result.iw_score);
    println!("Distance:   {:.4}", result.distance);
    println!("Confidence: {:.3}", result.confidence);
    println!(
        "Thresholds: accept {:.4} / review {:.4} / max {:.4} (k = {})",
        result.thresholds.accept_distance,
        result.thresholds.review_distance,
        result.thresholds.max_distance,
        result.thresholds.k,
    );
    for (i, hit) in result.nearest_chunks.iter().take(3).enumerate() {
        let preview: String = hit.text.chars().take(80).collect();
        println!("  {}. [{:.4}] {} | {}", i + 1, hit.distance, hit.chunk_id, preview.replace('\n', " "));
    }
}

fn print_status(status: &WorldStatus) {
    if !status.exists {
        println!("{}: no island", status.world_id);
        return;
    }
    let opt = |v: Option<f32>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
    println!("World:      {}", status.world_id);
    println!("Version:    {}", status.manifold_version.unwrap_or_default());
    println!("Model:      {}", status.model_name.as_deref().unwrap_or("-"));
    println!("Chunks:     {}", status.chunk_count.unwrap_or_default());
    println!("Dimension:  {}", status.embedding_dim.unwrap_or_default());
    println!("k:          {}", status.k.unwrap_or_default());
    println!(
        "Thresholds: accept {} / review {} / max {}",
        opt(status.accept_distance),
        opt(status.review_distance),
        opt(status.max_distance)
    );
    println!("Distances:  mean {} / min {}", opt(status.mean_distance), opt(status.min_distance));
    if let Some(built_at) = status.built_at {
        println!("Built at:   {}", built_at.to_rfc3339());
    }
}
