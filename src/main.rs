// Command-line entry point for threadtrace.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use threadtrace::application::AnalyzeUsecase;
use threadtrace::domain::demangle::demangle;
use threadtrace::domain::store::{GraphStore, MemoryGraphStore, SledGraphStore};
use threadtrace::infrastructure::config::{CliOverrides, ThreadtraceConfig};
use threadtrace::infrastructure::exporter::{ExportOptions, GraphExporter};
use threadtrace::infrastructure::graph_loader::load_graph;
use threadtrace::infrastructure::logging::init_tracing;
use threadtrace::infrastructure::passes::PassPipeline;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Program graph document (JSON)
    #[arg(short, long)]
    graph: PathBuf,

    /// Config file (defaults to ./threadtrace.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Persist the export to an on-disk store at this path
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Export worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Relationship rows per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Plan the export but write nothing
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let overrides = CliOverrides {
        store_path: cli.store.clone(),
        workers: cli.workers,
        relationship_batch_size: cli.batch_size,
    };
    let config = ThreadtraceConfig::load(cli.config.as_deref(), Some(&overrides))
        .context("failed to load configuration")?;

    let loaded = load_graph(&cli.graph)
        .with_context(|| format!("failed to load graph {}", cli.graph.display()))?;

    let pipeline = PassPipeline::standard(&config.analysis, demangle)?;
    let exporter = GraphExporter::new(ExportOptions::from_config(&config.export), demangle);

    let store: Box<dyn GraphStore> = match &config.export.store_path {
        Some(path) => Box::new(
            SledGraphStore::open(path)
                .with_context(|| format!("failed to open store {}", path.display()))?,
        ),
        None => Box::new(MemoryGraphStore::new()),
    };

    let usecase = AnalyzeUsecase {
        pipeline: &pipeline,
        exporter: &exporter,
        store: store.as_ref(),
    };
    let outcome = usecase.run(&loaded.graph, cli.dry_run)?;

    let summary = &outcome.summary;
    println!(
        "{} {} nodes ({} batches) and {} relationships ({} batches); dropped {} nodes, {} relationships",
        if outcome.exported { "Exported" } else { "Planned" },
        summary.nodes,
        summary.node_batches,
        summary.relationships,
        summary.relationship_batches,
        summary.dropped_nodes,
        summary.dropped_relationships,
    );
    Ok(())
}
