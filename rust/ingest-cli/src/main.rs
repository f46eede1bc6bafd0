// rust/ingest-cli/src/main.rs

//! Ingest command-line loader
//!
//! Loads the source described by a configuration file and prints a summary
//! of the resulting dataset.
//!
//! # Usage
//!
//! ```bash
//! # Load with the settings in the file
//! ingest --config mnist.toml
//!
//! # Decode text lines on eight workers and normalize afterwards
//! ingest --config iris.toml --max-concurrency 8 --normalize
//!
//! # Show decoder debug logs
//! RUST_LOG=ingest_core=debug ingest --config iris.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ingest_core::{Dataset, IngestConfig, Ingestor};

/// Chunk-described dataset loader
#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Decode a binary, text, or image-tree source into a sample dataset")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: PathBuf,

    /// Override the source path from the configuration
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Maximum in-flight text records (1 decodes sequentially)
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Rescale tagged features after loading
    #[arg(long)]
    normalize: bool,

    /// Number of samples to print
    #[arg(long, default_value = "0")]
    show: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> ingest_core::Result<()> {
    let mut config = IngestConfig::from_file(&args.config)?.with_env_overrides();
    if let Some(source) = &args.source {
        config.source.path = source.clone();
    }
    if let Some(n) = args.max_concurrency {
        config.decode.max_concurrency = n;
    }
    config.decode.normalize |= args.normalize;

    tracing::info!("Loading {:?} source", config.source.kind);
    tracing::info!("  Path: {}", config.source.path.display());
    tracing::info!("  Chunks: {}", config.chunks.len());
    tracing::info!("  Max concurrency: {}", config.decode.max_concurrency);

    let ingestor = Ingestor::from_config(config)?;
    let dataset = ingestor.load().await?;
    print_summary(&dataset, args.show);
    Ok(())
}

fn print_summary(dataset: &Dataset, show: usize) {
    let layout = dataset.layout();
    println!("samples: {}", dataset.num_samples());
    println!("input:   {:?} {:?}", layout.input_shape, layout.input_dtype);
    println!("output:  {:?} {:?}", layout.output_shape, layout.output_dtype);

    let labels = dataset.labels().labels();
    if !labels.is_empty() {
        println!("labels:  {}", labels.join(", "));
    }

    for (index, sample) in dataset.samples().iter().take(show).enumerate() {
        let class = sample
            .class_index
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "[{index}] class={class} input={:?} output={:?}",
            sample.input.as_slice(),
            sample.output.as_slice()
        );
    }
}
