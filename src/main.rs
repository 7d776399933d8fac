//! # Template Chunker CLI (`template-chunker`)
//!
//! Reads one JSON template, packs its sections into bounded-size chunks,
//! adds overlap context, and writes the chunked document as JSON.
//!
//! ## Usage
//!
//! ```bash
//! template-chunker --input lease.json [--output lease.chunked.json] \
//!     [--chunk-size 500] [--min-chunk-size 100] [--overlap 50]
//! ```
//!
//! Flags override values from `--config`. `--overlap 0` disables the
//! overlap pass. Exits with status 1 on any validation or processing error.

use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use template_chunker::config::{self, Config};
use template_chunker::pack_cmd::{self, PackRequest};

/// Template Chunker: split a JSON form template into bounded-size,
/// indexed chunks.
#[derive(Parser)]
#[command(
    name = "template-chunker",
    about = "Split a JSON form template into bounded-size, indexed chunks",
    version
)]
struct Cli {
    /// Template JSON file to chunk.
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the chunked JSON. Defaults to `<input>.chunked.json`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum estimated lines per chunk (at least 50).
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Advisory minimum lines per chunk. Recorded, not enforced.
    #[arg(long)]
    min_chunk_size: Option<usize>,

    /// Overlap budget; carries `ceil(overlap / 10)` trailing fields into
    /// the next chunk. `0` disables overlap.
    #[arg(long)]
    overlap: Option<usize>,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Embed every chunk with the configured provider before writing.
    #[arg(long)]
    embed: bool,

    /// Log packing decisions to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "template_chunker=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_logging(cli.verbose);

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(size) = cli.chunk_size {
        cfg.chunking.max_chunk_size = size;
    }
    if let Some(size) = cli.min_chunk_size {
        cfg.chunking.min_chunk_size = size;
    }
    if let Some(size) = cli.overlap {
        cfg.chunking.overlap_size = size;
    }
    config::validate(&cfg)?;

    let request = PackRequest {
        input: cli.input,
        output: cli.output,
        embed: cli.embed,
    };
    pack_cmd::run_pack(&cfg, &request).await?;

    Ok(())
}
