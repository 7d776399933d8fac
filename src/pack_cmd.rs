//! The `template-chunker` run: read a template, pack it, write the result.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::chunk::TemplateChunker;
use crate::config::Config;
use crate::embedding;
use crate::indexer::{self, IndexOptions};
use crate::models::{ChunkedDocument, Document};
use crate::stats::ChunkStats;

/// Inputs of a single CLI run, after flags and config have been merged.
#[derive(Debug, Clone)]
pub struct PackRequest {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Fill chunk embeddings with the configured provider before writing.
    pub embed: bool,
}

/// Default output path: `lease.json` → `lease.chunked.json`.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "template".to_string());
    input.with_file_name(format!("{}.chunked.json", stem))
}

/// Read and parse a template document.
pub fn read_document(path: &Path) -> Result<Document> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid template document: {}", path.display()))
}

/// Pack a document, run the overlap pass when enabled, and optionally
/// embed the chunks.
pub async fn pack_document(
    config: &Config,
    document: &Document,
    embed: bool,
) -> Result<ChunkedDocument> {
    let chunker = TemplateChunker::new(config.chunking.options())?;
    let mut chunked = chunker.chunk_document(document);

    if chunker.options().overlap_size > 0 {
        chunker.add_overlap_to_document(&mut chunked);
    }

    if embed {
        if !config.embedding.is_enabled() {
            bail!("Embedding provider is disabled. Set [embedding] provider in config.");
        }
        let provider = embedding::create_provider(&config.embedding)?;
        let options = IndexOptions::from(&config.indexing);
        let embedded =
            indexer::embed_chunks(&mut chunked.chunks, provider.as_ref(), &options).await?;
        info!(embedded, model = provider.model_name(), "embedded chunks");
        // by_id holds copies of the chunks; refresh it with the vectors.
        chunked.index = crate::chunk::build_index(&chunked.chunks);
    }

    Ok(chunked)
}

/// Run the full CLI flow and print a summary.
pub async fn run_pack(config: &Config, request: &PackRequest) -> Result<ChunkStats> {
    let document = read_document(&request.input)?;
    let chunked = pack_document(config, &document, request.embed).await?;
    let stats = ChunkStats::compute(&chunked.chunks);

    let output = request
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&request.input));
    let json = serde_json::to_string_pretty(&chunked)?;
    std::fs::write(&output, json)
        .with_context(|| format!("Failed to write output file: {}", output.display()))?;

    println!("chunk {}", document.name);
    println!("  input:   {}", request.input.display());
    println!("  output:  {}", output.display());
    println!();
    stats.print_summary();

    Ok(stats)
}
