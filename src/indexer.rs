//! Embedding and vector-store indexing of packed chunks.
//!
//! Chunks are rendered with [`chunk_to_text`] and sent to an
//! [`EmbeddingProvider`] in batches. At most `concurrency` batches are in
//! flight at once; results are reassembled in chunk order regardless of
//! completion order. The provider and the store are passed in by the
//! caller, never looked up globally.

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::IndexingConfig;
use crate::embedding::{chunk_to_text, embed_query, EmbeddingProvider};
use crate::models::Chunk;
use crate::store::{MetadataFilter, VectorMatch, VectorRecord, VectorStore};

/// Submission limits for embedding calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// Maximum embedding calls in flight at once.
    pub concurrency: usize,
    /// Chunks per embedding call.
    pub batch_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 16,
        }
    }
}

impl From<&IndexingConfig> for IndexOptions {
    fn from(config: &IndexingConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            batch_size: config.batch_size,
        }
    }
}

/// Outcome of [`index_chunks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Records written for this template.
    pub indexed: usize,
    /// Records from a previous run of the same template that were removed.
    pub removed: usize,
}

/// Embed texts with bounded concurrency, preserving input order.
///
/// Fails on the first failed batch.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    options: &IndexOptions,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let batch_size = options.batch_size.max(1);
    let concurrency = options.concurrency.max(1);

    let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(batch_size))
        .map(|batch| provider.embed(batch))
        .buffered(concurrency)
        .try_collect()
        .await?;

    let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
    if vectors.len() != texts.len() {
        bail!(
            "embedding provider returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        );
    }

    debug!(
        texts = texts.len(),
        batch_size,
        concurrency,
        model = provider.model_name(),
        "embedded texts"
    );
    Ok(vectors)
}

/// Fill in `embedding` on every chunk that does not have one yet.
///
/// Returns the number of chunks that were embedded.
pub async fn embed_chunks(
    chunks: &mut [Chunk],
    provider: &dyn EmbeddingProvider,
    options: &IndexOptions,
) -> Result<usize> {
    let pending: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, chunk)| chunk.embedding.is_none())
        .map(|(i, _)| i)
        .collect();

    let texts: Vec<String> = pending.iter().map(|&i| chunk_to_text(&chunks[i])).collect();
    let vectors = embed_texts(provider, &texts, options).await?;

    for (i, vector) in pending.iter().zip(vectors) {
        chunks[*i].embedding = Some(vector);
    }

    Ok(pending.len())
}

/// Metadata filter selecting every record of one template.
pub fn template_filter(template: &str) -> MetadataFilter {
    let mut filter = Map::new();
    filter.insert("template".to_string(), Value::from(template));
    filter
}

/// Store id of a chunk, unique across templates.
pub fn record_id(template: &str, chunk: &Chunk) -> String {
    format!("{}:{}", template, chunk.id)
}

/// Replace a template's records in `store` with freshly embedded chunks.
///
/// Every chunk is embedded before the store is touched, so a failed run
/// leaves the template's previous records in place. New records are
/// written first; records from earlier runs that were not overwritten are
/// deleted afterwards. Chunks that already carry an embedding are stored
/// without calling the provider again.
pub async fn index_chunks(
    template: &str,
    chunks: &[Chunk],
    provider: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    options: &IndexOptions,
) -> Result<IndexReport> {
    let mut chunks = chunks.to_vec();
    embed_chunks(&mut chunks, provider, options).await?;

    let records: Vec<VectorRecord> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let document = chunk_to_text(&chunk);
            let metadata = record_metadata(template, &chunk);
            let id = record_id(template, &chunk);
            chunk.embedding.map(|vector| VectorRecord {
                id,
                vector,
                metadata,
                document,
            })
        })
        .collect();

    let stale = store.get(Some(&template_filter(template))).await?;
    let report = IndexReport {
        indexed: records.len(),
        removed: stale.len(),
    };

    let fresh: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    store.add(records).await?;

    let leftover: Vec<String> = stale.into_iter().filter(|id| !fresh.contains(id)).collect();
    if !leftover.is_empty() {
        store.delete(&leftover).await?;
    }

    info!(
        template,
        indexed = report.indexed,
        removed = report.removed,
        "indexed template chunks"
    );
    Ok(report)
}

fn record_metadata(template: &str, chunk: &Chunk) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("template".to_string(), Value::from(template));
    metadata.insert("chunkId".to_string(), Value::from(chunk.id.as_str()));
    metadata.insert("title".to_string(), Value::from(chunk.title.as_str()));
    metadata.insert("tags".to_string(), Value::from(chunk.tags.join(",")));
    metadata.insert("startLine".to_string(), Value::from(chunk.start_line));
    metadata.insert("endLine".to_string(), Value::from(chunk.end_line));
    metadata
}

/// Embed `query` once and return the `k` closest records.
pub async fn search(
    query: &str,
    provider: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    k: usize,
    filter: Option<&MetadataFilter>,
) -> Result<Vec<VectorMatch>> {
    let vector = embed_query(provider, query).await?;
    store.query(&vector, k, filter).await
}
