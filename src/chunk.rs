//! Section-packing template chunker.
//!
//! Partitions a [`Document`]'s sections into an ordered sequence of
//! [`Chunk`]s whose estimated size stays within `max_chunk_size` lines.
//! Sections are placed whole; only a section that alone exceeds the limit
//! is split, and then only along field boundaries.
//!
//! # Size estimation
//!
//! The size of a section is the number of lines in its 2-space
//! pretty-printed JSON, keys in the order they appear. It is a proxy for
//! how much room the section takes up in a rendered template, and it is
//! stable across runs on unmodified input.
//!
//! # Algorithm
//!
//! 1. Walk the sections left to right with one open chunk and a running
//!    line count.
//! 2. A section that fits next to the open chunk's contents joins it.
//! 3. A section larger than `max_chunk_size` closes the open chunk and is
//!    split into `ceil(size / max)` parts of `ceil(fields / parts)` fields.
//! 4. Any other section closes the open chunk and seeds a new one.
//! 5. The last open chunk is closed, and a [`ChunkIndex`] is built over
//!    the result.
//!
//! # Example
//!
//! ```rust
//! use template_chunker::chunk::{ChunkerOptions, TemplateChunker};
//! use template_chunker::models::Document;
//!
//! let doc: Document = serde_json::from_str(
//!     r#"{ "name": "lease", "sections": [
//!         { "id": "parties", "name": "Parties", "tags": ["people"], "fields": [
//!             { "id": "tenant", "label": "Tenant", "type": "text" }
//!         ] }
//!     ] }"#,
//! ).unwrap();
//!
//! let chunker = TemplateChunker::new(ChunkerOptions::default()).unwrap();
//! let chunked = chunker.chunk_document(&doc);
//! assert_eq!(chunked.chunks.len(), 1);
//! assert_eq!(chunked.chunks[0].id, "chunk-001");
//! assert_eq!(chunked.index.by_tag["people"], vec!["chunk-001"]);
//! ```

use std::io;

use anyhow::{bail, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{
    Chunk, ChunkContent, ChunkIndex, ChunkMetadata, ChunkedDocument, Document, OverlapContext,
    Section,
};

/// Smallest accepted `max_chunk_size`.
pub const MIN_MAX_CHUNK_SIZE: usize = 50;

/// Keys the packer adds to its output; input keys with these names are
/// replaced rather than duplicated.
const RESERVED_KEYS: [&str; 3] = ["metadata", "chunks", "index"];

/// Packing configuration. Fixed once a [`TemplateChunker`] is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerOptions {
    /// Upper bound on a chunk's estimated size, in lines.
    pub max_chunk_size: usize,
    /// Advisory lower bound. Accepted and carried, never enforced.
    pub min_chunk_size: usize,
    /// Overlap budget; `ceil(overlap_size / 10)` fields are carried over.
    pub overlap_size: usize,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            min_chunk_size: 100,
            overlap_size: 50,
        }
    }
}

impl ChunkerOptions {
    /// Number of trailing fields copied into the next chunk's context.
    pub fn overlap_fields(&self) -> usize {
        self.overlap_size.div_ceil(10)
    }
}

/// Packs template documents into bounded-size chunks.
///
/// Holds no state besides its options, so one instance may be shared
/// freely across threads and calls.
#[derive(Debug, Clone)]
pub struct TemplateChunker {
    options: ChunkerOptions,
}

impl TemplateChunker {
    /// Create a chunker.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_chunk_size` is below [`MIN_MAX_CHUNK_SIZE`].
    pub fn new(options: ChunkerOptions) -> Result<Self> {
        if options.max_chunk_size < MIN_MAX_CHUNK_SIZE {
            bail!(
                "chunk size must be at least {} lines (got {})",
                MIN_MAX_CHUNK_SIZE,
                options.max_chunk_size
            );
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &ChunkerOptions {
        &self.options
    }

    /// Pack a document and return it merged with its chunks, index and
    /// chunking metadata.
    pub fn chunk_document(&self, document: &Document) -> ChunkedDocument {
        let chunks = self.pack(&document.sections);
        let index = build_index(&chunks);

        let extra = document
            .extra
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        debug!(
            document = %document.name,
            sections = document.sections.len(),
            chunks = chunks.len(),
            "packed document"
        );

        ChunkedDocument {
            name: document.name.clone(),
            sections: document.sections.clone(),
            extra,
            metadata: ChunkMetadata {
                total_chunks: chunks.len(),
                chunk_size: self.options.max_chunk_size,
                chunked_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
            chunks,
            index,
        }
    }

    /// Pack sections into chunks in a single left-to-right pass.
    ///
    /// Chunk ids are `chunk-001`, `chunk-002`, … in emission order.
    pub fn pack(&self, sections: &[Section]) -> Vec<Chunk> {
        let max = self.options.max_chunk_size;
        let mut chunks = Vec::new();
        let mut open = OpenChunk::default();

        for section in sections {
            let size = estimate_lines(section);

            if open.lines + size <= max {
                open.push(section, size);
            } else if size > max {
                open.close_into(&mut chunks);
                let parts = self.split_section(section, size, chunks.len() + 1);
                debug!(
                    section = %section.id,
                    lines = size,
                    parts = parts.len(),
                    "split oversized section"
                );
                chunks.extend(parts);
            } else {
                open.close_into(&mut chunks);
                open.push(section, size);
            }
        }
        open.close_into(&mut chunks);

        chunks
    }

    /// Split a section larger than `max_chunk_size` into one chunk per
    /// consecutive field group. Numbering of the new chunks starts at
    /// `first_number`.
    fn split_section(&self, section: &Section, size: usize, first_number: usize) -> Vec<Chunk> {
        if section.fields.is_empty() {
            // Nothing to split along; keep the section whole.
            return vec![Chunk {
                id: chunk_id(first_number),
                title: section.name.clone(),
                start_line: 1,
                end_line: size,
                tags: merged_tags(&[], section.tags()),
                content: ChunkContent {
                    sections: vec![section.clone()],
                    context: None,
                },
                embedding: None,
            }];
        }

        let parts_needed = size.div_ceil(self.options.max_chunk_size);
        let fields_per_chunk = section.fields.len().div_ceil(parts_needed);

        section
            .fields
            .chunks(fields_per_chunk)
            .enumerate()
            .map(|(i, group)| {
                let part = i + 1;
                let sub_section = Section {
                    id: format!("{}-part-{}", section.id, part),
                    name: format!("{} (part {})", section.name, part),
                    description: section.description.clone(),
                    tags: section.tags.clone(),
                    fields: group.to_vec(),
                    extra: section.extra.clone(),
                };
                let lines = estimate_lines(&sub_section);

                Chunk {
                    id: chunk_id(first_number + i),
                    title: sub_section.name.clone(),
                    start_line: 1,
                    end_line: lines,
                    tags: merged_tags(&[], sub_section.tags()),
                    content: ChunkContent {
                        sections: vec![sub_section],
                        context: None,
                    },
                    embedding: None,
                }
            })
            .collect()
    }

    /// Attach the previous chunk's trailing fields to each chunk as
    /// overlap context.
    ///
    /// Existing contexts are overwritten, so the result depends only on the
    /// current chunk sequence. The first chunk never receives a context.
    pub fn add_overlap(&self, chunks: &mut [Chunk]) {
        let take = self.options.overlap_fields();

        for i in 1..chunks.len() {
            let (before, after) = chunks.split_at_mut(i);
            let prev = &before[i - 1];
            let Some(last_section) = prev.content.sections.last() else {
                continue;
            };

            let start = last_section.fields.len().saturating_sub(take);
            let fields = last_section.fields[start..].to_vec();
            if fields.is_empty() {
                continue;
            }

            after[0].content.context = Some(OverlapContext {
                from: prev.id.clone(),
                fields,
            });
        }
    }

    /// Run [`add_overlap`](Self::add_overlap) on a packed document and
    /// rebuild its index so `by_id` carries the new contexts.
    pub fn add_overlap_to_document(&self, document: &mut ChunkedDocument) {
        self.add_overlap(&mut document.chunks);
        document.index = build_index(&document.chunks);
    }
}

/// The chunk currently being filled.
#[derive(Default)]
struct OpenChunk {
    title: Option<String>,
    sections: Vec<Section>,
    tags: Vec<String>,
    lines: usize,
}

impl OpenChunk {
    fn push(&mut self, section: &Section, lines: usize) {
        if self.title.is_none() {
            self.title = Some(section.name.clone());
        }
        self.tags = merged_tags(&self.tags, section.tags());
        self.sections.push(section.clone());
        self.lines += lines;
    }

    /// Emit this chunk if it holds anything, and reset it either way.
    fn close_into(&mut self, chunks: &mut Vec<Chunk>) {
        let open = std::mem::take(self);
        if open.sections.is_empty() {
            return;
        }

        let start_line = 1;
        chunks.push(Chunk {
            id: chunk_id(chunks.len() + 1),
            title: open.title.unwrap_or_default(),
            start_line,
            end_line: start_line + open.lines.max(1) - 1,
            tags: open.tags,
            content: ChunkContent {
                sections: open.sections,
                context: None,
            },
            embedding: None,
        });
    }
}

/// Format a 1-based chunk number as `chunk-NNN`.
pub fn chunk_id(number: usize) -> String {
    format!("chunk-{:03}", number)
}

/// Append `incoming` tags not already present, keeping first-seen order.
fn merged_tags(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut tags = existing.to_vec();
    for tag in incoming {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

/// Counts newlines written through it.
#[derive(Default)]
struct LineCounter {
    newlines: usize,
}

impl io::Write for LineCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.newlines += buf.iter().filter(|&&b| b == b'\n').count();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Estimate the size of a value as the line count of its 2-space
/// pretty-printed JSON.
///
/// Never returns less than 1. A value that fails to serialize (a map with
/// non-string keys, say) counts as a single line and is logged.
pub fn estimate_lines<T: Serialize + ?Sized>(value: &T) -> usize {
    let mut counter = LineCounter::default();
    match serde_json::to_writer_pretty(&mut counter, value) {
        // Pretty output has no trailing newline, so lines = newlines + 1.
        Ok(()) => counter.newlines + 1,
        Err(e) => {
            warn!(error = %e, "size estimate failed, counting one line");
            1
        }
    }
}

/// Build the tag, section-name and id lookup tables over a chunk sequence.
pub fn build_index(chunks: &[Chunk]) -> ChunkIndex {
    let mut index = ChunkIndex::default();

    for chunk in chunks {
        for tag in &chunk.tags {
            push_unique(index.by_tag.entry(tag.clone()).or_default(), &chunk.id);
        }
        for section in &chunk.content.sections {
            push_unique(
                index.by_section.entry(section.name.clone()).or_default(),
                &chunk.id,
            );
        }
        index.by_id.insert(chunk.id.clone(), chunk.clone());
    }

    index
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}
