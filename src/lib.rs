//! # Template Chunker
//!
//! Splits large JSON form templates into bounded-size chunks for retrieval.
//!
//! A template is a list of sections, each holding fields. The packer groups
//! whole sections into chunks of at most `max_chunk_size` estimated lines,
//! splits sections that are too large on their own along field boundaries,
//! and builds tag, section and id lookup tables over the result. Chunks can
//! then be embedded and stored in a vector store for similarity search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐   ┌─────────────┐
//! │ Template │──▶│ Chunk packer │──▶│  Overlap   │──▶│   Indexer   │
//! │  (JSON)  │   │ + lookup idx │   │  context   │   │ embed+store │
//! └──────────┘   └──────────────┘   └────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! template-chunker -i lease.json -o lease.chunked.json --chunk-size 400
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Template, chunk and index types |
//! | [`chunk`] | Section packing, splitting, overlap and index building |
//! | [`stats`] | Aggregate chunk statistics |
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding provider abstraction and chunk text rendering |
//! | [`store`] | Vector store abstraction and in-memory backend |
//! | [`indexer`] | Bounded-concurrency embedding, indexing and search |
//! | [`pack_cmd`] | The CLI run |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod indexer;
pub mod models;
pub mod pack_cmd;
pub mod stats;
pub mod store;
