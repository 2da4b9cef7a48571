//! # Paperdex
//!
//! A local-first PDF indexing and question-answering engine with
//! page-accurate citations.
//!
//! Paperdex walks configured document roots, extracts per-page text from
//! PDFs (with OCR fallback for scanned pages), chunks it into overlapping
//! word windows, and answers natural-language questions over the indexed
//! corpus. Retrieval prefers a vector index and degrades to a lexical
//! fallback; synthesis prefers a chat model and degrades to raw extracts.
//! Every optional capability that is missing turns into a weaker answer,
//! never an error.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────────────┐
//! │ Scanner  │──▶│ Extractor │──▶│  JSON stores +  │
//! │ roots    │   │ PDF / OCR │   │   vectors.bin   │
//! └──────────┘   └───────────┘   └───────┬─────────┘
//!                                        │
//!                          ┌─────────────┴──────────┐
//!                          ▼                        ▼
//!                   ┌────────────┐          ┌──────────────┐
//!                   │ Vector idx │          │ Lexical idx  │
//!                   └─────┬──────┘          └──────┬───────┘
//!                         └────────┬───────────────┘
//!                                  ▼
//!                         ┌────────────────┐
//!                         │ Query + LLM    │──▶ answer + citations
//!                         └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdx scan                        # register documents and fingerprints
//! pdx index                       # extract, chunk, and embed what changed
//! pdx ask "what is chapter 3 about?"
//! pdx search "gradient descent"   # offline keyword search
//! pdx open thesis.pdf --page 12   # open a cited source
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`store`] | Mapping store, fingerprint registry, diagnostics log |
//! | [`metadata`] | Chunk record store with legacy shape migration |
//! | [`capability`] | Null-object capability set (PDF text, OCR, notices) |
//! | [`scan`] | Root scanner and change detection |
//! | [`extract`] | Per-page extraction, OCR fallback, chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector`] | On-disk vector index with cosine search |
//! | [`lexical`] | Inverted-index fallback retrieval |
//! | [`index`] | Full and incremental indexing pipeline |
//! | [`llm`] | Chat model abstraction for answer synthesis |
//! | [`query`] | Retrieval, context packing, citations |
//! | [`engine`] | The facade tying configuration and capabilities together |
//! | [`autoscan`] | Bounded startup check with background indexing |
//! | [`stats`] | Index statistics |

pub mod autoscan;
pub mod capability;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod index;
pub mod lexical;
pub mod llm;
pub mod metadata;
pub mod models;
pub mod query;
pub mod scan;
pub mod stats;
pub mod store;
pub mod vector;
