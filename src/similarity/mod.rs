//! Similar-prompt recommendation engine.
//!
//! Selects prompts related to a target prompt using the richest backend
//! currently available, degrading silently:
//!
//! 1. external vector index process (line-oriented JSON over stdout)
//! 2. in-process embeddings with cosine similarity
//! 3. keyword and category matching against the prompt store
//!
//! # Architecture
//!
//! - `embeddings`: fastembed wrapper behind the `Embedder` trait
//! - `index`: in-memory embedding index keyed by prompt id
//! - `external`: process adapter behind the `VectorIndexPort` trait
//! - `textmatch`: tokenizing and ranking for the keyword fallback
//! - `engine`: mode selection, index lifecycle, and the search chain

pub mod embeddings;
pub mod engine;
pub mod external;
pub mod index;
mod textmatch;

pub use embeddings::{Embedder, EmbeddingModel};
pub use engine::{EngineMode, SimilarPrompt, SimilarityEngine};
pub use external::{ExternalHit, ProcessVectorIndex, VectorIndexPort};
pub use index::EmbeddingIndex;

/// Default number of similar prompts returned when the caller does not ask
/// for a specific limit
pub const DEFAULT_SIMILAR_LIMIT: usize = 5;
