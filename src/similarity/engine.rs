//! Similarity engine: backend selection, index lifecycle, search chain.
//!
//! One engine instance is created at process startup and handed to whatever
//! needs it. Mode is picked once at initialization; a failed *query* against
//! the external index never downgrades the stored mode, so a transiently
//! missing process is retried on the next call.

use crate::config::{RuntimeMode, SimilarityConfig};
use crate::fallback::{run_chain, Strategy};
use crate::prompts::{Prompt, PromptStore};
use crate::similarity::embeddings::{Embedder, EmbeddingModel};
use crate::similarity::external::VectorIndexPort;
use crate::similarity::index::EmbeddingIndex;
use crate::similarity::textmatch;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Embeddings are computed in small batches so progress is visible in the
/// logs; items within a batch are processed sequentially.
const EMBED_BATCH_SIZE: usize = 10;

/// Range for the synthetic scores attached by the keyword fallback. These
/// are placeholders so every result carries a score field; they are not
/// comparable to real cosine scores.
const FALLBACK_SCORE_MIN: f32 = 0.3;
const FALLBACK_SCORE_MAX: f32 = 0.8;

/// Which backend the engine settled on at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Uninitialized,
    /// External vector index process answered the build probe
    External,
    /// In-process embedding model loaded
    Embedding,
    /// Keyword and category matching only
    TextOnly,
}

/// A similar prompt with its score and engagement counts.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarPrompt {
    #[serde(flatten)]
    pub prompt: Prompt,
    pub similarity: f32,
    pub comments_count: usize,
    pub likes_count: usize,
}

pub struct SimilarityEngine {
    store: Arc<dyn PromptStore>,
    external: Option<Arc<dyn VectorIndexPort>>,
    config: SimilarityConfig,
    cache_dir: PathBuf,

    mode: RwLock<EngineMode>,
    embedder: RwLock<Option<Arc<dyn Embedder>>>,
    index: RwLock<EmbeddingIndex>,
}

impl SimilarityEngine {
    /// Create an engine over the given store and backends.
    ///
    /// `embedder` injects a pre-loaded embedding backend; pass `None` to
    /// have the configured fastembed model loaded lazily at initialization.
    pub fn new(
        store: Arc<dyn PromptStore>,
        external: Option<Arc<dyn VectorIndexPort>>,
        embedder: Option<Arc<dyn Embedder>>,
        config: SimilarityConfig,
        cache_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            external,
            config,
            cache_dir,
            mode: RwLock::new(EngineMode::Uninitialized),
            embedder: RwLock::new(embedder),
            index: RwLock::new(EmbeddingIndex::new()),
        }
    }

    pub async fn mode(&self) -> EngineMode {
        *self.mode.read().await
    }

    /// Number of prompts in the in-memory index.
    pub async fn indexed_count(&self) -> usize {
        self.index.read().await.len()
    }

    /// Ids currently indexed, in insertion order.
    pub async fn indexed_ids(&self) -> Vec<String> {
        self.index.read().await.ids().to_vec()
    }

    /// Pick the richest backend currently available.
    ///
    /// Safe to call repeatedly; once out of `Uninitialized` this is a no-op.
    /// Never fails: the worst outcome is keyword-only matching.
    pub async fn initialize(&self) {
        if *self.mode.read().await != EngineMode::Uninitialized {
            return;
        }

        log::info!("initializing similarity engine ({:?})", self.config.mode);

        match self.config.mode {
            RuntimeMode::Unconstrained => {
                if let Some(port) = &self.external {
                    match port.build().await {
                        Ok(()) => {
                            log::info!("external vector index available");
                            *self.mode.write().await = EngineMode::External;
                            return;
                        }
                        Err(err) => {
                            log::warn!("external vector index unavailable: {err}");
                        }
                    }
                }
            }
            RuntimeMode::Constrained => {
                log::info!("constrained runtime, skipping external vector index");
            }
        }

        let attempt_embeddings = self.config.mode == RuntimeMode::Unconstrained
            || self.config.embeddings_when_constrained;

        if attempt_embeddings && self.load_embedder().await {
            *self.mode.write().await = EngineMode::Embedding;
            return;
        }

        log::info!("similarity engine running on keyword matching only");
        *self.mode.write().await = EngineMode::TextOnly;
    }

    async fn ensure_initialized(&self) {
        if *self.mode.read().await == EngineMode::Uninitialized {
            self.initialize().await;
        }
    }

    async fn load_embedder(&self) -> bool {
        if self.embedder.read().await.is_some() {
            return true;
        }

        let model_name = self.config.model.clone();
        let cache_dir = self.cache_dir.clone();
        let timeout = Duration::from_secs(self.config.download_timeout_secs);

        let loaded = tokio::task::spawn_blocking(move || {
            EmbeddingModel::new(&model_name, cache_dir, Some(timeout))
        })
        .await;

        match loaded {
            Ok(Ok(model)) => {
                log::info!(
                    "embedding model '{}' loaded ({} dimensions)",
                    model.name(),
                    model.dimensions()
                );
                *self.embedder.write().await = Some(Arc::new(model));
                true
            }
            Ok(Err(err)) => {
                log::warn!("couldnt load embedding model: {err}");
                false
            }
            Err(err) => {
                log::warn!("embedding model loader panicked: {err}");
                false
            }
        }
    }

    /// Rebuild whatever index the current mode uses.
    ///
    /// In external mode the build is delegated to the process; in embedding
    /// mode the in-memory index is discarded and repopulated from the store.
    /// Keyword-only mode needs no precomputed state.
    ///
    /// A search running concurrently with a rebuild may observe the old or
    /// the partially repopulated index; rebuilds are not serialized against
    /// reads.
    pub async fn build_index(&self) -> anyhow::Result<()> {
        self.ensure_initialized().await;

        match *self.mode.read().await {
            EngineMode::External => {
                if let Some(port) = self.external.clone() {
                    log::info!("delegating index build to the external vector index");
                    if let Err(err) = port.build().await {
                        log::warn!("external index build failed: {err}");
                    }
                }
                Ok(())
            }
            EngineMode::Embedding => self.build_embedding_index().await,
            EngineMode::TextOnly | EngineMode::Uninitialized => {
                log::debug!("no index to build in keyword-only mode");
                Ok(())
            }
        }
    }

    async fn build_embedding_index(&self) -> anyhow::Result<()> {
        let Some(embedder) = self.embedder.read().await.clone() else {
            return Ok(());
        };

        let prompts = self.store.find_eligible()?;

        self.index.write().await.clear();

        if prompts.is_empty() {
            log::info!("no prompts found for indexing");
            return Ok(());
        }

        log::info!("building similarity index over {} prompts", prompts.len());

        let total = prompts.len();
        let mut processed = 0usize;

        for batch in prompts.chunks(EMBED_BATCH_SIZE) {
            let inputs: Vec<(String, String)> = batch
                .iter()
                .filter_map(|prompt| {
                    let text = prompt.content.trim();
                    if text.is_empty() {
                        log::debug!("skipping prompt {} without content", prompt.id);
                        return None;
                    }
                    Some((prompt.id.to_string(), text.to_string()))
                })
                .collect();

            let batch_embedder = embedder.clone();
            let embedded = tokio::task::spawn_blocking(move || {
                inputs
                    .into_iter()
                    .map(|(id, text)| {
                        let result = batch_embedder.embed(&text);
                        (id, result)
                    })
                    .collect::<Vec<_>>()
            })
            .await?;

            {
                let mut index = self.index.write().await;
                for (id, result) in embedded {
                    match result {
                        Ok(embedding) => index.insert(id, embedding),
                        Err(err) => log::error!("couldnt embed prompt {id}: {err}"),
                    }
                }
            }

            processed += batch.len();
            log::info!("indexed {processed}/{total} prompts");
        }

        log::info!(
            "similarity index built with {} prompts",
            self.index.read().await.len()
        );

        Ok(())
    }

    /// Find prompts similar to `target`, best match first, at most `limit`.
    ///
    /// Backends are tried richest first and any backend failure or empty
    /// result falls through to the next one; the keyword fallback is the
    /// floor. Only a store failure surfaces as an error.
    pub async fn find_similar(
        &self,
        target: &Prompt,
        limit: usize,
    ) -> anyhow::Result<Vec<SimilarPrompt>> {
        if limit == 0 {
            return Ok(vec![]);
        }

        if target.content.trim().is_empty() {
            log::debug!("prompt {} has no content to match on", target.id);
            return Ok(vec![]);
        }

        self.ensure_initialized().await;

        let mode = *self.mode.read().await;
        let has_embedder = self.embedder.read().await.is_some();

        let mut strategies: Vec<Strategy<'_, Vec<SimilarPrompt>>> = Vec::new();

        if mode == EngineMode::External {
            if let Some(port) = self.external.clone() {
                strategies.push(Strategy::new("external-index", async move {
                    self.query_external(port, target, limit).await
                }));
            }
        }

        if has_embedder {
            strategies.push(Strategy::new("embedding-index", async move {
                self.query_embeddings(target, limit).await
            }));
        }

        if let Some(results) = run_chain(strategies).await {
            return Ok(results);
        }

        self.query_text(target, limit).await
    }

    async fn query_external(
        &self,
        port: Arc<dyn VectorIndexPort>,
        target: &Prompt,
        limit: usize,
    ) -> anyhow::Result<Option<Vec<SimilarPrompt>>> {
        let hits = port.query(&target.content, limit).await?;

        let mut scores: HashMap<String, f32> = HashMap::new();
        let mut ids: Vec<String> = vec![];
        for hit in hits {
            if hit.id == target.id.as_str() {
                continue;
            }
            if scores
                .insert(hit.id.clone(), hit.similarity.unwrap_or(0.0))
                .is_none()
            {
                ids.push(hit.id);
            }
        }

        if ids.is_empty() {
            return Ok(None);
        }

        let prompts = self.store.find_by_ids(&ids)?;

        let mut results = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let similarity = scores.get(prompt.id.as_str()).copied().unwrap_or(0.0);
            results.push(self.enrich(prompt, similarity)?);
        }

        if results.is_empty() {
            return Ok(None);
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(Some(results))
    }

    async fn query_embeddings(
        &self,
        target: &Prompt,
        limit: usize,
    ) -> anyhow::Result<Option<Vec<SimilarPrompt>>> {
        let Some(embedder) = self.embedder.read().await.clone() else {
            return Ok(None);
        };

        if self.index.read().await.is_empty() {
            return Ok(None);
        }

        let text = target.content.trim().to_string();
        let query = tokio::task::spawn_blocking(move || embedder.embed(&text)).await??;

        let scored = self
            .index
            .read()
            .await
            .search(&query, target.id.as_str(), limit);

        if scored.is_empty() {
            return Ok(None);
        }

        let ids: Vec<String> = scored.iter().map(|s| s.id.clone()).collect();
        let scores: HashMap<&str, f32> = scored.iter().map(|s| (s.id.as_str(), s.score)).collect();

        let prompts = self.store.find_by_ids(&ids)?;
        if prompts.is_empty() {
            return Ok(None);
        }

        let mut results = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let similarity = scores.get(prompt.id.as_str()).copied().unwrap_or(0.0);
            results.push(self.enrich(prompt, similarity)?);
        }

        // the batched re-fetch does not preserve ranking
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(Some(results))
    }

    async fn query_text(
        &self,
        target: &Prompt,
        limit: usize,
    ) -> anyhow::Result<Vec<SimilarPrompt>> {
        log::debug!("using keyword similarity for prompt {}", target.id);

        let tokens = textmatch::content_tokens(&target.content);
        let Some(pattern) = textmatch::token_pattern(&tokens) else {
            log::debug!("no usable keywords in prompt {}", target.id);
            return Ok(vec![]);
        };

        let candidates: Vec<Prompt> = self
            .store
            .find_eligible()?
            .into_iter()
            .filter(|p| p.id != target.id)
            .filter(|p| pattern.is_match(&p.content) || p.category == target.category)
            .take(limit * 2) // headroom for ranking
            .collect();

        let mut rng = rand::rng();
        let mut results = Vec::with_capacity(candidates.len());
        for prompt in candidates {
            let similarity = rng.random_range(FALLBACK_SCORE_MIN..FALLBACK_SCORE_MAX);
            results.push(self.enrich(prompt, similarity)?);
        }

        textmatch::rank_candidates(&mut results, target.category);
        results.truncate(limit);

        Ok(results)
    }

    fn enrich(&self, prompt: Prompt, similarity: f32) -> anyhow::Result<SimilarPrompt> {
        let comments_count = self.store.count_comments(prompt.id.as_str())?;
        let likes_count = prompt.likes.len();
        Ok(SimilarPrompt {
            prompt,
            similarity,
            comments_count,
            likes_count,
        })
    }
}
