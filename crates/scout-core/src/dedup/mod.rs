//! Deduplication Store: exact-hash plus optional semantic-similarity gate
//! over every item ever seen/emitted, grounded on
//! `original_source/.../core/embeddings.py::EmbeddingManager` and shaped
//! after `tuitbot_core::safety::dedup::DedupChecker`.

use std::sync::OnceLock;

use sha2::{Digest, Sha256};

use crate::storage::fingerprints;
use crate::storage::DbPool;

/// Picks an embedding backend based on the host's resources, mirroring the
/// Python source's hardcoded `all-MiniLM-L6-v2` model id generalized into a
/// capability probe (spec SPEC_FULL §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackendKind {
    /// A small model, for memory-constrained hosts.
    Light,
    /// The default model, for hosts with adequate RAM.
    Standard,
}

/// Probes host resources and selects an embedding backend kind. Exposed as a
/// free function (not tied to any one struct) so it can run once at process
/// startup and the result threaded through.
pub fn select_embedding_backend(available_ram_mb: u64, has_simd: bool) -> EmbeddingBackendKind {
    const LIGHT_THRESHOLD_MB: u64 = 2048;
    if available_ram_mb < LIGHT_THRESHOLD_MB || !has_simd {
        EmbeddingBackendKind::Light
    } else {
        EmbeddingBackendKind::Standard
    }
}

/// Produces an embedding vector for a piece of text. Implemented by whatever
/// ML runtime is wired in; the engine never assumes a specific one.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// A no-op embedder used when the semantic backend is disabled, or in tests
/// that only exercise exact-hash dedup.
pub struct NullEmbedder;

impl Embedder for NullEmbedder {
    fn embed(&self, _text: &str) -> Vec<f32> {
        Vec::new()
    }
}

static LAZY_EMBEDDER: OnceLock<Box<dyn Embedder>> = OnceLock::new();

/// Returns the process-wide embedder, initializing it on first use with
/// `init` if it has not been set yet. Mirrors `EmbeddingManager._model`'s
/// lazy-load-on-first-use behavior.
fn lazy_embedder(init: impl FnOnce() -> Box<dyn Embedder>) -> &'static dyn Embedder {
    LAZY_EMBEDDER.get_or_init(init).as_ref()
}

/// SHA-256 over the UTF-8 bytes of `text`, matching
/// `embeddings.py::_compute_hash` one-for-one.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 for
/// mismatched lengths or a zero-magnitude vector rather than panicking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// The Dedup Store: `is_similar`/`add` over the `fingerprints` table.
#[derive(Clone)]
pub struct DedupStore {
    pool: DbPool,
    semantic_enabled: bool,
}

impl DedupStore {
    pub fn new(pool: DbPool, semantic_enabled: bool) -> Self {
        DedupStore {
            pool,
            semantic_enabled,
        }
    }

    /// Returns true if any previously-indexed content either has the same
    /// exact hash, or (if semantic mode is enabled) a cosine similarity
    /// above `threshold` against any stored embedding — scoped to a scout
    /// when `scout_id` is given (spec §4.C).
    pub async fn is_similar(
        &self,
        text: &str,
        threshold: f32,
        scout_id: Option<i64>,
    ) -> Result<bool, crate::error::StorageError> {
        let hash = content_hash(text);
        if fingerprints::exists_by_hash(&self.pool, &hash).await? {
            return Ok(true);
        }

        if !self.semantic_enabled {
            return Ok(false);
        }

        let embedder = lazy_embedder(|| Box::new(NullEmbedder));
        let candidate = embedder.embed(text);
        if candidate.is_empty() {
            return Ok(false);
        }

        let stored = fingerprints::load_embeddings(&self.pool, scout_id).await?;
        Ok(stored
            .iter()
            .any(|v| cosine_similarity(&candidate, v) >= threshold))
    }

    /// Inserts the (hash, vector?, provenance) triple for `text`. `add`
    /// stores a hash-only row when the semantic backend is disabled.
    pub async fn add(
        &self,
        text: &str,
        provenance: &str,
        scout_id: Option<i64>,
    ) -> Result<(), crate::error::StorageError> {
        let hash = content_hash(text);
        let embedding = if self.semantic_enabled {
            let embedder = lazy_embedder(|| Box::new(NullEmbedder));
            let vec = embedder.embed(text);
            if vec.is_empty() { None } else { Some(vec) }
        } else {
            None
        };

        fingerprints::insert(
            &self.pool,
            scout_id,
            &hash,
            embedding.as_deref(),
            provenance,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("world"));
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn select_embedding_backend_picks_light_on_low_ram() {
        assert_eq!(
            select_embedding_backend(512, true),
            EmbeddingBackendKind::Light
        );
        assert_eq!(
            select_embedding_backend(4096, false),
            EmbeddingBackendKind::Light
        );
        assert_eq!(
            select_embedding_backend(4096, true),
            EmbeddingBackendKind::Standard
        );
    }

    #[tokio::test]
    async fn is_similar_catches_exact_hash_match() {
        let pool = init_test_db().await.unwrap();
        let store = DedupStore::new(pool, false);

        assert!(!store.is_similar("hello world", 0.85, None).await.unwrap());
        store.add("hello world", "retrieved", None).await.unwrap();
        assert!(store.is_similar("hello world", 0.85, None).await.unwrap());
    }

    #[tokio::test]
    async fn is_similar_ignores_semantic_when_disabled() {
        let pool = init_test_db().await.unwrap();
        let store = DedupStore::new(pool, false);
        store.add("some text", "retrieved", None).await.unwrap();

        // Different text, semantic disabled: no match even though a real
        // embedder might consider them similar.
        assert!(!store.is_similar("different text", 0.0, None).await.unwrap());
    }
}
