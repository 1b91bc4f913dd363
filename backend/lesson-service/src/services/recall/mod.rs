use crate::models::{RecallSource, RetrievalStats, ScoredHit};
use crate::services::backends::{BackendError, DenseBackend, EmbeddingService, LexicalBackend};
use crate::services::indexing::LexicalQuery;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Query dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub lexical_hits: Vec<ScoredHit>,
    pub dense_hits: Vec<ScoredHit>,
    /// None when the query could not be embedded
    pub query_vec: Option<Vec<f32>>,
    pub stats: RetrievalStats,
}

/// Recall 層：lexical + dense 雙路召回
///
/// Both paths run concurrently under their own timeout. A failed or slow
/// source contributes an empty list instead of failing the request.
pub struct HybridRetriever {
    embedder: Arc<dyn EmbeddingService>,
    lexical: Arc<dyn LexicalBackend>,
    dense: Arc<dyn DenseBackend>,
    timeout: Duration,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        lexical: Arc<dyn LexicalBackend>,
        dense: Arc<dyn DenseBackend>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            lexical,
            dense,
            timeout,
        }
    }

    pub async fn retrieve(
        &self,
        query_text: &str,
        top_k: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        let lexical_query = LexicalQuery::from_text(query_text);

        let lexical_path = async {
            if lexical_query.is_empty() {
                return Ok(Vec::new());
            }
            self.bounded(self.lexical.search(&lexical_query, top_k)).await
        };

        let dense_path = async {
            let query_vec = self.bounded(self.embedder.encode(query_text)).await?;
            if query_vec.len() != self.embedder.dimension() {
                return Err(BackendError::DimensionMismatch {
                    expected: self.embedder.dimension(),
                    actual: query_vec.len(),
                });
            }
            let hits = self.bounded(self.dense.search(&query_vec, top_k)).await;
            Ok::<_, BackendError>((query_vec, hits))
        };

        let (lexical_result, dense_result) = tokio::join!(lexical_path, dense_path);

        let mut stats = RetrievalStats::default();

        let lexical_hits = match lexical_result {
            Ok(hits) => hits,
            Err(e) => degrade(RecallSource::Lexical, e, &mut stats)?,
        };

        let (query_vec, dense_hits) = match dense_result {
            Ok((query_vec, Ok(hits))) => (Some(query_vec), hits),
            // Query embedded fine but the dense backend failed: keep the vector for features
            Ok((query_vec, Err(e))) => (Some(query_vec), degrade(RecallSource::Dense, e, &mut stats)?),
            Err(e) => (None, degrade(RecallSource::Dense, e, &mut stats)?),
        };

        stats.lexical_hits = lexical_hits.len();
        stats.dense_hits = dense_hits.len();

        debug!(
            lexical_hits = stats.lexical_hits,
            dense_hits = stats.dense_hits,
            degraded = stats.degraded_sources.len(),
            "Hybrid retrieval completed"
        );

        Ok(RetrievalResult {
            lexical_hits,
            dense_hits,
            query_vec,
            stats,
        })
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.timeout)),
        }
    }
}

/// Degradable failures become an empty hit list; invariant violations propagate
fn degrade(
    source: RecallSource,
    error: BackendError,
    stats: &mut RetrievalStats,
) -> Result<Vec<ScoredHit>, RetrievalError> {
    if let BackendError::DimensionMismatch { expected, actual } = error {
        return Err(RetrievalError::DimensionMismatch { expected, actual });
    }

    if matches!(error, BackendError::EmptyInput(_)) {
        debug!(source = source.as_str(), "Query has no embeddable terms");
    } else {
        warn!(
            source = source.as_str(),
            error = %error,
            "Recall source degraded, continuing without it"
        );
    }
    stats.degraded_sources.push(source);
    Ok(Vec::new())
}
