// ============================================
// Dual Indexer
// ============================================
//
// Chunks lessons and publishes every chunk with:
//   - a BM25 term-weight vector over one corpus statistics snapshot
//   - a dense embedding (optional: failures leave the chunk dense-incomplete)
//
// Index operations are serialized by `write_lock`; serving reads run
// concurrently and see each chunk either before or after replacement.

pub mod chunker;
pub mod lexical;

pub use chunker::{chunk_id, ChunkDraft, ChunkerConfig, LessonChunker};
pub use lexical::{tokenize, tokenize_unique, CorpusStats, LexicalQuery};

use crate::models::{Chunk, IndexReport, Lesson};
use crate::services::backends::{BackendError, ChunkStore, EmbeddingService};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Max in-flight embedding calls during a rebuild
const EMBED_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Invalid lesson: {0}")]
    InvalidLesson(String),

    #[error("Duplicate lesson id in batch: {0}")]
    DuplicateLesson(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

pub struct DualIndexer {
    chunker: LessonChunker,
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn ChunkStore>,
    embed_timeout: Duration,
    /// Lessons currently in the index
    lessons: DashMap<String, Lesson>,
    stats: RwLock<Arc<CorpusStats>>,
    write_lock: Mutex<()>,
}

impl DualIndexer {
    pub fn new(
        chunker: LessonChunker,
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn ChunkStore>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            embed_timeout,
            lessons: DashMap::new(),
            stats: RwLock::new(Arc::new(CorpusStats::default())),
            write_lock: Mutex::new(()),
        }
    }

    pub fn lesson(&self, lesson_id: &str) -> Option<Lesson> {
        self.lessons.get(lesson_id).map(|entry| entry.value().clone())
    }

    pub fn lesson_count(&self) -> usize {
        self.lessons.len()
    }

    /// Statistics snapshot the current lexical vectors were computed against
    pub fn corpus_stats(&self) -> Arc<CorpusStats> {
        self.stats.read().clone()
    }

    /// Index (or re-index) a batch of lessons
    ///
    /// The whole batch is validated before anything is mutated. Lessons
    /// already in the index and absent from the batch are kept.
    pub async fn index_lessons(&self, lessons: Vec<Lesson>) -> Result<IndexReport> {
        validate_batch(&lessons)?;

        let _guard = self.write_lock.lock().await;

        let mut batch: HashSet<String> = HashSet::new();
        let mut changed: HashSet<String> = HashSet::new();
        for lesson in lessons {
            batch.insert(lesson.id.clone());
            let unchanged = self
                .lessons
                .get(&lesson.id)
                .is_some_and(|existing| *existing.value() == lesson);
            if !unchanged {
                changed.insert(lesson.id.clone());
            }
            self.lessons.insert(lesson.id.clone(), lesson);
        }

        let mut report = self.rebuild(&changed).await;
        report.lessons = batch.len();
        let batch_chunks: Vec<Arc<Chunk>> = batch
            .iter()
            .flat_map(|lesson_id| self.store.chunks_for_lesson(lesson_id))
            .collect();
        report.chunks = batch_chunks.len();
        report.dense_incomplete = batch_chunks
            .iter()
            .filter(|chunk| !chunk.is_dense_complete())
            .count();

        info!(
            lessons = report.lessons,
            chunks = report.chunks,
            dense_incomplete = report.dense_incomplete,
            removed = report.removed,
            "Indexed lessons"
        );

        Ok(report)
    }

    /// Remove a lesson and its chunks. Returns the number of chunks removed.
    pub async fn remove_lesson(&self, lesson_id: &str) -> usize {
        let _guard = self.write_lock.lock().await;

        if self.lessons.remove(lesson_id).is_none() {
            debug!(lesson_id = lesson_id, "Lesson not indexed, nothing to remove");
            return 0;
        }

        let report = self.rebuild(&HashSet::new()).await;
        info!(
            lesson_id = lesson_id,
            removed = report.removed,
            "Removed lesson from index"
        );
        report.removed
    }

    /// Retry embeddings for dense-incomplete chunks. Returns how many were filled.
    pub async fn backfill_embeddings(&self) -> usize {
        let _guard = self.write_lock.lock().await;

        let pending: Vec<Arc<Chunk>> = self
            .store
            .all()
            .into_iter()
            .filter(|chunk| !chunk.is_dense_complete())
            .collect();

        let mut filled = 0;
        for chunk in pending {
            let Some(lesson) = self.lesson(&chunk.lesson_id) else {
                continue;
            };
            let draft = self
                .chunker
                .split(&lesson)
                .into_iter()
                .find(|draft| draft.id == chunk.id);
            let Some(draft) = draft else {
                continue;
            };

            if let Some(dense) = self.embed(&draft).await {
                let mut updated = (*chunk).clone();
                updated.dense_vec = Some(dense);
                self.store.upsert(Arc::new(updated));
                filled += 1;
            }
        }

        info!(filled = filled, "Embedding backfill completed");
        filled
    }

    /// Re-chunk every indexed lesson against a fresh statistics snapshot
    ///
    /// Dense vectors are reused for lessons not in `changed` when the chunk
    /// text is identical; only changed lessons and dense-incomplete chunks hit
    /// the embedder.
    async fn rebuild(&self, changed: &HashSet<String>) -> IndexReport {
        let mut lessons: Vec<Lesson> = self
            .lessons
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        lessons.sort_by(|a, b| a.id.cmp(&b.id));

        let drafts: Vec<ChunkDraft> = lessons
            .iter()
            .flat_map(|lesson| self.chunker.split(lesson))
            .collect();
        let tokens: Vec<Vec<String>> = drafts
            .iter()
            .map(|draft| tokenize(&draft.indexable_text))
            .collect();
        let stats = CorpusStats::from_documents(tokens.iter().map(|t| t.as_slice()));

        let wanted: HashSet<String> = drafts.iter().map(|draft| draft.id.clone()).collect();

        let embed_futures: Vec<_> = drafts
            .iter()
            .map(|draft| async move {
                match self.reusable_dense(draft, changed) {
                    Some(dense) => Some(dense),
                    None => self.embed(draft).await,
                }
            })
            .collect();
        let dense_vecs: Vec<Option<Vec<f32>>> = stream::iter(embed_futures)
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        for ((draft, tokens), dense_vec) in drafts.into_iter().zip(&tokens).zip(dense_vecs) {
            let chunk = Chunk {
                bm25_vec: stats.bm25_weights(tokens),
                id: draft.id,
                lesson_id: draft.lesson_id,
                text: draft.text,
                dense_vec,
                tone_tag: draft.tone_tag,
            };

            let unchanged = self
                .store
                .get(&chunk.id)
                .is_some_and(|existing| *existing == chunk);
            if !unchanged {
                self.store.upsert(Arc::new(chunk));
            }
        }

        // Stale ordinals go only once their replacements are published
        let mut removed = 0;
        for chunk in self.store.all() {
            if !wanted.contains(&chunk.id) {
                self.store.remove(&chunk.id);
                removed += 1;
            }
        }

        *self.stats.write() = Arc::new(stats);

        IndexReport {
            removed,
            ..IndexReport::default()
        }
    }

    fn reusable_dense(&self, draft: &ChunkDraft, changed: &HashSet<String>) -> Option<Vec<f32>> {
        if changed.contains(&draft.lesson_id) {
            return None;
        }
        let existing = self.store.get(&draft.id)?;
        if existing.text != draft.text {
            return None;
        }
        existing
            .dense_vec
            .clone()
            .filter(|dense| dense.len() == self.embedder.dimension())
    }

    /// Embed one chunk; any failure leaves it dense-incomplete
    async fn embed(&self, draft: &ChunkDraft) -> Option<Vec<f32>> {
        let result =
            match tokio::time::timeout(self.embed_timeout, self.embedder.encode(&draft.indexable_text))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(self.embed_timeout)),
            };

        match result {
            Ok(dense) if dense.len() == self.embedder.dimension() => Some(dense),
            Ok(dense) => {
                warn!(
                    chunk_id = %draft.id,
                    expected = self.embedder.dimension(),
                    actual = dense.len(),
                    "Embedding dimension mismatch, chunk left dense-incomplete"
                );
                None
            }
            Err(e) => {
                warn!(
                    chunk_id = %draft.id,
                    embedder = self.embedder.name(),
                    error = %e,
                    "Embedding failed, chunk registered lexically only"
                );
                None
            }
        }
    }
}

fn validate_batch(lessons: &[Lesson]) -> Result<()> {
    let mut seen = HashSet::new();
    for lesson in lessons {
        if lesson.id.trim().is_empty() {
            return Err(IndexError::InvalidLesson("lesson id is empty".to_string()));
        }
        if lesson.title.trim().is_empty() && lesson.content.trim().is_empty() {
            return Err(IndexError::InvalidLesson(format!(
                "lesson {} has neither title nor content",
                lesson.id
            )));
        }
        if !seen.insert(lesson.id.as_str()) {
            return Err(IndexError::DuplicateLesson(lesson.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backends::{HashingEmbedder, InMemoryIndex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Embedder that can be switched off and counts its calls
    struct FlakyEmbedder {
        inner: HashingEmbedder,
        down: AtomicBool,
        calls: AtomicUsize,
    }

    impl FlakyEmbedder {
        fn new(down: bool) -> Self {
            Self {
                inner: HashingEmbedder::new(16),
                down: AtomicBool::new(down),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingService for FlakyEmbedder {
        async fn encode(&self, text: &str) -> crate::services::backends::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(BackendError::Unavailable("embedder offline".to_string()));
            }
            self.inner.embed(text)
        }

        fn dimension(&self) -> usize {
            16
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn lesson(id: &str, content: &str) -> Lesson {
        Lesson {
            id: id.to_string(),
            title: format!("Title {}", id),
            content: content.to_string(),
            tone_tag: "calming".to_string(),
        }
    }

    fn indexer(embedder: Arc<dyn EmbeddingService>) -> (DualIndexer, Arc<InMemoryIndex>) {
        let store = Arc::new(InMemoryIndex::new());
        let indexer = DualIndexer::new(
            LessonChunker::new(ChunkerConfig { max_chunk_chars: 40 }),
            embedder,
            store.clone(),
            Duration::from_millis(200),
        );
        (indexer, store)
    }

    #[tokio::test]
    async fn test_index_registers_both_vectors() {
        let (indexer, store) = indexer(Arc::new(HashingEmbedder::new(16)));

        let report = indexer
            .index_lessons(vec![lesson("l1", "Breathe slowly. Count to four.")])
            .await
            .unwrap();

        assert_eq!(report.lessons, 1);
        assert_eq!(report.dense_incomplete, 0);

        let chunk = store.get("l1-0").unwrap();
        assert_eq!(chunk.lesson_id, "l1");
        assert!(chunk.bm25_vec.contains_key("breathe"));
        assert_eq!(chunk.dense_vec.as_ref().map(|v| v.len()), Some(16));
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let embedder = Arc::new(FlakyEmbedder::new(false));
        let (indexer, store) = indexer(embedder.clone());
        let batch = vec![
            lesson("l1", "Breathe slowly. Count to four. Hold the breath gently."),
            lesson("l2", "Gratitude journaling every evening."),
        ];

        indexer.index_lessons(batch.clone()).await.unwrap();
        let first = store.all();
        let calls_after_first = embedder.calls.load(Ordering::SeqCst);

        indexer.index_lessons(batch).await.unwrap();
        let second = store.all();

        assert_eq!(first, second);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_embedding_outage_degrades_to_lexical() {
        let embedder = Arc::new(FlakyEmbedder::new(true));
        let (indexer, store) = indexer(embedder.clone());

        let report = indexer
            .index_lessons(vec![lesson("l1", "Breathe slowly.")])
            .await
            .unwrap();

        assert_eq!(report.dense_incomplete, 1);
        let chunk = store.get("l1-0").unwrap();
        assert!(!chunk.is_dense_complete());
        assert!(!chunk.bm25_vec.is_empty());

        embedder.down.store(false, Ordering::SeqCst);
        assert_eq!(indexer.backfill_embeddings().await, 1);
        assert!(store.get("l1-0").unwrap().is_dense_complete());
    }

    #[tokio::test]
    async fn test_shrinking_lesson_drops_stale_chunks() {
        let (indexer, store) = indexer(Arc::new(HashingEmbedder::new(16)));

        indexer
            .index_lessons(vec![lesson(
                "l1",
                "First sentence here. Second sentence here. Third sentence here.",
            )])
            .await
            .unwrap();
        assert!(store.chunks_for_lesson("l1").len() > 1);

        let report = indexer
            .index_lessons(vec![lesson("l1", "Short now.")])
            .await
            .unwrap();

        assert_eq!(store.chunks_for_lesson("l1").len(), 1);
        assert!(report.removed >= 1);
        assert_eq!(store.get("l1-0").unwrap().text, "Short now.");
    }

    #[tokio::test]
    async fn test_remove_lesson() {
        let (indexer, store) = indexer(Arc::new(HashingEmbedder::new(16)));
        indexer
            .index_lessons(vec![lesson("l1", "Calm."), lesson("l2", "Joy.")])
            .await
            .unwrap();

        assert_eq!(indexer.remove_lesson("l1").await, 1);
        assert_eq!(indexer.remove_lesson("missing").await, 0);
        assert!(store.get("l1-0").is_none());
        assert!(indexer.lesson("l1").is_none());
        assert_eq!(indexer.corpus_stats().total_docs, 1);
    }

    #[tokio::test]
    async fn test_invalid_batch_is_rejected_before_mutation() {
        let (indexer, store) = indexer(Arc::new(HashingEmbedder::new(16)));

        let duplicate = indexer
            .index_lessons(vec![lesson("l1", "a b"), lesson("l1", "c d")])
            .await;
        assert!(matches!(duplicate, Err(IndexError::DuplicateLesson(_))));

        let blank = indexer.index_lessons(vec![lesson(" ", "text")]).await;
        assert!(matches!(blank, Err(IndexError::InvalidLesson(_))));

        assert!(store.is_empty());
        assert_eq!(indexer.lesson_count(), 0);
    }

    /// Embeds correctly, but only after a fixed delay
    struct SlowEmbedder {
        inner: HashingEmbedder,
        delay: Duration,
    }

    #[async_trait]
    impl EmbeddingService for SlowEmbedder {
        async fn encode(&self, text: &str) -> crate::services::backends::Result<Vec<f32>> {
            tokio::time::sleep(self.delay).await;
            self.inner.embed(text)
        }

        fn dimension(&self) -> usize {
            16
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_stale_chunks_stay_until_replacements_publish() {
        let (indexer, store) = indexer(Arc::new(SlowEmbedder {
            inner: HashingEmbedder::new(16),
            delay: Duration::from_millis(80),
        }));
        indexer
            .index_lessons(vec![lesson(
                "l1",
                "First sentence here. Second sentence here. Third sentence here.",
            )])
            .await
            .unwrap();
        let before = store.chunks_for_lesson("l1").len();
        assert!(before > 1);

        let (report, during) = tokio::join!(
            indexer.index_lessons(vec![lesson("l1", "Short now.")]),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                (store.chunks_for_lesson("l1").len(), store.get("l1-0").map(|c| c.text.clone()))
            }
        );

        assert_eq!(during.0, before);
        assert_ne!(during.1.as_deref(), Some("Short now."));
        assert_eq!(report.unwrap().removed, before - 1);
        assert_eq!(store.chunks_for_lesson("l1").len(), 1);
    }
}

