use std::{
    cmp::Ordering,
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::document::Document},
    utils::embedding::EmbeddingProvider,
};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    fts::lexical_search,
    scoring::{fuse_scores, is_low_confidence, z_normalize, z_stats},
    vector::semantic_search,
};

pub const OVERFETCH_FACTOR: usize = 3;
pub const MIN_CANDIDATE_POOL: usize = 60;

/// Fusion of a segment's lexical and semantic evidence for one query; lives
/// only for the duration of the retrieval call.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalItem {
    pub segment_id: String,
    pub document_id: String,
    pub document_title: String,
    pub page_no: u32,
    pub chunk_index: u32,
    pub preview: Option<String>,
    pub snippet: Option<String>,
    pub semantic_score: f32,
    pub lexical_score: f32,
    pub score: f32,
    pub ocr_confidence: Option<f32>,
    pub low_confidence: bool,
}

/// Runs the lexical and semantic searches side by side and blends them into
/// one ranked, deduplicated candidate list.
pub struct HybridRetriever {
    db: Arc<SurrealDbClient>,
    provider: Arc<EmbeddingProvider>,
}

impl HybridRetriever {
    pub fn new(db: Arc<SurrealDbClient>, provider: Arc<EmbeddingProvider>) -> Self {
        Self { db, provider }
    }

    #[instrument(skip_all)]
    pub async fn search(
        &self,
        query: &str,
        scope: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RetrievalItem>, AppError> {
        let pool = (limit * OVERFETCH_FACTOR).max(MIN_CANDIDATE_POOL);

        let probe = self
            .provider
            .embed(query)
            .await
            .map_err(|err| AppError::EmbeddingService(err.to_string()))?;
        let model = self.provider.model_code();

        let semantic = semantic_search(&self.db, &probe, &model, scope, pool).await?;
        let lexical = lexical_search(&self.db, query, scope, pool).await?;
        debug!(
            semantic = semantic.len(),
            lexical = lexical.len(),
            "candidate sets fetched"
        );

        let semantic_sims: Vec<f32> = semantic.iter().map(|hit| 1.0 - hit.distance).collect();
        let lexical_ranks: Vec<f32> = lexical.iter().map(|hit| hit.rank).collect();
        let semantic_stats = z_stats(&semantic_sims);
        let lexical_stats = z_stats(&lexical_ranks);

        let mut combined: HashMap<String, RetrievalItem> = HashMap::new();

        for hit in semantic {
            let normalized = z_normalize(1.0 - hit.distance, &semantic_stats);
            combined.insert(
                hit.id.clone(),
                RetrievalItem {
                    segment_id: hit.id,
                    document_id: hit.document_id,
                    document_title: String::new(),
                    page_no: hit.page_no,
                    chunk_index: hit.chunk_index,
                    preview: hit.preview,
                    snippet: None,
                    semantic_score: normalized,
                    lexical_score: 0.0,
                    score: 0.0,
                    ocr_confidence: hit.ocr_confidence,
                    low_confidence: false,
                },
            );
        }

        for hit in lexical {
            let normalized = z_normalize(hit.rank, &lexical_stats);
            match combined.entry(hit.id.clone()) {
                Entry::Occupied(mut entry) => {
                    let item = entry.get_mut();
                    item.lexical_score = normalized;
                    item.snippet = hit.snippet;
                }
                Entry::Vacant(slot) => {
                    slot.insert(RetrievalItem {
                        segment_id: hit.id,
                        document_id: hit.document_id,
                        document_title: String::new(),
                        page_no: hit.page_no,
                        chunk_index: hit.chunk_index,
                        preview: None,
                        snippet: hit.snippet,
                        semantic_score: 0.0,
                        lexical_score: normalized,
                        score: 0.0,
                        ocr_confidence: hit.ocr_confidence,
                        low_confidence: false,
                    });
                }
            }
        }

        let mut items: Vec<RetrievalItem> = combined.into_values().collect();
        for item in &mut items {
            item.score = fuse_scores(item.semantic_score, item.lexical_score, item.ocr_confidence);
            item.low_confidence = is_low_confidence(item.ocr_confidence);
        }
        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.segment_id.cmp(&b.segment_id))
        });
        items.truncate(limit);

        let mut document_ids: Vec<String> =
            items.iter().map(|item| item.document_id.clone()).collect();
        document_ids.sort();
        document_ids.dedup();
        let titles = Document::titles_by_ids(&self.db, &document_ids).await?;
        for item in &mut items {
            if let Some(title) = titles.get(&item.document_id) {
                item.document_title = title.clone();
            }
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::segment::Segment;
    use common::utils::embedding::EmbeddingProvider;
    use uuid::Uuid;

    async fn test_db() -> Arc<SurrealDbClient> {
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", &database)
            .await
            .expect("failed to start in-memory surrealdb");
        db.apply_migrations().await.expect("migrations failed");
        db.ensure_vector_index(64)
            .await
            .expect("vector index failed");
        Arc::new(db)
    }

    async fn seed_corpus(
        db: &Arc<SurrealDbClient>,
        provider: &Arc<EmbeddingProvider>,
    ) -> (Segment, Segment) {
        let document = Document::new("Q1 report".into(), None, None, None, None);
        let decoy_document = Document::new("Nature notes".into(), None, None, None, None);
        let mut relevant = Segment::new(
            document.id.clone(),
            1,
            0,
            "Revenue grew 12% in Q1.".into(),
            7,
            None,
            None,
        );
        relevant.id = format!("a-{}", relevant.id);
        let mut decoy = Segment::new(
            decoy_document.id.clone(),
            1,
            0,
            "Penguins live in large colonies.".into(),
            6,
            None,
            None,
        );
        decoy.id = format!("b-{}", decoy.id);

        db.store_item(document).await.expect("doc store failed");
        db.store_item(decoy_document)
            .await
            .expect("doc store failed");
        Segment::insert_batch(db, vec![relevant.clone(), decoy.clone()])
            .await
            .expect("segment seed failed");

        ingestion_standin(db, provider).await;

        (relevant, decoy)
    }

    // embeds every segment with the same provider/model the retriever uses
    async fn ingestion_standin(db: &Arc<SurrealDbClient>, provider: &Arc<EmbeddingProvider>) {
        use common::storage::types::embedding_vector::EmbeddingVector;

        let pending = Segment::unembedded(db, &provider.model_code(), None, 100)
            .await
            .expect("scan failed");
        for segment in pending {
            let vector = provider.embed(&segment.text).await.expect("embed failed");
            EmbeddingVector::insert_batch(
                db,
                vec![EmbeddingVector::new(
                    segment.id,
                    segment.document_id,
                    provider.model_code(),
                    vector,
                )],
            )
            .await
            .expect("vector seed failed");
        }
    }

    #[tokio::test]
    async fn test_relevant_segment_ranks_first_with_both_signals() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));
        let (relevant, _) = seed_corpus(&db, &provider).await;

        let retriever = HybridRetriever::new(Arc::clone(&db), provider);
        let items = retriever
            .search("Q1 revenue growth", None, 5)
            .await
            .expect("search failed");

        assert!(!items.is_empty());
        assert_eq!(items[0].segment_id, relevant.id);
        assert_eq!(items[0].document_title, "Q1 report");
        assert!(items[0].score > 0.0, "fused score should be positive");
        assert!(
            items[0].semantic_score > 0.0 || items[0].lexical_score > 0.0,
            "at least one side should contribute"
        );
        assert!(!items[0].low_confidence);
    }

    #[tokio::test]
    async fn test_limit_truncates_the_ranked_list() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));
        seed_corpus(&db, &provider).await;

        let retriever = HybridRetriever::new(Arc::clone(&db), provider);
        let items = retriever
            .search("colonies of penguins", None, 1)
            .await
            .expect("search failed");

        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_no_items() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));
        let retriever = HybridRetriever::new(Arc::clone(&db), provider);

        let items = retriever
            .search("anything at all", None, 5)
            .await
            .expect("search failed");
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_low_confidence_segments_are_flagged_and_down_weighted() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));

        let document = Document::new("Scan".into(), None, None, None, None);
        let mut noisy = Segment::new(
            document.id.clone(),
            1,
            0,
            "blurred scan of turbine maintenance".into(),
            5,
            Some(40.0),
            None,
        );
        noisy.id = format!("n-{}", noisy.id);
        db.store_item(document).await.expect("doc store failed");
        Segment::insert_batch(&db, vec![noisy.clone()])
            .await
            .expect("segment seed failed");
        ingestion_standin(&db, &provider).await;

        let retriever = HybridRetriever::new(Arc::clone(&db), provider);
        let items = retriever
            .search("turbine maintenance", None, 5)
            .await
            .expect("search failed");

        assert_eq!(items.len(), 1);
        assert!(items[0].low_confidence);
        let unweighted = crate::scoring::SEMANTIC_WEIGHT * items[0].semantic_score
            + crate::scoring::LEXICAL_WEIGHT * items[0].lexical_score;
        assert!(items[0].score < unweighted || unweighted <= 0.0);
    }
}
