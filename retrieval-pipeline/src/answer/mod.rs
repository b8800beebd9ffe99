pub mod llm;
pub mod packing;
pub mod prompt;

use std::{collections::HashMap, sync::Arc, time::Instant};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::segment::Segment},
    utils::{embedding::EmbeddingProvider, retry::RetryPolicy},
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::hybrid::HybridRetriever;
use self::llm::{ChatModel, ChatOutcome, GenerationOptions};
use self::packing::pack_context;
use self::prompt::{
    build_user_message, extract_citation_indices, STRICT_CITATION_REMINDER, SYSTEM_PROMPT,
};

/// Fixed reply used whenever retrieval produces nothing to ground on.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str =
    "Insufficient context; try different keywords or remove filters.";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Citation {
    pub marker: String,
    pub document_id: String,
    pub page_no: u32,
    pub title: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AnswerTimings {
    pub retrieve_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub used_segments: Vec<String>,
    pub timings: AnswerTimings,
}

#[derive(Debug, Clone)]
pub struct AnswerOptions {
    pub k: usize,
    pub max_context_tokens: usize,
    pub scope: Option<String>,
    pub generation: GenerationOptions,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            k: 16,
            max_context_tokens: 3000,
            scope: None,
            generation: GenerationOptions::default(),
        }
    }
}

/// Grounded answer orchestration:
/// RETRIEVE → PACK → PROMPT → GENERATE → (CITATION-CHECK → one REGENERATE) → RESPOND.
pub struct AnswerSynthesizer {
    db: Arc<SurrealDbClient>,
    retriever: HybridRetriever,
    chat: Arc<dyn ChatModel>,
    retry: RetryPolicy,
}

impl AnswerSynthesizer {
    pub fn new(
        db: Arc<SurrealDbClient>,
        provider: Arc<EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            retriever: HybridRetriever::new(Arc::clone(&db), provider),
            db,
            chat,
            retry: RetryPolicy::default(),
        }
    }

    #[instrument(skip_all)]
    pub async fn answer(
        &self,
        query: &str,
        options: &AnswerOptions,
    ) -> Result<AnswerResponse, AppError> {
        let started = Instant::now();
        let scope = options.scope.as_deref();

        let ranked = self.retriever.search(query, scope, options.k).await?;
        let retrieve_ms = started.elapsed().as_millis() as u64;

        if ranked.is_empty() {
            info!("retrieval returned no candidates");
            return Ok(Self::insufficient_context(retrieve_ms, started));
        }

        let ids: Vec<String> = ranked.iter().map(|item| item.segment_id.clone()).collect();
        let segments = Segment::fetch_by_ids(&self.db, &ids).await?;
        let by_id: HashMap<String, Segment> = segments
            .into_iter()
            .map(|segment| (segment.id.clone(), segment))
            .collect();
        let blocks = pack_context(&ranked, &by_id, options.max_context_tokens);
        if blocks.is_empty() {
            info!("no context block survived packing");
            return Ok(Self::insufficient_context(retrieve_ms, started));
        }

        let user_message = build_user_message(&blocks, query, scope);

        let generation_started = Instant::now();
        let first = self
            .generate(&user_message, &options.generation, self.retry)
            .await?;
        let mut answer_text = first.text;
        let mut indices = extract_citation_indices(&answer_text);

        if indices.is_empty() {
            warn!("reply carried no citation markers; regenerating once with stricter instructions");
            let stricter = format!("{user_message}\n\n{STRICT_CITATION_REMINDER}");
            let second = self
                .generate(&stricter, &options.generation, RetryPolicy::new(1))
                .await?;
            answer_text = second.text;
            indices = extract_citation_indices(&answer_text);
        }
        let generation_ms = generation_started.elapsed().as_millis() as u64;

        let citations: Vec<Citation> = indices
            .into_iter()
            .filter(|index| (1..=blocks.len()).contains(index))
            .map(|index| {
                let block = &blocks[index - 1];
                Citation {
                    marker: format!("CIT-{index}"),
                    document_id: block.document_id.clone(),
                    page_no: block.page_no,
                    title: block.title.clone(),
                }
            })
            .collect();
        let used_segments: Vec<String> = blocks
            .iter()
            .map(|block| block.segment_id.clone())
            .collect();

        info!(
            citations = citations.len(),
            blocks = used_segments.len(),
            "answer synthesized"
        );

        Ok(AnswerResponse {
            answer: answer_text,
            citations,
            used_segments,
            timings: AnswerTimings {
                retrieve_ms,
                generation_ms,
                total_ms: started.elapsed().as_millis() as u64,
            },
        })
    }

    fn insufficient_context(retrieve_ms: u64, started: Instant) -> AnswerResponse {
        AnswerResponse {
            answer: INSUFFICIENT_CONTEXT_ANSWER.to_string(),
            citations: Vec::new(),
            used_segments: Vec::new(),
            timings: AnswerTimings {
                retrieve_ms,
                generation_ms: 0,
                total_ms: started.elapsed().as_millis() as u64,
            },
        }
    }

    async fn generate(
        &self,
        user_message: &str,
        generation: &GenerationOptions,
        policy: RetryPolicy,
    ) -> Result<ChatOutcome, AppError> {
        policy
            .run(|| self.chat.generate(SYSTEM_PROMPT, user_message, generation))
            .await
            .map_err(|err| AppError::LlmUnreachable(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::storage::types::document::Document;
    use common::storage::types::embedding_vector::EmbeddingVector;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };
    use uuid::Uuid;

    /// Chat double that pops one scripted reply per call; the last entry is
    /// repeated once the script runs out.
    struct FakeChat {
        replies: Mutex<Vec<Result<String, String>>>,
        calls: AtomicUsize,
    }

    impl FakeChat {
        fn scripted(replies: Vec<Result<String, String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatModel for FakeChat {
        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _options: &GenerationOptions,
        ) -> Result<ChatOutcome, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().expect("script lock");
            let next = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            };
            match next {
                Ok(text) => Ok(ChatOutcome {
                    text,
                    usage: Default::default(),
                }),
                Err(detail) => Err(AppError::Processing(detail)),
            }
        }
    }

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

    async fn seed_corpus(db: &Arc<SurrealDbClient>, provider: &Arc<EmbeddingProvider>) {
        let document = Document::new("Q1 report".into(), None, None, None, None);
        let segment = Segment::new(
            document.id.clone(),
            1,
            0,
            "Revenue grew 12% in Q1.".into(),
            7,
            None,
            None,
        );
        db.store_item(document).await.expect("doc store failed");
        let vector = provider.embed(&segment.text).await.expect("embed failed");
        let vector_row = EmbeddingVector::new(
            segment.id.clone(),
            segment.document_id.clone(),
            provider.model_code(),
            vector,
        );
        Segment::insert_batch(db, vec![segment])
            .await
            .expect("segment seed failed");
        EmbeddingVector::insert_batch(db, vec![vector_row])
            .await
            .expect("vector seed failed");
    }

    fn synthesizer(
        db: Arc<SurrealDbClient>,
        provider: Arc<EmbeddingProvider>,
        chat: Arc<FakeChat>,
    ) -> AnswerSynthesizer {
        AnswerSynthesizer::new(db, provider, chat)
    }

    #[tokio::test]
    async fn test_empty_retrieval_short_circuits_without_generation() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));
        let chat = FakeChat::scripted(vec![Ok("should never be called".into())]);
        let synth = synthesizer(db, provider, Arc::clone(&chat));

        let response = synth
            .answer("anything", &AnswerOptions::default())
            .await
            .expect("answering failed");

        assert_eq!(response.answer, INSUFFICIENT_CONTEXT_ANSWER);
        assert!(response.citations.is_empty());
        assert!(response.used_segments.is_empty());
        assert_eq!(response.timings.generation_ms, 0);
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn test_cited_reply_is_mapped_to_provenance() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));
        seed_corpus(&db, &provider).await;
        let chat = FakeChat::scripted(vec![Ok("Revenue grew 12% [CIT-1].".into())]);
        let synth = synthesizer(db, provider, Arc::clone(&chat));

        let response = synth
            .answer("Q1 revenue growth", &AnswerOptions::default())
            .await
            .expect("answering failed");

        assert_eq!(chat.calls(), 1);
        assert_eq!(response.citations.len(), 1);
        assert_eq!(response.citations[0].marker, "CIT-1");
        assert_eq!(response.citations[0].title, "Q1 report");
        assert_eq!(response.citations[0].page_no, 1);
        assert_eq!(response.used_segments.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_citations_trigger_exactly_one_regeneration() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));
        seed_corpus(&db, &provider).await;
        let chat = FakeChat::scripted(vec![
            Ok("uncited first attempt".into()),
            Ok("second attempt with [CIT-1].".into()),
        ]);
        let synth = synthesizer(db, provider, Arc::clone(&chat));

        let response = synth
            .answer("Q1 revenue growth", &AnswerOptions::default())
            .await
            .expect("answering failed");

        assert_eq!(chat.calls(), 2, "one generation plus one regeneration");
        assert_eq!(response.citations.len(), 1);
        assert!(response.answer.contains("[CIT-1]"));
    }

    #[tokio::test]
    async fn test_persistently_uncited_reply_is_returned_after_one_regeneration() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));
        seed_corpus(&db, &provider).await;
        let chat = FakeChat::scripted(vec![Ok("still no markers".into())]);
        let synth = synthesizer(db, provider, Arc::clone(&chat));

        let response = synth
            .answer("Q1 revenue growth", &AnswerOptions::default())
            .await
            .expect("answering failed");

        assert_eq!(chat.calls(), 2, "never more than one regeneration");
        assert_eq!(response.answer, "still no markers");
        assert!(response.citations.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_citation_indices_are_dropped() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));
        seed_corpus(&db, &provider).await;
        let chat = FakeChat::scripted(vec![Ok("claims [CIT-1] and [CIT-9].".into())]);
        let synth = synthesizer(db, provider, Arc::clone(&chat));

        let response = synth
            .answer("Q1 revenue growth", &AnswerOptions::default())
            .await
            .expect("answering failed");

        assert_eq!(response.citations.len(), 1);
        assert_eq!(response.citations[0].marker, "CIT-1");
    }

    #[tokio::test]
    async fn test_unreachable_llm_surfaces_fatal_error_after_retries() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));
        seed_corpus(&db, &provider).await;
        let chat = FakeChat::scripted(vec![Err("connection refused".into())]);
        let synth = synthesizer(db, provider, Arc::clone(&chat));

        let result = synth
            .answer("Q1 revenue growth", &AnswerOptions::default())
            .await;

        assert!(matches!(result, Err(AppError::LlmUnreachable(_))));
        assert_eq!(chat.calls(), 3, "initial attempt plus two retries");
    }

    #[tokio::test]
    async fn test_context_budget_limits_admitted_segments() {
        let db = test_db().await;
        let provider = Arc::new(EmbeddingProvider::new_hashed(64));

        let document = Document::new("Long doc".into(), None, None, None, None);
        db.store_item(document.clone()).await.expect("store failed");
        let mut segments = Vec::new();
        let mut vectors = Vec::new();
        for page in 1..=4 {
            let text = format!("turbine maintenance details {}", "word ".repeat(40));
            let segment = Segment::new(document.id.clone(), page, 0, text.clone(), 44, None, None);
            let vector = provider.embed(&text).await.expect("embed failed");
            vectors.push(EmbeddingVector::new(
                segment.id.clone(),
                document.id.clone(),
                provider.model_code(),
                vector,
            ));
            segments.push(segment);
        }
        Segment::insert_batch(&db, segments).await.expect("seed failed");
        EmbeddingVector::insert_batch(&db, vectors)
            .await
            .expect("vector seed failed");

        let chat = FakeChat::scripted(vec![Ok("summary [CIT-1]".into())]);
        let synth = synthesizer(db, provider, Arc::clone(&chat));

        let options = AnswerOptions {
            max_context_tokens: 100,
            ..AnswerOptions::default()
        };
        let response = synth
            .answer("turbine maintenance", &options)
            .await
            .expect("answering failed");

        assert_eq!(
            response.used_segments.len(),
            2,
            "only two ~44-token pages fit into a 100-token budget"
        );
    }
}
