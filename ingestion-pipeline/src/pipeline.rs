use std::{path::PathBuf, sync::Arc};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            document::{Document, DocumentStatus},
            segment::Segment,
        },
    },
    utils::embedding::EmbeddingProvider,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    chunker::{chunk_page_text, ChunkingConfig},
    extraction::{ocr::OcrEngine, pdf::PageRasterizer, PageExtractor, PageText},
    indexer::{EmbeddingIndexer, IndexReport},
};

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub pages: u32,
    pub segments_created: u32,
    pub indexed: Option<IndexReport>,
    pub skipped: Option<String>,
}

impl IngestReport {
    fn skipped(document_id: String, reason: String) -> Self {
        Self {
            document_id,
            pages: 0,
            segments_created: 0,
            indexed: None,
            skipped: Some(reason),
        }
    }
}

/// Synchronous per-document ingestion: extract pages (text-first, OCR
/// fallback), chunk them, persist the segments, then embed whatever the
/// document is missing. Documents are single-writer; status transitions
/// processing → ready/error guard against mixed results.
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    extractor: Arc<PageExtractor>,
    indexer: EmbeddingIndexer,
    chunking: ChunkingConfig,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        provider: Arc<EmbeddingProvider>,
        ocr: Arc<dyn OcrEngine>,
        rasterizer: Arc<dyn PageRasterizer>,
        chunking: ChunkingConfig,
        embedding_batch_size: usize,
    ) -> Self {
        Self {
            extractor: Arc::new(PageExtractor::new(ocr, rasterizer)),
            indexer: EmbeddingIndexer::new(Arc::clone(&db), provider, embedding_batch_size),
            db,
            chunking,
        }
    }

    #[instrument(skip_all, fields(document_id = %document_id))]
    pub async fn process_document(&self, document_id: &str) -> Result<IngestReport, AppError> {
        let document: Document = self
            .db
            .get_item(document_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document {document_id}")))?;

        let source_path = document.source_path.clone().ok_or_else(|| {
            AppError::Validation(format!("document {document_id} has no source path"))
        })?;
        let path = PathBuf::from(&source_path);
        if !path.exists() {
            Document::mark_status(&self.db, document_id, DocumentStatus::Error).await?;
            return Err(AppError::SourceMissing(source_path));
        }

        Document::mark_status(&self.db, document_id, DocumentStatus::Processing).await?;

        match self.ingest(&document, path).await {
            Ok(report) => Ok(report),
            Err(AppError::UnsupportedMedia(media)) => {
                warn!(media = %media, "no extraction path for media type; skipping");
                Document::mark_status(&self.db, document_id, DocumentStatus::Ready).await?;
                Ok(IngestReport::skipped(
                    document.id.clone(),
                    format!("unsupported mime: {media}"),
                ))
            }
            Err(err) => {
                Document::mark_status(&self.db, document_id, DocumentStatus::Error).await?;
                Err(err)
            }
        }
    }

    async fn ingest(&self, document: &Document, path: PathBuf) -> Result<IngestReport, AppError> {
        let mime = document.mime_type.clone().unwrap_or_default();
        let extractor = Arc::clone(&self.extractor);

        let pages: Vec<PageText> = if mime.starts_with("application/pdf") {
            tokio::task::spawn_blocking(move || extractor.extract_pdf(&path)).await??
        } else if mime.starts_with("image/") {
            tokio::task::spawn_blocking(move || extractor.extract_image(&path)).await??
        } else {
            return Err(AppError::UnsupportedMedia(if mime.is_empty() {
                "unknown".to_string()
            } else {
                mime
            }));
        };

        let mut segments = Vec::new();
        for page in &pages {
            let chunks = chunk_page_text(&page.text, &self.chunking);
            debug!(page = page.page_no, chunks = chunks.len(), "chunked page");
            for chunk in chunks {
                segments.push(Segment::new(
                    document.id.clone(),
                    page.page_no,
                    chunk.index,
                    chunk.text,
                    chunk.token_estimate as u32,
                    page.ocr_confidence,
                    chunk.heading_path,
                ));
            }
        }

        let segments_created = segments.len() as u32;
        Segment::insert_batch(&self.db, segments).await?;
        Document::finish_ingestion(&self.db, &document.id, pages.len() as u32).await?;

        let indexed = self.indexer.index(Some(&document.id)).await?;
        info!(
            pages = pages.len(),
            segments = segments_created,
            vectors = indexed.vectors_created,
            "document ingested"
        );

        Ok(IngestReport {
            document_id: document.id.clone(),
            pages: pages.len() as u32,
            segments_created,
            indexed: Some(indexed),
            skipped: None,
        })
    }
}
