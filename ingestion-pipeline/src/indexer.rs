use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{embedding_vector::EmbeddingVector, segment::Segment},
    },
    utils::embedding::EmbeddingProvider,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub segments_scanned: usize,
    pub vectors_created: usize,
}

/// Finds segments without a vector under the current model and embeds them
/// in fixed-size batches. Each batch commits independently: a failure aborts
/// the current batch only and committed batches stay valid.
pub struct EmbeddingIndexer {
    db: Arc<SurrealDbClient>,
    provider: Arc<EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingIndexer {
    pub fn new(db: Arc<SurrealDbClient>, provider: Arc<EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            db,
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Indexes the whole corpus, or a single document when `scope` is set.
    /// Re-running over a fully indexed scope performs zero work.
    #[instrument(skip_all)]
    pub async fn index(&self, scope: Option<&str>) -> Result<IndexReport, AppError> {
        let model = self.provider.model_code();
        let mut report = IndexReport::default();

        loop {
            let batch = Segment::unembedded(&self.db, &model, scope, self.batch_size).await?;
            if batch.is_empty() {
                break;
            }

            let texts: Vec<String> = batch.iter().map(|segment| segment.text.clone()).collect();
            let vectors = self
                .provider
                .embed_batch(texts)
                .await
                .map_err(|err| AppError::EmbeddingService(err.to_string()))?;
            if vectors.len() != batch.len() {
                return Err(AppError::EmbeddingService(format!(
                    "expected {} vectors, received {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let rows: Vec<EmbeddingVector> = batch
                .iter()
                .zip(vectors)
                .map(|(segment, vector)| {
                    EmbeddingVector::new(
                        segment.id.clone(),
                        segment.document_id.clone(),
                        model.clone(),
                        vector,
                    )
                })
                .collect();

            let created = rows.len();
            EmbeddingVector::insert_batch(&self.db, rows).await?;

            report.segments_scanned += batch.len();
            report.vectors_created += created;
            debug!(
                batch = created,
                total = report.vectors_created,
                "committed embedding batch"
            );
        }

        if report.vectors_created > 0 {
            info!(
                scope = scope.unwrap_or("all"),
                vectors = report.vectors_created,
                model = %model,
                "embedding indexing finished"
            );
        }

        Ok(report)
    }
}
