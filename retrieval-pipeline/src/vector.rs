use std::collections::HashMap;

use common::{error::AppError, storage::db::SurrealDbClient};
use serde::Deserialize;
use surrealdb::sql::Thing;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct KnnRow {
    segment_id: String,
    document_id: String,
    distance: f32,
}

#[derive(Debug, Deserialize)]
struct SegmentPreviewRow {
    id: String,
    page_no: u32,
    chunk_index: u32,
    ocr_confidence: Option<f32>,
    preview: Option<String>,
}

/// Semantic candidate: a segment plus its cosine distance to the probe.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub id: String,
    pub document_id: String,
    pub page_no: u32,
    pub chunk_index: u32,
    pub ocr_confidence: Option<f32>,
    pub distance: f32,
    pub preview: Option<String>,
}

/// Nearest-neighbor search over the vector table. The KNN operator takes its
/// candidate count and probe vector inline; everything else is bound.
pub async fn semantic_search(
    db: &SurrealDbClient,
    probe: &[f32],
    model: &str,
    scope: Option<&str>,
    limit: usize,
) -> Result<Vec<SemanticHit>, AppError> {
    let ef_search = limit.max(40);
    let filter = match scope {
        Some(_) => "model = $model AND document_id = $document",
        None => "model = $model",
    };
    let knn_query = format!(
        "SELECT segment_id, document_id, vector::distance::knn() AS distance \
         FROM embedding_vector \
         WHERE {filter} AND vector <|{limit},{ef_search}|> {probe:?} \
         ORDER BY distance ASC"
    );

    let prepared = match scope {
        Some(document_id) => db
            .query(knn_query)
            .bind(("document", document_id.to_owned())),
        None => db.query(knn_query),
    };
    let mut response = prepared.bind(("model", model.to_owned())).await?;
    let rows: Vec<KnnRow> = response.take(0)?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let things: Vec<Thing> = rows
        .iter()
        .map(|row| Thing::from(("segment", row.segment_id.as_str())))
        .collect();
    let mut preview_response = db
        .query(
            "SELECT record::id(id) AS id, page_no, chunk_index, ocr_confidence, \
             string::slice(text, 0, 400) AS preview \
             FROM segment WHERE id IN $things",
        )
        .bind(("things", things))
        .await?;
    let previews: Vec<SegmentPreviewRow> = preview_response.take(0)?;
    let mut by_id: HashMap<String, SegmentPreviewRow> = previews
        .into_iter()
        .map(|row| (row.id.clone(), row))
        .collect();

    // keep the KNN ordering; drop hits whose segment has vanished meanwhile
    let hits: Vec<SemanticHit> = rows
        .into_iter()
        .filter_map(|row| {
            by_id.remove(&row.segment_id).map(|preview| SemanticHit {
                id: row.segment_id,
                document_id: row.document_id,
                page_no: preview.page_no,
                chunk_index: preview.chunk_index,
                ocr_confidence: preview.ocr_confidence,
                distance: row.distance,
                preview: preview.preview,
            })
        })
        .collect();

    debug!(candidates = hits.len(), scoped = scope.is_some(), "semantic search finished");
    Ok(hits)
}
