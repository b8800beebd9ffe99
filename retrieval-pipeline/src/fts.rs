use common::{error::AppError, storage::db::SurrealDbClient};
use serde::Deserialize;
use tracing::debug;

/// Lexical candidate straight from the BM25 index, snippet included.
#[derive(Debug, Clone, Deserialize)]
pub struct LexicalHit {
    pub id: String,
    pub document_id: String,
    pub page_no: u32,
    pub chunk_index: u32,
    pub ocr_confidence: Option<f32>,
    pub rank: f32,
    pub snippet: Option<String>,
}

const LEXICAL_SCOPED: &str = "SELECT record::id(id) AS id, document_id, page_no, chunk_index, ocr_confidence, \
     search::score(0) AS rank, search::highlight('<b>', '</b>', 0) AS snippet \
     FROM segment \
     WHERE text @0@ $terms AND document_id = $document \
     ORDER BY rank DESC LIMIT $limit";

const LEXICAL_UNSCOPED: &str = "SELECT record::id(id) AS id, document_id, page_no, chunk_index, ocr_confidence, \
     search::score(0) AS rank, search::highlight('<b>', '</b>', 0) AS snippet \
     FROM segment \
     WHERE text @0@ $terms \
     ORDER BY rank DESC LIMIT $limit";

/// Full-text rank over segment text, optionally restricted to one document.
pub async fn lexical_search(
    db: &SurrealDbClient,
    query: &str,
    scope: Option<&str>,
    limit: usize,
) -> Result<Vec<LexicalHit>, AppError> {
    let prepared = match scope {
        Some(document_id) => db
            .query(LEXICAL_SCOPED)
            .bind(("document", document_id.to_owned())),
        None => db.query(LEXICAL_UNSCOPED),
    };

    let mut response = prepared
        .bind(("terms", query.to_owned()))
        .bind(("limit", limit as i64))
        .await?;
    let hits: Vec<LexicalHit> = response.take(0)?;

    debug!(candidates = hits.len(), scoped = scope.is_some(), "lexical search finished");
    Ok(hits)
}
