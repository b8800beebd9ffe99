use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use uuid::Uuid;

/// Bumped whenever the chunking strategy changes shape, so stale segments can
/// be found and re-chunked through full document re-ingestion.
pub const SEGMENT_SCHEMA_VERSION: u32 = 1;

stored_object!(Segment, "segment", {
    document_id: String,
    page_no: u32,
    chunk_index: u32,
    text: String,
    token_estimate: u32,
    modality: Modality,
    ocr_confidence: Option<f32>,
    heading_path: Option<String>,
    schema_version: u32
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
}

/// Page-ordered preview row used by document inspection.
#[derive(Debug, Deserialize)]
pub struct SegmentSample {
    pub id: String,
    pub page_no: u32,
    pub chunk_index: u32,
    pub sample: String,
}

/// Row returned by the embedding exclusion scan.
#[derive(Debug, Deserialize)]
pub struct UnembeddedSegment {
    pub id: String,
    pub document_id: String,
    pub text: String,
}

const UNEMBEDDED_SCOPED: &str = "SELECT record::id(id) AS id, document_id, text FROM segment \
     WHERE record::id(id) NOT IN \
       (SELECT VALUE segment_id FROM embedding_vector WHERE model = $model) \
       AND document_id = $document \
     ORDER BY id ASC LIMIT $limit";

const UNEMBEDDED_UNSCOPED: &str = "SELECT record::id(id) AS id, document_id, text FROM segment \
     WHERE record::id(id) NOT IN \
       (SELECT VALUE segment_id FROM embedding_vector WHERE model = $model) \
     ORDER BY id ASC LIMIT $limit";

impl Segment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        document_id: String,
        page_no: u32,
        chunk_index: u32,
        text: String,
        token_estimate: u32,
        ocr_confidence: Option<f32>,
        heading_path: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id,
            page_no,
            chunk_index,
            text,
            token_estimate,
            modality: Modality::Text,
            ocr_confidence,
            heading_path,
            schema_version: SEGMENT_SCHEMA_VERSION,
        }
    }

    pub async fn insert_batch(db: &SurrealDbClient, rows: Vec<Self>) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }
        db.query("INSERT INTO segment $rows")
            .bind(("rows", rows))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn fetch_by_ids(db: &SurrealDbClient, ids: &[String]) -> Result<Vec<Self>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let things: Vec<Thing> = ids
            .iter()
            .map(|id| Thing::from((Self::table_name(), id.as_str())))
            .collect();
        let mut response = db
            .query("SELECT * FROM segment WHERE id IN $things")
            .bind(("things", things))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn list_for_document(
        db: &SurrealDbClient,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<SegmentSample>, AppError> {
        let mut response = db
            .query(
                "SELECT record::id(id) AS id, page_no, chunk_index, \
                 string::slice(text, 0, 300) AS sample \
                 FROM segment WHERE document_id = $document \
                 ORDER BY page_no ASC, chunk_index ASC LIMIT $limit",
            )
            .bind(("document", document_id.to_owned()))
            .bind(("limit", limit as i64))
            .await?;
        Ok(response.take(0)?)
    }

    /// Finds segments that have no vector under `model` yet, ordered by
    /// ascending id and capped at `limit` to bound memory per batch.
    pub async fn unembedded(
        db: &SurrealDbClient,
        model: &str,
        scope: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UnembeddedSegment>, AppError> {
        let mut query = match scope {
            Some(document_id) => db
                .query(UNEMBEDDED_SCOPED)
                .bind(("document", document_id.to_owned())),
            None => db.query(UNEMBEDDED_UNSCOPED),
        };
        query = query
            .bind(("model", model.to_owned()))
            .bind(("limit", limit as i64));

        let mut response = query.await?;
        Ok(response.take(0)?)
    }
}
