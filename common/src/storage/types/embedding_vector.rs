use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use uuid::Uuid;

stored_object!(EmbeddingVector, "embedding_vector", {
    segment_id: String,
    document_id: String,
    model: String,
    dimension: u32,
    vector: Vec<f32>
});

impl EmbeddingVector {
    pub fn new(segment_id: String, document_id: String, model: String, vector: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            segment_id,
            document_id,
            model,
            dimension: vector.len() as u32,
            vector,
        }
    }

    /// Persists one indexing batch. The unique `(segment_id, model)` index
    /// rejects duplicates, so racing indexer runs fail loudly here instead of
    /// writing a second vector for the same segment.
    pub async fn insert_batch(db: &SurrealDbClient, rows: Vec<Self>) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }
        db.query("INSERT INTO embedding_vector $rows")
            .bind(("rows", rows))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn count_for_model(db: &SurrealDbClient, model: &str) -> Result<usize, AppError> {
        let mut response = db
            .query("SELECT VALUE count() FROM embedding_vector WHERE model = $model GROUP ALL")
            .bind(("model", model.to_owned()))
            .await?;
        #[derive(serde::Deserialize)]
        struct CountRow {
            count: i64,
        }
        let counts: Vec<CountRow> = response.take(0)?;
        Ok(counts.first().map(|row| row.count).unwrap_or(0) as usize)
    }
}
