use std::{collections::HashMap, path::Path};

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use sha2::{Digest, Sha256};
use uuid::Uuid;

stored_object!(Document, "document", {
    title: String,
    source_path: Option<String>,
    mime_type: Option<String>,
    pages: Option<u32>,
    byte_size: Option<u64>,
    hash_sha256: Option<String>,
    status: DocumentStatus
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Ready,
    Processing,
    Error,
}

#[derive(Debug, Deserialize)]
struct TitleRow {
    id: String,
    title: String,
}

impl Document {
    pub fn new(
        title: String,
        source_path: Option<String>,
        mime_type: Option<String>,
        byte_size: Option<u64>,
        hash_sha256: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            source_path,
            mime_type,
            pages: None,
            byte_size,
            hash_sha256,
            status: DocumentStatus::Ready,
        }
    }

    /// Registers a file on disk as a new document: detects the MIME type,
    /// records size and a streaming SHA-256 digest, and persists the record.
    pub async fn register_file(
        db: &SurrealDbClient,
        path: &Path,
        title: Option<String>,
    ) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::SourceMissing(path.display().to_string()));
        }

        let mime = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        let byte_size = tokio::fs::metadata(path).await?.len();

        let digest_path = path.to_path_buf();
        let digest = tokio::task::spawn_blocking(move || -> Result<String, std::io::Error> {
            let mut file = std::fs::File::open(&digest_path)?;
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher)?;
            Ok(format!("{:x}", hasher.finalize()))
        })
        .await??;

        let title = title.unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "untitled".to_string())
        });

        let document = Self::new(
            title,
            Some(path.display().to_string()),
            Some(mime),
            Some(byte_size),
            Some(digest),
        );
        db.store_item(document.clone()).await?;

        Ok(document)
    }

    pub async fn mark_status(
        db: &SurrealDbClient,
        id: &str,
        status: DocumentStatus,
    ) -> Result<(), AppError> {
        db.query("UPDATE type::thing('document', $id) SET status = $status, updated_at = time::now()")
            .bind(("id", id.to_owned()))
            .bind(("status", status))
            .await?
            .check()?;
        Ok(())
    }

    /// Records the final page count and flips the document back to `ready`.
    pub async fn finish_ingestion(
        db: &SurrealDbClient,
        id: &str,
        pages: u32,
    ) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('document', $id) \
             SET pages = $pages, status = $status, updated_at = time::now()",
        )
        .bind(("id", id.to_owned()))
        .bind(("pages", pages))
        .bind(("status", DocumentStatus::Ready))
        .await?
        .check()?;
        Ok(())
    }

    pub async fn list_recent(db: &SurrealDbClient, limit: usize) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM document ORDER BY created_at DESC LIMIT $limit")
            .bind(("limit", limit as i64))
            .await?;
        Ok(response.take(0)?)
    }

    /// Resolves titles for a set of document ids in one round trip.
    pub async fn titles_by_ids(
        db: &SurrealDbClient,
        ids: &[String],
    ) -> Result<HashMap<String, String>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let things: Vec<Thing> = ids
            .iter()
            .map(|id| Thing::from((Self::table_name(), id.as_str())))
            .collect();
        let mut response = db
            .query("SELECT record::id(id) AS id, title FROM document WHERE id IN $things")
            .bind(("things", things))
            .await?;
        let rows: Vec<TitleRow> = response.take(0)?;
        Ok(rows.into_iter().map(|row| (row.id, row.title)).collect())
    }

    /// Removes the document together with its segments and their vectors.
    pub async fn delete_cascade(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.query(
            "BEGIN TRANSACTION;
             DELETE embedding_vector WHERE document_id = $id;
             DELETE segment WHERE document_id = $id;
             DELETE type::thing('document', $id);
             COMMIT TRANSACTION;",
        )
        .bind(("id", id.to_owned()))
        .await?
        .check()?;
        Ok(())
    }
}
