use std::ops::Deref;

use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

use super::types::StoredObject;

const MIGRATIONS: &str = "BEGIN TRANSACTION;
    DEFINE TABLE IF NOT EXISTS document SCHEMALESS;
    DEFINE TABLE IF NOT EXISTS segment SCHEMALESS;
    DEFINE TABLE IF NOT EXISTS embedding_vector SCHEMALESS;
    DEFINE ANALYZER IF NOT EXISTS app_en_fts_analyzer
        TOKENIZERS class
        FILTERS lowercase, ascii, snowball(english);
    DEFINE INDEX IF NOT EXISTS idx_segment_document ON segment FIELDS document_id;
    DEFINE INDEX IF NOT EXISTS idx_segment_text_fts ON TABLE segment FIELDS text
        SEARCH ANALYZER app_en_fts_analyzer BM25 HIGHLIGHTS;
    DEFINE INDEX IF NOT EXISTS idx_vector_document ON embedding_vector FIELDS document_id;
    DEFINE INDEX IF NOT EXISTS idx_vector_segment_model ON embedding_vector FIELDS segment_id, model UNIQUE;
    COMMIT TRANSACTION;";

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// In-memory instance for tests and local experiments; no authentication.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Defines tables, the FTS analyzer and every non-vector index. Idempotent.
    pub async fn apply_migrations(&self) -> Result<(), Error> {
        self.client.query(MIGRATIONS).await?.check()?;
        Ok(())
    }

    /// Defines the KNN index for the configured embedding dimension. Changing
    /// the embedding model's dimension requires removing `idx_vector_knn` first.
    pub async fn ensure_vector_index(&self, dimension: usize) -> Result<(), Error> {
        let definition = format!(
            "DEFINE INDEX IF NOT EXISTS idx_vector_knn ON TABLE embedding_vector \
             FIELDS vector HNSW DIMENSION {dimension} DIST COSINE;"
        );
        self.client.query(definition).await?.check()?;
        Ok(())
    }

    /// Operation to store a object in SurrealDB, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `item` - The item to be stored
    ///
    /// # Returns
    /// * `Result` - Item or Error
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Operation to retrieve a single object by its ID, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `id` - The ID of the item to retrieve
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The found item or Error
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Operation to delete a single object by its ID, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `id` - The ID of the item to delete
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The deleted item or Error
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
